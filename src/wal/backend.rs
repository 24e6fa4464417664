use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// Storage surface the reference WAL journal writes through.
///
/// Mirrors the shape of the teacher's own `StorageBackend` abstraction
/// (separate `FileBackend` for native files and an in-memory variant for
/// tests), trimmed to the handful of operations the journal actually needs.
pub trait StorageBackend: Send + Sync {
    fn len(&self) -> io::Result<u64>;
    fn read(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;
    fn write(&self, offset: u64, data: &[u8]) -> io::Result<()>;
    fn set_len(&self, len: u64) -> io::Result<()>;
    fn sync_data(&self) -> io::Result<()>;
}

/// Native file-backed storage, for on-disk WAL use.
pub struct FileBackend {
    file: Mutex<File>,
}

impl FileBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl StorageBackend for FileBackend {
    fn len(&self) -> io::Result<u64> {
        let file = self.file.lock().unwrap();
        Ok(file.metadata()?.len())
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    fn write(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        let file = self.file.lock().unwrap();
        file.set_len(len)
    }

    fn sync_data(&self) -> io::Result<()> {
        let file = self.file.lock().unwrap();
        file.sync_data()
    }
}

/// In-memory storage, for tests that want WAL semantics (ordering, CRC
/// framing, group-commit) without real file I/O.
#[derive(Default)]
pub struct MemoryBackend {
    buf: Mutex<Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn len(&self) -> io::Result<u64> {
        Ok(self.buf.lock().unwrap().len() as u64)
    }

    fn read(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let backing = self.buf.lock().unwrap();
        let start = offset as usize;
        let end = start + buf.len();
        if end > backing.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "read past end"));
        }
        buf.copy_from_slice(&backing[start..end]);
        Ok(())
    }

    fn write(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        let mut backing = self.buf.lock().unwrap();
        let start = offset as usize;
        let end = start + data.len();
        if end > backing.len() {
            backing.resize(end, 0);
        }
        backing[start..end].copy_from_slice(data);
        Ok(())
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        self.buf.lock().unwrap().resize(len as usize, 0);
        Ok(())
    }

    fn sync_data(&self) -> io::Result<()> {
        Ok(())
    }
}
