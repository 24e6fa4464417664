use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use super::backend::StorageBackend;
use super::config::WALConfig;

/// Magic number identifying a reference WAL file.
const WAL_MAGIC: &[u8; 8] = b"STRATCWL";
/// Current WAL format version.
const WAL_VERSION: u8 = 1;
/// Size of the WAL file header in bytes.
const WAL_HEADER_SIZE: usize = 32;

/// Reference write-ahead log: an append-only, CRC32-checked, length-prefixed
/// record stream with leader-based group commit.
///
/// This is a collaborator used to exercise the commit pipeline end to end
/// and is not part of the pipeline's own contract (see the commit
/// environment's reference implementation). It mirrors the teacher's own
/// WAL journal: the first thread to call `wait_for_sync` after new records
/// have accumulated becomes the fsync "leader" for all of them; later
/// threads either become leader for records that arrived after, or wait as
/// followers and are woken when the current leader's fsync completes.
pub struct WALJournal {
    backend: Arc<dyn StorageBackend>,
    append_lock: Mutex<()>,
    /// Monotonic counter assigning each appended record a local watermark.
    /// Independent of the pipeline's own sequence numbers: this only orders
    /// records for group-commit purposes.
    watermark_counter: AtomicU64,
    /// Highest watermark fsynced so far.
    last_synced: Arc<(Mutex<u64>, Condvar)>,
    sync_in_progress: AtomicBool,
    config: WALConfig,
}

impl WALJournal {
    /// Wraps `backend` in a fresh or re-opened WAL journal.
    pub fn new(backend: Arc<dyn StorageBackend>, config: WALConfig) -> io::Result<Self> {
        let len = backend.len()?;
        if len == 0 {
            let header = encode_header();
            backend.write(0, &header)?;
            backend.sync_data()?;
        } else {
            let mut header = [0u8; WAL_HEADER_SIZE];
            backend.read(0, &mut header)?;
            validate_header(&header)?;
        }

        Ok(Self {
            backend,
            append_lock: Mutex::new(()),
            watermark_counter: AtomicU64::new(0),
            last_synced: Arc::new((Mutex::new(0), Condvar::new())),
            sync_in_progress: AtomicBool::new(false),
            config,
        })
    }

    /// Appends `payload` to the log (buffered, no fsync). Returns the
    /// watermark assigned to this record; pass it to `wait_for_sync` to
    /// block until it is durable.
    pub fn append(&self, payload: &[u8]) -> io::Result<u64> {
        let watermark = self.watermark_counter.fetch_add(1, Ordering::SeqCst) + 1;

        let crc = crc32fast::hash(payload);
        #[allow(clippy::cast_possible_truncation)]
        let total_len = (4 + payload.len() + 4) as u32;
        let mut wire = Vec::with_capacity(4 + total_len as usize);
        wire.extend_from_slice(&total_len.to_le_bytes());
        wire.extend_from_slice(payload);
        wire.extend_from_slice(&crc.to_le_bytes());

        let _guard = self.append_lock.lock().unwrap();
        let offset = self.backend.len()?;
        self.backend.write(offset, &wire)?;

        Ok(watermark)
    }

    /// Blocks until `watermark` has been fsynced, performing the fsync
    /// itself if no other thread is currently leading a group commit.
    #[cfg_attr(not(feature = "logging"), allow(unused_mut))]
    pub fn wait_for_sync(&self, watermark: u64) -> io::Result<()> {
        loop {
            {
                let (lock, _) = &*self.last_synced;
                let synced = lock.lock().unwrap();
                if *synced >= watermark {
                    return Ok(());
                }
            }

            if self
                .sync_in_progress
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                self.perform_group_sync()?;
                let (lock, _) = &*self.last_synced;
                let synced = lock.lock().unwrap();
                if *synced >= watermark {
                    return Ok(());
                }
                // Someone else's append raced in after we captured the
                // watermark to sync; loop and try to lead again.
            } else {
                let (lock, cvar) = &*self.last_synced;
                let mut synced = lock.lock().unwrap();
                while *synced < watermark {
                    synced = cvar.wait(synced).unwrap();
                }
                return Ok(());
            }
        }
    }

    fn perform_group_sync(&self) -> io::Result<()> {
        if !self.config.group_commit_window.is_zero() {
            let start = Instant::now();
            while start.elapsed() < self.config.group_commit_window {
                std::hint::spin_loop();
            }
        }

        self.backend.sync_data()?;

        let current = self.watermark_counter.load(Ordering::Acquire);
        {
            let (lock, cvar) = &*self.last_synced;
            let mut synced = lock.lock().unwrap();
            *synced = current;
            cvar.notify_all();
        }

        #[cfg(feature = "logging")]
        log::debug!("WAL group sync completed through watermark {current}");

        self.sync_in_progress.store(false, Ordering::Release);
        Ok(())
    }

    /// Forces an immediate fsync of all pending writes, bypassing group
    /// commit (used by shutdown and tests).
    pub fn sync(&self) -> io::Result<()> {
        self.backend.sync_data()?;
        let current = self.watermark_counter.load(Ordering::Acquire);
        let (lock, cvar) = &*self.last_synced;
        let mut synced = lock.lock().unwrap();
        *synced = current;
        cvar.notify_all();
        Ok(())
    }

    /// Reads every record currently in the log, in append order.
    pub fn read_all(&self) -> io::Result<Vec<Vec<u8>>> {
        let len = self.backend.len()?;
        let mut offset = WAL_HEADER_SIZE as u64;
        let mut records = Vec::new();

        while offset < len {
            let mut len_buf = [0u8; 4];
            if offset + 4 > len {
                break;
            }
            self.backend.read(offset, &mut len_buf)?;
            offset += 4;

            let total_len = u32::from_le_bytes(len_buf) as usize;
            if total_len < 8 {
                break;
            }
            let data_len = total_len - 8;
            if offset + data_len as u64 + 4 > len {
                break;
            }

            let mut data = vec![0u8; data_len];
            self.backend.read(offset, &mut data)?;
            offset += data_len as u64;

            let mut crc_buf = [0u8; 4];
            self.backend.read(offset, &mut crc_buf)?;
            offset += 4;

            let stored_crc = u32::from_le_bytes(crc_buf);
            if crc32fast::hash(&data) != stored_crc {
                #[cfg(feature = "logging")]
                log::warn!("WAL record CRC mismatch at offset {offset} - stopping replay");
                break;
            }

            records.push(data);
        }

        Ok(records)
    }

    /// Truncates the log back to an empty record stream and resets the
    /// group-commit watermark.
    pub fn truncate(&self) -> io::Result<()> {
        self.backend.set_len(WAL_HEADER_SIZE as u64)?;
        self.backend.sync_data()?;
        self.watermark_counter.store(0, Ordering::SeqCst);
        let (lock, cvar) = &*self.last_synced;
        let mut synced = lock.lock().unwrap();
        *synced = 0;
        cvar.notify_all();
        Ok(())
    }

    /// Gracefully shuts the journal down, performing a final sync.
    pub fn shutdown(&self) -> io::Result<()> {
        while self.sync_in_progress.load(Ordering::Acquire) {
            std::hint::spin_loop();
        }
        self.sync()
    }
}

fn encode_header() -> [u8; WAL_HEADER_SIZE] {
    let mut buf = [0u8; WAL_HEADER_SIZE];
    buf[0..8].copy_from_slice(WAL_MAGIC);
    buf[8] = WAL_VERSION;
    let crc = crc32fast::hash(&buf[0..9]);
    buf[9..13].copy_from_slice(&crc.to_le_bytes());
    buf
}

fn validate_header(buf: &[u8; WAL_HEADER_SIZE]) -> io::Result<()> {
    if &buf[0..8] != WAL_MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "invalid WAL magic number"));
    }
    let version = buf[8];
    if version != WAL_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported WAL version: {version}"),
        ));
    }
    let stored_crc = u32::from_le_bytes(buf[9..13].try_into().unwrap());
    if crc32fast::hash(&buf[0..9]) != stored_crc {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "WAL header CRC mismatch"));
    }
    Ok(())
}

impl Drop for WALJournal {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
