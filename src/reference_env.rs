use std::sync::{Arc, Mutex};

use crate::batch::{Batch, PAYLOAD_HEADER_LEN};
use crate::environment::CommitEnvironment;
use crate::error::BoxedError;
use crate::memtable::Memtable;
use crate::wal::{StorageBackend, WALConfig, WALJournal};

/// A single logical mutation carried in a batch's operation bytes.
///
/// This concrete encoding exists only for the reference environment and its
/// tests; the pipeline itself treats a batch's payload as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Encodes a sequence of operations into the wire format the reference
/// environment's `apply` decodes: `tag(1) + key_len(u32) + key [+
/// value_len(u32) + value]` per operation, back to back.
pub fn encode_ops(ops: &[Op]) -> Vec<u8> {
    let mut buf = Vec::new();
    for op in ops {
        match op {
            Op::Put { key, value } => {
                buf.push(0u8);
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
                buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
                buf.extend_from_slice(value);
            }
            Op::Delete { key } => {
                buf.push(1u8);
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
            }
        }
    }
    buf
}

fn decode_ops(mut data: &[u8]) -> Vec<Op> {
    let mut ops = Vec::new();
    while !data.is_empty() {
        let tag = data[0];
        data = &data[1..];
        let key_len = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
        data = &data[4..];
        let key = data[..key_len].to_vec();
        data = &data[key_len..];
        match tag {
            0 => {
                let value_len = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
                data = &data[4..];
                let value = data[..value_len].to_vec();
                data = &data[value_len..];
                ops.push(Op::Put { key, value });
            }
            1 => ops.push(Op::Delete { key }),
            other => panic!("unknown op tag {other}"),
        }
    }
    ops
}

/// Convenience constructor for a batch carrying `ops`, stamped with the
/// same wire layout `Batch::new` expects (seq slot, count slot, op bytes).
pub fn batch_from_ops(ops: &[Op]) -> Batch {
    Batch::new(ops.len() as u32, &encode_ops(ops))
}

type FaultHook = Arc<dyn Fn(&Batch) -> bool + Send + Sync>;

/// One concrete, in-process implementation of `CommitEnvironment`, built
/// from the reference WAL journal and reference memtable.
///
/// Not part of the pipeline's contract: a host engine substitutes its own
/// WAL and skiplist-backed memtable behind the same trait. This
/// implementation exists so the pipeline can be exercised and tested
/// end-to-end as a complete crate.
pub struct ReferenceEnvironment {
    journal: Arc<WALJournal>,
    memtable: Arc<Memtable>,
    write_fault: Mutex<Option<FaultHook>>,
    apply_fault: Mutex<Option<FaultHook>>,
}

impl ReferenceEnvironment {
    pub fn new(backend: Arc<dyn StorageBackend>, config: WALConfig) -> std::io::Result<Self> {
        Ok(Self {
            journal: Arc::new(WALJournal::new(backend, config)?),
            memtable: Arc::new(Memtable::new()),
            write_fault: Mutex::new(None),
            apply_fault: Mutex::new(None),
        })
    }

    pub fn memtable(&self) -> &Memtable {
        &self.memtable
    }

    pub fn journal(&self) -> &WALJournal {
        &self.journal
    }

    /// Installs a predicate that, when it returns `true` for a batch, makes
    /// `write` fail for that batch instead of appending it. Used to test
    /// error isolation (a failing batch must not affect its siblings).
    pub fn inject_write_fault(&self, predicate: impl Fn(&Batch) -> bool + Send + Sync + 'static) {
        *self.write_fault.lock().unwrap() = Some(Arc::new(predicate));
    }

    /// Installs a predicate that, when it returns `true` for a batch, makes
    /// `apply` fail for that batch after its WAL record was already
    /// durably appended.
    pub fn inject_apply_fault(&self, predicate: impl Fn(&Batch) -> bool + Send + Sync + 'static) {
        *self.apply_fault.lock().unwrap() = Some(Arc::new(predicate));
    }

    pub fn clear_faults(&self) {
        *self.write_fault.lock().unwrap() = None;
        *self.apply_fault.lock().unwrap() = None;
    }
}

impl CommitEnvironment for ReferenceEnvironment {
    type Memtable = Memtable;

    fn write(&self, batch: &Arc<Batch>, sync: bool) -> Result<Arc<Memtable>, BoxedError> {
        if let Some(fault) = self.write_fault.lock().unwrap().as_ref() {
            if fault(batch) {
                return Err("injected write fault".into());
            }
        }

        let record = batch.with_payload(<[u8]>::to_vec);
        let watermark = self
            .journal
            .append(&record)
            .map_err(|e| Box::new(e) as BoxedError)?;

        if sync {
            // The group-commit fsync that covers this watermark may be led
            // by any thread that next calls `wait_for_sync` (including a
            // concurrent submitter). This helper thread exists only so a
            // batch that requested sync is guaranteed *some* caller of
            // `wait_for_sync`, even if every other in-flight commit asked
            // for `sync = false`; it does not itself become the leader
            // unless no one else already is.
            let journal = Arc::clone(&self.journal);
            let batch = Arc::clone(batch);
            std::thread::spawn(move || {
                let result = journal
                    .wait_for_sync(watermark)
                    .map_err(|e| Box::new(e) as BoxedError);
                batch.signal_sync(result);
            });
        }

        Ok(Arc::clone(&self.memtable))
    }

    fn apply(&self, batch: &Arc<Batch>, memtable: &Memtable) -> Result<(), BoxedError> {
        if let Some(fault) = self.apply_fault.lock().unwrap().as_ref() {
            if fault(batch) {
                return Err("injected apply fault".into());
            }
        }

        let seq = batch.seq_num();
        let ops = batch.with_payload(|p| decode_ops(&p[PAYLOAD_HEADER_LEN..]));
        for (i, op) in ops.into_iter().enumerate() {
            let op_seq = seq + i as u64;
            match op {
                Op::Put { key, value } => memtable.put(key, value, op_seq),
                Op::Delete { key } => memtable.delete(key, op_seq),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::MemoryBackend;
    use std::sync::Arc;

    fn env() -> ReferenceEnvironment {
        ReferenceEnvironment::new(Arc::new(MemoryBackend::new()), WALConfig::default()).unwrap()
    }

    #[test]
    fn write_then_apply_installs_into_memtable() {
        let env = env();
        let batch = Arc::new(batch_from_ops(&[Op::Put {
            key: b"k".to_vec(),
            value: b"v".to_vec(),
        }]));
        batch.set_seq_num(1);

        let memtable = env.write(&batch, false).unwrap();
        env.apply(&batch, &memtable).unwrap();

        assert_eq!(
            env.memtable().get(b"k"),
            Some(crate::memtable::Entry::Value(b"v".to_vec()))
        );
    }

    #[test]
    fn op_encoding_round_trips_through_decode() {
        let ops = vec![
            Op::Put {
                key: b"a".to_vec(),
                value: b"1".to_vec(),
            },
            Op::Delete { key: b"b".to_vec() },
        ];
        let encoded = encode_ops(&ops);
        assert_eq!(decode_ops(&encoded), ops);
    }
}
