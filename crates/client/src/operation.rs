//! Deferred operations and their result slots
//!
//! A batch collects [`Operation`]s. Each operation carries a key that
//! identifies which executor handles it and which server bucket it targets;
//! consecutive operations with equal keys are coalesced into one wire
//! message. The payload is an enum over per-executor argument records, so
//! the executor inspects the tag once and gets typed access.
//!
//! Because execution is deferred, operations that produce data hand the
//! caller a *slot* up front; the executor fills it during
//! `Batch::execute`. Slots are cheap shared handles and may be read from
//! any thread once the batch completed.

use crate::db::{Entry, IdSlot, Schema};
use crate::kv::KvPair;
use crate::object::{DistributedObject, Object};
use bytes::Bytes;
use parking_lot::Mutex;
use reef_core::Document;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared byte counter filled during execution (e.g. bytes written).
///
/// Distributed operations fan out into children that all add into the same
/// counter.
#[derive(Debug, Clone, Default)]
pub struct ByteCount(Arc<AtomicU64>);

impl ByteCount {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    /// The accumulated count.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct StatusInner {
    found: AtomicBool,
    modification_time: AtomicI64,
    size: AtomicU64,
}

/// Result slot for a status operation.
#[derive(Debug, Clone, Default)]
pub struct StatusSlot(Arc<StatusInner>);

impl StatusSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Merge a per-server status into the slot, keeping the maxima. A
    /// single-server status merges into the zeroed slot once; distributed
    /// objects merge once per server, since each sees only its stripes.
    pub(crate) fn merge_max(&self, modification_time: i64, size: u64) {
        self.0.found.store(true, Ordering::Release);
        self.0
            .modification_time
            .fetch_max(modification_time, Ordering::Relaxed);
        self.0.size.fetch_max(size, Ordering::Relaxed);
    }

    /// Whether the operation filled the slot.
    pub fn exists(&self) -> bool {
        self.0.found.load(Ordering::Acquire)
    }

    /// Modification time in nanoseconds since the Unix epoch.
    pub fn modification_time(&self) -> i64 {
        self.0.modification_time.load(Ordering::Relaxed)
    }

    /// Object size in bytes.
    pub fn size(&self) -> u64 {
        self.0.size.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct ReadSlotInner {
    buf: Mutex<Vec<u8>>,
    count: AtomicU64,
}

/// Result slot for a read operation.
///
/// The buffer is sized to the requested length; children of a distributed
/// read fill disjoint regions concurrently.
#[derive(Debug, Clone)]
pub struct ReadSlot(Arc<ReadSlotInner>);

impl ReadSlot {
    pub(crate) fn with_length(length: u64) -> Self {
        Self(Arc::new(ReadSlotInner {
            buf: Mutex::new(vec![0u8; length as usize]),
            count: AtomicU64::new(0),
        }))
    }

    /// Copy `data` into the buffer at `pos` (relative to the request) and
    /// account for it.
    pub(crate) fn fill_at(&self, pos: u64, data: &[u8]) {
        let mut buf = self.0.buf.lock();
        let start = pos as usize;
        buf[start..start + data.len()].copy_from_slice(data);
        self.0.count.fetch_add(data.len() as u64, Ordering::Relaxed);
    }

    /// Number of bytes actually read.
    pub fn bytes_read(&self) -> u64 {
        self.0.count.load(Ordering::Relaxed)
    }

    /// Take the data, truncated to the bytes actually read.
    pub fn take(&self) -> Vec<u8> {
        let mut buf = self.0.buf.lock();
        let mut data = std::mem::take(&mut *buf);
        data.truncate(self.bytes_read() as usize);
        data
    }
}

/// Result slot for a kv get: `None` if the key was absent.
#[derive(Debug, Clone, Default)]
pub struct ValueSlot(Arc<Mutex<Option<Vec<u8>>>>);

impl ValueSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self, value: Option<Vec<u8>>) {
        *self.0.lock() = value;
    }

    /// The value, if the key existed at execution time.
    pub fn value(&self) -> Option<Vec<u8>> {
        self.0.lock().clone()
    }
}

/// Executor selector; operations only coalesce with the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecKind {
    ObjectCreate,
    ObjectDelete,
    ObjectStatus,
    ObjectSync,
    ObjectRead,
    ObjectWrite,
    DistCreate,
    DistDelete,
    DistStatus,
    DistRead,
    DistWrite,
    KvPut,
    KvDelete,
    KvGet,
    DbSchemaCreate,
    DbSchemaGet,
    DbSchemaDelete,
    DbInsert,
    DbUpdate,
    DbDelete,
}

/// Identifies the server bucket / entity group an operation targets. Two
/// operations with equal keys may be merged into one wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OperationKey {
    pub kind: ExecKind,
    pub server: u32,
    /// Namespace scope for db operations (backend batches are
    /// namespace-scoped); empty otherwise.
    pub scope: String,
}

/// Operation-specific arguments, owned by the batch.
pub(crate) enum Payload {
    ObjectCreate {
        object: Object,
    },
    ObjectDelete {
        object: Object,
    },
    ObjectStatus {
        object: Object,
        slot: StatusSlot,
    },
    ObjectSync {
        object: Object,
    },
    ObjectRead {
        object: Object,
        length: u64,
        offset: u64,
        slot: ReadSlot,
    },
    ObjectWrite {
        object: Object,
        data: Bytes,
        offset: u64,
        written: ByteCount,
    },
    DistCreate {
        object: DistributedObject,
    },
    DistDelete {
        object: DistributedObject,
    },
    DistStatus {
        object: DistributedObject,
        slot: StatusSlot,
    },
    DistRead {
        object: DistributedObject,
        length: u64,
        offset: u64,
        slot: ReadSlot,
    },
    DistWrite {
        object: DistributedObject,
        data: Bytes,
        offset: u64,
        written: ByteCount,
    },
    KvPut {
        pair: KvPair,
        value: Bytes,
    },
    KvDelete {
        pair: KvPair,
    },
    KvGet {
        pair: KvPair,
        slot: ValueSlot,
    },
    DbSchemaCreate {
        schema: Schema,
    },
    DbSchemaGet {
        schema: Schema,
    },
    DbSchemaDelete {
        schema: Schema,
    },
    DbInsert {
        entry: Entry,
        id: IdSlot,
    },
    DbUpdate {
        schema: Schema,
        selector: Document,
        entry: Document,
    },
    DbDelete {
        schema: Schema,
        selector: Document,
    },
}

impl Payload {
    pub(crate) fn kind(&self) -> ExecKind {
        match self {
            Payload::ObjectCreate { .. } => ExecKind::ObjectCreate,
            Payload::ObjectDelete { .. } => ExecKind::ObjectDelete,
            Payload::ObjectStatus { .. } => ExecKind::ObjectStatus,
            Payload::ObjectSync { .. } => ExecKind::ObjectSync,
            Payload::ObjectRead { .. } => ExecKind::ObjectRead,
            Payload::ObjectWrite { .. } => ExecKind::ObjectWrite,
            Payload::DistCreate { .. } => ExecKind::DistCreate,
            Payload::DistDelete { .. } => ExecKind::DistDelete,
            Payload::DistStatus { .. } => ExecKind::DistStatus,
            Payload::DistRead { .. } => ExecKind::DistRead,
            Payload::DistWrite { .. } => ExecKind::DistWrite,
            Payload::KvPut { .. } => ExecKind::KvPut,
            Payload::KvDelete { .. } => ExecKind::KvDelete,
            Payload::KvGet { .. } => ExecKind::KvGet,
            Payload::DbSchemaCreate { .. } => ExecKind::DbSchemaCreate,
            Payload::DbSchemaGet { .. } => ExecKind::DbSchemaGet,
            Payload::DbSchemaDelete { .. } => ExecKind::DbSchemaDelete,
            Payload::DbInsert { .. } => ExecKind::DbInsert,
            Payload::DbUpdate { .. } => ExecKind::DbUpdate,
            Payload::DbDelete { .. } => ExecKind::DbDelete,
        }
    }

    /// Whether this operation may enter the operation cache: it must be
    /// purely side-effecting (no reads, no queries, no slots a caller is
    /// waiting on).
    pub(crate) fn is_cacheable(&self) -> bool {
        matches!(
            self,
            Payload::ObjectCreate { .. }
                | Payload::ObjectDelete { .. }
                | Payload::ObjectSync { .. }
                | Payload::ObjectWrite { .. }
                | Payload::DistCreate { .. }
                | Payload::DistDelete { .. }
                | Payload::DistWrite { .. }
                | Payload::KvPut { .. }
                | Payload::KvDelete { .. }
                | Payload::DbSchemaCreate { .. }
                | Payload::DbSchemaDelete { .. }
                | Payload::DbInsert { .. }
                | Payload::DbUpdate { .. }
                | Payload::DbDelete { .. }
        )
    }

    /// Bulk-data bytes this operation holds; used for the cache's soft cap.
    pub(crate) fn data_size(&self) -> u64 {
        match self {
            Payload::ObjectWrite { data, .. }
            | Payload::DistWrite { data, .. }
            | Payload::KvPut { value: data, .. } => data.len() as u64,
            _ => 0,
        }
    }
}

/// One deferred operation: a grouping key plus typed arguments.
pub(crate) struct Operation {
    pub key: OperationKey,
    pub payload: Payload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_slot_fills_disjoint_regions() {
        let slot = ReadSlot::with_length(8);
        slot.fill_at(4, b"wxyz");
        slot.fill_at(0, b"abcd");
        assert_eq!(slot.bytes_read(), 8);
        assert_eq!(slot.take(), b"abcdwxyz");
    }

    #[test]
    fn read_slot_truncates_to_bytes_read() {
        let slot = ReadSlot::with_length(10);
        slot.fill_at(0, b"abc");
        assert_eq!(slot.bytes_read(), 3);
        assert_eq!(slot.take(), b"abc");
    }

    #[test]
    fn status_slot_merges_maxima() {
        let slot = StatusSlot::new();
        assert!(!slot.exists());
        slot.merge_max(100, 4096);
        slot.merge_max(50, 8192);
        assert!(slot.exists());
        assert_eq!(slot.modification_time(), 100);
        assert_eq!(slot.size(), 8192);
    }

    #[test]
    fn byte_count_accumulates() {
        let count = ByteCount::new();
        count.add(3);
        count.add(4);
        assert_eq!(count.get(), 7);
    }
}
