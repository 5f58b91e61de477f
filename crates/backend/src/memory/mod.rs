//! In-memory backends
//!
//! One backend per capability kind, all backed by per-namespace ordered
//! maps. Namespaces are tracked in a concurrent map; entities within a
//! namespace live in a `BTreeMap` under a read-write lock so prefix scans
//! come out in key order.

mod db;
mod kv;
mod object;

pub use db::MemoryDbBackend;
pub use kv::MemoryKvBackend;
pub use object::MemoryObjectBackend;

/// Nanoseconds since the Unix epoch, for object modification times.
pub(crate) fn now_ns() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
