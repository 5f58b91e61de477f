//! Per-server operation statistics
//!
//! Eight counters cover the operations a server performs. Updates are
//! atomic fetch-adds on the hot path; a snapshot serializes the counters in
//! a fixed order for the `STATISTICS` wire reply.

use std::sync::atomic::{AtomicU64, Ordering};

/// The tracked counter kinds, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticsType {
    /// Objects created
    FilesCreated,
    /// Objects deleted
    FilesDeleted,
    /// Status operations served
    FilesStated,
    /// Sync operations served
    SyncCount,
    /// Payload bytes read from storage
    BytesRead,
    /// Payload bytes written to storage
    BytesWritten,
    /// Bytes received over the network
    BytesReceived,
    /// Bytes sent over the network
    BytesSent,
}

/// Atomic counter set.
#[derive(Debug, Default)]
pub struct Statistics {
    files_created: AtomicU64,
    files_deleted: AtomicU64,
    files_stated: AtomicU64,
    sync_count: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
}

impl Statistics {
    /// Create a zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, ty: StatisticsType) -> &AtomicU64 {
        match ty {
            StatisticsType::FilesCreated => &self.files_created,
            StatisticsType::FilesDeleted => &self.files_deleted,
            StatisticsType::FilesStated => &self.files_stated,
            StatisticsType::SyncCount => &self.sync_count,
            StatisticsType::BytesRead => &self.bytes_read,
            StatisticsType::BytesWritten => &self.bytes_written,
            StatisticsType::BytesReceived => &self.bytes_received,
            StatisticsType::BytesSent => &self.bytes_sent,
        }
    }

    /// Atomically add `value` to a counter.
    pub fn add(&self, ty: StatisticsType, value: u64) {
        self.counter(ty).fetch_add(value, Ordering::Relaxed);
    }

    /// Current value of a counter.
    pub fn get(&self, ty: StatisticsType) -> u64 {
        self.counter(ty).load(Ordering::Relaxed)
    }

    /// Snapshot all counters in wire order.
    pub fn snapshot(&self) -> [u64; 8] {
        [
            self.get(StatisticsType::FilesCreated),
            self.get(StatisticsType::FilesDeleted),
            self.get(StatisticsType::FilesStated),
            self.get(StatisticsType::SyncCount),
            self.get(StatisticsType::BytesRead),
            self.get(StatisticsType::BytesWritten),
            self.get(StatisticsType::BytesReceived),
            self.get(StatisticsType::BytesSent),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn snapshot_order_is_stable() {
        let stats = Statistics::new();
        stats.add(StatisticsType::FilesCreated, 1);
        stats.add(StatisticsType::BytesSent, 7);
        assert_eq!(stats.snapshot(), [1, 0, 0, 0, 0, 0, 0, 7]);
    }

    #[test]
    fn concurrent_adds_do_not_lose_updates() {
        let stats = Arc::new(Statistics::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    stats.add(StatisticsType::BytesWritten, 2);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.get(StatisticsType::BytesWritten), 8000);
    }
}
