//! Operation cache for eventually consistent batches
//!
//! A batch whose consistency is `eventual` and whose operations are all
//! side-effecting does not execute right away: its operations move into
//! this process-wide FIFO and `execute` returns success immediately. The
//! queue drains, in order, when
//!
//! - the soft byte cap is exceeded,
//! - a non-cached batch is about to execute (program order),
//! - any iterator is created (reads must observe prior writes),
//! - the client shuts down.
//!
//! Errors from cached batches surface at the flush that runs them.

use crate::batch::execute_plan;
use crate::client::Client;
use crate::operation::Operation;
use parking_lot::Mutex;
use reef_core::semantics::SemanticsRef;
use reef_core::{Configuration, Result};
use std::collections::VecDeque;
use tracing::debug;

/// Soft cap on buffered bulk-data bytes: 512 MiB.
const DEFAULT_CAP: u64 = 512 * 1024 * 1024;

struct CachedBatch {
    semantics: SemanticsRef,
    ops: Vec<Operation>,
    data_size: u64,
}

struct CacheState {
    queue: VecDeque<CachedBatch>,
    buffered_bytes: u64,
}

/// Process-wide FIFO of deferred batches.
pub(crate) struct OperationCache {
    state: Mutex<CacheState>,
    cap: u64,
}

impl OperationCache {
    pub(crate) fn new(_config: &Configuration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                queue: VecDeque::new(),
                buffered_bytes: 0,
            }),
            cap: DEFAULT_CAP,
        }
    }

    /// Enqueue a batch's operations. Returns `true` if the cap was
    /// exceeded and the caller must flush.
    pub(crate) fn push(&self, semantics: SemanticsRef, ops: Vec<Operation>) -> bool {
        let data_size: u64 = ops.iter().map(|op| op.payload.data_size()).sum();
        let mut state = self.state.lock();
        state.buffered_bytes += data_size;
        state.queue.push_back(CachedBatch {
            semantics,
            ops,
            data_size,
        });
        state.buffered_bytes > self.cap
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Drain the queue, executing every cached batch in order. The first
    /// error is returned after the drain completes; later batches still
    /// run, matching the all-batches-execute contract of a synchronous
    /// group walk.
    pub(crate) fn flush(&self, client: &Client) -> Result<()> {
        let mut first_error = None;
        loop {
            let entry = {
                let mut state = self.state.lock();
                match state.queue.pop_front() {
                    Some(entry) => {
                        state.buffered_bytes -= entry.data_size;
                        entry
                    }
                    None => break,
                }
            };
            debug!(ops = entry.ops.len(), "flushing cached batch");
            if let Err(e) = execute_plan(client, &entry.semantics, entry.ops) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
