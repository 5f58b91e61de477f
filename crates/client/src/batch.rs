//! Batch engine
//!
//! A batch collects operations and defers them until `execute`. Execution
//! walks the operation list once, coalescing maximal runs of operations
//! with equal keys into groups, and hands each group to its executor. The
//! batch result is the conjunction of all group results; every group runs
//! even after an earlier one failed, and the first error is reported.
//!
//! Semantics drive the execution strategy:
//! - `consistency=eventual` with only side-effecting operations moves the
//!   operations into the operation cache and returns immediately,
//! - any other batch flushes the cache first to preserve program order,
//! - `atomicity=batch` across more than one backend kind is refused,
//! - safety bits and persistency are applied inside the executors.

use crate::client::Client;
use crate::operation::{ExecKind, Operation, OperationKey, Payload};
use parking_lot::{Condvar, Mutex};
use reef_core::semantics::{Atomicity, Consistency, SemanticsRef};
use reef_core::{trace, BackendKind, Error, Result};
use std::sync::Arc;
use tracing::warn;

/// A deferred batch of operations executed under one semantics.
pub struct Batch {
    client: Client,
    semantics: SemanticsRef,
    ops: Vec<Operation>,
    executed: bool,
}

impl Batch {
    pub(crate) fn new(client: &Client, semantics: SemanticsRef) -> Self {
        Self {
            client: client.clone(),
            semantics,
            ops: Vec::new(),
            executed: false,
        }
    }

    /// The semantics governing this batch.
    pub fn semantics(&self) -> &SemanticsRef {
        &self.semantics
    }

    /// Number of queued operations.
    pub fn operation_count(&self) -> usize {
        self.ops.len()
    }

    pub(crate) fn add(&mut self, key: OperationKey, payload: Payload) {
        self.ops.push(Operation { key, payload });
    }

    /// Execute the batch. A second execute is a no-op returning success.
    pub fn execute(&mut self) -> Result<()> {
        if self.executed {
            return Ok(());
        }
        self.executed = true;
        let ops = std::mem::take(&mut self.ops);
        execute_or_cache(&self.client, &self.semantics, ops)
    }

    /// Execute asynchronously on the client's batch worker. The callback
    /// receives the success boolean; the structured error is available
    /// from [`AsyncBatch::wait`].
    pub fn execute_async<F>(mut self, callback: F) -> AsyncBatch
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let state = Arc::new(AsyncState {
            done: Mutex::new(None),
            cond: Condvar::new(),
        });
        let job_state = Arc::clone(&state);

        let client = self.client.clone();
        let semantics = Arc::clone(&self.semantics);
        let ops = std::mem::take(&mut self.ops);
        self.executed = true;

        let submitted = self.client.inner.async_worker.submit(Box::new(move || {
            let result = execute_or_cache(&client, &semantics, ops);
            callback(result.is_ok());
            *job_state.done.lock() = Some(result);
            job_state.cond.notify_all();
        }));

        if let Err(e) = submitted {
            *state.done.lock() = Some(Err(e));
            state.cond.notify_all();
        }
        AsyncBatch { state }
    }
}

struct AsyncState {
    done: Mutex<Option<Result<()>>>,
    cond: Condvar,
}

/// Completion handle for an asynchronously executed batch.
pub struct AsyncBatch {
    state: Arc<AsyncState>,
}

impl AsyncBatch {
    /// Block until the batch completed and return its result.
    pub fn wait(self) -> Result<()> {
        let mut done = self.state.done.lock();
        while done.is_none() {
            self.state.cond.wait(&mut done);
        }
        done.take().unwrap()
    }
}

/// Backend kind an executor talks to; used to refuse cross-kind
/// transactional batches.
fn backend_kind(kind: ExecKind) -> BackendKind {
    match kind {
        ExecKind::ObjectCreate
        | ExecKind::ObjectDelete
        | ExecKind::ObjectStatus
        | ExecKind::ObjectSync
        | ExecKind::ObjectRead
        | ExecKind::ObjectWrite
        | ExecKind::DistCreate
        | ExecKind::DistDelete
        | ExecKind::DistStatus
        | ExecKind::DistRead
        | ExecKind::DistWrite => BackendKind::Object,
        ExecKind::KvPut | ExecKind::KvDelete | ExecKind::KvGet => BackendKind::Kv,
        ExecKind::DbSchemaCreate
        | ExecKind::DbSchemaGet
        | ExecKind::DbSchemaDelete
        | ExecKind::DbInsert
        | ExecKind::DbUpdate
        | ExecKind::DbDelete => BackendKind::Db,
    }
}

fn execute_or_cache(client: &Client, semantics: &SemanticsRef, ops: Vec<Operation>) -> Result<()> {
    let _span = trace::enter("batch_execute");

    if ops.is_empty() {
        return Ok(());
    }

    if semantics.atomicity() == Atomicity::Batch {
        let first = backend_kind(ops[0].key.kind);
        if ops.iter().any(|op| backend_kind(op.key.kind) != first) {
            return Err(Error::NotSupported(
                "atomicity=batch across multiple backend kinds".into(),
            ));
        }
        // The compiled-in backends expose no transactions; degrade rather
        // than fail the batch.
        warn!("atomicity=batch degraded to atomicity=operation");
    }

    let cacheable = semantics.consistency() == Consistency::Eventual
        && ops.iter().all(|op| op.payload.is_cacheable());
    if cacheable {
        if client.inner.cache.push(Arc::clone(semantics), ops) {
            // Soft cap exceeded; drain now. Errors of earlier cached
            // batches surface here.
            return client.inner.cache.flush(client);
        }
        return Ok(());
    }

    // Program order: anything cached must become observable first.
    client.inner.cache.flush(client)?;
    execute_plan(client, semantics, ops)
}

/// Walk the operation list once, flushing maximal equal-key runs to their
/// executors. All groups run; the first error wins.
pub(crate) fn execute_plan(
    client: &Client,
    semantics: &SemanticsRef,
    ops: Vec<Operation>,
) -> Result<()> {
    let mut first_error: Option<Error> = None;
    let mut group_key: Option<OperationKey> = None;
    let mut group: Vec<Payload> = Vec::new();

    for op in ops {
        match &group_key {
            Some(key) if *key == op.key => group.push(op.payload),
            _ => {
                if let Some(key) = group_key.take() {
                    run_group(client, semantics, &key, std::mem::take(&mut group), &mut first_error);
                }
                group_key = Some(op.key);
                group.push(op.payload);
            }
        }
    }
    if let Some(key) = group_key {
        run_group(client, semantics, &key, group, &mut first_error);
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn run_group(
    client: &Client,
    semantics: &SemanticsRef,
    key: &OperationKey,
    payloads: Vec<Payload>,
    first_error: &mut Option<Error>,
) {
    let result = dispatch(client, semantics, key, payloads);
    if let Err(e) = result {
        warn!(kind = ?key.kind, server = key.server, "operation group failed: {e}");
        first_error.get_or_insert(e);
    }
}

fn dispatch(
    client: &Client,
    semantics: &SemanticsRef,
    key: &OperationKey,
    payloads: Vec<Payload>,
) -> Result<()> {
    match key.kind {
        ExecKind::ObjectCreate
        | ExecKind::ObjectDelete
        | ExecKind::ObjectStatus
        | ExecKind::ObjectSync => crate::object::exec_object_meta(client, semantics, key, payloads),
        ExecKind::ObjectRead => crate::object::exec_object_read(client, semantics, key, payloads),
        ExecKind::ObjectWrite => crate::object::exec_object_write(client, semantics, key, payloads),
        ExecKind::DistCreate | ExecKind::DistDelete | ExecKind::DistStatus => {
            crate::object::exec_dist_meta(client, semantics, key, payloads)
        }
        ExecKind::DistRead => crate::object::exec_dist_read(client, semantics, payloads),
        ExecKind::DistWrite => crate::object::exec_dist_write(client, semantics, payloads),
        ExecKind::KvPut | ExecKind::KvDelete | ExecKind::KvGet => {
            crate::kv::exec_kv(client, semantics, key, payloads)
        }
        ExecKind::DbSchemaCreate
        | ExecKind::DbSchemaGet
        | ExecKind::DbSchemaDelete
        | ExecKind::DbInsert
        | ExecKind::DbUpdate
        | ExecKind::DbDelete => crate::db::exec::exec_db(client, semantics, key, payloads),
    }
}
