//! Background worker pool
//!
//! A fixed pool of worker threads executing submitted jobs in FIFO order.
//! The batch engine uses it to fan distributed-object sub-batches out over
//! servers in parallel.
//!
//! Shutdown is clean: queued jobs run to completion, submissions after
//! shutdown begins fail.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::error;

type Job = Box<dyn FnOnce() + Send>;

struct PoolInner {
    queue: Mutex<VecDeque<Job>>,
    work_ready: Condvar,
    shutdown: AtomicBool,
}

/// A fixed-size background worker pool.
pub struct BackgroundPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
}

struct JobSlot<T> {
    result: Mutex<Option<std::thread::Result<T>>>,
    done: Condvar,
}

/// Handle to a submitted job; [`wait`](JobHandle::wait) blocks until the
/// job completes and returns its result.
pub struct JobHandle<T> {
    slot: Arc<JobSlot<T>>,
}

impl<T> JobHandle<T> {
    /// Block until the job completes.
    ///
    /// # Panics
    ///
    /// Re-raises a panic that occurred inside the job.
    pub fn wait(self) -> T {
        let mut guard = self.slot.result.lock();
        while guard.is_none() {
            self.slot.done.wait(&mut guard);
        }
        match guard.take().unwrap() {
            Ok(value) => value,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Number of workers used by default: one per CPU, at least one.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1)
}

impl BackgroundPool {
    /// Create a pool with the given number of worker threads.
    ///
    /// Workers are named `reef-bg-0`, `reef-bg-1`, etc.
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let inner = Arc::new(PoolInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let inner = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name(format!("reef-bg-{i}"))
                .spawn(move || worker_loop(&inner));
            match handle {
                Ok(h) => workers.push(h),
                Err(e) => error!("failed to spawn background worker {i}: {e}"),
            }
        }

        Self {
            inner,
            workers: Mutex::new(workers),
            num_threads,
        }
    }

    /// Create a pool sized to the number of CPUs.
    pub fn with_default_threads() -> Self {
        Self::new(default_threads())
    }

    /// Number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Submit a job for execution.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` once shutdown has begun.
    pub fn submit<T, F>(&self, job: F) -> Result<JobHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(Error::InvalidArgument(
                "background pool is shut down".into(),
            ));
        }

        let slot = Arc::new(JobSlot {
            result: Mutex::new(None),
            done: Condvar::new(),
        });
        let job_slot = Arc::clone(&slot);
        let wrapped: Job = Box::new(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job));
            *job_slot.result.lock() = Some(result);
            job_slot.done.notify_all();
        });

        {
            let mut queue = self.inner.queue.lock();
            queue.push_back(wrapped);
        }
        self.inner.work_ready.notify_one();

        Ok(JobHandle { slot })
    }

    /// Begin shutdown and join all workers. Queued jobs run to completion.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.work_ready.notify_all();
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for BackgroundPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    break None;
                }
                inner.work_ready.wait(&mut queue);
            }
        };
        match job {
            Some(job) => job(),
            None => return,
        }
    }
}
