//! Client context
//!
//! A [`Client`] owns everything long-lived on the client side: the parsed
//! configuration, the connection pool, the background worker pool for
//! distribution fan-out, the operation cache and the single async-batch
//! worker. It is a cheap shared handle; batches and entities keep a clone.
//!
//! A backend kind whose server list is empty runs its backend *locally*
//! inside the client process; the batch engine then calls the backend
//! directly instead of sending messages.

use crate::cache::OperationCache;
use reef_backend::registry::open_backend;
use reef_backend::{Backend, DbBackend, KvBackend, ObjectBackend};
use reef_core::semantics::{Semantics, Template};
use reef_core::{util, BackendKind, Configuration, Credentials, Error, Result};
use reef_net::{ConnectionPool, Message, MessageOp};
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::warn;

type AsyncJob = Box<dyn FnOnce() + Send>;

/// Single worker thread executing async batches in submission order.
pub(crate) struct AsyncWorker {
    sender: Mutex<Option<mpsc::Sender<AsyncJob>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncWorker {
    fn new() -> Self {
        let (sender, receiver) = mpsc::channel::<AsyncJob>();
        let handle = std::thread::Builder::new()
            .name("reef-batch".to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })
            .ok();
        Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(handle),
        }
    }

    pub(crate) fn submit(&self, job: AsyncJob) -> Result<()> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(s) => s
                .send(job)
                .map_err(|_| Error::Cancelled),
            None => Err(Error::Cancelled),
        }
    }

    fn shutdown(&self) {
        // Dropping the sender ends the worker after queued jobs finish.
        self.sender.lock().take();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

pub(crate) struct ClientInner {
    pub(crate) config: Configuration,
    pub(crate) credentials: Credentials,
    pub(crate) pool: ConnectionPool,
    pub(crate) background: reef_core::BackgroundPool,
    pub(crate) cache: OperationCache,
    pub(crate) async_worker: AsyncWorker,
    pub(crate) local_object: Option<Arc<dyn ObjectBackend>>,
    pub(crate) local_kv: Option<Arc<dyn KvBackend>>,
    pub(crate) local_db: Option<Arc<dyn DbBackend>>,
}

/// Shared client handle.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

impl Client {
    /// Connect with a configuration: build the connection pool and open
    /// local backends for kinds without servers.
    pub fn connect(config: Configuration) -> Result<Self> {
        Self::connect_with_credentials(config, Credentials::default())
    }

    /// Connect and attach explicit credentials; they accompany
    /// security-relevant operations when a batch demands
    /// `security=strict`.
    pub fn connect_with_credentials(
        config: Configuration,
        credentials: Credentials,
    ) -> Result<Self> {
        let mut local_object = None;
        let mut local_kv = None;
        let mut local_db = None;

        for kind in BackendKind::ALL {
            if config.server_count(kind) > 0 {
                continue;
            }
            let selection = config.backend(kind);
            let backend = open_backend(&selection.backend, kind, &selection.path)?;
            match backend {
                Backend::Object(b) => local_object = Some(b),
                Backend::Kv(b) => local_kv = Some(b),
                Backend::Db(b) => local_db = Some(b),
            }
        }

        let pool = ConnectionPool::new(&config);
        Ok(Self {
            inner: Arc::new(ClientInner {
                pool,
                background: reef_core::BackgroundPool::with_default_threads(),
                cache: OperationCache::new(&config),
                async_worker: AsyncWorker::new(),
                credentials,
                local_object,
                local_kv,
                local_db,
                config,
            }),
        })
    }

    /// The client's configuration.
    pub fn config(&self) -> &Configuration {
        &self.inner.config
    }

    /// The credentials attached to this client.
    pub fn credentials(&self) -> Credentials {
        self.inner.credentials
    }

    /// Start a batch with template semantics.
    pub fn batch(&self, template: Template) -> crate::Batch {
        crate::Batch::new(self, Semantics::new(template).share())
    }

    /// Start a batch with explicit semantics.
    pub fn batch_with_semantics(
        &self,
        semantics: reef_core::semantics::SemanticsRef,
    ) -> crate::Batch {
        crate::Batch::new(self, semantics)
    }

    /// Number of server buckets for a kind; a local backend counts as one.
    pub(crate) fn bucket_count(&self, kind: BackendKind) -> u32 {
        self.inner.config.server_count(kind).max(1)
    }

    /// Server bucket for an entity name.
    pub(crate) fn bucket_for(&self, kind: BackendKind, name: &str) -> u32 {
        util::server_index_for(name, self.bucket_count(kind))
    }

    pub(crate) fn local_object(&self) -> Option<&Arc<dyn ObjectBackend>> {
        self.inner.local_object.as_ref()
    }

    pub(crate) fn local_kv(&self) -> Option<&Arc<dyn KvBackend>> {
        self.inner.local_kv.as_ref()
    }

    pub(crate) fn local_db(&self) -> Option<&Arc<dyn DbBackend>> {
        self.inner.local_db.as_ref()
    }

    /// Fetch the statistics counters of every object server.
    ///
    /// Returns one 8-counter snapshot per server in configuration order;
    /// see [`reef_core::StatisticsType`] for the counter order.
    pub fn server_statistics(&self) -> Result<Vec<[u64; 8]>> {
        let count = self.inner.config.server_count(BackendKind::Object);
        let mut all = Vec::with_capacity(count as usize);
        for index in 0..count {
            let request = Message::new(MessageOp::Statistics);
            let reply = crate::wire::with_endpoint(self, BackendKind::Object, index, |ep| {
                ep.send(&request)?;
                let reply = ep.receive()?;
                reply.expect_reply_for(&request)?;
                Ok(reply)
            })?;
            let mut reply = reply;
            let mut counters = [0u64; 8];
            for slot in counters.iter_mut() {
                *slot = reply.get_8()?;
            }
            all.push(counters);
        }
        Ok(all)
    }

    /// Sum the statistics counters across all object servers.
    pub fn statistics_total(&self) -> Result<[u64; 8]> {
        let mut total = [0u64; 8];
        for counters in self.server_statistics()? {
            for (t, c) in total.iter_mut().zip(counters) {
                *t += c;
            }
        }
        Ok(total)
    }

    /// Flush the operation cache and tear down pools.
    ///
    /// Errors from flushed batches surface here; the teardown itself is
    /// infallible.
    pub fn shutdown(&self) -> Result<()> {
        let flushed = self.inner.cache.flush(self);
        self.inner.async_worker.shutdown();
        self.inner.background.shutdown();
        self.inner.pool.shutdown();
        flushed
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if !self.cache.is_empty() {
            warn!("client dropped with unflushed cached batches; call shutdown() to flush");
        }
        self.async_worker.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> Configuration {
        // No servers configured: all backends run locally.
        Configuration::default()
    }

    #[test]
    fn local_backends_open_for_serverless_kinds() {
        let client = Client::connect(local_config()).unwrap();
        assert!(client.local_object().is_some());
        assert!(client.local_kv().is_some());
        assert!(client.local_db().is_some());
        assert_eq!(client.bucket_count(BackendKind::Object), 1);
    }

    #[test]
    fn bucket_is_stable_per_name() {
        let client = Client::connect(local_config()).unwrap();
        let a = client.bucket_for(BackendKind::Kv, "some-key");
        let b = client.bucket_for(BackendKind::Kv, "some-key");
        assert_eq!(a, b);
    }

    #[test]
    fn credentials_are_attached() {
        let client =
            Client::connect_with_credentials(local_config(), Credentials::new(1000, 100)).unwrap();
        assert_eq!(client.credentials(), Credentials::new(1000, 100));
    }

    #[test]
    fn unknown_backend_name_fails() {
        let mut config = Configuration::default();
        config.kv.backend = "leveldb".to_string();
        assert!(Client::connect(config).is_err());
    }
}
