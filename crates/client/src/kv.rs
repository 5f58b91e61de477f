//! Key-value pairs
//!
//! A [`KvPair`] references one (namespace, key) slot on a kv server; the
//! server bucket is derived from the key unless given explicitly. Put,
//! delete and get are deferred batch operations.
//!
//! A get of an absent key fills its slot with `None` and does not fail the
//! batch; the caller distinguishes absence from failure through the slot.

use crate::batch::Batch;
use crate::client::Client;
use crate::operation::{ExecKind, OperationKey, Payload, ValueSlot};
use crate::wire::with_endpoint;
use bytes::Bytes;
use reef_backend::KvBackend;
use reef_core::semantics::SemanticsRef;
use reef_core::{trace, types, BackendKind, Error, Result};
use reef_net::{Message, MessageFlags, MessageOp, ResultCode};
use std::sync::Arc;

struct KvPairInner {
    namespace: String,
    key: String,
    index: u32,
}

/// A typed blob keyed by (namespace, key) on one kv server.
#[derive(Clone)]
pub struct KvPair {
    inner: Arc<KvPairInner>,
}

impl KvPair {
    /// Reference a pair; the server bucket is derived from the key.
    pub fn new(client: &Client, namespace: &str, key: &str) -> Result<Self> {
        let index = client.bucket_for(BackendKind::Kv, key);
        Self::with_index(client, index, namespace, key)
    }

    /// Reference a pair on an explicit server.
    pub fn with_index(client: &Client, index: u32, namespace: &str, key: &str) -> Result<Self> {
        types::validate_name("namespace", namespace)?;
        types::validate_name("key", key)?;
        if index >= client.bucket_count(BackendKind::Kv) {
            return Err(Error::InvalidArgument(format!(
                "kv server index {index} out of range"
            )));
        }
        Ok(Self {
            inner: Arc::new(KvPairInner {
                namespace: namespace.to_string(),
                key: key.to_string(),
                index,
            }),
        })
    }

    /// The namespace.
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// The key.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// The server bucket this pair lives on.
    pub fn index(&self) -> u32 {
        self.inner.index
    }

    fn op_key(&self, kind: ExecKind) -> OperationKey {
        // Backend batches are namespace-scoped, so operations only
        // coalesce within one namespace.
        OperationKey {
            kind,
            server: self.inner.index,
            scope: self.inner.namespace.clone(),
        }
    }

    /// Queue storing `value` under this key.
    pub fn put(&self, batch: &mut Batch, value: impl Into<Bytes>) {
        batch.add(
            self.op_key(ExecKind::KvPut),
            Payload::KvPut {
                pair: self.clone(),
                value: value.into(),
            },
        );
    }

    /// Queue deleting this key.
    pub fn delete(&self, batch: &mut Batch) {
        batch.add(
            self.op_key(ExecKind::KvDelete),
            Payload::KvDelete { pair: self.clone() },
        );
    }

    /// Queue fetching this key; the slot holds `None` after execute if the
    /// key was absent.
    pub fn get(&self, batch: &mut Batch) -> ValueSlot {
        let slot = ValueSlot::new();
        batch.add(
            self.op_key(ExecKind::KvGet),
            Payload::KvGet {
                pair: self.clone(),
                slot: slot.clone(),
            },
        );
        slot
    }
}

fn payload_pair(payload: &Payload) -> &KvPair {
    match payload {
        Payload::KvPut { pair, .. } | Payload::KvDelete { pair } | Payload::KvGet { pair, .. } => {
            pair
        }
        _ => unreachable!("kv executor received a non-kv payload"),
    }
}

/// Executor for kv put/delete/get groups on one server.
pub(crate) fn exec_kv(
    client: &Client,
    semantics: &SemanticsRef,
    key: &OperationKey,
    payloads: Vec<Payload>,
) -> Result<()> {
    let _span = trace::enter("kv");

    if let Some(backend) = client.local_kv() {
        return local_kv(backend, semantics, key, &payloads);
    }

    let op = match key.kind {
        ExecKind::KvPut => MessageOp::KvPut,
        ExecKind::KvDelete => MessageOp::KvDelete,
        ExecKind::KvGet => MessageOp::KvGet,
        _ => unreachable!("kv executor received a non-kv kind"),
    };

    let mut message = Message::with_capacity(op, payloads.len() * 48);
    message.add_flags(MessageFlags::from_safety(semantics.safety()));
    for payload in &payloads {
        let pair = payload_pair(payload);
        message.add_operation();
        message.append_str(pair.namespace())?;
        message.append_str(pair.key())?;
        if let Payload::KvPut { value, .. } = payload {
            message.append_4(value.len() as u32);
            message.append_n(value);
        }
    }

    let want_reply = op == MessageOp::KvGet || message.flags().wants_reply();

    let per_op_error = with_endpoint(client, BackendKind::Kv, key.server, |endpoint| {
        endpoint.send(&message)?;
        if !want_reply {
            return Ok(None);
        }
        let mut reply = endpoint.receive()?;
        reply.expect_reply_for(&message)?;

        let mut first_error = None;
        for payload in &payloads {
            match payload {
                Payload::KvGet { slot, .. } => {
                    let len = reply.get_4()? as usize;
                    if len == 0 {
                        slot.set(None);
                    } else {
                        slot.set(Some(reply.get_n(len)?));
                    }
                }
                other => {
                    let pair = payload_pair(other);
                    let code = ResultCode::from_u32(reply.get_4()?)?;
                    let context = format!("{}/{}", pair.namespace(), pair.key());
                    if let Err(e) = code.into_result(&context) {
                        first_error.get_or_insert(e);
                    }
                }
            }
        }
        Ok(first_error)
    })?;

    match per_op_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// One backend batch covers the whole group; the grouping key guarantees
/// a single namespace.
fn local_kv(
    backend: &Arc<dyn KvBackend>,
    semantics: &SemanticsRef,
    key: &OperationKey,
    payloads: &[Payload],
) -> Result<()> {
    let mut batch = backend.batch_start(&key.scope, semantics)?;
    let mut first_error = None;

    for payload in payloads {
        let pair = payload_pair(payload);
        let result = match payload {
            Payload::KvPut { value, .. } => backend.put(&mut batch, pair.key(), value),
            Payload::KvDelete { .. } => backend.delete(&mut batch, pair.key()),
            Payload::KvGet { slot, .. } => match backend.get(&mut batch, pair.key()) {
                Ok(value) => {
                    slot.set(Some(value));
                    Ok(())
                }
                Err(e) if e.is_not_found() => {
                    slot.set(None);
                    Ok(())
                }
                Err(e) => Err(e),
            },
            _ => unreachable!("kv executor received a non-kv payload"),
        };
        if let Err(e) = result {
            first_error.get_or_insert(e);
        }
    }

    if let Err(e) = backend.batch_execute(batch) {
        first_error.get_or_insert(e);
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reef_backend::{KvBatch, PairIter};
    use reef_core::semantics::{Atomicity, Semantics, Template};
    use reef_core::Configuration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts batch lifecycle calls; storage itself is a no-op.
    #[derive(Default)]
    struct CountingKv {
        starts: AtomicUsize,
        executes: AtomicUsize,
        puts: AtomicUsize,
        atomic_starts: AtomicUsize,
    }

    impl KvBackend for CountingKv {
        fn batch_start(&self, namespace: &str, semantics: &Semantics) -> Result<KvBatch> {
            self.starts.fetch_add(1, Ordering::Relaxed);
            let atomic = semantics.atomicity() == Atomicity::Batch;
            if atomic {
                self.atomic_starts.fetch_add(1, Ordering::Relaxed);
            }
            Ok(KvBatch {
                namespace: namespace.to_string(),
                atomic,
            })
        }

        fn batch_execute(&self, _batch: KvBatch) -> Result<()> {
            self.executes.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn put(&self, _batch: &mut KvBatch, key: &str, _value: &[u8]) -> Result<()> {
            if key == "boom" {
                return Err(Error::Backend(key.to_string()));
            }
            self.puts.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn delete(&self, _batch: &mut KvBatch, key: &str) -> Result<()> {
            Err(Error::NotFound(key.to_string()))
        }

        fn get(&self, _batch: &mut KvBatch, key: &str) -> Result<Vec<u8>> {
            Err(Error::NotFound(key.to_string()))
        }

        fn get_all(&self, _namespace: &str) -> Result<PairIter> {
            Ok(PairIter::new(std::iter::empty()))
        }

        fn get_by_prefix(&self, _namespace: &str, _prefix: &str) -> Result<PairIter> {
            Ok(PairIter::new(std::iter::empty()))
        }
    }

    /// A coalesced group runs through exactly one backend batch, and the
    /// batch carries the atomicity aspect.
    #[test]
    fn group_shares_one_backend_batch() {
        let client = Client::connect(Configuration::default()).unwrap();
        let backend = Arc::new(CountingKv::default());
        let dyn_backend: Arc<dyn KvBackend> = backend.clone();

        let semantics = Semantics::parse(Template::Default, "atomicity=batch")
            .unwrap()
            .share();
        let payloads: Vec<Payload> = (0..5)
            .map(|i| Payload::KvPut {
                pair: KvPair::new(&client, "ns", &format!("k{i}")).unwrap(),
                value: Bytes::from_static(b"v"),
            })
            .collect();
        let key = OperationKey {
            kind: ExecKind::KvPut,
            server: 0,
            scope: "ns".to_string(),
        };

        local_kv(&dyn_backend, &semantics, &key, &payloads).unwrap();
        assert_eq!(backend.starts.load(Ordering::Relaxed), 1);
        assert_eq!(backend.executes.load(Ordering::Relaxed), 1);
        assert_eq!(backend.puts.load(Ordering::Relaxed), 5);
        assert_eq!(backend.atomic_starts.load(Ordering::Relaxed), 1);
    }

    /// A failing operation inside the group surfaces as the group error;
    /// the surrounding operations still run on the same single batch.
    #[test]
    fn group_failure_still_executes_one_batch() {
        let client = Client::connect(Configuration::default()).unwrap();
        let backend = Arc::new(CountingKv::default());
        let dyn_backend: Arc<dyn KvBackend> = backend.clone();

        let semantics = Semantics::new(Template::Default).share();
        let payloads: Vec<Payload> = ["a", "boom", "z"]
            .into_iter()
            .map(|k| Payload::KvPut {
                pair: KvPair::new(&client, "ns", k).unwrap(),
                value: Bytes::from_static(b"v"),
            })
            .collect();
        let key = OperationKey {
            kind: ExecKind::KvPut,
            server: 0,
            scope: "ns".to_string(),
        };

        let err = local_kv(&dyn_backend, &semantics, &key, &payloads).unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert_eq!(backend.starts.load(Ordering::Relaxed), 1);
        assert_eq!(backend.executes.load(Ordering::Relaxed), 1);
        assert_eq!(backend.puts.load(Ordering::Relaxed), 2);
    }
}
