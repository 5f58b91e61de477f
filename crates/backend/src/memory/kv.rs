//! In-memory key-value backend

use crate::{KvBackend, KvBatch, PairIter};
use dashmap::DashMap;
use parking_lot::RwLock;
use reef_core::semantics::{Atomicity, Semantics};
use reef_core::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

type Namespace = Arc<RwLock<BTreeMap<String, Vec<u8>>>>;

/// Key-value backend keeping everything in process memory.
///
/// Operations apply immediately; `batch_execute` is a barrier.
#[derive(Default)]
pub struct MemoryKvBackend {
    namespaces: DashMap<String, Namespace>,
}

impl MemoryKvBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn namespace(&self, namespace: &str) -> Namespace {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .clone()
    }
}

impl KvBackend for MemoryKvBackend {
    fn batch_start(&self, namespace: &str, semantics: &Semantics) -> Result<KvBatch> {
        Ok(KvBatch {
            namespace: namespace.to_string(),
            atomic: semantics.atomicity() == Atomicity::Batch,
        })
    }

    fn batch_execute(&self, _batch: KvBatch) -> Result<()> {
        Ok(())
    }

    fn put(&self, batch: &mut KvBatch, key: &str, value: &[u8]) -> Result<()> {
        let ns = self.namespace(&batch.namespace);
        ns.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, batch: &mut KvBatch, key: &str) -> Result<()> {
        let ns = self.namespace(&batch.namespace);
        let result = ns
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("{}/{key}", batch.namespace)));
        result
    }

    fn get(&self, batch: &mut KvBatch, key: &str) -> Result<Vec<u8>> {
        let ns = self.namespace(&batch.namespace);
        let result = ns
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{}/{key}", batch.namespace)));
        result
    }

    fn get_all(&self, namespace: &str) -> Result<PairIter> {
        let ns = self.namespace(namespace);
        let pairs: Vec<(String, Vec<u8>)> = ns
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(PairIter(Box::new(pairs.into_iter())))
    }

    fn get_by_prefix(&self, namespace: &str, prefix: &str) -> Result<PairIter> {
        let ns = self.namespace(namespace);
        let prefix = prefix.to_string();
        let pairs: Vec<(String, Vec<u8>)> = ns
            .read()
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(PairIter(Box::new(pairs.into_iter())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reef_core::semantics::Template;

    fn batch(backend: &MemoryKvBackend, ns: &str) -> KvBatch {
        backend
            .batch_start(ns, &Semantics::new(Template::Default))
            .unwrap()
    }

    #[test]
    fn put_get_delete() {
        let backend = MemoryKvBackend::new();
        let mut b = batch(&backend, "ns");

        backend.put(&mut b, "k1", b"v1").unwrap();
        assert_eq!(backend.get(&mut b, "k1").unwrap(), b"v1");

        backend.put(&mut b, "k1", b"v2").unwrap();
        assert_eq!(backend.get(&mut b, "k1").unwrap(), b"v2");

        backend.delete(&mut b, "k1").unwrap();
        assert!(backend.get(&mut b, "k1").unwrap_err().is_not_found());
        assert!(backend.delete(&mut b, "k1").unwrap_err().is_not_found());

        backend.batch_execute(b).unwrap();
    }

    #[test]
    fn namespaces_are_isolated() {
        let backend = MemoryKvBackend::new();
        let mut a = batch(&backend, "a");
        let mut b = batch(&backend, "b");

        backend.put(&mut a, "k", b"from-a").unwrap();
        assert!(backend.get(&mut b, "k").unwrap_err().is_not_found());
    }

    #[test]
    fn prefix_scan_in_key_order() {
        let backend = MemoryKvBackend::new();
        let mut b = batch(&backend, "ns");
        for key in ["user:2", "user:1", "config:1"] {
            backend.put(&mut b, key, key.as_bytes()).unwrap();
        }

        let mut iter = backend.get_by_prefix("ns", "user:").unwrap();
        assert_eq!(backend.iterate(&mut iter).unwrap().0, "user:1");
        assert_eq!(backend.iterate(&mut iter).unwrap().0, "user:2");
        assert!(backend.iterate(&mut iter).unwrap_err().is_iterator_end());
    }
}
