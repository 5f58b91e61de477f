//! In-memory object backend

use super::now_ns;
use crate::{BackendObject, NameIter, ObjectBackend, ObjectStatus};
use dashmap::DashMap;
use parking_lot::RwLock;
use reef_core::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

struct StoredObject {
    data: Vec<u8>,
    mtime_ns: i64,
}

type Namespace = Arc<RwLock<BTreeMap<String, StoredObject>>>;

/// Object backend keeping everything in process memory.
#[derive(Default)]
pub struct MemoryObjectBackend {
    namespaces: DashMap<String, Namespace>,
}

impl MemoryObjectBackend {
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

impl ObjectBackend for MemoryObjectBackend {
    fn create(&self, namespace: &str, path: &str) -> Result<BackendObject> {
        let ns = self.namespace(namespace);
        let mut objects = ns.write();
        if objects.contains_key(path) {
            return Err(Error::Exists(format!("{namespace}/{path}")));
        }
        objects.insert(
            path.to_string(),
            StoredObject {
                data: Vec::new(),
                mtime_ns: now_ns(),
            },
        );
        Ok(BackendObject {
            namespace: namespace.to_string(),
            path: path.to_string(),
        })
    }

    fn open(&self, namespace: &str, path: &str) -> Result<BackendObject> {
        let ns = self.namespace(namespace);
        if !ns.read().contains_key(path) {
            return Err(Error::NotFound(format!("{namespace}/{path}")));
        }
        Ok(BackendObject {
            namespace: namespace.to_string(),
            path: path.to_string(),
        })
    }

    fn delete(&self, object: &BackendObject) -> Result<()> {
        let ns = self.namespace(&object.namespace);
        let result = ns
            .write()
            .remove(&object.path)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("{}/{}", object.namespace, object.path)));
        result
    }

    fn close(&self, _object: BackendObject) -> Result<()> {
        Ok(())
    }

    fn status(&self, object: &BackendObject) -> Result<ObjectStatus> {
        let ns = self.namespace(&object.namespace);
        let objects = ns.read();
        let stored = objects
            .get(&object.path)
            .ok_or_else(|| Error::NotFound(format!("{}/{}", object.namespace, object.path)))?;
        Ok(ObjectStatus {
            modification_time: stored.mtime_ns,
            size: stored.data.len() as u64,
        })
    }

    fn sync(&self, object: &BackendObject) -> Result<()> {
        // Nothing to flush; verify the object still exists.
        self.status(object).map(|_| ())
    }

    fn read(&self, object: &BackendObject, buf: &mut [u8], offset: u64) -> Result<u64> {
        let ns = self.namespace(&object.namespace);
        let objects = ns.read();
        let stored = objects
            .get(&object.path)
            .ok_or_else(|| Error::NotFound(format!("{}/{}", object.namespace, object.path)))?;

        let len = stored.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let available = (len - offset).min(buf.len() as u64) as usize;
        let start = offset as usize;
        buf[..available].copy_from_slice(&stored.data[start..start + available]);
        Ok(available as u64)
    }

    fn write(&self, object: &BackendObject, buf: &[u8], offset: u64) -> Result<u64> {
        let ns = self.namespace(&object.namespace);
        let mut objects = ns.write();
        let stored = objects
            .get_mut(&object.path)
            .ok_or_else(|| Error::NotFound(format!("{}/{}", object.namespace, object.path)))?;

        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or_else(|| Error::InvalidArgument("offset + length overflows u64".into()))?
            as usize;
        if stored.data.len() < end {
            stored.data.resize(end, 0);
        }
        stored.data[offset as usize..end].copy_from_slice(buf);
        stored.mtime_ns = now_ns();
        Ok(buf.len() as u64)
    }

    fn get_all(&self, namespace: &str) -> Result<NameIter> {
        let ns = self.namespace(namespace);
        let names: Vec<String> = ns.read().keys().cloned().collect();
        Ok(NameIter(Box::new(names.into_iter())))
    }

    fn get_by_prefix(&self, namespace: &str, prefix: &str) -> Result<NameIter> {
        let ns = self.namespace(namespace);
        let prefix = prefix.to_string();
        let names: Vec<String> = ns
            .read()
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        Ok(NameIter(Box::new(names.into_iter())))
    }
}
