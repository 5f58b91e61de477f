//! Backend capability interfaces
//!
//! Every storage plugin satisfies one of three capability sets: object
//! (opaque byte containers), kv (typed blobs) or db (schemas and selector
//! queries). The traits here are the contract between the batch engine,
//! the server and the storage plugins; [`registry`] resolves plugins by
//! name.
//!
//! Iteration uses a dedicated end-of-stream error
//! ([`reef_core::Error::IteratorEnd`]) so callers can always distinguish
//! exhaustion from I/O failures.

pub mod doc;
pub mod memory;
pub mod registry;

use reef_core::semantics::Semantics;
use reef_core::{BackendKind, Document, Result};
use std::sync::Arc;

/// Handle for an opened or created object.
///
/// The handle carries the identifying pair; backends keep any further
/// per-object state internal and keyed by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendObject {
    /// Namespace the object lives in
    pub namespace: String,
    /// Object path within the namespace
    pub path: String,
}

/// Status of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectStatus {
    /// Modification time in nanoseconds since the Unix epoch
    pub modification_time: i64,
    /// Size in bytes
    pub size: u64,
}

/// Iterator over entity names (objects).
pub struct NameIter(pub(crate) Box<dyn Iterator<Item = String> + Send>);

impl NameIter {
    /// Wrap a backend cursor.
    pub fn new(iter: impl Iterator<Item = String> + Send + 'static) -> Self {
        Self(Box::new(iter))
    }
}

/// Iterator over key-value pairs.
pub struct PairIter(pub(crate) Box<dyn Iterator<Item = (String, Vec<u8>)> + Send>);

impl PairIter {
    /// Wrap a backend cursor.
    pub fn new(iter: impl Iterator<Item = (String, Vec<u8>)> + Send + 'static) -> Self {
        Self(Box::new(iter))
    }
}

/// Iterator over database rows.
pub struct RowIter(pub(crate) Box<dyn Iterator<Item = Document> + Send>);

impl RowIter {
    /// Wrap a backend cursor.
    pub fn new(iter: impl Iterator<Item = Document> + Send + 'static) -> Self {
        Self(Box::new(iter))
    }
}

/// An open kv batch.
///
/// A backend may queue operations and apply them atomically on execute, or
/// execute immediately and treat execute as a barrier.
#[derive(Debug)]
pub struct KvBatch {
    /// Namespace this batch operates on
    pub namespace: String,
    /// Whether the batch must be failure-atomic as a whole
    pub atomic: bool,
}

/// An open db batch.
#[derive(Debug)]
pub struct DbBatch {
    /// Namespace this batch operates on
    pub namespace: String,
    /// Whether the batch must be failure-atomic as a whole
    pub atomic: bool,
}

/// Object storage capability.
pub trait ObjectBackend: Send + Sync {
    /// Create a new object. Fails with `Exists` if it is already present.
    fn create(&self, namespace: &str, path: &str) -> Result<BackendObject>;

    /// Open an existing object. Fails with `NotFound` if absent.
    fn open(&self, namespace: &str, path: &str) -> Result<BackendObject>;

    /// Delete an object.
    fn delete(&self, object: &BackendObject) -> Result<()>;

    /// Close a handle. Backends without per-handle state treat this as a
    /// no-op.
    fn close(&self, object: BackendObject) -> Result<()>;

    /// Modification time and size.
    fn status(&self, object: &BackendObject) -> Result<ObjectStatus>;

    /// Flush the object to durable media.
    fn sync(&self, object: &BackendObject) -> Result<()>;

    /// Read up to `buf.len()` bytes at `offset`; returns the bytes read.
    /// A short read is only permitted at end-of-object.
    fn read(&self, object: &BackendObject, buf: &mut [u8], offset: u64) -> Result<u64>;

    /// Write `buf` at `offset`; returns the bytes written.
    fn write(&self, object: &BackendObject, buf: &[u8], offset: u64) -> Result<u64>;

    /// Iterate all object names in a namespace.
    fn get_all(&self, namespace: &str) -> Result<NameIter>;

    /// Iterate object names starting with `prefix`.
    fn get_by_prefix(&self, namespace: &str, prefix: &str) -> Result<NameIter>;

    /// Advance an iterator.
    ///
    /// # Errors
    ///
    /// `IteratorEnd` at end-of-stream.
    fn iterate(&self, iter: &mut NameIter) -> Result<String> {
        iter.0.next().ok_or(reef_core::Error::IteratorEnd)
    }
}

/// Key-value storage capability.
pub trait KvBackend: Send + Sync {
    /// Start a batch on a namespace.
    fn batch_start(&self, namespace: &str, semantics: &Semantics) -> Result<KvBatch>;

    /// Execute a batch; success iff all nested operations succeeded.
    fn batch_execute(&self, batch: KvBatch) -> Result<()>;

    /// Store a value under a key.
    fn put(&self, batch: &mut KvBatch, key: &str, value: &[u8]) -> Result<()>;

    /// Delete a key. Fails with `NotFound` if absent.
    fn delete(&self, batch: &mut KvBatch, key: &str) -> Result<()>;

    /// Fetch the value for a key. Fails with `NotFound` if absent.
    fn get(&self, batch: &mut KvBatch, key: &str) -> Result<Vec<u8>>;

    /// Iterate all pairs in a namespace.
    fn get_all(&self, namespace: &str) -> Result<PairIter>;

    /// Iterate pairs whose key starts with `prefix`.
    fn get_by_prefix(&self, namespace: &str, prefix: &str) -> Result<PairIter>;

    /// Advance an iterator.
    ///
    /// # Errors
    ///
    /// `IteratorEnd` at end-of-stream.
    fn iterate(&self, iter: &mut PairIter) -> Result<(String, Vec<u8>)> {
        iter.0.next().ok_or(reef_core::Error::IteratorEnd)
    }
}

/// Structured database capability.
///
/// Schemas, entries, selectors and rows are exchanged as self-describing
/// documents; [`doc`] defines their field layout.
pub trait DbBackend: Send + Sync {
    /// Start a batch on a namespace.
    fn batch_start(&self, namespace: &str, semantics: &Semantics) -> Result<DbBatch>;

    /// Execute a batch; success iff all nested operations succeeded.
    fn batch_execute(&self, batch: DbBatch) -> Result<()>;

    /// Create a schema. Fails with `Exists` if present.
    fn schema_create(&self, batch: &mut DbBatch, name: &str, schema: &Document) -> Result<()>;

    /// Fetch a schema document. The returned document is owned by the
    /// caller.
    fn schema_get(&self, batch: &mut DbBatch, name: &str) -> Result<Document>;

    /// Delete a schema and its rows.
    fn schema_delete(&self, batch: &mut DbBatch, name: &str) -> Result<()>;

    /// Insert an entry; returns the id document for the new row.
    fn insert(&self, batch: &mut DbBatch, name: &str, entry: &Document) -> Result<Document>;

    /// Update all rows matching the selector with the entry's fields.
    fn update(
        &self,
        batch: &mut DbBatch,
        name: &str,
        selector: &Document,
        entry: &Document,
    ) -> Result<()>;

    /// Delete all rows matching the selector.
    fn delete(&self, batch: &mut DbBatch, name: &str, selector: &Document) -> Result<()>;

    /// Query rows matching the selector.
    fn query(&self, batch: &mut DbBatch, name: &str, selector: &Document) -> Result<RowIter>;

    /// Advance an iterator.
    ///
    /// # Errors
    ///
    /// `IteratorEnd` at end-of-stream.
    fn iterate(&self, iter: &mut RowIter) -> Result<Document> {
        iter.0.next().ok_or(reef_core::Error::IteratorEnd)
    }
}

/// A constructed backend of one kind.
#[derive(Clone)]
pub enum Backend {
    /// Object capability
    Object(Arc<dyn ObjectBackend>),
    /// Kv capability
    Kv(Arc<dyn KvBackend>),
    /// Db capability
    Db(Arc<dyn DbBackend>),
}

impl Backend {
    /// The kind this backend satisfies.
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Object(_) => BackendKind::Object,
            Backend::Kv(_) => BackendKind::Kv,
            Backend::Db(_) => BackendKind::Db,
        }
    }
}

/// Capability record exported by every backend plugin.
pub struct BackendInfo {
    /// Plugin name used in configuration
    pub name: &'static str,
    /// Capability kind
    pub kind: BackendKind,
    /// Construct the backend for a data path
    pub open: fn(path: &str) -> Result<Backend>,
}
