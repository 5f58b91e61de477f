//! Reef, a distributed storage framework
//!
//! Reef exposes three coordinated data models over one batch-oriented
//! client:
//!
//! - an **object store**: opaque byte containers, optionally striped over
//!   multiple servers by a distribution policy,
//! - a **key-value store**: typed blobs keyed by namespace and key,
//! - a **structured database**: schemas with typed fields and indices,
//!   queried through selector trees.
//!
//! Operations are collected into **batches** whose execution obeys a
//! configurable **semantics** (atomicity, consistency, persistency,
//! concurrency, ordering, safety, security). Batches coalesce compatible
//! operations into single wire messages per server, fan distributed I/O
//! out in parallel, and may defer eventually consistent work through the
//! operation cache.
//!
//! This crate re-exports the public surface of the workspace members:
//! [`reef_core`] (semantics, distributions, values, configuration),
//! [`reef_net`] (wire protocol and connection pool), [`reef_backend`]
//! (backend capability traits and the in-memory backends), [`reef_client`]
//! (entities, batches, iterators) and [`reef_server`] (the daemon).

pub use reef_backend as backend;
pub use reef_client as client;
pub use reef_core;
pub use reef_net as net;
pub use reef_server as server;

pub use reef_client::{
    AsyncBatch, Batch, Client, CompareOp, DbIterator, DbRow, DistributedObject, Entry, IdSlot,
    KvIterator, KvPair, Object, ObjectIterator, Schema, Selector, SelectorMode, Uri,
};
pub use reef_core::semantics::{
    Atomicity, Concurrency, Consistency, OrderingMode, Persistency, Safety, Security, Semantics,
    Template,
};
pub use reef_core::{
    BackendKind, Configuration, Distribution, Document, Error, FieldType, Result, Value,
};
pub use reef_server::{Server, ServerBackends, ServerHandle};
