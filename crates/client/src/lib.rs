//! Reef client
//!
//! The client side of the framework: entities (objects, key-value pairs,
//! database schemas), the deferred batch/operation engine that coalesces
//! compatible operations per server, the operation cache for eventually
//! consistent batches, iterators over remote or local backends, and the
//! URI parser.
//!
//! The usual flow:
//!
//! ```ignore
//! let client = Client::connect(Configuration::load("reef.toml")?)?;
//! let object = Object::new(&client, "ns", "a")?;
//!
//! let mut batch = client.batch(Template::Default);
//! object.create(&mut batch);
//! let written = object.write(&mut batch, Bytes::from_static(b"hello"), 0);
//! batch.execute()?;
//! assert_eq!(written.get(), 5);
//! ```

pub mod batch;
pub mod cache;
pub mod client;
pub mod db;
pub mod iterator;
pub mod kv;
pub mod object;
pub mod operation;
pub mod uri;

mod wire;

pub use batch::{AsyncBatch, Batch};
pub use client::Client;
pub use db::{DbIterator, DbRow, Entry, IdSlot, Schema, Selector};
pub use iterator::{KvIterator, ObjectIterator};
pub use kv::KvPair;
pub use object::{DistributedObject, Object};
pub use operation::{ByteCount, ReadSlot, StatusSlot, ValueSlot};
pub use reef_backend::doc::{CompareOp, SelectorMode};
pub use uri::Uri;
