//! Structured database client
//!
//! Schemas declare typed fields and indices; entries hold typed values for
//! a schema's fields; selectors filter rows with a tree of comparisons.
//! Schema and entry mutations are deferred batch operations; queries
//! execute immediately through [`DbIterator`].
//!
//! All operations for a namespace target the same db server, chosen by
//! hashing the namespace.

mod entry;
pub(crate) mod exec;
mod iterator;
mod schema;
mod selector;

pub use entry::{Entry, IdSlot};
pub use iterator::{DbIterator, DbRow};
pub use schema::Schema;
pub use selector::{Selector, MAX_SELECTOR_LEAVES};
