//! Core types for Reef
//!
//! This crate defines the foundational pieces shared by the client, the
//! server and the backends:
//! - Error: the unified error type for all Reef APIs
//! - Semantics: the seven-aspect execution contract attached to batches
//! - Distribution: striping policies for distributed objects
//! - Value / Document: typed values and self-describing documents for the
//!   structured database
//! - Configuration: `reef.toml` loading
//! - Statistics, trace spans and the background worker pool

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod config;
pub mod credentials;
pub mod distribution;
pub mod error;
pub mod semantics;
pub mod statistics;
pub mod trace;
pub mod types;
pub mod util;
pub mod value;

// Re-export commonly used types at the crate root
pub use background::{BackgroundPool, JobHandle};
pub use config::{BackendConfig, Configuration};
pub use credentials::Credentials;
pub use distribution::{Distribution, DistributionMeta, Stripe};
pub use error::{Error, Result};
pub use semantics::{
    Atomicity, Concurrency, Consistency, OrderingMode, Persistency, Safety, Security, Semantics,
    Template,
};
pub use statistics::{Statistics, StatisticsType};
pub use types::{BackendKind, FieldType};
pub use value::{Document, Value};
