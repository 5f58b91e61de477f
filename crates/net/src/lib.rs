//! Wire protocol and transport for Reef
//!
//! - [`message`]: length-prefixed binary messages with an operation list
//! - [`endpoint`]: TCP endpoints carrying framed messages and bulk payloads
//! - [`pool`]: bounded per-server endpoint reuse

pub mod endpoint;
pub mod message;
pub mod pool;
pub mod status;

pub use endpoint::Endpoint;
pub use message::{Message, MessageFlags, MessageOp};
pub use pool::{ConnectionPool, PooledEndpoint};
pub use status::ResultCode;
