//! User/group credentials
//!
//! A credential pair is attached to security-relevant operations when the
//! batch semantics demand `security=strict`. On the wire it is two
//! little-endian u32 values.

use serde::{Deserialize, Serialize};

/// A (user, group) credential pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Numeric user id
    pub user: u32,
    /// Numeric group id
    pub group: u32,
}

impl Credentials {
    /// Create credentials from explicit ids.
    pub fn new(user: u32, group: u32) -> Self {
        Self { user, group }
    }
}
