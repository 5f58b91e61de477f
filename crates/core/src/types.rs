//! Shared scalar types
//!
//! - BackendKind: discriminates the three storage models
//! - FieldType: the typed fields of a database schema

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three storage models served by Reef.
///
/// Every server address list, connection-pool slot and backend plugin is
/// scoped to one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Opaque byte containers
    Object,
    /// Typed blobs keyed by namespace/key
    Kv,
    /// Schemas, indices and selector queries
    Db,
}

impl BackendKind {
    /// All kinds, in a fixed order.
    pub const ALL: [BackendKind; 3] = [BackendKind::Object, BackendKind::Kv, BackendKind::Db];

    /// Lowercase name used in configuration files and log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Object => "object",
            BackendKind::Kv => "kv",
            BackendKind::Db => "db",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field types supported by database schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Signed 32-bit integer
    Sint32,
    /// Unsigned 32-bit integer
    Uint32,
    /// Signed 64-bit integer
    Sint64,
    /// Unsigned 64-bit integer
    Uint64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
    /// UTF-8 string
    String,
    /// Opaque blob with length
    Blob,
    /// Implementation-chosen row id
    Id,
}

impl FieldType {
    /// Stable name used inside schema documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Sint32 => "sint32",
            FieldType::Uint32 => "uint32",
            FieldType::Sint64 => "sint64",
            FieldType::Uint64 => "uint64",
            FieldType::Float32 => "float32",
            FieldType::Float64 => "float64",
            FieldType::String => "string",
            FieldType::Blob => "blob",
            FieldType::Id => "id",
        }
    }

    /// Parse a stable name back into a field type.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for unknown names.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "sint32" => Ok(FieldType::Sint32),
            "uint32" => Ok(FieldType::Uint32),
            "sint64" => Ok(FieldType::Sint64),
            "uint64" => Ok(FieldType::Uint64),
            "float32" => Ok(FieldType::Float32),
            "float64" => Ok(FieldType::Float64),
            "string" => Ok(FieldType::String),
            "blob" => Ok(FieldType::Blob),
            "id" => Ok(FieldType::Id),
            other => Err(Error::InvalidArgument(format!("unknown field type: {other}"))),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a namespace or entity name.
///
/// Namespaces and names are opaque UTF-8 strings that must be non-empty and
/// must not contain `/` or NUL (both are wire and URI separators).
///
/// # Errors
///
/// Returns `InvalidArgument` if the name is empty or contains a separator.
pub fn validate_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument(format!("{what} must not be empty")));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(Error::InvalidArgument(format!(
            "{what} must not contain '/' or NUL: {name:?}"
        )));
    }
    Ok(())
}
