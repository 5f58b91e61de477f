//! URI parsing for objects, distributed objects and key-value pairs
//!
//! Accepted forms:
//!
//! - `object://<index>/<namespace>` and `object://<index>/<namespace>/<name>`
//! - `dobject://<namespace>` and `dobject://<namespace>/<name>`
//! - `kv://<index>/<namespace>` and `kv://<index>/<namespace>/<key>`
//!
//! Parts are split on `/` with a fixed expected count; empty parts are
//! rejected and `<index>` must parse as an unsigned integer.

use reef_core::{Error, Result};

/// A parsed entity URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Uri {
    /// An object or object namespace on one server
    Object {
        /// Server index
        index: u32,
        /// Namespace
        namespace: String,
        /// Object name; `None` addresses the namespace
        name: Option<String>,
    },
    /// A distributed object (default distribution) or its namespace
    DistributedObject {
        /// Namespace
        namespace: String,
        /// Object name; `None` addresses the namespace
        name: Option<String>,
    },
    /// A key-value pair or kv namespace on one server
    Kv {
        /// Server index
        index: u32,
        /// Namespace
        namespace: String,
        /// Key; `None` addresses the namespace
        key: Option<String>,
    },
}

fn split_parts(rest: &str, min: usize, max: usize, uri: &str) -> Result<Vec<String>> {
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.len() < min || parts.len() > max {
        return Err(Error::InvalidArgument(format!("malformed URI: {uri}")));
    }
    if parts.iter().any(|p| p.is_empty()) {
        return Err(Error::InvalidArgument(format!(
            "URI has empty components: {uri}"
        )));
    }
    Ok(parts.into_iter().map(str::to_string).collect())
}

fn parse_index(part: &str, uri: &str) -> Result<u32> {
    part.parse::<u32>()
        .map_err(|_| Error::InvalidArgument(format!("invalid server index in URI: {uri}")))
}

impl Uri {
    /// Parse an entity URI.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for unknown schemes, wrong part counts,
    /// empty components and non-numeric indices.
    pub fn parse(uri: &str) -> Result<Self> {
        if let Some(rest) = uri.strip_prefix("object://") {
            let mut parts = split_parts(rest, 2, 3, uri)?;
            let name = if parts.len() == 3 { parts.pop() } else { None };
            let namespace = parts.pop().expect("split_parts guarantees arity");
            let index = parse_index(&parts[0], uri)?;
            Ok(Uri::Object {
                index,
                namespace,
                name,
            })
        } else if let Some(rest) = uri.strip_prefix("dobject://") {
            let mut parts = split_parts(rest, 1, 2, uri)?;
            let name = if parts.len() == 2 { parts.pop() } else { None };
            let namespace = parts.pop().expect("split_parts guarantees arity");
            Ok(Uri::DistributedObject { namespace, name })
        } else if let Some(rest) = uri.strip_prefix("kv://") {
            let mut parts = split_parts(rest, 2, 3, uri)?;
            let key = if parts.len() == 3 { parts.pop() } else { None };
            let namespace = parts.pop().expect("split_parts guarantees arity");
            let index = parse_index(&parts[0], uri)?;
            Ok(Uri::Kv {
                index,
                namespace,
                key,
            })
        } else {
            Err(Error::InvalidArgument(format!("unknown URI scheme: {uri}")))
        }
    }
}
