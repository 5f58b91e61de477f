//! Backend registry
//!
//! Backends are compiled in statically and selected by name at runtime;
//! the capability record ([`BackendInfo`]) is the stable contract a
//! dynamically loaded plugin would export instead.

use crate::memory::{MemoryDbBackend, MemoryKvBackend, MemoryObjectBackend};
use crate::{Backend, BackendInfo};
use reef_core::{BackendKind, Error, Result};
use std::sync::Arc;

fn open_memory_object(_path: &str) -> Result<Backend> {
    Ok(Backend::Object(Arc::new(MemoryObjectBackend::new())))
}

fn open_memory_kv(_path: &str) -> Result<Backend> {
    Ok(Backend::Kv(Arc::new(MemoryKvBackend::new())))
}

fn open_memory_db(_path: &str) -> Result<Backend> {
    Ok(Backend::Db(Arc::new(MemoryDbBackend::new())))
}

static BACKENDS: &[BackendInfo] = &[
    BackendInfo {
        name: "memory",
        kind: BackendKind::Object,
        open: open_memory_object,
    },
    BackendInfo {
        name: "memory",
        kind: BackendKind::Kv,
        open: open_memory_kv,
    },
    BackendInfo {
        name: "memory",
        kind: BackendKind::Db,
        open: open_memory_db,
    },
];

/// Look up a backend's capability record by name and kind.
pub fn backend_info(name: &str, kind: BackendKind) -> Option<&'static BackendInfo> {
    BACKENDS
        .iter()
        .find(|info| info.name == name && info.kind == kind)
}

/// Construct a backend by name.
///
/// # Errors
///
/// Returns `InvalidArgument` for unknown plugin names.
pub fn open_backend(name: &str, kind: BackendKind, path: &str) -> Result<Backend> {
    let info = backend_info(name, kind).ok_or_else(|| {
        Error::InvalidArgument(format!("no {kind} backend named {name:?}"))
    })?;
    (info.open)(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backends_resolve() {
        for kind in BackendKind::ALL {
            let backend = open_backend("memory", kind, "").unwrap();
            assert_eq!(backend.kind(), kind);
        }
    }

    #[test]
    fn unknown_backend_is_invalid() {
        assert!(open_backend("leveldb", BackendKind::Kv, "").is_err());
        assert!(backend_info("posix", BackendKind::Object).is_none());
    }
}
