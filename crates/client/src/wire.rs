//! Endpoint helpers for executors
//!
//! Executors pop one endpoint, do all their I/O on it without suspension
//! points in between, then return it. A transport or protocol failure
//! poisons the endpoint: it is discarded instead of being pushed back, so
//! a half-read stream can never be reused.

use crate::client::Client;
use reef_core::{BackendKind, Error, Result};
use reef_net::Endpoint;

/// Run `f` with a pooled endpoint for (kind, server).
///
/// On a transport or protocol error the endpoint is marked broken before
/// the error propagates; backend-level errors leave it reusable.
pub(crate) fn with_endpoint<T>(
    client: &Client,
    kind: BackendKind,
    server: u32,
    f: impl FnOnce(&mut Endpoint) -> Result<T>,
) -> Result<T> {
    let mut endpoint = client.inner.pool.pop(kind, server)?;
    match f(&mut endpoint) {
        Ok(value) => Ok(value),
        Err(e) => {
            if matches!(e, Error::Transport(_) | Error::Protocol(_)) {
                endpoint.mark_broken();
            }
            Err(e)
        }
    }
}
