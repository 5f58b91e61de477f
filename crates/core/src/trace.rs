//! Scoped trace spans
//!
//! `enter(name)` pushes a span and returns a guard; dropping the guard
//! leaves the span, so all exit paths are covered. The backend is chosen
//! once per process from the `TRACE` environment variable:
//!
//! - `off` (default): spans are free no-ops
//! - `echo`: enter/leave lines with elapsed time, via `tracing`

use once_cell::sync::Lazy;
use std::time::Instant;
use tracing::trace;

/// Trace backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceBackend {
    /// Spans are no-ops
    Off,
    /// Enter/leave events echoed through `tracing`
    Echo,
}

static BACKEND: Lazy<TraceBackend> = Lazy::new(|| {
    match std::env::var("TRACE").as_deref() {
        Ok("echo") => TraceBackend::Echo,
        _ => TraceBackend::Off,
    }
});

/// The process-wide trace backend.
pub fn backend() -> TraceBackend {
    *BACKEND
}

/// A scoped span; leaves on drop.
pub struct Span {
    name: &'static str,
    start: Option<Instant>,
}

/// Enter a span named `name`.
pub fn enter(name: &'static str) -> Span {
    match backend() {
        TraceBackend::Off => Span { name, start: None },
        TraceBackend::Echo => {
            trace!(target: "reef::trace", "enter {name}");
            Span {
                name,
                start: Some(Instant::now()),
            }
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if let Some(start) = self.start {
            trace!(
                target: "reef::trace",
                "leave {} ({:?})",
                self.name,
                start.elapsed()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_guard_is_droppable() {
        // TRACE is unset in tests, so this exercises the no-op path.
        let span = enter("test");
        drop(span);
        let _span = enter("nested");
    }
}
