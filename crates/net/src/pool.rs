//! Connection pool
//!
//! Each (backend kind, server index) owns a bounded LIFO of idle endpoints
//! plus a count of endpoints currently lent out. `pop` reuses an idle
//! endpoint, constructs a new one while under the cap, or blocks on a
//! condition variable until one is returned. Endpoints are exclusively
//! owned between pop and the guard's drop.
//!
//! An endpoint that saw an I/O error must be marked broken; it is then
//! discarded instead of re-queued and a waiter is woken so it can construct
//! a replacement.

use crate::endpoint::Endpoint;
use parking_lot::{Condvar, Mutex};
use reef_core::{BackendKind, Configuration, Error, Result};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::debug;

struct SlotState {
    idle: Vec<Endpoint>,
    outstanding: u32,
    shutdown: bool,
}

struct Slot {
    addr: String,
    cap: u32,
    state: Mutex<SlotState>,
    returned: Condvar,
}

impl Slot {
    fn new(addr: String, cap: u32) -> Self {
        Self {
            addr,
            cap,
            state: Mutex::new(SlotState {
                idle: Vec::new(),
                outstanding: 0,
                shutdown: false,
            }),
            returned: Condvar::new(),
        }
    }

    fn push(&self, endpoint: Option<Endpoint>) {
        let mut state = self.state.lock();
        state.outstanding -= 1;
        if let Some(endpoint) = endpoint {
            if state.shutdown {
                endpoint.close();
            } else {
                state.idle.push(endpoint);
            }
        }
        self.returned.notify_one();
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        for endpoint in state.idle.drain(..) {
            endpoint.close();
        }
        self.returned.notify_all();
    }
}

fn pop_from(slot: &Arc<Slot>) -> Result<PooledEndpoint> {
    let mut state = slot.state.lock();
    loop {
        if state.shutdown {
            return Err(Error::Transport(format!(
                "connection pool for {} is shut down",
                slot.addr
            )));
        }
        if let Some(endpoint) = state.idle.pop() {
            state.outstanding += 1;
            return Ok(PooledEndpoint::new(Arc::clone(slot), endpoint));
        }
        if state.idle.len() as u32 + state.outstanding < slot.cap {
            state.outstanding += 1;
            drop(state);
            // Connect outside the lock; on failure undo the reservation
            // and wake a waiter.
            return match Endpoint::connect(&slot.addr) {
                Ok(endpoint) => Ok(PooledEndpoint::new(Arc::clone(slot), endpoint)),
                Err(e) => {
                    let mut state = slot.state.lock();
                    state.outstanding -= 1;
                    slot.returned.notify_one();
                    Err(e)
                }
            };
        }
        slot.returned.wait(&mut state);
    }
}

/// RAII guard for a popped endpoint. Dropping it returns the endpoint to
/// the pool, or discards it if it was marked broken.
pub struct PooledEndpoint {
    slot: Arc<Slot>,
    endpoint: Option<Endpoint>,
    broken: bool,
}

impl PooledEndpoint {
    fn new(slot: Arc<Slot>, endpoint: Endpoint) -> Self {
        Self {
            slot,
            endpoint: Some(endpoint),
            broken: false,
        }
    }

    /// Mark this endpoint broken; it is discarded instead of reused.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl Deref for PooledEndpoint {
    type Target = Endpoint;

    fn deref(&self) -> &Endpoint {
        self.endpoint.as_ref().expect("endpoint taken")
    }
}

impl DerefMut for PooledEndpoint {
    fn deref_mut(&mut self) -> &mut Endpoint {
        self.endpoint.as_mut().expect("endpoint taken")
    }
}

impl Drop for PooledEndpoint {
    fn drop(&mut self) {
        let endpoint = self.endpoint.take();
        if self.broken {
            debug!("discarding broken endpoint to {}", self.slot.addr);
            if let Some(e) = &endpoint {
                e.close();
            }
            self.slot.push(None);
        } else {
            self.slot.push(endpoint);
        }
    }
}

/// Bounded per-server endpoint reuse for all three backend kinds.
pub struct ConnectionPool {
    object: Vec<Arc<Slot>>,
    kv: Vec<Arc<Slot>>,
    db: Vec<Arc<Slot>>,
}

impl ConnectionPool {
    /// Build a pool from the configured server lists and connection cap.
    pub fn new(config: &Configuration) -> Self {
        let slots = |kind: BackendKind| {
            config
                .server_list(kind)
                .iter()
                .map(|addr| Arc::new(Slot::new(addr.clone(), config.max_connections)))
                .collect()
        };
        Self {
            object: slots(BackendKind::Object),
            kv: slots(BackendKind::Kv),
            db: slots(BackendKind::Db),
        }
    }

    fn slots(&self, kind: BackendKind) -> &[Arc<Slot>] {
        match kind {
            BackendKind::Object => &self.object,
            BackendKind::Kv => &self.kv,
            BackendKind::Db => &self.db,
        }
    }

    /// Borrow an endpoint for (kind, server index), blocking at the cap.
    ///
    /// # Errors
    ///
    /// Fails for unknown indices, on connect failure, and after shutdown.
    pub fn pop(&self, kind: BackendKind, index: u32) -> Result<PooledEndpoint> {
        let slot = self.slots(kind).get(index as usize).ok_or_else(|| {
            Error::InvalidArgument(format!("no {kind} server with index {index}"))
        })?;
        pop_from(slot)
    }

    /// Close every idle endpoint and refuse further pops.
    pub fn shutdown(&self) {
        for kind in BackendKind::ALL {
            for slot in self.slots(kind) {
                slot.shutdown();
            }
        }
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
