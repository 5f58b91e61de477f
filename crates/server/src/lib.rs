//! Reef server
//!
//! A thread-per-connection daemon that receives framed messages, applies
//! them to its local backends and replies when the message's flags (or the
//! operation type) call for it. Statistics counters track served
//! operations and transferred bytes; a `STATISTICS` message reads them
//! back.

use parking_lot::Mutex;
use reef_backend::Backend;
use reef_core::{trace, BackendKind, Configuration, Result, Statistics, StatisticsType};
use reef_net::Endpoint;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

mod chunk;
mod dispatch;

use chunk::MemoryChunk;

/// The three backends a server serves.
#[derive(Clone)]
pub struct ServerBackends {
    /// Object storage backend
    pub object: Arc<dyn reef_backend::ObjectBackend>,
    /// Key-value backend
    pub kv: Arc<dyn reef_backend::KvBackend>,
    /// Database backend
    pub db: Arc<dyn reef_backend::DbBackend>,
}

impl ServerBackends {
    /// Open the backends named in a configuration, with `{PORT}`
    /// substituted into their data paths.
    pub fn from_config(config: &Configuration, port: u16) -> Result<Self> {
        let mut object = None;
        let mut kv = None;
        let mut db = None;
        for kind in BackendKind::ALL {
            let selection = config.backend(kind);
            let path = selection.path_for_port(port);
            match reef_backend::registry::open_backend(&selection.backend, kind, &path)? {
                Backend::Object(b) => object = Some(b),
                Backend::Kv(b) => kv = Some(b),
                Backend::Db(b) => db = Some(b),
            }
        }
        Ok(Self {
            object: object.expect("object backend opened"),
            kv: kv.expect("kv backend opened"),
            db: db.expect("db backend opened"),
        })
    }

    /// In-memory backends for all kinds.
    pub fn memory() -> Self {
        Self {
            object: Arc::new(reef_backend::memory::MemoryObjectBackend::new()),
            kv: Arc::new(reef_backend::memory::MemoryKvBackend::new()),
            db: Arc::new(reef_backend::memory::MemoryDbBackend::new()),
        }
    }
}

/// A listening server.
pub struct Server {
    listener: TcpListener,
    backends: ServerBackends,
    statistics: Arc<Statistics>,
    running: Arc<AtomicBool>,
}

impl Server {
    /// Bind to `addr` (`host:port`; port 0 picks a free port).
    pub fn bind(addr: &str, backends: ServerBackends) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            backends,
            statistics: Arc::new(Statistics::new()),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> Result<String> {
        Ok(self.listener.local_addr()?.to_string())
    }

    /// This server's statistics counters.
    pub fn statistics(&self) -> Arc<Statistics> {
        Arc::clone(&self.statistics)
    }

    /// Accept connections until shutdown, one thread per connection.
    pub fn run(&self) -> Result<()> {
        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        for stream in self.listener.incoming() {
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            match stream {
                Ok(stream) => {
                    let backends = self.backends.clone();
                    let statistics = Arc::clone(&self.statistics);
                    let handle = std::thread::Builder::new()
                        .name("reefd-conn".to_string())
                        .spawn(move || serve_connection(stream, backends, statistics));
                    match handle {
                        Ok(h) => workers.push(h),
                        Err(e) => warn!("failed to spawn connection thread: {e}"),
                    }
                }
                Err(e) => {
                    warn!("accept failed: {e}");
                }
            }
        }
        for handle in workers {
            let _ = handle.join();
        }
        Ok(())
    }

    /// Run on a background thread; the handle stops the server on demand.
    pub fn spawn(self) -> Result<ServerHandle> {
        let addr = self.local_addr()?;
        let running = Arc::clone(&self.running);
        let statistics = Arc::clone(&self.statistics);
        let handle = std::thread::Builder::new()
            .name("reefd-accept".to_string())
            .spawn(move || {
                if let Err(e) = self.run() {
                    warn!("server terminated: {e}");
                }
            })?;
        Ok(ServerHandle {
            addr,
            running,
            statistics,
            handle: Mutex::new(Some(handle)),
        })
    }
}

/// Handle to a spawned server.
pub struct ServerHandle {
    addr: String,
    running: Arc<AtomicBool>,
    statistics: Arc<Statistics>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ServerHandle {
    /// The server's bound address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The server's statistics counters.
    pub fn statistics(&self) -> Arc<Statistics> {
        Arc::clone(&self.statistics)
    }

    /// Stop accepting and join the accept loop. Established connections
    /// finish their current message streams.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        // Unblock the accept loop.
        let _ = TcpStream::connect(&self.addr);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Scratch size per connection: one default stripe.
const CHUNK_SIZE: usize = 4 * 1024 * 1024;

fn serve_connection(stream: TcpStream, backends: ServerBackends, statistics: Arc<Statistics>) {
    let mut endpoint = match Endpoint::from_stream(stream) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            warn!("rejecting connection: {e}");
            return;
        }
    };
    let peer = endpoint.peer().to_string();
    debug!("connection from {peer}");

    let mut chunk = MemoryChunk::new(CHUNK_SIZE);
    loop {
        let mut request = match endpoint.receive() {
            Ok(request) => request,
            Err(_) => break, // peer closed or stream broke
        };
        statistics.add(
            StatisticsType::BytesReceived,
            (reef_net::message::HEADER_SIZE + request.payload_len()) as u64,
        );

        chunk.reset();
        let _span = trace::enter("serve_message");
        if let Err(e) = dispatch::handle_message(
            &mut endpoint,
            &mut request,
            &backends,
            &statistics,
            &mut chunk,
        ) {
            warn!("dropping connection from {peer}: {e}");
            break;
        }
    }
    debug!("connection from {peer} closed");
}
