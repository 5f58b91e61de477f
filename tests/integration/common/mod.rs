//! Shared helpers for integration tests

pub use bytes::Bytes;
pub use reef::{
    Client, Configuration, Entry, KvPair, Object, Schema, Selector, Server, ServerBackends,
    ServerHandle, Template,
};

/// A client with no servers: all backends run inside the process.
pub fn local_client() -> Client {
    Client::connect(Configuration::default()).unwrap()
}

/// Spawn an in-process server with in-memory backends.
pub fn spawn_server() -> ServerHandle {
    Server::bind("127.0.0.1:0", ServerBackends::memory())
        .unwrap()
        .spawn()
        .unwrap()
}

/// A client whose object, kv and db servers are all `addrs`.
pub fn remote_client(addrs: &[&str]) -> Client {
    let list: Vec<String> = addrs.iter().map(|s| s.to_string()).collect();
    let mut config = Configuration::default();
    config.servers.object = list.clone();
    config.servers.kv = list.clone();
    config.servers.db = list;
    Client::connect(config).unwrap()
}
