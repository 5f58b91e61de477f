//! Configuration via `reef.toml`
//!
//! A single config file describes the server lists per backend kind, the
//! backend plugin and data path for each kind, the connection cap and the
//! default stripe size. Clients and servers read the same file.
//!
//! A kind whose server list is empty runs its backend locally inside the
//! client process.

use crate::error::{Error, Result};
use crate::types::BackendKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "reef.toml";

fn default_max_connections() -> u32 {
    8
}

fn default_stripe_size() -> u64 {
    crate::distribution::DEFAULT_BLOCK_SIZE
}

fn default_backend() -> String {
    "memory".to_string()
}

/// Server address lists, one per backend kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Servers {
    /// Object servers (`host:port`)
    #[serde(default)]
    pub object: Vec<String>,
    /// Key-value servers
    #[serde(default)]
    pub kv: Vec<String>,
    /// Database servers
    #[serde(default)]
    pub db: Vec<String>,
}

/// Backend selection for one kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend plugin name (e.g. `"memory"`)
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Backend data path; `{PORT}` is substituted with the server port
    #[serde(default)]
    pub path: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: String::new(),
        }
    }
}

impl BackendConfig {
    /// The data path with `{PORT}` substituted.
    pub fn path_for_port(&self, port: u16) -> String {
        self.path.replace("{PORT}", &port.to_string())
    }
}

/// Configuration loaded from `reef.toml`.
///
/// # Example
///
/// ```toml
/// max-connections = 8
/// stripe-size = 4194304
///
/// [servers]
/// object = ["127.0.0.1:4711"]
/// kv = ["127.0.0.1:4711"]
/// db = ["127.0.0.1:4711"]
///
/// [object]
/// backend = "memory"
///
/// [kv]
/// backend = "memory"
///
/// [db]
/// backend = "memory"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// Server address lists
    #[serde(default)]
    pub servers: Servers,
    /// Object backend selection
    #[serde(default)]
    pub object: BackendConfig,
    /// Key-value backend selection
    #[serde(default)]
    pub kv: BackendConfig,
    /// Database backend selection
    #[serde(default)]
    pub db: BackendConfig,
    /// Idle-endpoint cap per (kind, server)
    #[serde(rename = "max-connections", default = "default_max_connections")]
    pub max_connections: u32,
    /// Default distribution block size in bytes
    #[serde(rename = "stripe-size", default = "default_stripe_size")]
    pub stripe_size: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            servers: Servers::default(),
            object: BackendConfig::default(),
            kv: BackendConfig::default(),
            db: BackendConfig::default(),
            max_connections: default_max_connections(),
            stripe_size: default_stripe_size(),
        }
    }
}

impl Configuration {
    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` on malformed TOML or invalid values.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Configuration = toml::from_str(text)
            .map_err(|e| Error::InvalidArgument(format!("config parse: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::InvalidArgument("max-connections must be > 0".into()));
        }
        if self.stripe_size == 0 {
            return Err(Error::InvalidArgument("stripe-size must be > 0".into()));
        }
        for kind in BackendKind::ALL {
            for addr in self.server_list(kind) {
                if addr.is_empty() {
                    return Err(Error::InvalidArgument(format!(
                        "empty {kind} server address"
                    )));
                }
            }
        }
        Ok(())
    }

    /// The server list for one backend kind.
    pub fn server_list(&self, kind: BackendKind) -> &[String] {
        match kind {
            BackendKind::Object => &self.servers.object,
            BackendKind::Kv => &self.servers.kv,
            BackendKind::Db => &self.servers.db,
        }
    }

    /// Number of servers configured for a kind. Zero means the backend
    /// runs locally.
    pub fn server_count(&self, kind: BackendKind) -> u32 {
        self.server_list(kind).len() as u32
    }

    /// Address of one server.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an out-of-range index.
    pub fn server(&self, kind: BackendKind, index: u32) -> Result<&str> {
        self.server_list(kind)
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| {
                Error::InvalidArgument(format!("no {kind} server with index {index}"))
            })
    }

    /// Backend selection for one kind.
    pub fn backend(&self, kind: BackendKind) -> &BackendConfig {
        match kind {
            BackendKind::Object => &self.object,
            BackendKind::Kv => &self.kv,
            BackendKind::Db => &self.db,
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Reef configuration
#
# Per-kind server lists. A kind with no servers runs its backend locally
# inside the client process.
[servers]
object = ["127.0.0.1:4711"]
kv = ["127.0.0.1:4711"]
db = ["127.0.0.1:4711"]

[object]
backend = "memory"
# path = "/var/lib/reef/object/{PORT}"

[kv]
backend = "memory"

[db]
backend = "memory"

# Idle-endpoint cap per (kind, server).
max-connections = 8

# Default distribution block size in bytes (4 MiB).
stripe-size = 4194304
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_toml_parses() {
        let config = Configuration::from_toml(Configuration::default_toml()).unwrap();
        assert_eq!(config.server_count(BackendKind::Object), 1);
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.stripe_size, 4 * 1024 * 1024);
        assert_eq!(config.backend(BackendKind::Kv).backend, "memory");
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config = Configuration::from_toml("").unwrap();
        assert_eq!(config.server_count(BackendKind::Db), 0);
        assert_eq!(config.backend(BackendKind::Db).backend, "memory");
    }

    #[test]
    fn port_substitution() {
        let backend = BackendConfig {
            backend: "memory".into(),
            path: "/var/lib/reef/{PORT}/data".into(),
        };
        assert_eq!(backend.path_for_port(4711), "/var/lib/reef/4711/data");
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(Configuration::from_toml("max-connections = 0").is_err());
        assert!(Configuration::from_toml("stripe-size = 0").is_err());
        assert!(Configuration::from_toml("[servers]\nobject = [\"\"]").is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, Configuration::default_toml()).unwrap();
        let config = Configuration::load(&path).unwrap();
        assert_eq!(config.server(BackendKind::Object, 0).unwrap(), "127.0.0.1:4711");
        assert!(config.server(BackendKind::Object, 1).is_err());
    }
}
