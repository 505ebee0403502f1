//! Configuration loading for relay.
//!
//! A TOML file at the platform config dir (`relay/config.toml`), path
//! overridable via `RELAY_CONFIG`. A missing file yields defaults; a
//! malformed file is an error, not silently defaulted over.
//!
//! ```toml
//! [service]
//! base_url = "https://attribution.internal.example"
//! connect_timeout_secs = 30
//!
//! [storage]
//! dir = "/var/lib/relay"
//! namespace = "relay"
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV_VAR: &str = "RELAY_CONFIG";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7311";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_NAMESPACE: &str = "relay";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the attribution service.
    pub base_url: String,
    pub connect_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Override for the state directory. Defaults to the platform data
    /// dir under `relay/`.
    pub dir: Option<PathBuf>,
    /// Namespace of the delivery-state file.
    pub namespace: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl RelayConfig {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from an explicit path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Resolved state directory for the flag store.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.storage.dir.clone().unwrap_or_else(|| {
            dirs::data_dir().map_or_else(|| PathBuf::from(".relay"), |dir| dir.join("relay"))
        })
    }
}

/// Config file location: `$RELAY_CONFIG`, else the platform config dir.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.is_empty()
    {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("relay").join("config.toml"))
}
