//! Client configuration via `deferkv.toml`
//!
//! A missing file means defaults. To change settings, edit the file and
//! restart the client process.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Config file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "deferkv.toml";

/// Transaction client configuration loaded from `deferkv.toml`.
///
/// # Example
///
/// ```toml
/// host = "localhost"
/// port = 11211
/// announce = true
/// max_retries = 10
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Store host name
    #[serde(default = "default_host")]
    pub host: String,
    /// Store port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Announce each new transaction to the store with an atomic increment
    /// keyed by the transaction id, and retract it on explicit abort.
    #[serde(default = "default_announce")]
    pub announce: bool,
    /// Retries allowed by `run_with_retry` after commit rejections.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    11211
}

fn default_announce() -> bool {
    true
}

fn default_max_retries() -> u32 {
    10
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            announce: default_announce(),
            max_retries: default_max_retries(),
        }
    }
}

impl ClientConfig {
    /// `host:port` of the store
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# deferkv client configuration

# Store address
host = "localhost"
port = 11211

# Announce in-flight transactions to the store (atomic increment keyed by
# the transaction id at begin, decrement on explicit abort).
announce = true

# Commit rejections tolerated by run_with_retry before giving up.
max_retries = 10
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Read config from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
