use crate::core::{DbError, Result};
use crate::Connection;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub connection: ConnectionConfig,
}

/// Connection profile.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// `host` or `host:port`
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    /// Character set applied after connecting
    pub encoding: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl ConnectionConfig {
    /// Opens a connection with this profile and applies its encoding.
    ///
    /// A rejected encoding is logged and the connection is still returned.
    pub fn connect(&self) -> Result<Connection> {
        let mut conn = Connection::open(&self.host, &self.user, &self.password, &self.database)?;
        if let Some(encoding) = &self.encoding {
            if !conn.set_encoding(encoding) {
                warn!("Encoding {} was not applied", encoding);
            }
        }
        Ok(conn)
    }
}

impl Config {
    /// `<config dir>/unidb/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("unidb").join("config.toml"))
    }
}

impl FromStr for Config {
    type Err = DbError;

    fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.connection.database.trim().is_empty() {
            return Err(DbError::Config("connection.database must not be empty".to_string()));
        }
        Ok(config)
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    content.parse()
}
