//! # Serve Configuration
//!
//! The settings a host passes to a plugin process through its environment.

use std::fmt;
use std::path::PathBuf;

use crate::handshake::MAGIC_COOKIE_KEY;

pub const PROTOCOL_VERSIONS_VAR: &str = "PLUGIN_PROTOCOL_VERSIONS";
pub const UNIX_SOCKET_DIR_VAR: &str = "PLUGIN_UNIX_SOCKET_DIR";
pub const MIN_PORT_VAR: &str = "PLUGIN_MIN_PORT";
pub const MAX_PORT_VAR: &str = "PLUGIN_MAX_PORT";

pub const DEFAULT_MIN_PORT: u16 = 10000;
pub const DEFAULT_MAX_PORT: u16 = 25000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidPort { var: &'static str, value: String },
    EmptyPortRange { min: u16, max: u16 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPort { var, value } => write!(f, "{} must be a port number, got {:?}", var, value),
            Self::EmptyPortRange { min, max } => write!(f, "port range {}..={} is empty", min, max),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    /// Value of the magic cookie variable, if the host set it.
    pub magic_cookie: Option<String>,
    /// Comma separated protocol versions the host speaks. `None` means any.
    pub protocol_versions: Option<String>,
    /// Where Unix sockets are created. `None` means the system temp dir.
    pub unix_socket_dir: Option<PathBuf>,
    pub min_port: u16,
    pub max_port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            magic_cookie: None,
            protocol_versions: None,
            unix_socket_dir: None,
            min_port: DEFAULT_MIN_PORT,
            max_port: DEFAULT_MAX_PORT,
        }
    }
}

impl ServeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let config = Self {
            magic_cookie: lookup(MAGIC_COOKIE_KEY),
            protocol_versions: get(PROTOCOL_VERSIONS_VAR),
            unix_socket_dir: get(UNIX_SOCKET_DIR_VAR).map(PathBuf::from),
            min_port: parse_port(MIN_PORT_VAR, get(MIN_PORT_VAR), DEFAULT_MIN_PORT)?,
            max_port: parse_port(MAX_PORT_VAR, get(MAX_PORT_VAR), DEFAULT_MAX_PORT)?,
        };
        if config.min_port > config.max_port {
            return Err(ConfigError::EmptyPortRange { min: config.min_port, max: config.max_port });
        }
        Ok(config)
    }

    pub fn socket_dir(&self) -> PathBuf {
        self.unix_socket_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn parse_port(var: &'static str, value: Option<String>, default: u16) -> Result<u16, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidPort { var, value }),
    }
}
