//! # Plugin Handshake
//!
//! How a plugin process proves it was launched by a host, agrees on a
//! protocol version, and tells the host where to connect.

use std::fmt;

pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str = "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

/// Version of the handshake line itself.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Name of the wire protocol announced in the handshake line.
pub const WIRE_PROTOCOL: &str = "funcrpc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The cookie is missing or wrong: the binary was run by hand.
    NotLaunchedByHost,
    InvalidVersionList(String),
    NoCommonVersion { offered: Vec<u32>, supported: Vec<u32> },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotLaunchedByHost => write!(
                f,
                "This binary is a plugin. These are not meant to be executed directly. \
                 Please execute the program that consumes these plugins, which will \
                 load any plugins automatically"
            ),
            Self::InvalidVersionList(list) => write!(f, "invalid protocol version list {:?}", list),
            Self::NoCommonVersion { offered, supported } => write!(
                f,
                "no common protocol version: client offers {:?}, server supports {:?}",
                offered, supported
            ),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

pub fn check_cookie(value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if v == MAGIC_COOKIE_VALUE => Ok(()),
        _ => Err(Error::NotLaunchedByHost),
    }
}

/// Picks the highest version both sides speak. `offered = None` accepts any supported version.
pub fn negotiate_version(offered: Option<&str>, supported: &[u32]) -> Result<u32> {
    let offered = match offered {
        None => return supported.iter().copied().max().ok_or(Error::NoCommonVersion {
            offered: Vec::new(),
            supported: Vec::new(),
        }),
        Some(list) => parse_versions(list)?,
    };

    offered
        .iter()
        .copied()
        .filter(|v| supported.contains(v))
        .max()
        .ok_or_else(|| Error::NoCommonVersion { offered, supported: supported.to_vec() })
}

fn parse_versions(list: &str) -> Result<Vec<u32>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| Error::InvalidVersionList(list.to_string())))
        .collect()
}

/// The line written to stdout once the listener is up.
pub fn handshake_line(version: u32, network: &str, address: &str) -> String {
    format!("{}|{}|{}|{}|{}", CORE_PROTOCOL_VERSION, version, network, address, WIRE_PROTOCOL)
}
