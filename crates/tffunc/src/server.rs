//! # Plugin Server
//!
//! Accepts host connections and answers their frames.
//!
//! ## Concurrency
//!
//! Each connection is served by its own task, and every frame on it is
//! handled by a further task. Replies are written as soon as they are ready,
//! so a slow call never holds up the calls behind it.

use std::fmt;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use funcrpc::ProviderServer;
use funcrpc::handle_frame;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::ConfigError;
use crate::config::ServeConfig;
use crate::handshake;
use crate::registry::Provider;
use crate::registry::Registry;
use crate::service::FunctionProvider;
use crate::transport;
use crate::transport::StreamTransport;
use crate::transport::Transport;

/// Protocol versions this server speaks.
pub const SUPPORTED_VERSIONS: &[u32] = &[funcrpc::PROTOCOL_VERSION];

#[derive(Debug)]
pub enum ServeError {
    Config(ConfigError),
    Handshake(handshake::Error),
    Listen(std::io::Error),
    Accept(std::io::Error),
    /// The handshake line could not be written.
    Announce(std::io::Error),
}

impl fmt::Display for ServeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid configuration: {}", e),
            Self::Handshake(e) => write!(f, "{}", e),
            Self::Listen(e) => write!(f, "failed to listen: {}", e),
            Self::Accept(e) => write!(f, "failed to accept connection: {}", e),
            Self::Announce(e) => write!(f, "failed to write handshake: {}", e),
        }
    }
}

impl std::error::Error for ServeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Handshake(e) => Some(e),
            Self::Listen(e) | Self::Accept(e) | Self::Announce(e) => Some(e),
        }
    }
}

impl From<ConfigError> for ServeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<handshake::Error> for ServeError {
    fn from(e: handshake::Error) -> Self {
        Self::Handshake(e)
    }
}

pub type Result<T> = std::result::Result<T, ServeError>;

// ============================================================================
//  CONNECTION
// ============================================================================

/// Answers frames from `transport` until the peer closes it.
pub async fn serve_connection(server: Arc<dyn ProviderServer>, transport: Arc<dyn Transport>) -> transport::Result<()> {
    loop {
        let Some(frame) = transport.recv().await? else {
            debug!("peer closed the connection");
            return Ok(());
        };

        let server = server.clone();
        let transport = transport.clone();
        tokio::spawn(async move {
            match handle_frame(server.as_ref(), &frame).await {
                Ok(reply) => {
                    if let Err(e) = transport.send(&reply).await {
                        warn!(error = %e, "failed to send reply");
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode reply"),
            }
        });
    }
}

// ============================================================================
//  LISTENER
// ============================================================================

enum Listener {
    #[cfg(unix)]
    Unix {
        listener: tokio::net::UnixListener,
        path: std::path::PathBuf,
    },
    #[cfg_attr(unix, allow(dead_code))]
    Tcp(tokio::net::TcpListener),
}

impl Listener {
    #[cfg(unix)]
    async fn bind(config: &ServeConfig) -> Result<Self> {
        let path = config.socket_dir().join(format!("plugin{}", rand::random::<u32>()));
        let listener = tokio::net::UnixListener::bind(&path).map_err(ServeError::Listen)?;
        Ok(Self::Unix { listener, path })
    }

    #[cfg(not(unix))]
    async fn bind(config: &ServeConfig) -> Result<Self> {
        Self::bind_tcp(config).await
    }

    #[cfg_attr(unix, allow(dead_code))]
    async fn bind_tcp(config: &ServeConfig) -> Result<Self> {
        let mut last_error = None;
        for port in config.min_port..=config.max_port {
            match tokio::net::TcpListener::bind(("127.0.0.1", port)).await {
                Ok(listener) => return Ok(Self::Tcp(listener)),
                Err(e) => last_error = Some(e),
            }
        }
        let e = last_error.unwrap_or_else(|| std::io::Error::other("no port in range"));
        Err(ServeError::Listen(e))
    }

    fn network(&self) -> &'static str {
        match self {
            #[cfg(unix)]
            Self::Unix { .. } => "unix",
            Self::Tcp(_) => "tcp",
        }
    }

    fn address(&self) -> Result<String> {
        match self {
            #[cfg(unix)]
            Self::Unix { path, .. } => Ok(path.display().to_string()),
            Self::Tcp(listener) => Ok(listener.local_addr().map_err(ServeError::Listen)?.to_string()),
        }
    }

    async fn accept(&self) -> Result<Arc<dyn Transport>> {
        match self {
            #[cfg(unix)]
            Self::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await.map_err(ServeError::Accept)?;
                Ok(Arc::new(StreamTransport::new(stream)))
            }
            Self::Tcp(listener) => {
                let (stream, _) = listener.accept().await.map_err(ServeError::Accept)?;
                stream.set_nodelay(true).map_err(ServeError::Accept)?;
                Ok(Arc::new(StreamTransport::new(stream)))
            }
        }
    }

    fn cleanup(&self) {
        #[cfg(unix)]
        if let Self::Unix { path, .. } = self {
            if let Err(e) = std::fs::remove_file(path) {
                debug!(path = %path.display(), error = %e, "failed to remove socket file");
            }
        }
    }
}

// ============================================================================
//  SERVER
// ============================================================================

/// A listening plugin server that has completed the host handshake.
pub struct PluginServer {
    listener: Listener,
    version: u32,
    service: Arc<dyn ProviderServer>,
}

impl PluginServer {
    /// Checks the handshake settings in `config`, picks a protocol version and starts listening.
    pub async fn bind(registry: Arc<Registry>, config: &ServeConfig) -> Result<Self> {
        handshake::check_cookie(config.magic_cookie.as_deref())?;
        let version = handshake::negotiate_version(config.protocol_versions.as_deref(), SUPPORTED_VERSIONS)?;
        let service = service_for(version, registry)?;
        let listener = Listener::bind(config).await?;
        info!(version, network = listener.network(), address = %listener.address()?, "listening");
        Ok(Self { listener, version, service })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn network(&self) -> &'static str {
        self.listener.network()
    }

    pub fn address(&self) -> Result<String> {
        self.listener.address()
    }

    /// The line that tells the host where to connect.
    pub fn handshake_line(&self) -> Result<String> {
        Ok(handshake::handshake_line(self.version, self.network(), &self.address()?))
    }

    /// Accepts connections until `shutdown` resolves or accepting fails.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        let outcome = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutting down");
                    break Ok(());
                }
                accepted = self.listener.accept() => {
                    let transport = match accepted {
                        Ok(transport) => transport,
                        Err(e) => break Err(e),
                    };
                    info!("connection accepted");
                    let service = self.service.clone();
                    tokio::spawn(async move {
                        match serve_connection(service, transport).await {
                            Ok(()) => info!("connection closed"),
                            Err(e) => warn!(error = %e, "connection failed"),
                        }
                    });
                }
            }
        };
        self.listener.cleanup();
        outcome
    }
}

/// The version table: which service answers each protocol version.
fn service_for(version: u32, registry: Arc<Registry>) -> Result<Arc<dyn ProviderServer>> {
    match version {
        6 => Ok(Arc::new(FunctionProvider::new(registry))),
        other => Err(ServeError::Handshake(handshake::Error::NoCommonVersion {
            offered: vec![other],
            supported: SUPPORTED_VERSIONS.to_vec(),
        })),
    }
}

// ============================================================================
//  ENTRY POINTS
// ============================================================================

impl Provider {
    /// Serves the registered functions to the host that launched this process.
    ///
    /// Only returns if the server cannot start or stops accepting connections.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Like `serve`, but stops accepting connections once `shutdown` resolves.
    pub async fn serve_with_shutdown(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let config = ServeConfig::from_env()?;
        let server = PluginServer::bind(self.into_registry(), &config).await?;

        announce(&server.handshake_line()?).map_err(ServeError::Announce)?;
        server.run(shutdown).await
    }
}

/// Writes the handshake line to stdout, which the host reads to find the server.
fn announce(line: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", line)?;
    stdout.flush()
}
