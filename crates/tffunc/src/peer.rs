//! # RPC Peer with Async Pump
//!
//! The host side of a connection: sends Call frames and correlates the
//! replies with pending requests via sequence numbers. A background pump task
//! reads every reply off the transport, so any number of calls may be in
//! flight at once.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use funcrpc::CallFrame;
use funcrpc::Frame;
use funcrpc::Method;
use funcrpc::Status;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tracing::warn;

use crate::transport;
use crate::transport::Transport;

/// How long a call waits for its reply.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub enum Error {
    Transport(transport::Error),
    Rpc(funcrpc::Error),
    /// The server answered with a failure status.
    Remote(Status),
    Timeout,
    ChannelClosed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Rpc(e) => write!(f, "RPC error: {}", e),
            Self::Remote(status) => write!(f, "Remote failure: {}", status),
            Self::Timeout => write!(f, "Request timed out"),
            Self::ChannelClosed => write!(f, "Response channel closed"),
        }
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<funcrpc::Error> for Error {
    fn from(e: funcrpc::Error) -> Self {
        Self::Rpc(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

type Pending = DashMap<u64, oneshot::Sender<Result<Vec<u8>>>>;

/// Host-side RPC peer.
///
/// Each Peer owns its transport exclusively, so sequence numbers are scoped
/// to a single connection. Peers can be wrapped in Arc for sharing across tasks.
pub struct Peer {
    peer_name: String,
    transport: Arc<dyn Transport>,
    pending: Arc<Pending>,
    seq_gen: AtomicU64,
}

impl Peer {
    /// Creates a new peer and spawns the background pump task.
    pub fn new(peer_name: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        let peer_name = peer_name.into();
        let transport: Arc<dyn Transport> = Arc::from(transport);
        let pending: Arc<Pending> = Arc::new(DashMap::new());

        let pump_transport = transport.clone();
        let pump_pending = pending.clone();
        let pump_name = peer_name.clone();

        tokio::spawn(async move {
            let error = loop {
                match pump_transport.recv().await {
                    Ok(Some(msg)) => {
                        if let Err(e) = Self::handle_message(&msg, &pump_pending) {
                            warn!(peer = %pump_name, error = %e, "dropping connection after bad reply");
                            break e;
                        }
                    }
                    Ok(None) => {
                        break Error::Transport(transport::Error::ConnectionLost("Stream closed".into()));
                    }
                    Err(e) => {
                        warn!(peer = %pump_name, error = %e, "transport error in pump");
                        break Error::Transport(e);
                    }
                }
            };

            Self::notify_all_pending(&pump_pending, error);
        });

        Self {
            peer_name,
            transport,
            pending,
            seq_gen: AtomicU64::new(1),
        }
    }

    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    fn notify_all_pending(pending: &Pending, error: Error) {
        let keys: Vec<u64> = pending.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some((_, tx)) = pending.remove(&key) {
                let _ = tx.send(Err(error.clone()));
            }
        }
    }

    fn handle_message(msg: &[u8], pending: &Pending) -> Result<()> {
        let Frame::Reply(reply) = Frame::decode(msg)? else {
            return Err(Error::Rpc(funcrpc::Error::ProtocolViolation(
                "Pump received Call frame instead of Reply".into(),
            )));
        };

        // A missing entry means the caller already gave up on this sequence.
        let Some((_, tx)) = pending.remove(&reply.seq) else {
            return Ok(());
        };

        let _ = tx.send(reply.status.map_err(Error::Remote));
        Ok(())
    }

    /// Sends `body` as a call to `method` and awaits the raw reply body.
    pub async fn call(&self, method: Method, body: Vec<u8>) -> Result<Vec<u8>> {
        let seq = self.seq_gen.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);

        let payload = match Frame::Call(CallFrame::new(seq, method.as_str(), body)).encode() {
            Ok(payload) => payload,
            Err(e) => {
                self.pending.remove(&seq);
                return Err(e.into());
            }
        };

        if let Err(e) = self.transport.send(&payload).await {
            self.pending.remove(&seq);
            return Err(e.into());
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.pending.remove(&seq);
                Err(Error::ChannelClosed)
            }
            Err(_) => {
                self.pending.remove(&seq);
                Err(Error::Timeout)
            }
        }
    }

    /// Encodes `req`, calls `method` and decodes the response.
    pub async fn request<Req, Resp>(&self, method: Method, req: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let body = funcrpc::encode_message(req)?;
        let reply = self.call(method, body).await?;
        Ok(funcrpc::decode_message(&reply)?)
    }

    pub async fn call_function(&self, req: &funcrpc::CallFunctionRequest) -> Result<funcrpc::CallFunctionResponse> {
        self.request(Method::CallFunction, req).await
    }

    pub async fn get_functions(&self) -> Result<funcrpc::GetFunctionsResponse> {
        self.request(Method::GetFunctions, &funcrpc::GetFunctionsRequest {}).await
    }

    pub async fn get_metadata(&self) -> Result<funcrpc::GetMetadataResponse> {
        self.request(Method::GetMetadata, &funcrpc::GetMetadataRequest {}).await
    }

    pub async fn get_provider_schema(&self) -> Result<funcrpc::GetProviderSchemaResponse> {
        self.request(Method::GetProviderSchema, &funcrpc::GetProviderSchemaRequest {}).await
    }
}
