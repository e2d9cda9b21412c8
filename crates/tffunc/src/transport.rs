//! # Transport Abstraction
//!
//! A minimal, async interface for moving frames between a host and a provider.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The Transport knows nothing about RPC frames or values.
//!   It moves opaque buffers.
//! - **Full Duplex**: `send` and `recv` are independent, so replies to
//!   concurrent calls may be written while the next request is being read.

use std::fmt;

use bytes::Bytes;
use futures::SinkExt;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::ReadHalf;
use tokio::io::WriteHalf;
use tokio::sync::Mutex;
use tokio_util::codec::FramedRead;
use tokio_util::codec::FramedWrite;
use tokio_util::codec::LengthDelimitedCodec;
use tokio_util::codec::LengthDelimitedCodecError;

/// Largest frame either side accepts.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone)]
pub enum Error {
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// The operation timed out before a response was received.
    Timeout,
    /// The frame exceeds `MAX_FRAME_LENGTH`.
    PayloadTooLarge,
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Timeout => write!(f, "Request timed out"),
            Self::PayloadTooLarge => write!(f, "Payload too large for transport"),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::UnexpectedEof => {
                Self::ConnectionLost(e.to_string())
            }
            _ if e.get_ref().is_some_and(|inner| inner.is::<LengthDelimitedCodecError>()) => {
                Self::PayloadTooLarge
            }
            _ => Self::Io(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A mechanism to send byte buffers and receive them from the other side.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one frame.
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Receives the next frame, or `None` once the peer has closed the connection.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;
}

/// Length-prefixed frames (32-bit big-endian) over any byte stream.
pub struct StreamTransport<S> {
    reader: Mutex<FramedRead<ReadHalf<S>, LengthDelimitedCodec>>,
    writer: Mutex<FramedWrite<WriteHalf<S>, LengthDelimitedCodec>>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(FramedRead::new(read, codec())),
            writer: Mutex::new(FramedWrite::new(write, codec())),
        }
    }
}

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

#[async_trait::async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn send(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_FRAME_LENGTH {
            return Err(Error::PayloadTooLarge);
        }
        let mut writer = self.writer.lock().await;
        writer.send(Bytes::copy_from_slice(payload)).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>> {
        let mut reader = self.reader.lock().await;
        match reader.next().await {
            None => Ok(None),
            Some(Ok(frame)) => Ok(Some(frame.to_vec())),
            Some(Err(e)) => Err(e.into()),
        }
    }
}
