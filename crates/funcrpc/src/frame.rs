//! # Protocol Frames
//!
//! Defines the structure of the RPC envelope (Call vs Reply).
//!
//! ## Invariants
//! - **Panic Safety**: All decoding paths return `Result`, never panicking on unknown data.
//! - **Correlation**: A Reply always carries the sequence number of the Call it answers.

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::error::Status;

/// A request to run `method` with an encoded request `body`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFrame {
    pub seq: u64,
    pub method: String,
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
}

impl CallFrame {
    pub fn new(seq: u64, method: impl Into<String>, body: Vec<u8>) -> Self {
        Self { seq, method: method.into(), body }
    }
}

/// The answer to a Call: an encoded response body, or the status it failed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub seq: u64,
    #[serde(with = "reply_status")]
    pub status: std::result::Result<Vec<u8>, Status>,
}

/// Keeps the `Ok`/`Err` layout of `Result` while writing the body as binary.
mod reply_status {
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serialize;
    use serde::Serializer;
    use serde_bytes::ByteBuf;
    use serde_bytes::Bytes;

    use crate::error::Status;

    #[derive(Serialize)]
    enum Borrowed<'a> {
        Ok(&'a Bytes),
        Err(&'a Status),
    }

    #[derive(Deserialize)]
    enum Owned {
        Ok(ByteBuf),
        Err(Status),
    }

    pub fn serialize<S: Serializer>(
        status: &std::result::Result<Vec<u8>, Status>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match status {
            Ok(body) => Borrowed::Ok(Bytes::new(body)),
            Err(status) => Borrowed::Err(status),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<std::result::Result<Vec<u8>, Status>, D::Error> {
        Ok(match Owned::deserialize(deserializer)? {
            Owned::Ok(body) => Ok(body.into_vec()),
            Owned::Err(status) => Err(status),
        })
    }
}

impl ReplyFrame {
    pub fn ok(seq: u64, body: Vec<u8>) -> Self {
        Self { seq, status: Ok(body) }
    }

    pub fn err(seq: u64, status: Status) -> Self {
        Self { seq, status: Err(status) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Call(CallFrame),
    Reply(ReplyFrame),
}

impl Frame {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_message(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode_message(bytes)
    }

    pub fn seq(&self) -> u64 {
        match self {
            Self::Call(call) => call.seq,
            Self::Reply(reply) => reply.seq,
        }
    }
}

/// Serializes a message body with named fields.
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(msg)?)
}

/// Parses a message body.
pub fn decode_message<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(bytes)?)
}
