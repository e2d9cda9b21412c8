//! # FuncRPC
//!
//! The wire contract between a host and a provider plugin (protocol version 6).
//!
//! ## Architecture
//!
//! - **Messages**: the request and response bodies of every service method.
//! - **Frames**: the envelope that carries a body with a sequence number so
//!   concurrent calls can share one connection.
//! - **Service**: the `ProviderServer` contract and the router that turns an
//!   inbound frame into a reply frame.
//!
//! Every body and frame is MessagePack with named fields.

pub mod error;
pub mod frame;
pub mod messages;
pub mod service;

pub use error::Code;
pub use error::Error;
pub use error::Result;
pub use error::Status;
pub use frame::CallFrame;
pub use frame::Frame;
pub use frame::ReplyFrame;
pub use frame::decode_message;
pub use frame::encode_message;
pub use messages::*;
pub use service::Method;
pub use service::Plane;
pub use service::ProviderServer;
pub use service::RawMessage;
pub use service::handle_frame;
pub use service::route;

/// The protocol version these messages belong to.
pub const PROTOCOL_VERSION: u32 = 6;
