//! # Tyval
//!
//! A small algebra of typed values and the two encodings the provider
//! protocol carries them in.
//!
//! ## Overview
//!
//! - **Types**: primitives (`bool`, `number`, `string`), collections, structural
//!   types and the `dynamic` placeholder for "decided at runtime".
//! - **Values**: every value knows its type, including nulls and unknowns.
//! - **JSON**: self-describing, decoded leniently and checked against a wanted type.
//! - **MessagePack**: compact, decoding always requires the wanted type.

pub mod error;
pub mod json;
pub mod msgpack;
pub mod types;
pub mod value;

pub use error::Error;
pub use error::Path;
pub use error::PathStep;
pub use error::Result;
pub use types::Type;
pub use value::Number;
pub use value::Value;

/// The maximum nesting depth of values before encoding or decoding gives up.
pub const MAX_RECURSION_DEPTH: usize = 64;
