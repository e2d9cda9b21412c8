//! # TfFunc
//!
//! Serve a set of pure, typed functions to a host over the provider plugin
//! protocol, without offering any resources or data sources.
//!
//! ## Architecture
//!
//! - **Function model**: `FunctionSpec` declares parameters, a return type
//!   rule and an implementation, and knows how to call it safely.
//! - **Registry**: `Provider` collects functions during setup and freezes
//!   into a read-only `Registry` for serving.
//! - **Dispatcher**: decodes the arguments of a call, invokes the function and
//!   encodes its result or error.
//! - **Service**: `FunctionProvider` answers every protocol method, refusing
//!   the resource plane.
//! - **Serving**: handshake, listener, per-frame tasks, and a host-side `Peer`.
//!
//! ## Example
//!
//! ```no_run
//! use tffunc::FunctionSpec;
//! use tffunc::Parameter;
//! use tffunc::Provider;
//! use tffunc::ReturnType;
//! use tyval::Type;
//! use tyval::Value;
//!
//! # async fn run() -> Result<(), tffunc::ServeError> {
//! let mut provider = Provider::new();
//! provider.add_function(
//!     "echo",
//!     FunctionSpec::new(ReturnType::Static(Type::String), |args, _| Ok(args[0].clone()))
//!         .param(Parameter::new("value", Type::String)),
//! );
//! provider.serve().await
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod function;
pub mod handshake;
pub mod peer;
pub mod registry;
pub mod schema;
pub mod server;
pub mod service;
pub mod transport;

pub use config::ServeConfig;
pub use dispatch::call_function;
pub use function::FunctionError;
pub use function::FunctionSpec;
pub use function::Parameter;
pub use function::Refinement;
pub use function::ReturnType;
pub use peer::Peer;
pub use registry::Provider;
pub use registry::RegisteredFunction;
pub use registry::RegistrationError;
pub use registry::Registry;
pub use schema::build_schema;
pub use server::PluginServer;
pub use server::ServeError;
pub use server::serve_connection;
pub use service::FunctionProvider;
pub use transport::StreamTransport;
pub use transport::Transport;

#[cfg(test)]
mod tests;
