//! # Provider Service
//!
//! The method contract of a provider server and the router that maps an
//! inbound Call frame onto it.
//!
//! ## Planes
//! - **Introspection**: metadata and schema.
//! - **Function**: listing and calling functions.
//! - **Configuration**: provider config validation, configuration, shutdown.
//! - **Resource**: managed resources and data sources. Their bodies are
//!   passed through as `RawMessage` and never decoded by the router, so a
//!   server that offers none can refuse every request the same way.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::warn;

use crate::error::Result;
use crate::error::Status;
use crate::frame::Frame;
use crate::frame::ReplyFrame;
use crate::frame::decode_message;
use crate::frame::encode_message;
use crate::messages::*;

/// An undecoded request or response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage(pub Vec<u8>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    Introspection,
    Function,
    Configuration,
    Resource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GetMetadata,
    GetProviderSchema,
    GetFunctions,
    CallFunction,
    ValidateProviderConfig,
    ConfigureProvider,
    StopProvider,
    ValidateResourceConfig,
    ValidateDataResourceConfig,
    UpgradeResourceState,
    ReadResource,
    PlanResourceChange,
    ApplyResourceChange,
    ImportResourceState,
    MoveResourceState,
    ReadDataSource,
}

impl Method {
    pub const ALL: [Method; 16] = [
        Method::GetMetadata,
        Method::GetProviderSchema,
        Method::GetFunctions,
        Method::CallFunction,
        Method::ValidateProviderConfig,
        Method::ConfigureProvider,
        Method::StopProvider,
        Method::ValidateResourceConfig,
        Method::ValidateDataResourceConfig,
        Method::UpgradeResourceState,
        Method::ReadResource,
        Method::PlanResourceChange,
        Method::ApplyResourceChange,
        Method::ImportResourceState,
        Method::MoveResourceState,
        Method::ReadDataSource,
    ];

    /// The name carried in a Call frame.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetMetadata => "GetMetadata",
            Self::GetProviderSchema => "GetProviderSchema",
            Self::GetFunctions => "GetFunctions",
            Self::CallFunction => "CallFunction",
            Self::ValidateProviderConfig => "ValidateProviderConfig",
            Self::ConfigureProvider => "ConfigureProvider",
            Self::StopProvider => "StopProvider",
            Self::ValidateResourceConfig => "ValidateResourceConfig",
            Self::ValidateDataResourceConfig => "ValidateDataResourceConfig",
            Self::UpgradeResourceState => "UpgradeResourceState",
            Self::ReadResource => "ReadResource",
            Self::PlanResourceChange => "PlanResourceChange",
            Self::ApplyResourceChange => "ApplyResourceChange",
            Self::ImportResourceState => "ImportResourceState",
            Self::MoveResourceState => "MoveResourceState",
            Self::ReadDataSource => "ReadDataSource",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }

    pub fn plane(&self) -> Plane {
        match self {
            Self::GetMetadata | Self::GetProviderSchema => Plane::Introspection,
            Self::GetFunctions | Self::CallFunction => Plane::Function,
            Self::ValidateProviderConfig | Self::ConfigureProvider | Self::StopProvider => Plane::Configuration,
            _ => Plane::Resource,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type Reply<T> = std::result::Result<T, Status>;

/// Everything a provider server answers.
#[async_trait]
pub trait ProviderServer: Send + Sync + 'static {
    async fn get_metadata(&self, req: GetMetadataRequest) -> Reply<GetMetadataResponse>;
    async fn get_provider_schema(&self, req: GetProviderSchemaRequest) -> Reply<GetProviderSchemaResponse>;
    async fn get_functions(&self, req: GetFunctionsRequest) -> Reply<GetFunctionsResponse>;
    async fn call_function(&self, req: CallFunctionRequest) -> Reply<CallFunctionResponse>;

    async fn validate_provider_config(&self, req: ValidateProviderConfigRequest) -> Reply<ValidateProviderConfigResponse>;
    async fn configure_provider(&self, req: ConfigureProviderRequest) -> Reply<ConfigureProviderResponse>;
    async fn stop_provider(&self, req: StopProviderRequest) -> Reply<StopProviderResponse>;

    async fn validate_resource_config(&self, req: RawMessage) -> Reply<RawMessage>;
    async fn validate_data_resource_config(&self, req: RawMessage) -> Reply<RawMessage>;
    async fn upgrade_resource_state(&self, req: RawMessage) -> Reply<RawMessage>;
    async fn read_resource(&self, req: RawMessage) -> Reply<RawMessage>;
    async fn plan_resource_change(&self, req: RawMessage) -> Reply<RawMessage>;
    async fn apply_resource_change(&self, req: RawMessage) -> Reply<RawMessage>;
    async fn import_resource_state(&self, req: RawMessage) -> Reply<RawMessage>;
    async fn move_resource_state(&self, req: RawMessage) -> Reply<RawMessage>;
    async fn read_data_source(&self, req: RawMessage) -> Reply<RawMessage>;
}

// ============================================================================
//  ROUTER
// ============================================================================

/// Runs one method against `server`, decoding the request body and encoding the response.
pub async fn route(server: &dyn ProviderServer, method: Method, body: &[u8]) -> Reply<Vec<u8>> {
    match method {
        Method::GetMetadata => respond(server.get_metadata(request(method, body)?).await?),
        Method::GetProviderSchema => respond(server.get_provider_schema(request(method, body)?).await?),
        Method::GetFunctions => respond(server.get_functions(request(method, body)?).await?),
        Method::CallFunction => respond(server.call_function(request(method, body)?).await?),
        Method::ValidateProviderConfig => respond(server.validate_provider_config(request(method, body)?).await?),
        Method::ConfigureProvider => respond(server.configure_provider(request(method, body)?).await?),
        Method::StopProvider => respond(server.stop_provider(request(method, body)?).await?),
        Method::ValidateResourceConfig => raw(server.validate_resource_config(RawMessage(body.to_vec())).await),
        Method::ValidateDataResourceConfig => raw(server.validate_data_resource_config(RawMessage(body.to_vec())).await),
        Method::UpgradeResourceState => raw(server.upgrade_resource_state(RawMessage(body.to_vec())).await),
        Method::ReadResource => raw(server.read_resource(RawMessage(body.to_vec())).await),
        Method::PlanResourceChange => raw(server.plan_resource_change(RawMessage(body.to_vec())).await),
        Method::ApplyResourceChange => raw(server.apply_resource_change(RawMessage(body.to_vec())).await),
        Method::ImportResourceState => raw(server.import_resource_state(RawMessage(body.to_vec())).await),
        Method::MoveResourceState => raw(server.move_resource_state(RawMessage(body.to_vec())).await),
        Method::ReadDataSource => raw(server.read_data_source(RawMessage(body.to_vec())).await),
    }
}

fn request<T: DeserializeOwned>(method: Method, body: &[u8]) -> Reply<T> {
    decode_message(body).map_err(|e| Status::invalid_argument(format!("malformed {} request: {}", method, e)))
}

fn respond<T: Serialize>(resp: T) -> Reply<Vec<u8>> {
    encode_message(&resp).map_err(|e| Status::internal(format!("failed to encode response: {}", e)))
}

fn raw(resp: Reply<RawMessage>) -> Reply<Vec<u8>> {
    resp.map(|msg| msg.0)
}

/// Answers one inbound frame with an encoded Reply frame.
///
/// Every frame gets a reply; frames that cannot be decoded are answered on sequence 0.
pub async fn handle_frame(server: &dyn ProviderServer, payload: &[u8]) -> Result<Vec<u8>> {
    let reply = match Frame::decode(payload) {
        Err(e) => {
            warn!(error = %e, "undecodable frame");
            ReplyFrame::err(0, Status::invalid_argument(format!("undecodable frame: {}", e)))
        }
        Ok(Frame::Reply(reply)) => {
            warn!(seq = reply.seq, "received a Reply frame where a Call was expected");
            ReplyFrame::err(reply.seq, Status::invalid_argument("expected a Call frame"))
        }
        Ok(Frame::Call(call)) => match Method::from_name(&call.method) {
            None => {
                debug!(seq = call.seq, method = %call.method, "unknown method");
                ReplyFrame::err(call.seq, Status::unimplemented(format!("unknown method {}", call.method)))
            }
            Some(method) => {
                debug!(seq = call.seq, %method, "dispatching call");
                match route(server, method, &call.body).await {
                    Ok(body) => ReplyFrame::ok(call.seq, body),
                    Err(status) => ReplyFrame::err(call.seq, status),
                }
            }
        },
    };
    Frame::Reply(reply).encode()
}
