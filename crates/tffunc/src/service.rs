//! # Protocol Service Facade
//!
//! The provider server a host talks to. Functions are the only thing it
//! offers: every resource and data source method is refused.

use std::sync::Arc;

use async_trait::async_trait;
use funcrpc::*;
use tracing::debug;

use crate::dispatch::call_function;
use crate::registry::Registry;

const NO_RESOURCES: &str = "provider does not offer any resource types";

type Reply<T> = std::result::Result<T, Status>;

/// Serves the functions of a frozen `Registry`.
#[derive(Debug, Clone)]
pub struct FunctionProvider {
    registry: Arc<Registry>,
}

impl FunctionProvider {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn capabilities() -> ServerCapabilities {
        ServerCapabilities {
            get_provider_schema_optional: true,
            ..Default::default()
        }
    }

    fn refuse(method: Method) -> Reply<RawMessage> {
        debug!(%method, "refusing resource-plane call");
        Err(Status::unimplemented(NO_RESOURCES))
    }
}

#[async_trait]
impl ProviderServer for FunctionProvider {
    async fn get_metadata(&self, _req: GetMetadataRequest) -> Reply<GetMetadataResponse> {
        Ok(GetMetadataResponse {
            server_capabilities: Self::capabilities(),
            functions: self.registry.metadata().to_vec(),
            ..Default::default()
        })
    }

    async fn get_provider_schema(&self, _req: GetProviderSchemaRequest) -> Reply<GetProviderSchemaResponse> {
        Ok(GetProviderSchemaResponse {
            provider: Schema::default(),
            functions: self.registry.schemas().clone(),
            server_capabilities: Self::capabilities(),
            ..Default::default()
        })
    }

    async fn get_functions(&self, _req: GetFunctionsRequest) -> Reply<GetFunctionsResponse> {
        Ok(GetFunctionsResponse {
            functions: self.registry.schemas().clone(),
            diagnostics: Vec::new(),
        })
    }

    async fn call_function(&self, req: CallFunctionRequest) -> Reply<CallFunctionResponse> {
        debug!(function = %req.name, args = req.arguments.len(), "CallFunction");
        Ok(call_function(&self.registry, req))
    }

    async fn validate_provider_config(&self, _req: ValidateProviderConfigRequest) -> Reply<ValidateProviderConfigResponse> {
        Ok(ValidateProviderConfigResponse::default())
    }

    async fn configure_provider(&self, _req: ConfigureProviderRequest) -> Reply<ConfigureProviderResponse> {
        Ok(ConfigureProviderResponse::default())
    }

    async fn stop_provider(&self, _req: StopProviderRequest) -> Reply<StopProviderResponse> {
        Ok(StopProviderResponse::default())
    }

    async fn validate_resource_config(&self, _req: RawMessage) -> Reply<RawMessage> {
        Self::refuse(Method::ValidateResourceConfig)
    }

    async fn validate_data_resource_config(&self, _req: RawMessage) -> Reply<RawMessage> {
        Self::refuse(Method::ValidateDataResourceConfig)
    }

    async fn upgrade_resource_state(&self, _req: RawMessage) -> Reply<RawMessage> {
        Self::refuse(Method::UpgradeResourceState)
    }

    async fn read_resource(&self, _req: RawMessage) -> Reply<RawMessage> {
        Self::refuse(Method::ReadResource)
    }

    async fn plan_resource_change(&self, _req: RawMessage) -> Reply<RawMessage> {
        Self::refuse(Method::PlanResourceChange)
    }

    async fn apply_resource_change(&self, _req: RawMessage) -> Reply<RawMessage> {
        Self::refuse(Method::ApplyResourceChange)
    }

    async fn import_resource_state(&self, _req: RawMessage) -> Reply<RawMessage> {
        Self::refuse(Method::ImportResourceState)
    }

    async fn move_resource_state(&self, _req: RawMessage) -> Reply<RawMessage> {
        Self::refuse(Method::MoveResourceState)
    }

    async fn read_data_source(&self, _req: RawMessage) -> Reply<RawMessage> {
        Self::refuse(Method::ReadDataSource)
    }
}
