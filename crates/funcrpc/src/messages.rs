//! # Protocol Messages
//!
//! Request and response bodies of the provider service, version 6.
//!
//! Every struct defaults its missing fields, so an empty map decodes to the
//! empty message of that kind.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
//  SHARED
// ============================================================================

/// How a description string should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StringKind {
    #[default]
    Plain,
    Markdown,
}

/// A value in one of the two argument encodings. At most one field is populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicValue {
    #[serde(with = "serde_bytes")]
    pub msgpack: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub json: Vec<u8>,
}

impl DynamicValue {
    pub fn msgpack(bytes: Vec<u8>) -> Self {
        Self { msgpack: bytes, json: Vec::new() }
    }

    pub fn json(bytes: Vec<u8>) -> Self {
        Self { msgpack: Vec::new(), json: bytes }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Severity {
    #[default]
    Invalid,
    Error,
    Warning,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

/// Optional protocol behaviours this server supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerCapabilities {
    pub plan_destroy: bool,
    /// The host may skip `GetProviderSchema` and rely on `GetMetadata`.
    pub get_provider_schema_optional: bool,
    pub move_resource_state: bool,
}

// ============================================================================
//  SCHEMAS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaBlock {
    pub version: i64,
    pub description: String,
    pub description_kind: StringKind,
    pub deprecated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    pub version: i64,
    pub block: SchemaBlock,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionParameter {
    pub name: String,
    /// Canonical type JSON.
    #[serde(rename = "type", with = "serde_bytes")]
    pub type_json: Vec<u8>,
    pub allow_null_value: bool,
    pub allow_unknown_values: bool,
    pub description: String,
    pub description_kind: StringKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionReturn {
    /// Canonical type JSON.
    #[serde(rename = "type", with = "serde_bytes")]
    pub type_json: Vec<u8>,
}

/// The introspectable description of one function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Function {
    pub parameters: Vec<FunctionParameter>,
    pub variadic_parameter: Option<FunctionParameter>,
    #[serde(rename = "return")]
    pub return_: FunctionReturn,
    pub summary: String,
    pub description: String,
    pub description_kind: StringKind,
    pub deprecation_message: String,
}

/// A failed call. `function_argument` names the offending argument, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionError {
    pub text: String,
    pub function_argument: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionMetadata {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceMetadata {
    pub type_name: String,
}

// ============================================================================
//  INTROSPECTION
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetMetadataRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetMetadataResponse {
    pub server_capabilities: ServerCapabilities,
    pub diagnostics: Vec<Diagnostic>,
    pub data_sources: Vec<ResourceMetadata>,
    pub resources: Vec<ResourceMetadata>,
    pub functions: Vec<FunctionMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetProviderSchemaRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetProviderSchemaResponse {
    pub provider: Schema,
    pub provider_meta: Option<Schema>,
    pub resource_schemas: BTreeMap<String, Schema>,
    pub data_source_schemas: BTreeMap<String, Schema>,
    pub functions: BTreeMap<String, Function>,
    pub diagnostics: Vec<Diagnostic>,
    pub server_capabilities: ServerCapabilities,
}

// ============================================================================
//  FUNCTIONS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetFunctionsRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetFunctionsResponse {
    pub functions: BTreeMap<String, Function>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallFunctionRequest {
    pub name: String,
    pub arguments: Vec<DynamicValue>,
}

/// Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallFunctionResponse {
    pub result: Option<DynamicValue>,
    pub error: Option<FunctionError>,
}

impl CallFunctionResponse {
    pub fn success(result: DynamicValue) -> Self {
        Self { result: Some(result), error: None }
    }

    pub fn failure(error: FunctionError) -> Self {
        Self { result: None, error: Some(error) }
    }
}

// ============================================================================
//  PROVIDER CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateProviderConfigRequest {
    pub config: Option<DynamicValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateProviderConfigResponse {
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigureProviderRequest {
    pub terraform_version: String,
    pub config: Option<DynamicValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigureProviderResponse {
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopProviderRequest {}

/// `error` is empty when the provider stopped cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopProviderResponse {
    pub error: String,
}
