use std::sync::Arc;

use funcrpc::CallFunctionRequest;
use funcrpc::Code;
use funcrpc::DynamicValue;
use funcrpc::Method;
use funcrpc::ProviderServer;
use funcrpc::StringKind;
use tyval::Type;
use tyval::Value;

use crate::config::ConfigError;
use crate::config::ServeConfig;
use crate::function::FunctionError;
use crate::function::FunctionSpec;
use crate::function::Parameter;
use crate::function::Refinement;
use crate::function::ReturnType;
use crate::handshake;
use crate::registry::Provider;
use crate::registry::RegistrationError;
use crate::registry::Registry;
use crate::schema::DYNAMIC_TYPE_JSON;
use crate::schema::build_schema;
use crate::service::FunctionProvider;
use crate::transport;
use crate::transport::StreamTransport;
use crate::transport::Transport;

// ============================================================================
//  FIXTURES
// ============================================================================

fn upper() -> FunctionSpec {
    FunctionSpec::new(ReturnType::Static(Type::String), |args, _| {
        let s = args[0].as_str().ok_or_else(|| FunctionError::arg(0, "not a string"))?;
        Ok(Value::string(s.to_uppercase()))
    })
    .description("Converts a given string to uppercase.")
    .param(Parameter::new("str", Type::String).description("The string to convert."))
    .refine(Refinement::NotNull)
}

/// Joins any number of strings after a separator.
fn join() -> FunctionSpec {
    FunctionSpec::new(ReturnType::Static(Type::String), |args, _| {
        let sep = args[0].as_str().unwrap_or_default();
        let parts: Vec<&str> = args[1..].iter().filter_map(Value::as_str).collect();
        Ok(Value::string(parts.join(sep)))
    })
    .param(Parameter::new("separator", Type::String))
    .variadic(Parameter::new("parts", Type::String))
}

fn failing(error: FunctionError) -> FunctionSpec {
    FunctionSpec::new(ReturnType::Static(Type::String), move |_, _| Err(error.clone()))
        .param(Parameter::new("a", Type::String))
        .param(Parameter::new("b", Type::String))
}

fn registry() -> Arc<Registry> {
    let mut provider = Provider::new();
    provider.add_function("upper", upper());
    provider.add_function("join", join());
    provider.add_function("fail_arg", failing(FunctionError::arg(1, "b is wrong")));
    provider.add_function("fail_other", failing(FunctionError::other("nope")));
    provider.into_registry()
}

fn mp(val: Value, ty: &Type) -> DynamicValue {
    DynamicValue::msgpack(tyval::msgpack::marshal(&val, ty).unwrap())
}

fn string_arg(s: &str) -> DynamicValue {
    mp(Value::string(s), &Type::String)
}

fn call(registry: &Registry, name: &str, arguments: Vec<DynamicValue>) -> funcrpc::CallFunctionResponse {
    crate::dispatch::call_function(registry, CallFunctionRequest { name: name.into(), arguments })
}

fn result_of(resp: funcrpc::CallFunctionResponse) -> Value {
    assert_eq!(resp.error, None);
    let result = resp.result.expect("no result");
    tyval::msgpack::unmarshal(&result.msgpack, &Type::Dynamic).unwrap()
}

fn error_of(resp: funcrpc::CallFunctionResponse) -> (String, Option<i64>) {
    assert_eq!(resp.result, None);
    let error = resp.error.expect("no error");
    (error.text, error.function_argument)
}

// ============================================================================
//  CALL SEMANTICS
// ============================================================================

#[test]
fn test_call_runs_implementation() {
    assert_eq!(upper().call(&[Value::string("abc")]), Ok(Value::string("ABC")));
}

#[test]
fn test_call_checks_arity() {
    assert_eq!(upper().call(&[]), Err(FunctionError::other("not enough arguments")));
    let two = [Value::string("a"), Value::string("b")];
    assert_eq!(upper().call(&two), Err(FunctionError::other("too many arguments")));
}

#[test]
fn test_call_rejects_null_argument() {
    let err = upper().call(&[Value::null(Type::String)]).unwrap_err();
    assert_eq!(err, FunctionError::arg(0, "argument must not be null"));
}

#[test]
fn test_null_is_reported_before_type_mismatch() {
    let err = upper().call(&[Value::null(Type::Number)]).unwrap_err();
    assert_eq!(err, FunctionError::arg(0, "argument must not be null"));
}

#[test]
fn test_call_accepts_null_when_allowed() {
    let spec = FunctionSpec::new(ReturnType::Static(Type::Bool), |args, _| Ok(Value::bool(args[0].is_null())))
        .param(Parameter::new("v", Type::String).allow_null(true));
    assert_eq!(spec.call(&[Value::null(Type::String)]), Ok(Value::bool(true)));
}

#[test]
fn test_call_rejects_nonconforming_argument() {
    let err = upper().call(&[Value::number(1)]).unwrap_err();
    assert_eq!(err, FunctionError::arg(0, "string required"));
}

#[test]
fn test_unknown_argument_skips_implementation() {
    let spec = FunctionSpec::new(ReturnType::Static(Type::String), |_, _| panic!("must not run"))
        .param(Parameter::new("s", Type::String))
        .refine(Refinement::NotNull);
    let result = spec.call(&[Value::unknown(Type::String)]).unwrap();
    assert_eq!(result, Value::Unknown { ty: Type::String, not_null: true });
}

#[test]
fn test_unknown_argument_passed_when_allowed() {
    let spec = FunctionSpec::new(ReturnType::Static(Type::Bool), |args, _| Ok(Value::bool(args[0].is_known())))
        .param(Parameter::new("s", Type::String).allow_unknown(true));
    assert_eq!(spec.call(&[Value::unknown(Type::String)]), Ok(Value::bool(false)));
}

#[test]
fn test_result_must_conform() {
    let spec = FunctionSpec::new(ReturnType::Static(Type::String), |_, _| Ok(Value::number(3)));
    let err = spec.call(&[]).unwrap_err();
    assert_eq!(err.index(), None);
    assert_eq!(err.message(), "function returned number, but its return type is string");
}

#[test]
fn test_not_null_result_is_enforced() {
    let spec = FunctionSpec::new(ReturnType::Static(Type::String), |_, _| Ok(Value::null(Type::String)))
        .refine(Refinement::NotNull);
    assert!(matches!(spec.call(&[]), Err(FunctionError::Other(_))));
}

#[test]
fn test_computed_return_type() {
    let spec = FunctionSpec::new(
        ReturnType::computed(|args| Ok(args[0].ty())),
        |args, ret| {
            assert_eq!(ret, &args[0].ty());
            Ok(args[0].clone())
        },
    )
    .param(Parameter::new("v", Type::Dynamic));
    assert_eq!(spec.call(&[Value::number(7)]), Ok(Value::number(7)));
    assert_eq!(spec.call(&[Value::unknown(Type::Bool)]), Ok(Value::unknown(Type::Bool)));
}

#[test]
fn test_computed_return_type_errors_before_deferring() {
    let spec = FunctionSpec::new(
        ReturnType::computed(|_| Err(FunctionError::arg(0, "cannot infer a result type"))),
        |_, _| panic!("must not run"),
    )
    .param(Parameter::new("v", Type::Dynamic));
    let err = spec.call(&[Value::unknown(Type::String)]).unwrap_err();
    assert_eq!(err, FunctionError::arg(0, "cannot infer a result type"));
}

#[test]
fn test_variadic_accepts_zero_extra_arguments() {
    assert_eq!(join().call(&[Value::string(",")]), Ok(Value::string("")));
    let args = [Value::string("-"), Value::string("a"), Value::string("b")];
    assert_eq!(join().call(&args), Ok(Value::string("a-b")));
}

// ============================================================================
//  SCHEMA
// ============================================================================

#[test]
fn test_schema_describes_parameters() {
    let schema = build_schema(&join().description("Joins strings.")).unwrap();
    assert_eq!(schema.description, "Joins strings.");
    assert_eq!(schema.description_kind, StringKind::Plain);
    assert_eq!(schema.parameters.len(), 1);
    assert_eq!(schema.parameters[0].name, "separator");
    assert_eq!(schema.parameters[0].type_json, b"\"string\"".to_vec());
    assert!(!schema.parameters[0].allow_null_value);

    let variadic = schema.variadic_parameter.unwrap();
    assert_eq!(variadic.name, "parts");
    assert_eq!(schema.return_.type_json, DYNAMIC_TYPE_JSON.to_vec());
}

#[test]
fn test_schema_return_type_is_dynamic_json() {
    assert_eq!(Type::Dynamic.marshal_json().unwrap(), DYNAMIC_TYPE_JSON.to_vec());
}

#[test]
fn test_schema_copies_flags() {
    let spec = upper().param(Parameter::new("opt", Type::list(Type::Number)).allow_null(true).allow_unknown(true));
    let schema = build_schema(&spec).unwrap();
    let opt = &schema.parameters[1];
    assert!(opt.allow_null_value);
    assert!(opt.allow_unknown_values);
    assert_eq!(opt.type_json, br#"["list","number"]"#.to_vec());
}

#[test]
fn test_schema_rejects_marked_parameter() {
    let spec = upper().param(Parameter::new("secret", Type::String).allow_marked(true));
    let err = build_schema(&spec).unwrap_err();
    assert_eq!(err, RegistrationError::MarkedParameter("secret".into()));
    assert_eq!(err.to_string(), "parameter \"secret\" sets allow_marked, which is forbidden");
}

#[test]
fn test_schema_rejects_capsule_parameter() {
    let spec = upper().variadic(Parameter::new("handle", Type::capsule("file")));
    let err = build_schema(&spec).unwrap_err();
    assert!(matches!(err, RegistrationError::UnsupportedType { ref param, .. } if param == "handle"));
    assert!(err.to_string().starts_with("parameter \"handle\" has unsupported type file"));
}

// ============================================================================
//  REGISTRY
// ============================================================================

#[test]
#[should_panic(expected = "function \"upper\" was already defined")]
fn test_duplicate_registration_panics() {
    let mut provider = Provider::new();
    provider.add_function("upper", upper());
    provider.add_function("upper", upper());
}

#[test]
#[should_panic(expected = "sets allow_marked")]
fn test_marked_registration_panics() {
    let mut provider = Provider::new();
    provider.add_function("bad", upper().param(Parameter::new("m", Type::String).allow_marked(true)));
}

#[test]
fn test_failed_registration_leaves_provider_unchanged() {
    let mut provider = Provider::new();
    let bad = upper().param(Parameter::new("m", Type::capsule("x")));
    assert!(provider.try_add_function("bad", bad).is_err());
    assert_eq!(
        provider.try_add_function("upper", upper()),
        Ok(()),
    );
    assert_eq!(
        provider.try_add_function("upper", upper()),
        Err(RegistrationError::Duplicate("upper".into())),
    );

    let registry = provider.into_registry();
    assert_eq!(registry.len(), 1);
    assert!(registry.lookup("bad").is_none());
    assert!(!registry.schemas().contains_key("bad"));
}

#[test]
fn test_registry_snapshots() {
    let registry = registry();
    let names: Vec<&str> = registry.metadata().iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["upper", "join", "fail_arg", "fail_other"]);
    assert_eq!(registry.schemas().len(), 4);

    let join = registry.lookup("join").unwrap();
    assert_eq!(join.param_types, vec![Type::String]);
    assert_eq!(join.variadic_type, Some(Type::String));
    assert_eq!(join.type_for(5), Some(&Type::String));
    assert!(registry.lookup("missing").is_none());
}

#[test]
fn test_call_stub() {
    let mut provider = Provider::new();
    provider.add_function("upper", upper());
    let stub = provider.call_stub("upper");
    assert_eq!(stub(&[Value::string("hello")]), Ok(Value::string("HELLO")));
}

#[test]
#[should_panic(expected = "call stub request for undefined function \"nope\"")]
fn test_call_stub_for_missing_function_panics() {
    let _ = Provider::new().call_stub("nope");
}

// ============================================================================
//  DISPATCHER
// ============================================================================

#[test]
fn test_dispatch_success() {
    let resp = call(&registry(), "upper", vec![string_arg("hello")]);
    assert_eq!(result_of(resp), Value::string("HELLO"));
}

#[test]
fn test_dispatch_unknown_function() {
    let (text, index) = error_of(call(&registry(), "missing", vec![]));
    assert_eq!(text, "this provider does not offer a function named \"missing\"");
    assert_eq!(index, None);
}

#[test]
fn test_dispatch_fixed_arity() {
    let registry = registry();
    for args in [vec![], vec![string_arg("a"), string_arg("b")]] {
        let (text, index) = error_of(call(&registry, "upper", args));
        assert_eq!(text, "argument count must be 1");
        assert_eq!(index, None);
    }
}

#[test]
fn test_dispatch_variadic_arity() {
    let registry = registry();
    let (text, index) = error_of(call(&registry, "join", vec![]));
    assert_eq!(text, "argument count must be at least 1");
    assert_eq!(index, None);

    let resp = call(&registry, "join", vec![string_arg("+")]);
    assert_eq!(result_of(resp), Value::string(""));

    let resp = call(&registry, "join", vec![string_arg("+"), string_arg("a"), string_arg("b")]);
    assert_eq!(result_of(resp), Value::string("a+b"));
}

#[test]
fn test_dispatch_missing_encoding() {
    let (text, index) = error_of(call(&registry(), "upper", vec![DynamicValue::default()]));
    assert_eq!(text, "plugin client is using unsupported argument encoding format");
    assert_eq!(index, Some(0));
}

#[test]
fn test_dispatch_bad_encoding_blames_argument() {
    let registry = registry();
    let (text, index) = error_of(call(&registry, "upper", vec![mp(Value::bool(true), &Type::Bool)]));
    assert_eq!(text, "invalid encoding for argument: string required, but found bool");
    assert_eq!(index, Some(0));

    let args = vec![string_arg("-"), string_arg("a"), DynamicValue::msgpack(vec![0xc1])];
    let (text, index) = error_of(call(&registry, "join", args));
    assert!(text.starts_with("invalid encoding for argument: "));
    assert_eq!(index, Some(2));
}

#[test]
fn test_dispatch_json_arguments() {
    let registry = registry();
    let resp = call(&registry, "upper", vec![DynamicValue::json(b"\"json\"".to_vec())]);
    assert_eq!(result_of(resp), Value::string("JSON"));

    // JSON wins when both encodings are present.
    let both = DynamicValue { json: b"\"a\"".to_vec(), msgpack: vec![0xc1] };
    assert_eq!(result_of(call(&registry, "upper", vec![both])), Value::string("A"));
}

#[test]
fn test_dispatch_msgpack_null_is_rejected_by_function() {
    let (text, index) = error_of(call(&registry(), "upper", vec![mp(Value::null(Type::String), &Type::String)]));
    assert_eq!(text, "argument must not be null");
    assert_eq!(index, Some(0));
}

#[test]
fn test_dispatch_unknown_argument_yields_refined_unknown() {
    let resp = call(&registry(), "upper", vec![DynamicValue::msgpack(vec![0xd4, 0x00, 0x00])]);
    assert_eq!(result_of(resp), Value::Unknown { ty: Type::String, not_null: true });
}

#[test]
fn test_dispatch_function_errors() {
    let registry = registry();
    let args = || vec![string_arg("a"), string_arg("b")];

    let (text, index) = error_of(call(&registry, "fail_arg", args()));
    assert_eq!(text, "b is wrong");
    assert_eq!(index, Some(1));

    let (text, index) = error_of(call(&registry, "fail_other", args()));
    assert_eq!(text, "nope");
    assert_eq!(index, None);
}

#[test]
fn test_dispatch_result_encoding_failure() {
    let mut provider = Provider::new();
    provider.add_function(
        "opaque",
        FunctionSpec::new(ReturnType::Static(Type::Dynamic), |_, _| Ok(Value::null(Type::capsule("handle")))),
    );
    let (text, index) = error_of(call(&provider.into_registry(), "opaque", vec![]));
    assert!(text.starts_with("failed to encode result: "), "{}", text);
    assert_eq!(index, None);
}

#[test]
fn test_dispatch_result_carries_its_type() {
    let mut provider = Provider::new();
    provider.add_function(
        "pair",
        FunctionSpec::new(ReturnType::Static(Type::Dynamic), |_, _| {
            Ok(Value::list(Type::Number, vec![Value::number(1), Value::number(2)]))
        }),
    );
    let resp = call(&provider.into_registry(), "pair", vec![]);
    let value = result_of(resp);
    assert_eq!(value.ty(), Type::list(Type::Number));
}

// ============================================================================
//  SERVICE FACADE
// ============================================================================

#[tokio::test]
async fn test_service_metadata() {
    let service = FunctionProvider::new(registry());
    let meta = service.get_metadata(Default::default()).await.unwrap();
    assert!(meta.server_capabilities.get_provider_schema_optional);
    assert!(meta.resources.is_empty());
    assert!(meta.data_sources.is_empty());
    assert_eq!(meta.functions.len(), 4);
    assert_eq!(meta.functions[0].name, "upper");
}

#[tokio::test]
async fn test_service_provider_schema() {
    let service = FunctionProvider::new(registry());
    let schema = service.get_provider_schema(Default::default()).await.unwrap();
    assert_eq!(schema.provider, funcrpc::Schema::default());
    assert!(schema.resource_schemas.is_empty());
    assert!(schema.data_source_schemas.is_empty());
    assert_eq!(schema.functions.len(), 4);
    assert!(schema.server_capabilities.get_provider_schema_optional);

    let functions = service.get_functions(Default::default()).await.unwrap();
    assert_eq!(functions.functions, schema.functions);
}

#[tokio::test]
async fn test_service_configuration_plane_is_a_no_op() {
    let service = FunctionProvider::new(registry());
    assert!(service.validate_provider_config(Default::default()).await.unwrap().diagnostics.is_empty());
    assert!(service.configure_provider(Default::default()).await.unwrap().diagnostics.is_empty());
    assert_eq!(service.stop_provider(Default::default()).await.unwrap().error, "");
}

#[tokio::test]
async fn test_service_refuses_resource_plane() {
    let service = FunctionProvider::new(registry());
    let resource_methods = Method::ALL.into_iter().filter(|m| m.plane() == funcrpc::Plane::Resource);
    for method in resource_methods {
        for body in [Vec::new(), vec![0xc1, 0xff, 0x00]] {
            let status = funcrpc::route(&service, method, &body).await.unwrap_err();
            assert_eq!(status.code, Code::Unimplemented, "{}", method);
            assert_eq!(status.message, "provider does not offer any resource types");
        }
    }
}

// ============================================================================
//  CONFIG & HANDSHAKE
// ============================================================================

fn lookup(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |key: &str| vars.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
}

#[test]
fn test_config_defaults() {
    let config = ServeConfig::from_lookup(lookup(&[])).unwrap();
    assert_eq!(config, ServeConfig::default());
    assert_eq!((config.min_port, config.max_port), (10000, 25000));
}

#[test]
fn test_config_reads_variables() {
    let config = ServeConfig::from_lookup(lookup(&[
        ("TF_PLUGIN_MAGIC_COOKIE", "abc"),
        ("PLUGIN_PROTOCOL_VERSIONS", "5,6"),
        ("PLUGIN_UNIX_SOCKET_DIR", "/run/plugins"),
        ("PLUGIN_MIN_PORT", "20000"),
        ("PLUGIN_MAX_PORT", "20010"),
    ]))
    .unwrap();
    assert_eq!(config.magic_cookie.as_deref(), Some("abc"));
    assert_eq!(config.protocol_versions.as_deref(), Some("5,6"));
    assert_eq!(config.socket_dir(), std::path::PathBuf::from("/run/plugins"));
    assert_eq!((config.min_port, config.max_port), (20000, 20010));
}

#[test]
fn test_config_rejects_bad_ports() {
    let err = ServeConfig::from_lookup(lookup(&[("PLUGIN_MIN_PORT", "lots")])).unwrap_err();
    assert_eq!(err, ConfigError::InvalidPort { var: "PLUGIN_MIN_PORT", value: "lots".into() });

    let err = ServeConfig::from_lookup(lookup(&[("PLUGIN_MIN_PORT", "300"), ("PLUGIN_MAX_PORT", "200")])).unwrap_err();
    assert_eq!(err, ConfigError::EmptyPortRange { min: 300, max: 200 });
}

#[test]
fn test_cookie_check() {
    assert!(handshake::check_cookie(Some(handshake::MAGIC_COOKIE_VALUE)).is_ok());
    assert_eq!(handshake::check_cookie(None), Err(handshake::Error::NotLaunchedByHost));
    assert_eq!(handshake::check_cookie(Some("cafe")), Err(handshake::Error::NotLaunchedByHost));
    assert!(handshake::Error::NotLaunchedByHost.to_string().starts_with("This binary is a plugin."));
}

#[test]
fn test_version_negotiation() {
    assert_eq!(handshake::negotiate_version(None, &[6]), Ok(6));
    assert_eq!(handshake::negotiate_version(Some("5, 6"), &[6]), Ok(6));
    assert_eq!(handshake::negotiate_version(Some("6,7"), &[5, 6, 7]), Ok(7));
    assert_eq!(
        handshake::negotiate_version(Some("4,5"), &[6]),
        Err(handshake::Error::NoCommonVersion { offered: vec![4, 5], supported: vec![6] }),
    );
    assert!(matches!(
        handshake::negotiate_version(Some("six"), &[6]),
        Err(handshake::Error::InvalidVersionList(_)),
    ));
}

#[test]
fn test_handshake_line() {
    assert_eq!(handshake::handshake_line(6, "unix", "/tmp/plugin42"), "1|6|unix|/tmp/plugin42|funcrpc");
}

// ============================================================================
//  TRANSPORT
// ============================================================================

#[tokio::test]
async fn test_stream_transport_frames() {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let a = StreamTransport::new(a);
    let b = StreamTransport::new(b);

    a.send(b"first").await.unwrap();
    a.send(b"").await.unwrap();
    a.send(&[7u8; 4000]).await.unwrap();

    assert_eq!(b.recv().await.unwrap(), Some(b"first".to_vec()));
    assert_eq!(b.recv().await.unwrap(), Some(Vec::new()));
    assert_eq!(b.recv().await.unwrap(), Some(vec![7u8; 4000]));

    drop(a);
    assert_eq!(b.recv().await.unwrap(), None);
}

#[tokio::test]
async fn test_oversized_frame_header_is_payload_too_large() {
    use tokio::io::AsyncWriteExt;

    let (mut raw, b) = tokio::io::duplex(64);
    let b = StreamTransport::new(b);
    raw.write_all(&[0xff, 0xff, 0xff, 0xff]).await.unwrap();
    assert!(matches!(b.recv().await, Err(transport::Error::PayloadTooLarge)));
}

#[test]
fn test_other_io_errors_are_not_payload_too_large() {
    use std::io;

    let invalid = io::Error::new(io::ErrorKind::InvalidData, "stream did not contain valid UTF-8");
    assert!(matches!(transport::Error::from(invalid), transport::Error::Io(_)));
    let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
    assert!(matches!(transport::Error::from(eof), transport::Error::ConnectionLost(_)));
}
