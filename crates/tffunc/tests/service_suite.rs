//! End-to-end tests: a host-side `Peer` talking to a served provider.

use std::sync::Arc;
use std::time::Duration;

use funcrpc::CallFunctionRequest;
use funcrpc::Code;
use funcrpc::DynamicValue;
use funcrpc::Method;
use funcrpc::ProviderServer;
use tffunc::FunctionProvider;
use tffunc::FunctionSpec;
use tffunc::Parameter;
use tffunc::Peer;
use tffunc::Provider;
use tffunc::Refinement;
use tffunc::ReturnType;
use tffunc::StreamTransport;
use tffunc::peer;
use tffunc::serve_connection;
use tyval::Type;
use tyval::Value;

fn provider() -> Provider {
    let mut provider = Provider::new();
    provider.add_function(
        "upper",
        FunctionSpec::new(ReturnType::Static(Type::String), |args, _| {
            Ok(Value::string(args[0].as_str().unwrap_or_default().to_uppercase()))
        })
        .param(Parameter::new("str", Type::String))
        .refine(Refinement::NotNull),
    );
    provider.add_function(
        "repeat",
        FunctionSpec::new(ReturnType::Static(Type::list(Type::String)), |args, _| {
            let s = args[0].as_str().unwrap_or_default();
            let n = args[1].as_number().and_then(|n| n.as_i64()).unwrap_or(0);
            let items = (0..n).map(|i| Value::string(format!("{}{}", s, i))).collect();
            Ok(Value::list(Type::String, items))
        })
        .param(Parameter::new("str", Type::String))
        .param(Parameter::new("count", Type::Number)),
    );
    provider.add_function(
        "sleepy",
        FunctionSpec::new(ReturnType::Static(Type::Number), |args, _| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(args[0].clone())
        })
        .param(Parameter::new("n", Type::Number)),
    );
    provider
}

/// Connects a peer to a freshly served provider over an in-memory stream.
fn connect() -> Peer {
    let (host, plugin) = tokio::io::duplex(64 * 1024);
    let service: Arc<dyn ProviderServer> = Arc::new(FunctionProvider::new(provider().into_registry()));
    tokio::spawn(serve_connection(service, Arc::new(StreamTransport::new(plugin))));
    Peer::new("host", Box::new(StreamTransport::new(host)))
}

fn mp(val: Value, ty: &Type) -> DynamicValue {
    DynamicValue::msgpack(tyval::msgpack::marshal(&val, ty).unwrap())
}

fn decode(result: Option<DynamicValue>) -> Value {
    let result = result.expect("call returned no result");
    tyval::msgpack::unmarshal(&result.msgpack, &Type::Dynamic).unwrap()
}

#[tokio::test]
async fn test_introspection_over_the_wire() {
    let peer = connect();

    let meta = peer.get_metadata().await.unwrap();
    let names: Vec<_> = meta.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["upper", "repeat", "sleepy"]);
    assert!(meta.server_capabilities.get_provider_schema_optional);

    let functions = peer.get_functions().await.unwrap().functions;
    assert_eq!(functions["repeat"].parameters.len(), 2);
    assert_eq!(functions["repeat"].parameters[1].type_json, b"\"number\"".to_vec());
    assert_eq!(functions["upper"].return_.type_json, b"\"dynamic\"".to_vec());

    let schema = peer.get_provider_schema().await.unwrap();
    assert_eq!(schema.functions, functions);
    assert!(schema.resource_schemas.is_empty());
}

#[tokio::test]
async fn test_call_over_the_wire() {
    let peer = connect();

    let req = CallFunctionRequest {
        name: "repeat".into(),
        arguments: vec![mp(Value::string("x"), &Type::String), DynamicValue::json(b"\"3\"".to_vec())],
    };
    let resp = peer.call_function(&req).await.unwrap();
    assert_eq!(resp.error, None);
    let expected = Value::list(Type::String, vec![Value::string("x0"), Value::string("x1"), Value::string("x2")]);
    assert_eq!(decode(resp.result), expected);
}

#[tokio::test]
async fn test_call_errors_over_the_wire() {
    let peer = connect();

    let req = CallFunctionRequest {
        name: "repeat".into(),
        arguments: vec![mp(Value::string("x"), &Type::String), mp(Value::bool(true), &Type::Bool)],
    };
    let error = peer.call_function(&req).await.unwrap().error.unwrap();
    assert_eq!(error.function_argument, Some(1));
    assert!(error.text.starts_with("invalid encoding for argument: "));

    let req = CallFunctionRequest { name: "nope".into(), arguments: Vec::new() };
    let error = peer.call_function(&req).await.unwrap().error.unwrap();
    assert_eq!(error.function_argument, None);
}

#[tokio::test]
async fn test_resource_plane_is_unimplemented_over_the_wire() {
    let peer = connect();
    for method in Method::ALL.into_iter().filter(|m| m.plane() == funcrpc::Plane::Resource) {
        let err = peer.call(method, vec![0xde, 0xad]).await.unwrap_err();
        let peer::Error::Remote(status) = err else {
            panic!("{}: expected a remote status, got {}", method, err);
        };
        assert_eq!(status.code, Code::Unimplemented);
    }
}

#[tokio::test]
async fn test_malformed_request_keeps_connection_alive() {
    let peer = connect();
    let err = peer.call(Method::CallFunction, vec![0xc1]).await.unwrap_err();
    assert!(matches!(err, peer::Error::Remote(ref s) if s.code == Code::InvalidArgument));

    let req = CallFunctionRequest { name: "upper".into(), arguments: vec![mp(Value::string("ok"), &Type::String)] };
    let resp = peer.call_function(&req).await.unwrap();
    assert_eq!(decode(resp.result), Value::string("OK"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_keep_their_results() {
    let peer = Arc::new(connect());

    let mut tasks = Vec::new();
    for i in 0..64 {
        let peer = peer.clone();
        tasks.push(tokio::spawn(async move {
            let word = format!("word{}", i);
            let req = CallFunctionRequest {
                name: "upper".into(),
                arguments: vec![mp(Value::string(word.clone()), &Type::String)],
            };
            let resp = peer.call_function(&req).await.unwrap();
            (word, decode(resp.result))
        }));
    }

    for task in tasks {
        let (word, result) = task.await.unwrap();
        assert_eq!(result, Value::string(word.to_uppercase()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_call_does_not_block_others() {
    let peer = Arc::new(connect());

    let slow_peer = peer.clone();
    let slow = tokio::spawn(async move {
        let req = CallFunctionRequest { name: "sleepy".into(), arguments: vec![mp(Value::number(9), &Type::Number)] };
        slow_peer.call_function(&req).await.unwrap()
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let started = std::time::Instant::now();
    let req = CallFunctionRequest { name: "upper".into(), arguments: vec![mp(Value::string("fast"), &Type::String)] };
    let resp = peer.call_function(&req).await.unwrap();
    assert_eq!(decode(resp.result), Value::string("FAST"));
    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(!slow.is_finished());

    assert_eq!(decode(slow.await.unwrap().result), Value::number(9));
}

#[cfg(unix)]
#[tokio::test]
async fn test_plugin_server_over_unix_socket() {
    use tffunc::PluginServer;
    use tffunc::ServeConfig;
    use tffunc::handshake;

    let config = ServeConfig {
        magic_cookie: Some(handshake::MAGIC_COOKIE_VALUE.into()),
        protocol_versions: Some("5,6".into()),
        ..Default::default()
    };
    let server = PluginServer::bind(provider().into_registry(), &config).await.unwrap();
    assert_eq!(server.version(), 6);
    assert_eq!(server.network(), "unix");

    let address = server.address().unwrap();
    let line = server.handshake_line().unwrap();
    assert_eq!(line, format!("1|6|unix|{}|funcrpc", address));

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(server.run(async move {
        let _ = stopped.await;
    }));

    let stream = tokio::net::UnixStream::connect(&address).await.unwrap();
    let peer = Peer::new("host", Box::new(StreamTransport::new(stream)));
    let req = CallFunctionRequest { name: "upper".into(), arguments: vec![mp(Value::string("sock"), &Type::String)] };
    assert_eq!(decode(peer.call_function(&req).await.unwrap().result), Value::string("SOCK"));

    stop.send(()).unwrap();
    running.await.unwrap().unwrap();
    assert!(!std::path::Path::new(&address).exists());
}

#[tokio::test]
async fn test_plugin_server_refuses_without_cookie() {
    let config = tffunc::ServeConfig::default();
    let err = tffunc::PluginServer::bind(provider().into_registry(), &config).await.err().unwrap();
    assert!(matches!(err, tffunc::ServeError::Handshake(tffunc::handshake::Error::NotLaunchedByHost)));
}
