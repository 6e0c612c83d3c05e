//! End-to-end client/server scenarios over the in-process loopback
//! transport: hello/echo, authentication, one-way dispatch, a delegate
//! callback round trip, and idle-session eviction.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use relay_rpc_client::{build_call, dispatch, Argument, Client, ClientConfig};
use relay_rpc_core::LocalHandler;
use relay_rpc_server::{AllowAllAuthenticationProvider, ArgValue, Server, ServerConfig, ServiceDispatcher};
use relay_rpc_wire::{Credential, RemoteDelegateInfo, RemoteExceptionMessage};

struct EchoService {
    shouts: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ServiceDispatcher for EchoService {
    async fn dispatch(&self, method_name: &str, args: Vec<ArgValue>) -> Result<Option<ArgValue>, RemoteExceptionMessage> {
        match method_name {
            "Echo" => Ok(args.into_iter().next()),
            "Shout" => {
                let text = args.into_iter().next().and_then(|v| v.as_str().map(str::to_owned)).unwrap_or_default();
                self.shouts.lock().unwrap().push(text);
                Ok(None)
            }
            other => Err(RemoteExceptionMessage::new(format!("method not found: {other}"))),
        }
    }

    fn is_one_way(&self, method_name: &str) -> bool {
        method_name == "Shout"
    }
}

struct NotifierService;

#[async_trait]
impl ServiceDispatcher for NotifierService {
    async fn dispatch(&self, method_name: &str, args: Vec<ArgValue>) -> Result<Option<ArgValue>, RemoteExceptionMessage> {
        match method_name {
            // The subscription itself just acknowledges; unwrap_parameters
            // has already forged the session-side delegate proxy for the
            // RemoteDelegateInfo argument by the time dispatch runs.
            "Subscribe" => Ok(args.into_iter().next()),
            other => Err(RemoteExceptionMessage::new(format!("method not found: {other}"))),
        }
    }
}

fn key_size() -> usize {
    relay_rpc_crypto::rsa::MIN_KEY_SIZE_BITS
}

async fn wire_up(server_config: ServerConfig, client_config: ClientConfig) -> (Arc<Server>, Arc<Client>) {
    let server = Server::new(server_config, Arc::new(AllowAllAuthenticationProvider)).unwrap();
    let client_channel = server.accept_loopback(None).await.unwrap();
    let client = Client::new(client_config).unwrap();
    client.connect(client_channel).await.unwrap();
    (server, client)
}

#[tokio::test]
async fn hello_echo_round_trips_without_encryption() {
    let shouts = Arc::new(Mutex::new(Vec::new()));
    let server_config = ServerConfig { network_port: 1, key_size_bits: key_size(), message_encryption: false, ..Default::default() };
    let server = Server::new(server_config, Arc::new(AllowAllAuthenticationProvider)).unwrap();
    server.register_service("IEcho", Arc::new(EchoService { shouts }));

    let client_channel = server.accept_loopback(None).await.unwrap();
    let client = Client::new(ClientConfig { server_port: 1, key_size_bits: key_size(), message_encryption: false, ..Default::default() }).unwrap();
    client.connect(client_channel).await.unwrap();

    let engine = client.engine().unwrap();
    let call = build_call(
        engine,
        0,
        "IEcho",
        "Echo",
        vec![Argument::Value { name: "text".into(), declared_type_name: "string".into(), value: serde_json::json!("hello") }],
    );
    let reply = dispatch(engine, call, false, true).await.unwrap();
    assert_eq!(reply, Some(serde_json::json!("hello")));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn one_way_call_does_not_block_and_reaches_the_service() {
    let shouts = Arc::new(Mutex::new(Vec::new()));
    let server_config = ServerConfig { network_port: 2, key_size_bits: key_size(), message_encryption: false, ..Default::default() };
    let server = Server::new(server_config, Arc::new(AllowAllAuthenticationProvider)).unwrap();
    server.register_service("IEcho", Arc::new(EchoService { shouts: shouts.clone() }));

    let client_channel = server.accept_loopback(None).await.unwrap();
    let client = Client::new(ClientConfig { server_port: 2, key_size_bits: key_size(), message_encryption: false, ..Default::default() }).unwrap();
    client.connect(client_channel).await.unwrap();

    let engine = client.engine().unwrap();
    let call = build_call(
        engine,
        0,
        "IEcho",
        "Shout",
        vec![Argument::Value { name: "text".into(), declared_type_name: "string".into(), value: serde_json::json!("fire and forget") }],
    );
    let reply = dispatch(engine, call, true, false).await.unwrap();
    assert_eq!(reply, None);

    for _ in 0..50 {
        if !shouts.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(shouts.lock().unwrap().as_slice(), ["fire and forget"]);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn authenticated_caller_is_accepted_when_auth_is_required() {
    let server_config = ServerConfig {
        network_port: 3,
        key_size_bits: key_size(),
        message_encryption: false,
        authentication_required: true,
        ..Default::default()
    };
    let client_config = ClientConfig {
        server_port: 3,
        key_size_bits: key_size(),
        message_encryption: false,
        credentials: vec![Credential { name: "name".into(), value: "carol".into() }],
        ..Default::default()
    };
    let (server, client) = wire_up(server_config, client_config).await;
    server.register_service("IEcho", Arc::new(EchoService { shouts: Arc::new(Mutex::new(Vec::new())) }));

    let engine = client.engine().unwrap();
    assert_eq!(engine.identity().unwrap().name, "carol");

    let call = build_call(
        engine,
        0,
        "IEcho",
        "Echo",
        vec![Argument::Value { name: "text".into(), declared_type_name: "string".into(), value: serde_json::json!("hi") }],
    );
    let reply = dispatch(engine, call, false, true).await.unwrap();
    assert_eq!(reply, Some(serde_json::json!("hi")));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn unauthenticated_caller_is_rejected_when_auth_is_required() {
    let server_config = ServerConfig {
        network_port: 4,
        key_size_bits: key_size(),
        message_encryption: false,
        authentication_required: true,
        ..Default::default()
    };
    let client_config = ClientConfig { server_port: 4, key_size_bits: key_size(), message_encryption: false, ..Default::default() };
    let (server, client) = wire_up(server_config, client_config).await;
    server.register_service("IEcho", Arc::new(EchoService { shouts: Arc::new(Mutex::new(Vec::new())) }));

    let engine = client.engine().unwrap();
    let call = build_call(
        engine,
        0,
        "IEcho",
        "Echo",
        vec![Argument::Value { name: "text".into(), declared_type_name: "string".into(), value: serde_json::json!("hi") }],
    );
    let err = dispatch(engine, call, false, true).await.unwrap_err();
    match err {
        relay_rpc_client::ClientError::RemoteInvocation { message, .. } => {
            assert!(message.contains("not authenticated"));
        }
        other => panic!("expected RemoteInvocation, got {other:?}"),
    }

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn server_invoked_delegate_reaches_the_clients_local_handler() {
    let server_config = ServerConfig { network_port: 5, key_size_bits: key_size(), message_encryption: false, ..Default::default() };
    let client_config = ClientConfig { server_port: 5, key_size_bits: key_size(), message_encryption: false, ..Default::default() };
    let (server, client) = wire_up(server_config, client_config).await;
    server.register_service("INotifier", Arc::new(NotifierService));

    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = received.clone();
    let handler: LocalHandler = Arc::new(move |args| received_clone.lock().unwrap().extend(args));

    let engine = client.engine().unwrap();
    let call = build_call(
        engine,
        1,
        "INotifier",
        "Subscribe",
        vec![Argument::Delegate { name: "onEvent".into(), declared_type_name: "Action<string>".into(), handler }],
    );
    let info: RemoteDelegateInfo = serde_json::from_slice(&call.parameters[0].value).unwrap();
    dispatch(engine, call, false, true).await.unwrap();

    let session_id = engine.session_id().unwrap();
    let session = server.get_session(session_id).unwrap();
    let proxy = session.delegate_proxy_factory().forge(info.handler_key, true, Arc::new(|_| {})).unwrap();
    proxy.invoke(vec![serde_json::json!("server says hi")]);

    for _ in 0..50 {
        if !received.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(received.lock().unwrap().as_slice(), [serde_json::json!("server says hi")]);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn idle_sessions_are_evicted_by_the_sweeper() {
    let server_config = ServerConfig {
        network_port: 6,
        key_size_bits: key_size(),
        message_encryption: false,
        inactive_session_sweep_interval_sec: 1,
        maximum_session_inactivity_time_minutes: 0,
        ..Default::default()
    };
    let client_config = ClientConfig { server_port: 6, key_size_bits: key_size(), message_encryption: false, keep_session_alive_interval_sec: 0, ..Default::default() };
    let (server, client) = wire_up(server_config, client_config).await;

    let session_id = client.engine().unwrap().session_id().unwrap();
    assert!(server.get_session(session_id).is_ok());

    for _ in 0..50 {
        if server.get_session(session_id).is_err() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(server.get_session(session_id).is_err());
}
