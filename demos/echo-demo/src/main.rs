//! Minimal end-to-end walkthrough: a server exposing `IEcho`, a client
//! calling it over an in-process loopback channel, and a one-way
//! notification method showing the fire-and-forget dispatch path.
//!
//! Run with `cargo run -p echo-demo`.

use std::sync::Arc;

use async_trait::async_trait;
use relay_rpc_client::{build_call, dispatch, Argument, Client, ClientConfig};
use relay_rpc_server::{AllowAllAuthenticationProvider, ArgValue, Server, ServerConfig, ServiceDispatcher};
use relay_rpc_wire::RemoteExceptionMessage;
use tracing_subscriber::EnvFilter;

struct EchoService;

#[async_trait]
impl ServiceDispatcher for EchoService {
    async fn dispatch(&self, method_name: &str, args: Vec<ArgValue>) -> Result<Option<ArgValue>, RemoteExceptionMessage> {
        match method_name {
            "Echo" => Ok(args.into_iter().next()),
            "Shout" => {
                let text = args.into_iter().next().and_then(|v| v.as_str().map(str::to_owned)).unwrap_or_default();
                tracing::info!(%text, "shout received");
                Ok(None)
            }
            other => Err(RemoteExceptionMessage::new(format!("method not found: {other}"))),
        }
    }

    fn is_one_way(&self, method_name: &str) -> bool {
        method_name == "Shout"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    // The demo runs over an in-process loopback channel, which has no
    // out-of-band leg to carry the client's public key ahead of the
    // handshake the way a real TLS/TCP accept would — so both sides run
    // with encryption off. A networked deployment leaves it on (the
    // default) and supplies `client_public_key_blob` from its listener.
    let key_size_bits = relay_rpc_crypto::rsa::MIN_KEY_SIZE_BITS;

    let server = Server::new(
        ServerConfig { network_port: 7007, key_size_bits, message_encryption: false, ..Default::default() },
        Arc::new(AllowAllAuthenticationProvider),
    )?;
    server.register_service("IEcho", Arc::new(EchoService));

    let client_channel = server.accept_loopback(None).await?;

    let client = Client::new(ClientConfig {
        server_port: 7007,
        key_size_bits,
        message_encryption: false,
        ..Default::default()
    })?;
    client.connect(client_channel).await?;

    let engine = client.engine()?;
    let call = build_call(
        engine,
        0,
        "IEcho",
        "Echo",
        vec![Argument::Value {
            name: "text".into(),
            declared_type_name: "string".into(),
            value: serde_json::json!("hello from the client"),
        }],
    );
    let reply = dispatch(engine, call, false, true).await?;
    println!("Echo replied: {reply:?}");

    let notify = build_call(
        engine,
        0,
        "IEcho",
        "Shout",
        vec![Argument::Value { name: "text".into(), declared_type_name: "string".into(), value: serde_json::json!("fire and forget") }],
    );
    dispatch(engine, notify, true, false).await?;

    client.disconnect().await?;
    Ok(())
}
