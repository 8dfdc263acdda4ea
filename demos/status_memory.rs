//! Status query over the in-memory transport.
//!
//! A "nodeA" responder and a "portal" client share one in-process hub. The
//! client issues `getStatus` and `listRooms` and prints whatever comes back
//! through the callbacks.
//!
//! Run with: RUST_LOG=debug cargo run --example status_memory

#![allow(clippy::unwrap_used, clippy::expect_used)]

use mom_rpc_callbacks::{
    create_memory_transport_with_hub, CallResult, Callbacks, MemoryHub, RpcClient, RpcConfig,
    RpcServer,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing_subscriber::{fmt as tracing_format, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---
    tracing_format()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_line_number(true)
        .init();

    let hub = MemoryHub::new();

    let server_config = RpcConfig::new("nodeA");
    let server_transport = create_memory_transport_with_hub(&server_config, hub.clone()).await?;
    let server = RpcServer::new(server_transport, "nodeA");

    server.register("getStatus", |_args: Vec<Value>| async move {
        // ---
        Ok(json!({"state": "running", "uptime_s": 42}))
    });

    server.register("listRooms", |args: Vec<Value>| async move {
        // ---
        let limit = args.first().and_then(Value::as_u64).unwrap_or(2);
        let rooms: Vec<Value> = (0..limit).map(|i| json!(format!("room-{i}"))).collect();
        Ok(Value::Array(rooms))
    });

    server.spawn().await?;

    let client_config = RpcConfig::new("portal");
    let client_transport = create_memory_transport_with_hub(&client_config, hub.clone()).await?;
    let client = RpcClient::connect(client_transport, client_config).await?;

    let status = call(&client, "getStatus", vec![]).await;
    println!("getStatus -> {status:?}");

    let rooms = call(&client, "listRooms", vec![json!(3)]).await;
    println!("listRooms -> {rooms:?}");

    server.shutdown();
    client.disconnect();
    Ok(())
}

/// Bridge the callback API into an awaitable result.
async fn call(client: &RpcClient, method: &str, args: Vec<Value>) -> CallResult {
    // ---
    let (tx, rx) = oneshot::channel();
    let callbacks = Callbacks::callback(move |result| {
        let _ = tx.send(result);
    });

    client.call_rpc("nodeA", method, args, callbacks, None).await;
    rx.await.expect("every call resolves exactly once")
}
