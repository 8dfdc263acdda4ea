//! Timeout and not-ready outcomes over the in-memory transport.
//!
//! Nobody serves "nodeB", so the first call expires after its deadline. The
//! hub is then taken offline and the second call fails before it is sent.
//!
//! Run with: cargo run --example timeout_memory

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::{Duration, Instant};

use mom_rpc_callbacks::{
    create_memory_transport_with_hub, Callbacks, MemoryHub, RpcClient, RpcConfig,
};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt as tracing_format, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---
    tracing_format()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let hub = MemoryHub::new();
    let config = RpcConfig::new("portal").with_default_timeout(Duration::from_millis(250));
    let transport = create_memory_transport_with_hub(&config, hub.clone()).await?;
    let client = RpcClient::connect(transport, config).await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress_tx = tx.clone();
    let callbacks = Callbacks::callback(move |result| {
        let _ = tx.send(("callback", result));
    })
    .on("progress", move |result| {
        let _ = progress_tx.send(("progress", result));
    });

    let start = Instant::now();
    let id = client
        .call_rpc("nodeB", "getStatus", vec![], callbacks, None)
        .await;
    println!("issued call {id:?}, {} pending", client.pending_count());

    while let Some((tag, result)) = rx.recv().await {
        println!("[{:?}] {tag}: {result:?}", start.elapsed());
    }

    hub.set_ready(false);

    let id = client
        .call_rpc(
            "nodeB",
            "getStatus",
            vec![],
            Callbacks::callback(|result| println!("offline call: {result:?}")),
            None,
        )
        .await;
    println!("offline call id {id:?}, {} pending", client.pending_count());

    Ok(())
}
