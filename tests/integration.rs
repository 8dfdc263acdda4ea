use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

use mom_rpc_callbacks::{
    //
    create_memory_transport_with_hub,
    Address,
    CallResult,
    Callbacks,
    CorrelationId,
    Envelope,
    MemoryHub,
    Reply,
    Result,
    RpcClient,
    RpcConfig,
    RpcError,
    RpcReply,
    RpcRequest,
    RpcServer,
    SubscriptionHandle,
    TransportPtr,
};

type Events = mpsc::UnboundedReceiver<(&'static str, CallResult)>;

/// Callbacks for the given tags, each forwarding into one channel.
fn recording(tags: &[&'static str]) -> (Callbacks, Events) {
    // ---
    let (tx, rx) = mpsc::unbounded_channel::<(&'static str, CallResult)>();
    let mut callbacks: Option<Callbacks> = None;

    for &tag in tags {
        let tx = tx.clone();
        let handler = move |result: CallResult| {
            let _ = tx.send((tag, result));
        };
        callbacks = Some(match callbacks {
            None => Callbacks::new(tag, handler),
            Some(c) => c.on(tag, handler),
        });
    }

    (callbacks.expect("at least one tag"), rx)
}

async fn transport(hub: &Arc<MemoryHub>, node: &str) -> TransportPtr {
    create_memory_transport_with_hub(&RpcConfig::new(node), hub.clone())
        .await
        .expect("memory transport")
}

async fn client_on(hub: &Arc<MemoryHub>, node: &str) -> Result<RpcClient> {
    RpcClient::connect(transport(hub, node).await, RpcConfig::new(node)).await
}

/// Take the next request published to a peer subscription.
async fn next_request(peer: &mut SubscriptionHandle) -> RpcRequest {
    let env = peer.inbox.recv().await.expect("request delivered");
    RpcRequest::decode(&env.payload).expect("valid request")
}

async fn send_reply(transport: &TransportPtr, to: &Address, reply: RpcReply) {
    let env = Envelope::json(to.clone(), reply.encode().unwrap());
    transport.publish(env).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_reply_resolves_call_once() -> Result<()> {
    // ---
    // Arrange
    // ---
    let hub = MemoryHub::new();
    let peer_transport = transport(&hub, "nodeA").await;
    let mut peer = peer_transport.subscribe("nodeA".into()).await?;
    let client = client_on(&hub, "portal").await?;
    let (callbacks, mut events) = recording(&["callback"]);

    // ---
    // Act
    // ---
    let id = client
        .call_rpc(
            "nodeA",
            "getStatus",
            vec![],
            callbacks,
            Some(Duration::from_millis(100)),
        )
        .await
        .expect("call is outstanding");

    let request = next_request(&mut peer).await;
    sleep(Duration::from_millis(10)).await;
    send_reply(
        &peer_transport,
        &request.reply_to,
        RpcReply::callback(request.corr_id, json!("ok")),
    )
    .await;

    // ---
    // Assert
    // ---
    assert_eq!(request.method, "getStatus");
    assert_eq!(request.corr_id, id);
    assert_eq!(&request.reply_to, client.reply_address());

    let (tag, result) = events.recv().await.expect("reply delivered");
    assert_eq!(tag, "callback");
    assert_eq!(
        result,
        Ok(Reply {
            data: Some(json!("ok")),
            err: None
        })
    );

    sleep(Duration::from_millis(200)).await;
    assert!(events.recv().await.is_none(), "no timeout after reply");
    assert!(!client.is_pending(id));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_reply_times_out_once() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let client = client_on(&hub, "portal").await?;
    let (callbacks, mut events) = recording(&["callback", "progress"]);

    let start = Instant::now();
    client
        .call_rpc(
            "nodeA",
            "getStatus",
            vec![],
            callbacks,
            Some(Duration::from_millis(100)),
        )
        .await
        .expect("call is outstanding");
    assert_eq!(client.pending_count(), 1);

    let mut tags = Vec::new();
    while let Some((tag, result)) = events.recv().await {
        assert_eq!(result, Err(RpcError::Timeout(Duration::from_millis(100))));
        tags.push(tag);
    }

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(100), "fired early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(105), "fired late: {elapsed:?}");
    assert_eq!(tags, ["callback", "progress"]);
    assert_eq!(client.pending_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_default_timeout_applies() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let client = client_on(&hub, "portal").await?;
    let (callbacks, mut events) = recording(&["callback"]);

    let start = Instant::now();
    client
        .call_rpc("nodeA", "getStatus", vec![], callbacks, Some(Duration::ZERO))
        .await;

    let (_, result) = events.recv().await.unwrap();
    assert_eq!(result, Err(RpcError::Timeout(Duration::from_millis(3000))));
    assert!(start.elapsed() >= Duration::from_millis(3000));
    Ok(())
}

#[tokio::test]
async fn test_not_listening_fails_synchronously() {
    // ---
    let hub = MemoryHub::new();
    let client = RpcClient::new(transport(&hub, "portal").await, RpcConfig::new("portal"));

    let seen: Arc<Mutex<Vec<CallResult>>> = Arc::default();
    let sink = seen.clone();
    let callbacks = Callbacks::callback(move |r| sink.lock().unwrap().push(r));

    let id = client
        .call_rpc("nodeA", "getStatus", vec![], callbacks, None)
        .await;

    assert_eq!(id, None);
    assert_eq!(*seen.lock().unwrap(), vec![Err(RpcError::ClientNotReady)]);
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test]
async fn test_transport_not_ready_fails_every_tag() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let client = client_on(&hub, "portal").await?;
    hub.set_ready(false);

    let (callbacks, mut events) = recording(&["onOk", "onError"]);
    let id = client
        .call_rpc("nodeA", "getStatus", vec![], callbacks, None)
        .await;

    assert_eq!(id, None);
    assert!(!client.is_ready());
    assert_eq!(client.pending_count(), 0);

    let mut tags = Vec::new();
    while let Some((tag, result)) = events.recv().await {
        assert_eq!(result, Err(RpcError::ClientNotReady));
        tags.push(tag);
    }
    assert_eq!(tags, ["onError", "onOk"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unknown_corr_id_is_ignored() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let stranger = transport(&hub, "stranger").await;
    let client = client_on(&hub, "portal").await?;
    let (callbacks, mut events) = recording(&["callback"]);

    let id = client
        .call_rpc("nodeA", "getStatus", vec![], callbacks, Some(Duration::from_secs(1)))
        .await
        .unwrap();

    let bogus = CorrelationId::from(id.get() + 1000);
    send_reply(
        &stranger,
        client.reply_address(),
        RpcReply::callback(bogus, json!("not yours")),
    )
    .await;
    sleep(Duration::from_millis(50)).await;

    assert!(events.try_recv().is_err());
    assert_eq!(client.pending_count(), 1);
    assert!(client.is_pending(id));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_late_reply_after_timeout_is_dropped() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let peer_transport = transport(&hub, "nodeA").await;
    let mut peer = peer_transport.subscribe("nodeA".into()).await?;
    let client = client_on(&hub, "portal").await?;
    let (callbacks, mut events) = recording(&["callback"]);

    client
        .call_rpc("nodeA", "slow", vec![], callbacks, Some(Duration::from_millis(50)))
        .await
        .unwrap();
    let request = next_request(&mut peer).await;

    sleep(Duration::from_millis(80)).await;
    send_reply(
        &peer_transport,
        &request.reply_to,
        RpcReply::callback(request.corr_id, json!("too late")),
    )
    .await;
    sleep(Duration::from_millis(10)).await;

    let (_, result) = events.recv().await.unwrap();
    assert_eq!(result, Err(RpcError::Timeout(Duration::from_millis(50))));
    assert!(events.recv().await.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_server_round_trip_and_remote_error() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = RpcServer::new(transport(&hub, "nodeA").await, "nodeA");
    server.register("getStatus", |_args: Vec<Value>| async move { Ok(json!("ok")) });
    server.register("divide", |args: Vec<Value>| async move {
        match (args.first().and_then(Value::as_f64), args.get(1).and_then(Value::as_f64)) {
            (Some(_), Some(b)) if b == 0.0 => {
                Err(json!({"code": 400, "message": "division by zero"}))
            }
            (Some(a), Some(b)) => Ok(json!(a / b)),
            _ => Err(json!("bad args")),
        }
    });
    server.spawn().await?;

    let client = client_on(&hub, "portal").await?;

    let (callbacks, mut events) = recording(&["callback"]);
    client
        .call_rpc("nodeA", "getStatus", vec![], callbacks, None)
        .await
        .unwrap();
    let (_, result) = events.recv().await.unwrap();
    assert_eq!(result.unwrap().data, Some(json!("ok")));

    let (callbacks, mut events) = recording(&["callback"]);
    client
        .call_rpc("nodeA", "divide", vec![json!(1), json!(0)], callbacks, None)
        .await
        .unwrap();
    let reply = events.recv().await.unwrap().1.unwrap();
    assert!(reply.is_remote_error());
    assert_eq!(reply.data, None);
    assert_eq!(reply.err, Some(json!({"code": 400, "message": "division by zero"})));

    assert_eq!(client.pending_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unknown_method_fails_fast() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = RpcServer::new(transport(&hub, "nodeA").await, "nodeA");
    server.spawn().await?;
    let client = client_on(&hub, "portal").await?;

    let (callbacks, mut events) = recording(&["callback"]);
    let start = Instant::now();
    client
        .call_rpc("nodeA", "nope", vec![], callbacks, None)
        .await
        .unwrap();

    let reply = events.recv().await.unwrap().1.unwrap();
    assert_eq!(
        reply.err,
        Some(json!("no handler registered for method: nope"))
    );
    assert!(start.elapsed() < Duration::from_millis(3000));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unknown_reply_type_fails_all_callbacks() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let peer_transport = transport(&hub, "nodeA").await;
    let mut peer = peer_transport.subscribe("nodeA".into()).await?;
    let client = client_on(&hub, "portal").await?;
    let (callbacks, mut events) = recording(&["callback"]);

    let id = client
        .call_rpc("nodeA", "getStatus", vec![], callbacks, None)
        .await
        .unwrap();
    let request = next_request(&mut peer).await;
    send_reply(
        &peer_transport,
        &request.reply_to,
        RpcReply::callback(request.corr_id, json!(1)).with_type("mystery"),
    )
    .await;

    let (_, result) = events.recv().await.unwrap();
    assert_eq!(
        result,
        Err(RpcError::UnknownReplyType {
            id,
            tag: "mystery".into()
        })
    );
    assert!(events.recv().await.is_none());
    assert_eq!(client.pending_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_leaves_calls_to_time_out() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let client = client_on(&hub, "portal").await?;
    let (callbacks, mut events) = recording(&["callback"]);

    client
        .call_rpc("nodeA", "getStatus", vec![], callbacks, Some(Duration::from_millis(100)))
        .await
        .unwrap();
    client.disconnect();
    assert!(!client.is_ready());

    let (_, result) = events.recv().await.unwrap();
    assert_eq!(result, Err(RpcError::Timeout(Duration::from_millis(100))));

    let (callbacks, mut events) = recording(&["callback"]);
    assert_eq!(
        client
            .call_rpc("nodeA", "getStatus", vec![], callbacks, None)
            .await,
        None
    );
    assert_eq!(events.recv().await.unwrap().1, Err(RpcError::ClientNotReady));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_get_their_own_replies() -> Result<()> {
    // ---
    let hub = MemoryHub::new();
    let server = RpcServer::new(transport(&hub, "math").await, "math");
    server.register("double", |args: Vec<Value>| async move {
        match args.first().and_then(Value::as_i64) {
            Some(n) => Ok(json!(n * 2)),
            None => Err(json!("bad args")),
        }
    });
    server.spawn().await?;

    let client = client_on(&hub, "portal").await?;

    let mut tasks = Vec::new();
    for i in 0..32_i64 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let (callbacks, mut events) = recording(&["callback"]);
            let id = client
                .call_rpc("math", "double", vec![json!(i)], callbacks, Some(Duration::from_secs(5)))
                .await
                .expect("ready");
            let (_, result) = events.recv().await.expect("resolved");
            (id, i, result)
        }));
    }

    let mut ids = std::collections::HashSet::new();
    for task in tasks {
        let (id, i, result) = task.await.expect("task panicked");
        assert!(ids.insert(id), "duplicate id {id}");
        assert_eq!(result.unwrap().data, Some(json!(i * 2)));
    }

    assert_eq!(client.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_panicking_callback_keeps_listener_running() -> Result<()> {
    // ---
    // Arrange
    // ---
    let hub = MemoryHub::new();
    let peer_transport = transport(&hub, "nodeA").await;
    let mut peer = peer_transport.subscribe("nodeA".into()).await?;
    let client = client_on(&hub, "portal").await?;

    client
        .call_rpc(
            "nodeA",
            "getStatus",
            vec![],
            Callbacks::callback(|_| panic!("callback bug")),
            Some(Duration::from_secs(1)),
        )
        .await
        .expect("first call is outstanding");
    let first = next_request(&mut peer).await;

    // ---
    // Act
    // ---
    send_reply(
        &peer_transport,
        &first.reply_to,
        RpcReply::callback(first.corr_id, json!("ok")),
    )
    .await;

    let (callbacks, mut events) = recording(&["callback"]);
    client
        .call_rpc(
            "nodeA",
            "getStatus",
            vec![],
            callbacks,
            Some(Duration::from_secs(1)),
        )
        .await
        .expect("second call is outstanding");
    let second = next_request(&mut peer).await;
    send_reply(
        &peer_transport,
        &second.reply_to,
        RpcReply::callback(second.corr_id, json!("still up")),
    )
    .await;

    // ---
    // Assert
    // ---
    let (_, result) = timeout(Duration::from_millis(500), events.recv())
        .await
        .expect("second reply dispatched before its timeout")
        .expect("callback invoked");
    assert_eq!(result.map(|reply| reply.data), Ok(Some(json!("still up"))));
    assert!(client.is_ready());
    assert_eq!(client.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_closed_reply_channel_makes_client_not_ready() -> Result<()> {
    // ---
    // Arrange
    // ---
    let hub = MemoryHub::new();
    let client_transport = transport(&hub, "portal").await;
    let client = RpcClient::connect(client_transport.clone(), RpcConfig::new("portal")).await?;
    assert!(client.is_ready());

    // ---
    // Act
    // ---
    client_transport.close().await?;
    timeout(Duration::from_secs(1), async {
        while client.is_ready() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("listener stops once its inbox closes");

    let (callbacks, mut events) = recording(&["callback"]);
    let id = client
        .call_rpc(
            "nodeA",
            "getStatus",
            vec![],
            callbacks,
            Some(Duration::from_millis(100)),
        )
        .await;

    // ---
    // Assert
    // ---
    assert_eq!(id, None);
    assert_eq!(
        events.try_recv().expect("failed synchronously"),
        ("callback", Err(RpcError::ClientNotReady))
    );
    assert_eq!(client.pending_count(), 0);

    client.listen().await?;
    assert!(client.is_ready());
    Ok(())
}
