//! 연결 수명 주기 통합 테스트: 재연결, 구독 복원, 하트비트, 종료.

mod common;

use std::collections::BTreeSet;
use std::time::Duration;

use common::*;
use hl_core::StreamConfig;
use hl_stream::{
    ConnectionEvent, ConnectionState, DisconnectReason, StreamClient, StreamError, Subscription,
};
use serde_json::{json, Value};

async fn collect_subscribes(server: &mut ServerConn, n: usize) -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    for _ in 0..n {
        let command = server.next_subscription_command().await.unwrap();
        assert_eq!(command["method"], "subscribe");
        set.insert(command["subscription"].to_string());
    }
    set
}

fn payload(sub: &Subscription) -> String {
    serde_json::to_value(sub).unwrap().to_string()
}

#[tokio::test]
async fn test_reconnect_replays_live_subscriptions() {
    let (client, transport, mut conns, mut server) = connected_client().await;
    let mut events = client.events();

    let a = Subscription::trades("BTC");
    let b = Subscription::l2_book("ETH").with_n_sig_figs(4);
    let c = Subscription::order_updates("0xabc");

    client.subscribe(a.clone(), |_| {}).await.unwrap();
    let hb = client.subscribe(b.clone(), |_| {}).await.unwrap();
    client.subscribe(c.clone(), |_| {}).await.unwrap();
    collect_subscribes(&mut server, 3).await;

    client.unsubscribe(&hb).await.unwrap();
    assert_eq!(server.next_command().await.unwrap()["method"], "unsubscribe");

    server.fail("connection reset by peer");

    let event = wait_event(&mut events, |e| matches!(e, ConnectionEvent::Disconnected { .. })).await;
    assert!(matches!(
        event,
        ConnectionEvent::Disconnected { epoch: 1, reason: DisconnectReason::ReadError(_) }
    ));

    let mut server = next_conn(&mut conns).await;
    let replayed = collect_subscribes(&mut server, 2).await;
    assert_eq!(replayed, BTreeSet::from([payload(&a), payload(&c)]));
    server.assert_no_command().await;

    let event = wait_event(&mut events, |e| matches!(e, ConnectionEvent::Connected { .. })).await;
    assert_eq!(event, ConnectionEvent::Connected { epoch: 2, restored: 2 });
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(transport.attempts(), 2);
}

#[tokio::test]
async fn test_delivery_resumes_after_reconnect() {
    let (client, _transport, mut conns, mut server) = connected_client().await;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    client
        .subscribe_trades("BTC", move |trades| {
            let _ = tx.send(trades[0].tid);
        })
        .await
        .unwrap();
    server.next_command().await.unwrap();

    server.fail("broken pipe");
    let mut server = next_conn(&mut conns).await;
    server.next_subscription_command().await.unwrap();

    server.push_channel(
        "trades",
        json!([{"coin": "BTC", "side": "A", "px": "1", "sz": "1", "time": 1, "tid": 77}]),
    );
    let tid = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(tid, 77);
}

#[tokio::test]
async fn test_reconnect_backoff_doubles() {
    let (client, transport, mut conns, server) = connected_client().await;
    let mut events = client.events();

    transport.fail_next(3);
    server.fail("gone");

    let mut delays = Vec::new();
    for expected in 1..=3u32 {
        match wait_event(&mut events, |e| matches!(e, ConnectionEvent::Reconnecting { .. })).await {
            ConnectionEvent::Reconnecting { attempt, delay } => {
                assert_eq!(attempt, expected);
                delays.push(delay);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(40)
        ]
    );

    let _server = next_conn(&mut conns).await;
    wait_event(&mut events, |e| matches!(e, ConnectionEvent::Connected { .. })).await;
    assert_eq!(transport.attempts(), 5);
}

#[tokio::test]
async fn test_clean_close_does_not_reconnect() {
    let (client, transport, mut conns, mut server) = connected_client().await;
    let mut events = client.events();

    client.subscribe(Subscription::bbo("BTC"), |_| {}).await.unwrap();
    server.next_command().await.unwrap();

    server.close();
    let event = wait_event(&mut events, |e| matches!(e, ConnectionEvent::Disconnected { .. })).await;
    assert!(matches!(
        event,
        ConnectionEvent::Disconnected { reason: DisconnectReason::ClosedByPeer, .. }
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.attempts(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // 명시적으로 다시 연결하면 구독이 복원됨
    client.connect().await.unwrap();
    let mut server = next_conn(&mut conns).await;
    assert_eq!(
        server.next_command().await.unwrap()["subscription"],
        json!({"type": "bbo", "coin": "BTC"})
    );
}

#[tokio::test]
async fn test_close_is_idempotent_and_silent() {
    let (client, _transport, _conns, mut server) = connected_client().await;
    let mut events = client.events();

    let handle = client.subscribe(Subscription::trades("BTC"), |_| {}).await.unwrap();
    server.next_command().await.unwrap();

    client.close().await.unwrap();
    client.close().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_eq!(
        wait_event(&mut events, |_| true).await,
        ConnectionEvent::Closed
    );

    // unsubscribe 프레임 없이 싱크가 닫힘
    assert!(server.next_command().await.is_none());
    assert!(client.subscriptions().await.is_empty());

    let err = client.subscribe_trades("ETH", |_| {}).await.unwrap_err();
    assert!(matches!(err, StreamError::ConnectionClosed));
    assert!(matches!(
        handle.unsubscribe().await.unwrap_err(),
        StreamError::SubscriptionNotFound(_)
    ));
    assert!(matches!(
        client.connect().await.unwrap_err(),
        StreamError::ConnectionClosed
    ));
}

#[tokio::test]
async fn test_connect_is_noop_when_connected() {
    let (client, transport, _conns, _server) = connected_client().await;
    client.connect().await.unwrap();
    assert_eq!(transport.attempts(), 1);
}

#[tokio::test]
async fn test_initial_connect_failure() {
    let (transport, mut conns) = MockTransport::new();
    transport.fail_next(1);
    let client = StreamClient::with_transport(test_config(), transport.clone()).unwrap();

    let err = client.connect().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.connect().await.unwrap();
    next_conn(&mut conns).await;
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_detach_while_reconnecting_is_not_replayed() {
    let (transport, mut conns) = MockTransport::new();
    let config = StreamConfig {
        reconnect_initial_delay_ms: 300,
        ..test_config()
    };
    let client = StreamClient::with_transport(config, transport.clone()).unwrap();
    let mut events = client.events();
    client.connect().await.unwrap();
    let mut server = next_conn(&mut conns).await;

    let keep = Subscription::trades("BTC");
    client.subscribe(keep.clone(), |_| {}).await.unwrap();
    let drop_me = client.subscribe(Subscription::trades("ETH"), |_| {}).await.unwrap();
    collect_subscribes(&mut server, 2).await;

    transport.fail_next(1);
    server.fail("reset");
    wait_event(&mut events, |e| matches!(e, ConnectionEvent::Reconnecting { .. })).await;

    // 연결이 없는 동안의 해제는 성공하고 재구독 대상에서 빠짐
    drop_me.unsubscribe().await.unwrap();

    let mut server = next_conn(&mut conns).await;
    let replayed: Value = server.next_subscription_command().await.unwrap();
    assert_eq!(replayed["subscription"].to_string(), payload(&keep));
    server.assert_no_command().await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_sends_ping() {
    let (_client, _transport, _conns, mut server) = connected_client().await;

    tokio::time::advance(Duration::from_secs(50)).await;
    assert_eq!(server.next_command().await.unwrap(), json!({"method": "ping"}));

    tokio::time::advance(Duration::from_secs(50)).await;
    assert_eq!(server.next_command().await.unwrap(), json!({"method": "ping"}));
}

#[tokio::test(start_paused = true)]
async fn test_idle_connection_triggers_reconnect() {
    let (transport, mut conns) = MockTransport::new();
    let config = StreamConfig {
        ping_interval_secs: 1,
        read_idle_timeout_secs: 2,
        ..test_config()
    };
    let client = StreamClient::with_transport(config, transport.clone()).unwrap();
    let mut events = client.events();
    client.connect().await.unwrap();
    let _first = next_conn(&mut conns).await;

    let event = wait_event(&mut events, |e| matches!(e, ConnectionEvent::Disconnected { .. })).await;
    assert!(matches!(
        event,
        ConnectionEvent::Disconnected { epoch: 1, reason: DisconnectReason::HeartbeatTimeout }
    ));

    let _second = next_conn(&mut conns).await;
    wait_event(&mut events, |e| matches!(e, ConnectionEvent::Connected { epoch: 2, .. })).await;
    assert_eq!(transport.attempts(), 2);
}
