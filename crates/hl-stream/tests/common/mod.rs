//! 통합 테스트용 메모리 전송.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use hl_core::StreamConfig;
use hl_stream::{
    ConnectionEvent, FrameSink, FrameStream, StreamClient, StreamError, StreamResult, Transport,
};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

pub const WAIT: Duration = Duration::from_secs(5);

/// 서버 쪽 연결 끝점.
pub struct ServerConn {
    /// 클라이언트가 보낸 프레임
    outbound: mpsc::UnboundedReceiver<String>,
    /// 클라이언트에게 보낼 프레임
    inbound: mpsc::UnboundedSender<StreamResult<String>>,
}

impl ServerConn {
    /// 텍스트 프레임 전송.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.inbound.unbounded_send(Ok(frame.into()));
    }

    /// `{"channel":..,"data":..}` 프레임 전송.
    pub fn push_channel(&self, channel: &str, data: Value) {
        self.push(serde_json::json!({ "channel": channel, "data": data }).to_string());
    }

    /// 비정상 종료.
    pub fn fail(&self, message: &str) {
        let _ = self
            .inbound
            .unbounded_send(Err(StreamError::Transport(message.to_string())));
    }

    /// 정상 종료 (스트림 끝).
    pub fn close(&self) {
        self.inbound.close_channel();
    }

    /// 다음 명령 프레임. 시간 내에 없으면 `None`.
    pub async fn next_command(&mut self) -> Option<Value> {
        let frame = tokio::time::timeout(WAIT, self.outbound.next())
            .await
            .ok()??;
        Some(serde_json::from_str(&frame).expect("command frame is JSON"))
    }

    /// ping이 아닌 다음 명령 프레임.
    pub async fn next_subscription_command(&mut self) -> Option<Value> {
        loop {
            let command = self.next_command().await?;
            if command["method"] != "ping" {
                return Some(command);
            }
        }
    }

    /// 짧은 시간 동안 추가 명령이 없는지 확인.
    pub async fn assert_no_command(&mut self) {
        let frame = tokio::time::timeout(Duration::from_millis(100), self.outbound.next()).await;
        if let Ok(Some(frame)) = frame {
            panic!("unexpected command: {}", frame);
        }
    }
}

/// 연결마다 새 채널 쌍을 만들어 테스트에 넘겨주는 전송.
pub struct MockTransport {
    conns: Mutex<mpsc::UnboundedSender<ServerConn>>,
    failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerConn>) {
        let (tx, rx) = mpsc::unbounded();
        let transport = Arc::new(Self {
            conns: Mutex::new(tx),
            failures: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        });
        (transport, rx)
    }

    /// 다음 `n`번의 연결 시도를 실패시킵니다.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _url: &str) -> StreamResult<(FrameSink, FrameStream)> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StreamError::Transport("connection refused".into()));
        }

        let (out_tx, out_rx) = mpsc::unbounded::<String>();
        let (in_tx, in_rx) = mpsc::unbounded::<StreamResult<String>>();

        let sink = out_tx.sink_map_err(|e| StreamError::Transport(e.to_string()));
        let _ = self.conns.lock().await.unbounded_send(ServerConn {
            outbound: out_rx,
            inbound: in_tx,
        });

        Ok((Box::pin(sink), Box::pin(in_rx)))
    }
}

pub fn test_config() -> StreamConfig {
    StreamConfig {
        reconnect_initial_delay_ms: 10,
        reconnect_max_delay_secs: 1,
        ..StreamConfig::default()
    }
    .with_ws_url("ws://mock/ws")
}

/// 클라이언트를 만들고 연결까지 마칩니다.
pub async fn connected_client() -> (
    StreamClient,
    Arc<MockTransport>,
    mpsc::UnboundedReceiver<ServerConn>,
    ServerConn,
) {
    let (transport, mut conns) = MockTransport::new();
    let client = StreamClient::with_transport(test_config(), transport.clone()).unwrap();
    client.connect().await.unwrap();
    let server = next_conn(&mut conns).await;
    (client, transport, conns, server)
}

pub async fn next_conn(conns: &mut mpsc::UnboundedReceiver<ServerConn>) -> ServerConn {
    tokio::time::timeout(WAIT, conns.next())
        .await
        .expect("connection within timeout")
        .expect("transport alive")
}

/// 조건에 맞는 연결 이벤트를 기다립니다.
pub async fn wait_event<F>(events: &mut broadcast::Receiver<ConnectionEvent>, mut pred: F) -> ConnectionEvent
where
    F: FnMut(&ConnectionEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("event within timeout")
}
