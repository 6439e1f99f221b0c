//! 연결 상태, 연결 이벤트, 송신 라이터.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use hl_core::WsCommand;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::registry::CommandSink;
use crate::transport::FrameSink;
use crate::{StreamError, StreamResult};

/// 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 연결 없음 (최초 상태 또는 정상 종료 후)
    Disconnected,
    /// 연결 시도 중
    Connecting,
    /// 연결됨
    Connected,
    /// 비정상 종료 후 재연결 대기 중
    Reconnecting,
    /// 클라이언트 종료됨 (최종 상태)
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// 연결이 끊긴 원인.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// 수신 에러
    ReadError(String),
    /// 송신 에러 (ping 포함)
    WriteError(String),
    /// 수신 유휴 타임아웃
    HeartbeatTimeout,
    /// 서버가 정상 종료함. 재연결하지 않음
    ClosedByPeer,
}

impl DisconnectReason {
    /// 자동 재연결 대상인지 확인.
    pub fn should_reconnect(&self) -> bool {
        !matches!(self, DisconnectReason::ClosedByPeer)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ReadError(e) => write!(f, "read error: {}", e),
            DisconnectReason::WriteError(e) => write!(f, "write error: {}", e),
            DisconnectReason::HeartbeatTimeout => f.write_str("heartbeat timeout"),
            DisconnectReason::ClosedByPeer => f.write_str("closed by peer"),
        }
    }
}

/// 연결 수명 주기 이벤트.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// 연결 수립 및 구독 복원 완료
    Connected { epoch: u64, restored: usize },
    /// 연결 끊김
    Disconnected { epoch: u64, reason: DisconnectReason },
    /// 재연결 실패, `delay` 후 재시도
    Reconnecting { attempt: u32, delay: Duration },
    /// 클라이언트 종료
    Closed,
}

/// 현재 연결의 송신 싱크. 연결 세대(epoch)와 함께 보관합니다.
pub(crate) struct FrameWriter {
    sink: Mutex<Option<(u64, FrameSink)>>,
}

impl FrameWriter {
    pub(crate) fn new() -> Self {
        Self {
            sink: Mutex::new(None),
        }
    }

    /// 새 연결의 싱크를 설치합니다. 이전 싱크는 닫습니다.
    pub(crate) async fn install(&self, epoch: u64, sink: FrameSink) {
        let previous = self.sink.lock().await.replace((epoch, sink));
        if let Some((old_epoch, mut old)) = previous {
            debug!(epoch = old_epoch, "이전 싱크 닫기");
            let _ = old.close().await;
        }
    }

    /// 지정한 세대의 싱크가 아직 설치되어 있으면 제거하고 닫습니다.
    pub(crate) async fn discard(&self, epoch: u64) {
        let mut guard = self.sink.lock().await;
        if matches!(guard.as_ref(), Some((current, _)) if *current == epoch) {
            if let Some((_, mut sink)) = guard.take() {
                let _ = sink.close().await;
            }
        }
    }

    /// 세대와 관계없이 싱크를 닫습니다.
    pub(crate) async fn close(&self) {
        if let Some((epoch, mut sink)) = self.sink.lock().await.take() {
            debug!(epoch, "싱크 닫기");
            let _ = sink.close().await;
        }
    }

    pub(crate) async fn send_text(&self, text: String) -> StreamResult<()> {
        let mut guard = self.sink.lock().await;
        let (_, sink) = guard.as_mut().ok_or(StreamError::ConnectionClosed)?;
        trace!(frame = %text, "프레임 송신");
        sink.send(text).await
    }
}

#[async_trait]
impl CommandSink for FrameWriter {
    async fn send_command(&self, command: &WsCommand) -> StreamResult<()> {
        self.send_text(command.to_frame()?).await
    }
}
