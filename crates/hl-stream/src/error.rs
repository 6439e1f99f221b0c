//! 스트림 에러 타입.

use hl_core::CoreError;
use thiserror::Error;

/// 스트림 클라이언트 에러.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// 전송 계층 에러 (연결, 송수신)
    #[error("Transport error: {0}")]
    Transport(String),

    /// 설치된 연결이 없음
    #[error("Connection closed")]
    ConnectionClosed,

    /// 채널 페이로드 디코딩 실패
    #[error("Decode error on {channel}: {message}")]
    Decode { channel: String, message: String },

    /// 알 수 없는 채널
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// 등록되지 않았거나 이미 해제된 구독
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// 잘못된 구독 요청
    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),

    /// 타임아웃
    #[error("Timeout: {0}")]
    Timeout(String),

    /// 명령 직렬화 실패
    #[error("Serialize error: {0}")]
    Serialize(String),

    /// 설정 에러
    #[error("Config error: {0}")]
    Config(String),
}

/// 스트림 작업을 위한 Result 타입.
pub type StreamResult<T> = Result<T, StreamError>;

impl StreamError {
    /// 재연결/재시도로 회복될 수 있는 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreamError::Transport(_) | StreamError::ConnectionClosed | StreamError::Timeout(_)
        )
    }

    /// 호출자의 잘못된 사용으로 생긴 에러인지 확인.
    pub fn is_protocol_misuse(&self) -> bool {
        matches!(
            self,
            StreamError::SubscriptionNotFound(_) | StreamError::InvalidSubscription(_)
        )
    }
}

impl From<CoreError> for StreamError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config(msg) => StreamError::Config(msg),
            CoreError::Serialization(msg) => StreamError::Serialize(msg),
            CoreError::UnknownChannel(name) => StreamError::UnknownChannel(name),
            CoreError::InvalidInput(msg) => StreamError::InvalidSubscription(msg),
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialize(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}
