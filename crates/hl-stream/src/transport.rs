//! 전송 계층.
//!
//! 클라이언트는 텍스트 프레임 싱크/스트림 쌍만 알고 있으며,
//! 실제 연결은 [`Transport`] 구현이 담당합니다.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info};

use crate::{StreamError, StreamResult};

/// 송신 텍스트 프레임 싱크.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = StreamError> + Send>>;

/// 수신 텍스트 프레임 스트림. `None`은 정상 종료(1000 또는 코드 없는 close), `Err`는 비정상 종료.
pub type FrameStream = Pin<Box<dyn Stream<Item = StreamResult<String>> + Send>>;

/// 연결 수립 협력자.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &str) -> StreamResult<(FrameSink, FrameStream)>;
}

/// tokio-tungstenite 기반 WebSocket 전송.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str) -> StreamResult<(FrameSink, FrameStream)> {
        info!("WebSocket 연결 중: {}", url);
        let (ws, response) = tokio_tungstenite::connect_async(url).await?;
        debug!(status = %response.status(), "WebSocket 핸드셰이크 완료");

        let (write, read) = ws.split();

        let sink = write.with(|text: String| {
            future::ready(Ok::<Message, StreamError>(Message::Text(text.into())))
        });

        // ping/pong/binary 프레임은 건너뛰고 텍스트만 전달
        let stream = futures::stream::unfold(read, |mut read| async move {
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => return Some((Ok(text.to_string()), read)),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "서버에서 연결 종료 요청");
                        return abnormal_close(frame.as_ref()).map(|e| (Err(e), read));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(WsError::ConnectionClosed)) | None => return None,
                    Some(Err(e)) => return Some((Err(StreamError::from(e)), read)),
                }
            }
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

/// 정상 종료(1000)가 아닌 close 프레임을 전송 에러로 바꿉니다.
/// 서비스 재시작(1001, 1012 등)은 재연결 대상입니다.
fn abnormal_close(frame: Option<&CloseFrame<'_>>) -> Option<StreamError> {
    let frame = frame?;
    if frame.code == CloseCode::Normal {
        return None;
    }
    Some(StreamError::Transport(format!(
        "closed by peer: {} {}",
        u16::from(frame.code),
        frame.reason
    )))
}
