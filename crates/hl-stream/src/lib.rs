//! # HL Stream
//!
//! 단일 WebSocket 연결 위에서 여러 구독자를 다중화하는 스트림 클라이언트입니다.
//!
//! - 같은 키의 구독은 업스트림에 한 번만 요청하고 로컬 리스너를 여러 개 연결
//! - 수신 메시지를 채널별 규칙으로 디코딩해 일치하는 리스너에게만 전달
//! - 연결이 끊기면 지수 백오프로 재연결하고 모든 구독을 다시 요청
//!
//! ```no_run
//! use hl_core::{CandleInterval, StreamConfig};
//! use hl_stream::StreamClient;
//!
//! # async fn run() -> Result<(), hl_stream::StreamError> {
//! let client = StreamClient::new(StreamConfig::default())?;
//! client.connect().await?;
//!
//! client
//!     .subscribe_candles("ETH", CandleInterval::M1, |candle| {
//!         println!("{} close={}", candle.symbol, candle.close);
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod handle;
pub mod registry;
pub mod subscription;
pub mod transport;

pub use backoff::Backoff;
pub use client::StreamClient;
pub use connection::{ConnectionEvent, ConnectionState, DisconnectReason};
pub use dispatch::{
    AckDispatcher, DispatcherTable, KeyedDispatcher, MessageDispatcher, Subscriptable,
    UserScopedDispatcher,
};
pub use error::{StreamError, StreamResult};
pub use event::ChannelEvent;
pub use handle::SubscriptionHandle;
pub use registry::{
    CommandSink, GroupSnapshot, Listener, ListenerId, ListenerSlot, SubscriberRegistry,
};
pub use subscription::{Subscription, SubscriptionKey};
pub use transport::{FrameSink, FrameStream, Transport, WsTransport};
