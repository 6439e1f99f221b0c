//! # HL Core
//!
//! 거래소 스트림 클라이언트가 공유하는 기본 타입을 제공합니다.
//!
//! - 채널 레지스트리 (`Channel`)와 수신 메시지 봉투 (`Envelope`)
//! - 송신 명령 프레임 (`WsCommand`)
//! - 채널별 페이로드 타입 (체결, 호가, 캔들, 주문 업데이트 등)
//! - 설정 관리
//! - 로깅 인프라

pub mod channel;
pub mod config;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod types;

pub use channel::Channel;
pub use config::*;
pub use envelope::{Envelope, Method, WsCommand, CONNECTION_ESTABLISHED};
pub use error::*;
pub use logging::*;
pub use types::*;
