//! 채널별 페이로드 타입.

mod account;
mod interval;
mod market;

pub use account::*;
pub use interval::*;
pub use market::*;

use chrono::{DateTime, Utc};

/// 밀리초 타임스탬프를 UTC 시각으로 변환합니다.
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}
