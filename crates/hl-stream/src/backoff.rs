//! 재연결 지수 백오프.

use std::time::Duration;

/// 지수 백오프 상태. 재연결 태스크가 단독으로 소유합니다.
#[derive(Debug, Clone)]
pub struct Backoff {
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            max,
            current: initial.min(max),
            attempts: 0,
        }
    }

    /// 다음 대기 시간을 반환하고 간격을 두 배로 늘립니다 (최대값에서 고정).
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// 지금까지의 시도 횟수.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
