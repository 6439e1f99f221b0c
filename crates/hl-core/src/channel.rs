//! 스트림 채널 레지스트리.
//!
//! 업스트림이 수신 메시지의 `channel` 필드에 싣는 고정된 채널 식별자 집합입니다.
//! 구독 요청의 `type`과 수신 채널 이름이 다른 경우가 있습니다
//! (`userEvents` 구독은 `user` 채널로 수신됨).

use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// 수신 채널 식별자.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// 체결
    Trades,
    /// L2 호가 스냅샷
    L2Book,
    /// 캔들
    Candle,
    /// 전체 중간가
    AllMids,
    /// 최우선 호가
    Bbo,
    /// 자산 컨텍스트 (펀딩, 미결제약정 등)
    ActiveAssetCtx,
    /// 사용자 알림
    Notification,
    /// 주문 상태 업데이트
    OrderUpdates,
    /// 사용자 체결
    UserFills,
    /// 사용자 이벤트 (구독 타입 `userEvents`)
    UserEvents,
    /// 사용자 펀딩 정산
    UserFundings,
    /// 펀딩 외 원장 변경
    UserNonFundingLedgerUpdates,
    /// 웹 대시보드 집계 데이터
    WebData2,
    /// 구독/구독 해제 확인 응답
    SubscriptionResponse,
    /// ping 응답
    Pong,
    /// 업스트림 에러 통지
    Error,
}

impl Channel {
    /// 알려진 모든 채널.
    pub const ALL: [Channel; 16] = [
        Channel::Trades,
        Channel::L2Book,
        Channel::Candle,
        Channel::AllMids,
        Channel::Bbo,
        Channel::ActiveAssetCtx,
        Channel::Notification,
        Channel::OrderUpdates,
        Channel::UserFills,
        Channel::UserEvents,
        Channel::UserFundings,
        Channel::UserNonFundingLedgerUpdates,
        Channel::WebData2,
        Channel::SubscriptionResponse,
        Channel::Pong,
        Channel::Error,
    ];

    /// 와이어 상의 채널 이름.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Trades => "trades",
            Channel::L2Book => "l2Book",
            Channel::Candle => "candle",
            Channel::AllMids => "allMids",
            Channel::Bbo => "bbo",
            Channel::ActiveAssetCtx => "activeAssetCtx",
            Channel::Notification => "notification",
            Channel::OrderUpdates => "orderUpdates",
            Channel::UserFills => "userFills",
            Channel::UserEvents => "user",
            Channel::UserFundings => "userFundings",
            Channel::UserNonFundingLedgerUpdates => "userNonFundingLedgerUpdates",
            Channel::WebData2 => "webData2",
            Channel::SubscriptionResponse => "subscriptionResponse",
            Channel::Pong => "pong",
            Channel::Error => "error",
        }
    }

    /// 구독 대상이 아닌 제어 채널인지 확인.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Channel::SubscriptionResponse | Channel::Pong | Channel::Error
        )
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::UnknownChannel(s.to_string()))
    }
}
