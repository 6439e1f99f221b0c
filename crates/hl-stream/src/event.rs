//! 리스너에게 전달되는 채널 이벤트.

use hl_core::{
    ActiveAssetCtx, AllMids, Bbo, Candle, Channel, L2Book, Notification, OrderUpdate, Trade,
    UserFills,
};
use serde_json::Value;

/// 디코딩된 채널 메시지.
///
/// 리스너는 구독 시 자신의 채널에 맞는 변형만 받습니다.
/// 형태가 자주 바뀌는 사용자 집계 채널은 원본 JSON으로 전달합니다.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// 같은 코인의 체결 묶음
    Trades(Vec<Trade>),
    L2Book(L2Book),
    Candle(Candle),
    AllMids(AllMids),
    Bbo(Bbo),
    ActiveAssetCtx(ActiveAssetCtx),
    Notification(Notification),
    OrderUpdates(Vec<OrderUpdate>),
    UserFills(UserFills),
    UserEvents(Value),
    UserFundings(Value),
    UserNonFundingLedgerUpdates(Value),
    WebData2(Value),
}

impl ChannelEvent {
    /// 이벤트가 수신된 채널.
    pub fn channel(&self) -> Channel {
        match self {
            ChannelEvent::Trades(_) => Channel::Trades,
            ChannelEvent::L2Book(_) => Channel::L2Book,
            ChannelEvent::Candle(_) => Channel::Candle,
            ChannelEvent::AllMids(_) => Channel::AllMids,
            ChannelEvent::Bbo(_) => Channel::Bbo,
            ChannelEvent::ActiveAssetCtx(_) => Channel::ActiveAssetCtx,
            ChannelEvent::Notification(_) => Channel::Notification,
            ChannelEvent::OrderUpdates(_) => Channel::OrderUpdates,
            ChannelEvent::UserFills(_) => Channel::UserFills,
            ChannelEvent::UserEvents(_) => Channel::UserEvents,
            ChannelEvent::UserFundings(_) => Channel::UserFundings,
            ChannelEvent::UserNonFundingLedgerUpdates(_) => Channel::UserNonFundingLedgerUpdates,
            ChannelEvent::WebData2(_) => Channel::WebData2,
        }
    }

    /// 페이로드가 되돌려 준 사용자 주소. 대부분의 사용자 채널은 주소를 싣지 않습니다.
    pub fn echoed_user(&self) -> Option<&str> {
        match self {
            ChannelEvent::UserFills(fills) => fills.user.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_channel() {
        assert_eq!(ChannelEvent::Trades(vec![]).channel(), Channel::Trades);
        assert_eq!(
            ChannelEvent::UserEvents(Value::Null).channel().as_str(),
            "user"
        );
    }

    #[test]
    fn test_echoed_user() {
        let fills = UserFills {
            is_snapshot: false,
            user: Some("0xAbC".into()),
            fills: vec![],
        };
        assert_eq!(ChannelEvent::UserFills(fills).echoed_user(), Some("0xAbC"));
        assert!(ChannelEvent::OrderUpdates(vec![]).echoed_user().is_none());
    }
}
