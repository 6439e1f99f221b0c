//! 구독 요청과 정규 구독 키.
//!
//! 같은 업스트림 구독을 가리키는 요청은 항상 같은 [`SubscriptionKey`]를 만듭니다.
//! 키는 채널 이름과 식별 필드(코인, 간격, 사용자, dex)를 `:`로 이어 붙인 문자열이며,
//! 호가 유효숫자(`nSigFigs`), `mantissa`, `aggregateByTime` 같은 표현 옵션은 포함하지 않습니다.

use std::fmt;

use hl_core::{CandleInterval, Channel};
use serde::{Deserialize, Serialize};

use crate::{StreamError, StreamResult};

const KEY_SEPARATOR: char = ':';

/// 정규 구독 키.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    fn build(channel: Channel, parts: &[&str]) -> Self {
        let mut key = String::from(channel.as_str());
        for part in parts {
            key.push(KEY_SEPARATOR);
            key.push_str(part);
        }
        Self(key)
    }

    /// 코인 단위 채널 키 (`trades:BTC`, `l2Book:ETH` ...).
    pub fn for_coin(channel: Channel, coin: &str) -> Self {
        Self::build(channel, &[coin])
    }

    /// 캔들 키 (`candle:BTC:1m`).
    pub fn for_candle(coin: &str, interval: &str) -> Self {
        Self::build(Channel::Candle, &[coin, interval])
    }

    /// 전체 중간가 키. 기본 DEX면 `allMids`, 빌더 DEX면 `allMids:<dex>`.
    pub fn for_all_mids(dex: Option<&str>) -> Self {
        match dex {
            Some(dex) if !dex.is_empty() => Self::build(Channel::AllMids, &[dex]),
            _ => Self::build(Channel::AllMids, &[]),
        }
    }

    /// 사용자 단위 채널 키. 주소는 대소문자를 구분하지 않으므로 소문자로 정규화합니다.
    pub fn for_user(channel: Channel, user: &str) -> Self {
        let user = normalize_user(user);
        Self::build(channel, &[user.as_str()])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 사용자 주소 정규화.
pub fn normalize_user(user: &str) -> String {
    user.to_ascii_lowercase()
}

/// 업스트림 구독 요청.
///
/// 직렬화 결과가 그대로 `{"method":"subscribe","subscription":...}`의 페이로드가 됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Subscription {
    /// 체결
    Trades { coin: String },
    /// L2 호가
    L2Book {
        coin: String,
        #[serde(rename = "nSigFigs", default, skip_serializing_if = "Option::is_none")]
        n_sig_figs: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mantissa: Option<u32>,
    },
    /// 캔들
    Candle {
        coin: String,
        interval: CandleInterval,
    },
    /// 전체 중간가
    AllMids {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dex: Option<String>,
    },
    /// 최우선 호가
    Bbo { coin: String },
    /// 자산 컨텍스트
    ActiveAssetCtx { coin: String },
    /// 사용자 알림
    Notification { user: String },
    /// 주문 상태 업데이트
    OrderUpdates { user: String },
    /// 사용자 체결
    UserFills {
        user: String,
        #[serde(
            rename = "aggregateByTime",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        aggregate_by_time: Option<bool>,
    },
    /// 사용자 이벤트 (수신 채널은 `user`)
    UserEvents { user: String },
    /// 펀딩 정산
    UserFundings { user: String },
    /// 펀딩 외 원장 변경
    UserNonFundingLedgerUpdates { user: String },
    /// 웹 대시보드 집계
    WebData2 { user: String },
}

impl Subscription {
    pub fn trades(coin: impl Into<String>) -> Self {
        Subscription::Trades { coin: coin.into() }
    }

    pub fn l2_book(coin: impl Into<String>) -> Self {
        Subscription::L2Book {
            coin: coin.into(),
            n_sig_figs: None,
            mantissa: None,
        }
    }

    pub fn candle(coin: impl Into<String>, interval: CandleInterval) -> Self {
        Subscription::Candle {
            coin: coin.into(),
            interval,
        }
    }

    pub fn all_mids() -> Self {
        Subscription::AllMids { dex: None }
    }

    pub fn all_mids_for_dex(dex: impl Into<String>) -> Self {
        Subscription::AllMids {
            dex: Some(dex.into()),
        }
    }

    pub fn bbo(coin: impl Into<String>) -> Self {
        Subscription::Bbo { coin: coin.into() }
    }

    pub fn active_asset_ctx(coin: impl Into<String>) -> Self {
        Subscription::ActiveAssetCtx { coin: coin.into() }
    }

    pub fn notification(user: impl Into<String>) -> Self {
        Subscription::Notification { user: user.into() }
    }

    pub fn order_updates(user: impl Into<String>) -> Self {
        Subscription::OrderUpdates { user: user.into() }
    }

    pub fn user_fills(user: impl Into<String>) -> Self {
        Subscription::UserFills {
            user: user.into(),
            aggregate_by_time: None,
        }
    }

    pub fn user_events(user: impl Into<String>) -> Self {
        Subscription::UserEvents { user: user.into() }
    }

    pub fn user_fundings(user: impl Into<String>) -> Self {
        Subscription::UserFundings { user: user.into() }
    }

    pub fn user_non_funding_ledger_updates(user: impl Into<String>) -> Self {
        Subscription::UserNonFundingLedgerUpdates { user: user.into() }
    }

    pub fn web_data2(user: impl Into<String>) -> Self {
        Subscription::WebData2 { user: user.into() }
    }

    /// 호가 유효숫자 지정. L2 호가 외에는 무시됩니다.
    pub fn with_n_sig_figs(mut self, value: u32) -> Self {
        if let Subscription::L2Book { n_sig_figs, .. } = &mut self {
            *n_sig_figs = Some(value);
        }
        self
    }

    /// 호가 mantissa 지정. L2 호가 외에는 무시됩니다.
    pub fn with_mantissa(mut self, value: u32) -> Self {
        if let Subscription::L2Book { mantissa, .. } = &mut self {
            *mantissa = Some(value);
        }
        self
    }

    /// 체결 시간 단위 집계 여부. 사용자 체결 외에는 무시됩니다.
    pub fn with_aggregate_by_time(mut self, value: bool) -> Self {
        if let Subscription::UserFills {
            aggregate_by_time, ..
        } = &mut self
        {
            *aggregate_by_time = Some(value);
        }
        self
    }

    /// 이 구독의 메시지가 도착하는 수신 채널.
    pub fn channel(&self) -> Channel {
        match self {
            Subscription::Trades { .. } => Channel::Trades,
            Subscription::L2Book { .. } => Channel::L2Book,
            Subscription::Candle { .. } => Channel::Candle,
            Subscription::AllMids { .. } => Channel::AllMids,
            Subscription::Bbo { .. } => Channel::Bbo,
            Subscription::ActiveAssetCtx { .. } => Channel::ActiveAssetCtx,
            Subscription::Notification { .. } => Channel::Notification,
            Subscription::OrderUpdates { .. } => Channel::OrderUpdates,
            Subscription::UserFills { .. } => Channel::UserFills,
            Subscription::UserEvents { .. } => Channel::UserEvents,
            Subscription::UserFundings { .. } => Channel::UserFundings,
            Subscription::UserNonFundingLedgerUpdates { .. } => {
                Channel::UserNonFundingLedgerUpdates
            }
            Subscription::WebData2 { .. } => Channel::WebData2,
        }
    }

    /// 코인 (코인 단위 구독인 경우).
    pub fn coin(&self) -> Option<&str> {
        match self {
            Subscription::Trades { coin }
            | Subscription::L2Book { coin, .. }
            | Subscription::Candle { coin, .. }
            | Subscription::Bbo { coin }
            | Subscription::ActiveAssetCtx { coin } => Some(coin),
            _ => None,
        }
    }

    /// 사용자 주소 (사용자 단위 구독인 경우).
    pub fn user(&self) -> Option<&str> {
        match self {
            Subscription::Notification { user }
            | Subscription::OrderUpdates { user }
            | Subscription::UserFills { user, .. }
            | Subscription::UserEvents { user }
            | Subscription::UserFundings { user }
            | Subscription::UserNonFundingLedgerUpdates { user }
            | Subscription::WebData2 { user } => Some(user),
            _ => None,
        }
    }

    /// 정규 구독 키.
    pub fn key(&self) -> SubscriptionKey {
        match self {
            Subscription::Candle { coin, interval } => {
                SubscriptionKey::for_candle(coin, interval.as_str())
            }
            Subscription::AllMids { dex } => SubscriptionKey::for_all_mids(dex.as_deref()),
            other => {
                let channel = other.channel();
                match (other.coin(), other.user()) {
                    (Some(coin), _) => SubscriptionKey::for_coin(channel, coin),
                    (None, Some(user)) => SubscriptionKey::for_user(channel, user),
                    (None, None) => SubscriptionKey::build(channel, &[]),
                }
            }
        }
    }

    /// 식별 필드가 비어 있지 않은지 검증합니다.
    pub fn validate(&self) -> StreamResult<()> {
        if let Some(coin) = self.coin() {
            if coin.trim().is_empty() {
                return Err(StreamError::InvalidSubscription(format!(
                    "{}: coin is empty",
                    self.channel()
                )));
            }
        }
        if let Some(user) = self.user() {
            if user.trim().is_empty() {
                return Err(StreamError::InvalidSubscription(format!(
                    "{}: user is empty",
                    self.channel()
                )));
            }
        }
        if let Subscription::AllMids { dex: Some(dex) } = self {
            if dex.trim().is_empty() {
                return Err(StreamError::InvalidSubscription(
                    "allMids: dex is empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_key_formats() {
        assert_eq!(Subscription::trades("BTC").key().as_str(), "trades:BTC");
        assert_eq!(Subscription::l2_book("ETH").key().as_str(), "l2Book:ETH");
        assert_eq!(
            Subscription::candle("SOL", CandleInterval::M15).key().as_str(),
            "candle:SOL:15m"
        );
        assert_eq!(Subscription::all_mids().key().as_str(), "allMids");
        assert_eq!(
            Subscription::all_mids_for_dex("test").key().as_str(),
            "allMids:test"
        );
        assert_eq!(
            Subscription::user_events("0xAB").key().as_str(),
            "user:0xab"
        );
    }

    #[test]
    fn test_presentation_fields_excluded_from_key() {
        let plain = Subscription::l2_book("BTC");
        let tuned = Subscription::l2_book("BTC")
            .with_n_sig_figs(5)
            .with_mantissa(2);
        assert_ne!(plain, tuned);
        assert_eq!(plain.key(), tuned.key());

        let fills = Subscription::user_fills("0x1").with_aggregate_by_time(true);
        assert_eq!(fills.key(), Subscription::user_fills("0x1").key());
    }

    #[test]
    fn test_interval_distinguishes_candle_keys() {
        let m1 = Subscription::candle("BTC", CandleInterval::M1).key();
        let mn1 = Subscription::candle("BTC", CandleInterval::MN1).key();
        assert_ne!(m1, mn1);
    }

    #[test]
    fn test_request_payloads() {
        let sub = Subscription::l2_book("BTC").with_n_sig_figs(3);
        assert_eq!(
            serde_json::to_value(&sub).unwrap(),
            json!({"type": "l2Book", "coin": "BTC", "nSigFigs": 3})
        );

        let sub = Subscription::candle("ETH", CandleInterval::H1);
        assert_eq!(
            serde_json::to_value(&sub).unwrap(),
            json!({"type": "candle", "coin": "ETH", "interval": "1h"})
        );

        assert_eq!(
            serde_json::to_value(Subscription::all_mids()).unwrap(),
            json!({"type": "allMids"})
        );

        let sub = Subscription::user_non_funding_ledger_updates("0x1");
        assert_eq!(
            serde_json::to_value(&sub).unwrap(),
            json!({"type": "userNonFundingLedgerUpdates", "user": "0x1"})
        );
    }

    #[test]
    fn test_user_events_receives_on_user_channel() {
        let sub: Subscription =
            serde_json::from_value(json!({"type": "userEvents", "user": "0x1"})).unwrap();
        assert_eq!(sub.channel(), Channel::UserEvents);
        assert_eq!(sub.channel().as_str(), "user");
    }

    #[test]
    fn test_validate() {
        assert!(Subscription::trades("BTC").validate().is_ok());
        assert!(Subscription::all_mids().validate().is_ok());

        let err = Subscription::trades("").validate().unwrap_err();
        assert!(err.is_protocol_misuse());
        assert!(Subscription::order_updates("  ").validate().is_err());
        assert!(Subscription::all_mids_for_dex("").validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_book_key_ignores_presentation(
            coin in "[A-Za-z0-9@]{1,8}",
            sig in proptest::option::of(2u32..6),
            mantissa in proptest::option::of(1u32..6),
        ) {
            let mut sub = Subscription::l2_book(coin.clone());
            if let Some(s) = sig { sub = sub.with_n_sig_figs(s); }
            if let Some(m) = mantissa { sub = sub.with_mantissa(m); }
            prop_assert_eq!(sub.key(), Subscription::l2_book(coin).key());
        }

        #[test]
        fn prop_user_key_case_insensitive(user in "0x[0-9a-fA-F]{8}") {
            let upper = Subscription::order_updates(user.to_uppercase()).key();
            let lower = Subscription::order_updates(user.to_lowercase()).key();
            prop_assert_eq!(upper, lower);
        }

        #[test]
        fn prop_distinct_coins_distinct_keys(a in "[A-Z]{1,6}", b in "[A-Z]{1,6}") {
            prop_assume!(a != b);
            prop_assert_ne!(Subscription::trades(a).key(), Subscription::trades(b).key());
        }
    }
}
