//! 사용자 단위 채널 페이로드.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;

/// 주문 업데이트 안의 주문 정보.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicOrder {
    pub coin: String,
    pub side: Side,
    pub limit_px: Decimal,
    pub sz: Decimal,
    pub oid: u64,
    pub timestamp: i64,
    pub orig_sz: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloid: Option<String>,
}

/// `orderUpdates` 채널 항목. 사용자 주소는 포함되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderUpdate {
    pub order: BasicOrder,
    /// open, filled, canceled, triggered, rejected, marginCanceled ...
    pub status: String,
    pub status_timestamp: i64,
}

impl OrderUpdate {
    pub fn is_terminal(&self) -> bool {
        self.status != "open" && self.status != "triggered"
    }
}

/// `notification` 채널.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub notification: String,
}

/// 사용자 체결.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    pub coin: String,
    pub px: Decimal,
    pub sz: Decimal,
    pub side: Side,
    pub time: i64,
    #[serde(default)]
    pub start_position: Option<Decimal>,
    #[serde(default)]
    pub dir: String,
    #[serde(default)]
    pub closed_pnl: Option<Decimal>,
    #[serde(default)]
    pub hash: String,
    pub oid: u64,
    #[serde(default)]
    pub crossed: bool,
    #[serde(default)]
    pub fee: Option<Decimal>,
    #[serde(default)]
    pub tid: u64,
    #[serde(default)]
    pub fee_token: Option<String>,
}

/// `userFills` 채널. 다른 사용자 채널과 달리 주소를 되돌려 줍니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFills {
    /// 구독 직후 첫 메시지는 과거 체결 스냅샷
    #[serde(default)]
    pub is_snapshot: bool,
    #[serde(default)]
    pub user: Option<String>,
    pub fills: Vec<Fill>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decode_order_updates() {
        let json = r#"[{"order":{"coin":"BTC","side":"A","limitPx":"70000","sz":"0.0",
            "oid":7,"timestamp":1,"origSz":"0.5"},"status":"filled","statusTimestamp":2}]"#;
        let updates: Vec<OrderUpdate> = serde_json::from_str(json).unwrap();
        assert_eq!(updates[0].order.orig_sz, dec!(0.5));
        assert!(updates[0].is_terminal());
    }

    #[test]
    fn test_decode_user_fills() {
        let json = r#"{"isSnapshot":true,"user":"0xAbC","fills":[{"coin":"ETH","px":"3000",
            "sz":"1","side":"B","time":1,"oid":9,"dir":"Open Long","closedPnl":"0","fee":"0.3"}]}"#;
        let fills: UserFills = serde_json::from_str(json).unwrap();
        assert!(fills.is_snapshot);
        assert_eq!(fills.user.as_deref(), Some("0xAbC"));
        assert_eq!(fills.fills[0].fee, Some(dec!(0.3)));
    }
}
