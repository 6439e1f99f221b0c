//! 시장 데이터 채널 페이로드.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::millis_to_datetime;

/// 체결/주문 방향. 와이어 표기 `A`(매도) / `B`(매수).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "A")]
    Ask,
    #[serde(rename = "B")]
    Bid,
}

/// `trades` 채널의 단일 체결.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub coin: String,
    pub side: Side,
    pub px: Decimal,
    pub sz: Decimal,
    pub time: i64,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub tid: u64,
    /// [매수자, 매도자] 주소
    #[serde(default)]
    pub users: Vec<String>,
}

impl Trade {
    /// 체결 시각.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.time)
    }

    /// 체결 금액 (가격 × 수량).
    pub fn notional(&self) -> Decimal {
        self.px * self.sz
    }
}

/// 호가 단계.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub px: Decimal,
    pub sz: Decimal,
    /// 해당 가격의 주문 수
    pub n: u32,
}

/// `l2Book` 채널 스냅샷. `levels[0]`은 매수, `levels[1]`은 매도.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L2Book {
    pub coin: String,
    pub levels: Vec<Vec<BookLevel>>,
    pub time: i64,
}

impl L2Book {
    /// 매수 호가 (높은 가격 순).
    pub fn bids(&self) -> &[BookLevel] {
        self.levels.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// 매도 호가 (낮은 가격 순).
    pub fn asks(&self) -> &[BookLevel] {
        self.levels.get(1).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 최우선 매수/매도 호가의 중간값.
    pub fn mid(&self) -> Option<Decimal> {
        let bid = self.bids().first()?.px;
        let ask = self.asks().first()?.px;
        Some((bid + ask) / Decimal::TWO)
    }

    /// 스프레드 (최우선 매도 - 최우선 매수).
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.asks().first()?.px - self.bids().first()?.px)
    }
}

/// `bbo` 채널. 한쪽 호가가 비어 있으면 `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bbo {
    pub coin: String,
    pub time: i64,
    pub bbo: [Option<BookLevel>; 2],
}

impl Bbo {
    pub fn bid(&self) -> Option<&BookLevel> {
        self.bbo[0].as_ref()
    }

    pub fn ask(&self) -> Option<&BookLevel> {
        self.bbo[1].as_ref()
    }
}

/// `candle` 채널의 캔들.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// 시작 시각 (ms)
    #[serde(rename = "t")]
    pub open_time: i64,
    /// 종료 시각 (ms)
    #[serde(rename = "T")]
    pub close_time: i64,
    /// 심볼
    #[serde(rename = "s")]
    pub symbol: String,
    /// 간격 문자열. 라우팅 키에 그대로 사용되므로 문자열로 보관
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "v")]
    pub volume: Decimal,
    /// 체결 건수
    #[serde(rename = "n", default)]
    pub num_trades: u64,
}

impl Candle {
    pub fn open_timestamp(&self) -> Option<DateTime<Utc>> {
        millis_to_datetime(self.open_time)
    }
}

/// 캔들 페이로드. 업스트림은 단일 객체를 보내지만 배열도 허용합니다.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CandleBatch {
    Many(Vec<Candle>),
    One(Candle),
}

impl CandleBatch {
    pub fn into_vec(self) -> Vec<Candle> {
        match self {
            CandleBatch::Many(candles) => candles,
            CandleBatch::One(candle) => vec![candle],
        }
    }
}

/// `allMids` 채널. 코인 → 중간가.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllMids {
    pub mids: BTreeMap<String, Decimal>,
    /// 빌더 배포 DEX 이름 (기본 DEX면 없음)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dex: Option<String>,
}

impl AllMids {
    pub fn get(&self, coin: &str) -> Option<Decimal> {
        self.mids.get(coin).copied()
    }
}

/// `activeAssetCtx` 채널. 무기한/현물에 따라 `ctx` 형태가 달라 원본 JSON으로 보관합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAssetCtx {
    pub coin: String,
    pub ctx: Value,
}

impl ActiveAssetCtx {
    /// 마크 가격 (있는 경우).
    pub fn mark_px(&self) -> Option<Decimal> {
        self.ctx.get("markPx")?.as_str()?.parse().ok()
    }
}
