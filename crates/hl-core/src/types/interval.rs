//! 캔들 구독 간격.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// 업스트림이 지원하는 캔들 간격.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CandleInterval {
    /// 1분봉
    M1,
    /// 3분봉
    M3,
    /// 5분봉
    M5,
    /// 15분봉
    M15,
    /// 30분봉
    M30,
    /// 1시간봉
    H1,
    /// 2시간봉
    H2,
    /// 4시간봉
    H4,
    /// 8시간봉
    H8,
    /// 12시간봉
    H12,
    /// 일봉
    D1,
    /// 3일봉
    D3,
    /// 주봉
    W1,
    /// 월봉
    MN1,
}

impl CandleInterval {
    pub const ALL: [CandleInterval; 14] = [
        CandleInterval::M1,
        CandleInterval::M3,
        CandleInterval::M5,
        CandleInterval::M15,
        CandleInterval::M30,
        CandleInterval::H1,
        CandleInterval::H2,
        CandleInterval::H4,
        CandleInterval::H8,
        CandleInterval::H12,
        CandleInterval::D1,
        CandleInterval::D3,
        CandleInterval::W1,
        CandleInterval::MN1,
    ];

    /// 와이어 문자열 (`1m`, `1h`, `1M` ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleInterval::M1 => "1m",
            CandleInterval::M3 => "3m",
            CandleInterval::M5 => "5m",
            CandleInterval::M15 => "15m",
            CandleInterval::M30 => "30m",
            CandleInterval::H1 => "1h",
            CandleInterval::H2 => "2h",
            CandleInterval::H4 => "4h",
            CandleInterval::H8 => "8h",
            CandleInterval::H12 => "12h",
            CandleInterval::D1 => "1d",
            CandleInterval::D3 => "3d",
            CandleInterval::W1 => "1w",
            CandleInterval::MN1 => "1M",
        }
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandleInterval {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "1m"과 "1M"은 대소문자로만 구분되므로 정확히 일치해야 함
        CandleInterval::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| CoreError::InvalidInput(format!("Invalid candle interval: {}", s)))
    }
}

impl Serialize for CandleInterval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CandleInterval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_parse() {
        assert_eq!("15m".parse::<CandleInterval>().unwrap(), CandleInterval::M15);
        assert_eq!("1M".parse::<CandleInterval>().unwrap(), CandleInterval::MN1);
        assert_eq!("1m".parse::<CandleInterval>().unwrap(), CandleInterval::M1);
        assert!("6h".parse::<CandleInterval>().is_err());
    }

    #[test]
    fn test_interval_serde() {
        let json = serde_json::to_string(&CandleInterval::H1).unwrap();
        assert_eq!(json, "\"1h\"");
        let parsed: CandleInterval = serde_json::from_str("\"3d\"").unwrap();
        assert_eq!(parsed, CandleInterval::D3);
    }
}
