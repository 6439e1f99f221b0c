//! 와이어 봉투와 명령 프레임.
//!
//! 수신: `{"channel": "...", "data": <raw>}`
//! 송신: `{"method": "subscribe" | "unsubscribe" | "ping", "subscription": <payload>?}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Channel, CoreError, CoreResult};

/// 연결 직후 서버가 보내는 안내 텍스트 (JSON 아님).
pub const CONNECTION_ESTABLISHED: &str = "Websocket connection established.";

/// 수신 메시지 봉투.
///
/// 채널 이름은 문자열 그대로 보관합니다. 알 수 없는 채널도 디코딩은 성공해야
/// 라우팅 단계에서 로그를 남기고 버릴 수 있습니다.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub channel: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// 텍스트 프레임을 봉투로 파싱합니다.
    pub fn parse(text: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// 채널 이름을 알려진 채널로 해석합니다.
    pub fn known_channel(&self) -> CoreResult<Channel> {
        self.channel.parse()
    }

    /// 페이로드를 지정한 타입으로 디코딩합니다.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> CoreResult<T> {
        T::deserialize(&self.data).map_err(CoreError::from)
    }
}

/// 송신 명령 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Subscribe,
    Unsubscribe,
    Ping,
}

/// 송신 명령 프레임.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WsCommand {
    pub method: Method,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Value>,
}

impl WsCommand {
    /// 구독 명령.
    pub fn subscribe<S: Serialize>(payload: &S) -> CoreResult<Self> {
        Ok(Self {
            method: Method::Subscribe,
            subscription: Some(serde_json::to_value(payload)?),
        })
    }

    /// 구독 해제 명령.
    pub fn unsubscribe<S: Serialize>(payload: &S) -> CoreResult<Self> {
        Ok(Self {
            method: Method::Unsubscribe,
            subscription: Some(serde_json::to_value(payload)?),
        })
    }

    /// ping 명령.
    pub fn ping() -> Self {
        Self {
            method: Method::Ping,
            subscription: None,
        }
    }

    /// 텍스트 프레임으로 직렬화합니다.
    pub fn to_frame(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_envelope() {
        let env = Envelope::parse(r#"{"channel":"trades","data":[{"coin":"BTC"}]}"#).unwrap();
        assert_eq!(env.channel, "trades");
        assert_eq!(env.known_channel().unwrap(), Channel::Trades);
        assert!(env.data.is_array());
    }

    #[test]
    fn test_envelope_without_data() {
        let env = Envelope::parse(r#"{"channel":"pong"}"#).unwrap();
        assert_eq!(env.known_channel().unwrap(), Channel::Pong);
        assert!(env.data.is_null());
    }

    #[test]
    fn test_envelope_unknown_channel_still_parses() {
        let env = Envelope::parse(r#"{"channel":"mystery","data":{}}"#).unwrap();
        assert!(env.known_channel().is_err());
    }

    #[test]
    fn test_command_frames() {
        let sub = WsCommand::subscribe(&json!({"type": "trades", "coin": "BTC"})).unwrap();
        assert_eq!(
            serde_json::to_value(&sub).unwrap(),
            json!({"method": "subscribe", "subscription": {"type": "trades", "coin": "BTC"}})
        );

        let ping = WsCommand::ping().to_frame().unwrap();
        assert_eq!(ping, r#"{"method":"ping"}"#);
    }
}
