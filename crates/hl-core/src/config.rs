//! 설정 관리.
//!
//! 기본값 → (선택) TOML 파일 → `HL__` 접두사 환경 변수 순으로 덮어씁니다.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::{CoreError, CoreResult};

/// 메인넷 REST 기본 URL.
pub const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";
/// 테스트넷 REST 기본 URL.
pub const TESTNET_API_URL: &str = "https://api.hyperliquid-testnet.xyz";

/// 접속 네트워크.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn api_url(&self) -> &'static str {
        match self {
            Network::Mainnet => MAINNET_API_URL,
            Network::Testnet => TESTNET_API_URL,
        }
    }
}

/// REST 기본 URL에서 WebSocket URL을 만듭니다 (`https://host` → `wss://host/ws`).
///
/// 경로, 쿼리, 프래그먼트는 버립니다.
pub fn ws_url_from_api(api_url: &str) -> CoreResult<String> {
    let mut url = Url::parse(api_url)?;

    let ws_scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(CoreError::Config(format!("unsupported scheme: {}", other))),
    };
    if url.host_str().map_or(true, str::is_empty) {
        return Err(CoreError::Config(format!("missing host: {}", api_url)));
    }

    url.set_scheme(ws_scheme)
        .map_err(|_| CoreError::Config(format!("cannot use {} scheme: {}", ws_scheme, api_url)))?;
    url.set_path("/ws");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

/// WebSocket URL 검증 (`ws`/`wss` 스킴과 호스트 필수).
fn validate_ws_url(ws_url: &str) -> CoreResult<()> {
    let url = Url::parse(ws_url)?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(CoreError::Config(format!("ws_url must use ws or wss: {}", ws_url)));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(CoreError::Config(format!("missing host: {}", ws_url)));
    }
    Ok(())
}

/// 스트림 연결 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// 접속 네트워크
    #[serde(default)]
    pub network: Network,
    /// WebSocket URL 직접 지정 (지정 시 `network` 무시)
    #[serde(default)]
    pub ws_url: Option<String>,
    /// ping 전송 간격 (초)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// 수신 프레임이 이 시간 동안 없으면 연결을 끊고 재연결 (초)
    #[serde(default = "default_read_idle_timeout")]
    pub read_idle_timeout_secs: u64,
    /// 연결 수립 타임아웃 (초)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// 재연결 초기 대기 시간 (밀리초)
    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_delay_ms: u64,
    /// 재연결 최대 대기 시간 (초)
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_delay_secs: u64,
    /// 연결 이벤트 브로드캐스트 버퍼 크기
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_ping_interval() -> u64 {
    50
}
fn default_read_idle_timeout() -> u64 {
    120
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_reconnect_initial() -> u64 {
    1000
}
fn default_reconnect_max() -> u64 {
    60
}
fn default_event_buffer() -> usize {
    64
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            ws_url: None,
            ping_interval_secs: default_ping_interval(),
            read_idle_timeout_secs: default_read_idle_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            reconnect_initial_delay_ms: default_reconnect_initial(),
            reconnect_max_delay_secs: default_reconnect_max(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl StreamConfig {
    /// 지정한 네트워크용 기본 설정.
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            ..Default::default()
        }
    }

    /// WebSocket URL을 고정합니다.
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// 실제 접속할 WebSocket URL.
    pub fn resolve_ws_url(&self) -> CoreResult<String> {
        match &self.ws_url {
            Some(url) => Ok(url.clone()),
            None => ws_url_from_api(self.network.api_url()),
        }
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn read_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.read_idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_delay_secs)
    }

    /// 설정값 검증.
    pub fn validate(&self) -> CoreResult<()> {
        if self.ping_interval_secs == 0 {
            return Err(CoreError::Config("ping_interval_secs must be > 0".into()));
        }
        if self.read_idle_timeout_secs <= self.ping_interval_secs {
            return Err(CoreError::Config(
                "read_idle_timeout_secs must exceed ping_interval_secs".into(),
            ));
        }
        if self.reconnect_initial_delay() > self.reconnect_max_delay() {
            return Err(CoreError::Config(
                "reconnect_initial_delay_ms exceeds reconnect_max_delay_secs".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(CoreError::Config("event_buffer must be > 0".into()));
        }
        if let Some(ws_url) = &self.ws_url {
            validate_ws_url(ws_url)?;
        }
        Ok(())
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨 필터
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 파일(선택)과 환경 변수에서 설정을 로드합니다.
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let mut builder = config::Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.format", "compact")?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("HL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = config.try_deserialize()?;
        app.stream.validate()?;
        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_from_api() {
        assert_eq!(
            ws_url_from_api("https://api.hyperliquid.xyz").unwrap(),
            "wss://api.hyperliquid.xyz/ws"
        );
        assert_eq!(
            ws_url_from_api("http://localhost:3001/info").unwrap(),
            "ws://localhost:3001/ws"
        );
        assert!(ws_url_from_api("api.hyperliquid.xyz").is_err());
        assert!(ws_url_from_api("ftp://host").is_err());
    }

    #[test]
    fn test_ws_url_drops_query_and_fragment() {
        assert_eq!(
            ws_url_from_api("https://api.hyperliquid.xyz?x=1").unwrap(),
            "wss://api.hyperliquid.xyz/ws"
        );
        assert_eq!(
            ws_url_from_api("https://api.hyperliquid.xyz/info?x=1#top").unwrap(),
            "wss://api.hyperliquid.xyz/ws"
        );
        assert_eq!(
            ws_url_from_api("http://127.0.0.1:8080").unwrap(),
            "ws://127.0.0.1:8080/ws"
        );
    }

    #[test]
    fn test_invalid_ws_url_override() {
        let config = StreamConfig::default().with_ws_url("https://api.hyperliquid.xyz/ws");
        assert!(config.validate().is_err());

        let config = StreamConfig::default().with_ws_url("not a url");
        assert!(config.validate().is_err());

        let config = StreamConfig::default().with_ws_url("wss://api.hyperliquid.xyz/ws");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_ws_url() {
        let config = StreamConfig::for_network(Network::Testnet);
        assert_eq!(
            config.resolve_ws_url().unwrap(),
            "wss://api.hyperliquid-testnet.xyz/ws"
        );

        let config = config.with_ws_url("ws://127.0.0.1:9000/ws");
        assert_eq!(config.resolve_ws_url().unwrap(), "ws://127.0.0.1:9000/ws");
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ping_interval().as_secs(), 50);
        assert_eq!(config.reconnect_max_delay().as_secs(), 60);
    }

    #[test]
    fn test_invalid_config() {
        let config = StreamConfig {
            read_idle_timeout_secs: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_without_file() {
        let app = AppConfig::load(None).unwrap();
        assert_eq!(app.logging.level, "info");
        assert_eq!(app.stream.network, Network::Mainnet);
    }
}
