//! 실시간 스트림 뷰어 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # BTC 체결 스트림
//! hl trades BTC
//!
//! # 유효숫자 5자리 ETH 호가, JSON 출력, 60초 후 종료
//! hl --json --duration 60 book ETH --sig-figs 5
//!
//! # 테스트넷 SOL 1분봉
//! hl --testnet candles SOL -i 1m
//!
//! # 주문 상태 업데이트
//! hl orders 0x0000000000000000000000000000000000000000
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hl_core::{init_logging, AppConfig, CandleInterval, LogConfig, Network};
use hl_stream::StreamClient;
use tracing::debug;

mod commands;

use commands::stream::{run, OutputOptions, StreamTarget};

#[derive(Parser)]
#[command(name = "hl")]
#[command(about = "Hyperliquid WebSocket 스트림 뷰어", long_about = None)]
#[command(version)]
struct Cli {
    /// 설정 파일 경로 (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 테스트넷에 연결
    #[arg(long, global = true)]
    testnet: bool,

    /// 페이로드를 JSON으로 출력
    #[arg(long, global = true)]
    json: bool,

    /// 지정 시간(초) 후 종료
    #[arg(short, long, global = true)]
    duration: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 체결 스트림
    Trades {
        /// 코인 (예: BTC, ETH, @107)
        coin: String,
    },

    /// L2 호가 스트림
    Book {
        /// 코인
        coin: String,

        /// 가격 유효숫자 (2-5)
        #[arg(long)]
        sig_figs: Option<u32>,
    },

    /// 캔들 스트림
    Candles {
        /// 코인
        coin: String,

        /// 간격 (1m, 3m, 5m, 15m, 30m, 1h, 2h, 4h, 8h, 12h, 1d, 3d, 1w, 1M)
        #[arg(short, long, default_value = "1m")]
        interval: String,
    },

    /// 전체 중간가 스트림
    Mids {
        /// 빌더 배포 DEX 이름
        #[arg(long)]
        dex: Option<String>,
    },

    /// 최우선 호가 스트림
    Bbo {
        /// 코인
        coin: String,
    },

    /// 자산 컨텍스트 스트림 (마크 가격, 펀딩 등)
    AssetCtx {
        /// 코인
        coin: String,
    },

    /// 주문 상태 업데이트
    Orders {
        /// 사용자 주소
        user: String,
    },

    /// 사용자 체결
    Fills {
        /// 사용자 주소
        user: String,
    },

    /// 사용자 알림
    Notifications {
        /// 사용자 주소
        user: String,
    },
}

impl Commands {
    fn into_target(self) -> Result<StreamTarget> {
        Ok(match self {
            Commands::Trades { coin } => StreamTarget::Trades(coin),
            Commands::Book { coin, sig_figs } => StreamTarget::Book {
                coin,
                n_sig_figs: sig_figs,
            },
            Commands::Candles { coin, interval } => StreamTarget::Candles {
                coin,
                interval: interval.parse::<CandleInterval>()?,
            },
            Commands::Mids { dex } => StreamTarget::Mids(dex),
            Commands::Bbo { coin } => StreamTarget::Bbo(coin),
            Commands::AssetCtx { coin } => StreamTarget::AssetCtx(coin),
            Commands::Orders { user } => StreamTarget::Orders(user),
            Commands::Fills { user } => StreamTarget::Fills(user),
            Commands::Notifications { user } => StreamTarget::Notifications(user),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if cli.testnet {
        config.stream.network = Network::Testnet;
    }

    // 이벤트 출력은 stdout, 로그는 stderr로 분리
    init_logging(LogConfig::from(&config.logging))
        .map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;
    debug!(?config, "설정 로드 완료");

    let target = cli.command.into_target()?;
    let client = StreamClient::new(config.stream)?;

    run(
        client,
        target,
        OutputOptions {
            json: cli.json,
            duration: cli.duration,
        },
    )
    .await
}
