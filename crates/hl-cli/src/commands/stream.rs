//! 실시간 스트림 출력 명령.

use std::time::Duration;

use anyhow::{Context, Result};
use hl_core::CandleInterval;
use hl_stream::{ChannelEvent, ConnectionEvent, StreamClient, Subscription};
use tracing::{info, warn};

/// 구독할 스트림 대상.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamTarget {
    Trades(String),
    Book {
        coin: String,
        n_sig_figs: Option<u32>,
    },
    Candles {
        coin: String,
        interval: CandleInterval,
    },
    Mids(Option<String>),
    Bbo(String),
    AssetCtx(String),
    Orders(String),
    Fills(String),
    Notifications(String),
}

impl StreamTarget {
    /// 대상별 업스트림 구독 요청.
    pub fn subscription(&self) -> Subscription {
        match self {
            StreamTarget::Trades(coin) => Subscription::trades(coin.as_str()),
            StreamTarget::Book { coin, n_sig_figs } => {
                let sub = Subscription::l2_book(coin.as_str());
                match n_sig_figs {
                    Some(n) => sub.with_n_sig_figs(*n),
                    None => sub,
                }
            }
            StreamTarget::Candles { coin, interval } => {
                Subscription::candle(coin.as_str(), *interval)
            }
            StreamTarget::Mids(dex) => Subscription::AllMids { dex: dex.clone() },
            StreamTarget::Bbo(coin) => Subscription::bbo(coin.as_str()),
            StreamTarget::AssetCtx(coin) => Subscription::active_asset_ctx(coin.as_str()),
            StreamTarget::Orders(user) => Subscription::order_updates(user.as_str()),
            StreamTarget::Fills(user) => Subscription::user_fills(user.as_str()),
            StreamTarget::Notifications(user) => Subscription::notification(user.as_str()),
        }
    }
}

/// 출력 옵션.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    /// 페이로드를 JSON 한 줄로 출력
    pub json: bool,
    /// 지정 시간(초) 후 종료
    pub duration: Option<u64>,
}

/// 이벤트를 한 줄 문자열로 변환합니다.
pub fn render(event: &ChannelEvent, json: bool) -> String {
    if json {
        return render_json(event);
    }

    match event {
        ChannelEvent::Trades(trades) => trades
            .iter()
            .map(|t| format!("[trade] {} {:?} {} @ {} (tid={})", t.coin, t.side, t.sz, t.px, t.tid))
            .collect::<Vec<_>>()
            .join("\n"),
        ChannelEvent::L2Book(book) => {
            let best = |levels: &[hl_core::BookLevel]| {
                levels
                    .first()
                    .map(|l| format!("{} x {}", l.px, l.sz))
                    .unwrap_or_else(|| "-".to_string())
            };
            format!(
                "[book] {} bid {} | ask {} | levels {}/{}",
                book.coin,
                best(book.bids()),
                best(book.asks()),
                book.bids().len(),
                book.asks().len()
            )
        }
        ChannelEvent::Candle(c) => format!(
            "[candle] {} {} o={} h={} l={} c={} v={}",
            c.symbol, c.interval, c.open, c.high, c.low, c.close, c.volume
        ),
        ChannelEvent::AllMids(mids) => {
            let dex = mids.dex.as_deref().unwrap_or("default");
            format!("[mids] {} coins (dex: {})", mids.mids.len(), dex)
        }
        ChannelEvent::Bbo(bbo) => {
            let side = |level: Option<&hl_core::BookLevel>| {
                level
                    .map(|l| format!("{} x {}", l.px, l.sz))
                    .unwrap_or_else(|| "-".to_string())
            };
            format!("[bbo] {} {} | {}", bbo.coin, side(bbo.bid()), side(bbo.ask()))
        }
        ChannelEvent::ActiveAssetCtx(ctx) => match ctx.mark_px() {
            Some(mark) => format!("[ctx] {} mark {}", ctx.coin, mark),
            None => format!("[ctx] {} {}", ctx.coin, ctx.ctx),
        },
        ChannelEvent::OrderUpdates(updates) => updates
            .iter()
            .map(|u| {
                format!(
                    "[order] {} oid={} {} {} @ {}",
                    u.order.coin, u.order.oid, u.status, u.order.sz, u.order.limit_px
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        ChannelEvent::UserFills(fills) => {
            let kind = if fills.is_snapshot { "snapshot" } else { "update" };
            format!("[fills] {} ({} fills)", kind, fills.fills.len())
        }
        ChannelEvent::Notification(n) => format!("[notification] {}", n.notification),
        other => format!("[{}] {}", other.channel(), render_json(other)),
    }
}

fn render_json(event: &ChannelEvent) -> String {
    let value = match event {
        ChannelEvent::Trades(v) => serde_json::to_string(v),
        ChannelEvent::L2Book(v) => serde_json::to_string(v),
        ChannelEvent::Candle(v) => serde_json::to_string(v),
        ChannelEvent::AllMids(v) => serde_json::to_string(v),
        ChannelEvent::Bbo(v) => serde_json::to_string(v),
        ChannelEvent::ActiveAssetCtx(v) => serde_json::to_string(v),
        ChannelEvent::Notification(v) => serde_json::to_string(v),
        ChannelEvent::OrderUpdates(v) => serde_json::to_string(v),
        ChannelEvent::UserFills(v) => serde_json::to_string(v),
        ChannelEvent::UserEvents(v)
        | ChannelEvent::UserFundings(v)
        | ChannelEvent::UserNonFundingLedgerUpdates(v)
        | ChannelEvent::WebData2(v) => serde_json::to_string(v),
    };
    value.unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
}

/// 스트림에 연결해 이벤트를 출력합니다. Ctrl-C 또는 지정 시간 경과 시 종료합니다.
pub async fn run(client: StreamClient, target: StreamTarget, options: OutputOptions) -> Result<()> {
    let mut events = client.events();

    client
        .connect()
        .await
        .with_context(|| format!("연결 실패: {}", client.url()))?;

    let subscription = target.subscription();
    let key = subscription.key();
    let json = options.json;
    let handle = client
        .subscribe(subscription, move |event| println!("{}", render(event, json)))
        .await
        .with_context(|| format!("구독 실패: {}", key))?;
    info!(subscription = %handle, "스트림 구독 시작");

    let deadline = async {
        match options.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C 수신, 종료합니다");
                break;
            }
            _ = &mut deadline => {
                info!("지정 시간 경과, 종료합니다");
                break;
            }
            event = events.recv() => match event {
                Ok(ConnectionEvent::Disconnected { reason, .. }) => warn!(%reason, "연결 끊김"),
                Ok(ConnectionEvent::Reconnecting { attempt, delay }) => {
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "재연결 대기");
                }
                Ok(ConnectionEvent::Connected { epoch, restored }) => {
                    info!(epoch, restored, "연결됨");
                }
                Ok(ConnectionEvent::Closed) => break,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "연결 이벤트 누락");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    if let Err(e) = handle.unsubscribe().await {
        warn!(error = %e, "구독 해제 실패");
    }
    client.close().await?;
    Ok(())
}
