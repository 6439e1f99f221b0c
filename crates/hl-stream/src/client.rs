//! 스트림 클라이언트.
//!
//! 하나의 WebSocket 연결을 여러 구독자가 공유합니다.
//!
//! # 태스크 구성
//! - 수신 루프: 프레임을 받아 디스패처 테이블로 전달 (연결당 1개)
//! - 하트비트 루프: 주기적으로 ping 송신 (연결당 1개)
//! - 재연결 루프: 비정상 종료 시 백오프로 재시도 (최대 1개)
//!
//! 연결마다 종료 토큰(클라이언트 토큰의 자식)과 세대 번호를 부여해,
//! 이전 연결의 태스크가 새 연결의 상태를 건드리지 않도록 합니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use futures::StreamExt;
use hl_core::{
    ActiveAssetCtx, AllMids, Bbo, Candle, CandleInterval, Envelope, L2Book, Notification,
    OrderUpdate, StreamConfig, Trade, UserFills, WsCommand, CONNECTION_ESTABLISHED,
};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::backoff::Backoff;
use crate::connection::{
    ConnectionEvent, ConnectionState, DisconnectReason, FrameWriter,
};
use crate::dispatch::DispatcherTable;
use crate::event::ChannelEvent;
use crate::handle::SubscriptionHandle;
use crate::registry::{CommandSink, Listener, SubscriberRegistry};
use crate::subscription::{Subscription, SubscriptionKey};
use crate::transport::{FrameStream, Transport, WsTransport};
use crate::{StreamError, StreamResult};

struct Link {
    state: ConnectionState,
    epoch: u64,
    /// 현재 연결의 태스크 종료 토큰
    token: Option<CancellationToken>,
}

pub(crate) struct ClientInner {
    config: StreamConfig,
    url: String,
    transport: Arc<dyn Transport>,
    registry: SubscriberRegistry,
    dispatchers: DispatcherTable,
    writer: FrameWriter,
    link: RwLock<Link>,
    next_epoch: AtomicU64,
    shutdown: CancellationToken,
    events: broadcast::Sender<ConnectionEvent>,
}

/// 구독 멀티플렉싱 스트림 클라이언트.
///
/// ```no_run
/// use hl_core::StreamConfig;
/// use hl_stream::StreamClient;
///
/// # async fn run() -> Result<(), hl_stream::StreamError> {
/// let client = StreamClient::new(StreamConfig::default())?;
/// client.connect().await?;
///
/// let handle = client
///     .subscribe_trades("BTC", |trades| println!("{} trades", trades.len()))
///     .await?;
///
/// handle.unsubscribe().await?;
/// client.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<ClientInner>,
}

impl StreamClient {
    /// WebSocket 전송으로 클라이언트를 생성합니다.
    pub fn new(config: StreamConfig) -> StreamResult<Self> {
        Self::with_transport(config, Arc::new(WsTransport))
    }

    /// 지정한 전송으로 클라이언트를 생성합니다.
    pub fn with_transport(config: StreamConfig, transport: Arc<dyn Transport>) -> StreamResult<Self> {
        Self::with_dispatchers(config, transport, DispatcherTable::standard())
    }

    /// 디스패처 테이블까지 지정해 클라이언트를 생성합니다.
    pub fn with_dispatchers(
        config: StreamConfig,
        transport: Arc<dyn Transport>,
        dispatchers: DispatcherTable,
    ) -> StreamResult<Self> {
        config.validate()?;
        let url = config.resolve_ws_url()?;
        let (events, _) = broadcast::channel(config.event_buffer);

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                url,
                transport,
                registry: SubscriberRegistry::new(),
                dispatchers,
                writer: FrameWriter::new(),
                link: RwLock::new(Link {
                    state: ConnectionState::Disconnected,
                    epoch: 0,
                    token: None,
                }),
                next_epoch: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
                events,
            }),
        })
    }

    /// 접속 URL.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// 현재 연결 상태.
    pub fn state(&self) -> ConnectionState {
        self.inner.read_link().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// 연결 이벤트 수신기.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// 연결을 수립하고 등록된 구독을 복원합니다. 이미 연결되어 있으면 아무것도 하지 않습니다.
    pub async fn connect(&self) -> StreamResult<()> {
        {
            let mut link = self.inner.write_link();
            match link.state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Closed => return Err(StreamError::ConnectionClosed),
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    return Err(StreamError::Transport(
                        "connection attempt already in progress".to_string(),
                    ))
                }
                ConnectionState::Disconnected => link.state = ConnectionState::Connecting,
            }
        }

        match self.inner.open_connection().await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.inner
                    .transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// 클라이언트를 종료합니다. 여러 번 호출해도 안전합니다.
    ///
    /// 업스트림 unsubscribe 없이 모든 구독을 제거합니다.
    pub async fn close(&self) -> StreamResult<()> {
        let token = {
            let mut link = self.inner.write_link();
            if link.state == ConnectionState::Closed {
                return Ok(());
            }
            link.state = ConnectionState::Closed;
            link.token.take()
        };

        self.inner.shutdown.cancel();
        if let Some(token) = token {
            token.cancel();
        }
        self.inner.writer.close().await;
        let cleared = self.inner.registry.clear_all().await;

        info!(cleared, "스트림 클라이언트 종료");
        self.inner.emit(ConnectionEvent::Closed);
        Ok(())
    }

    /// 구독을 등록하고 리스너를 연결합니다.
    ///
    /// 같은 키의 구독이 이미 있으면 업스트림 요청 없이 리스너만 추가합니다.
    pub async fn subscribe<F>(
        &self,
        subscription: Subscription,
        callback: F,
    ) -> StreamResult<SubscriptionHandle>
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        if self.state() == ConnectionState::Closed {
            return Err(StreamError::ConnectionClosed);
        }
        let listener: Listener = Arc::new(callback);
        let (key, id) = self
            .inner
            .registry
            .attach(subscription, listener, &self.inner.writer)
            .await?;
        Ok(SubscriptionHandle::new(key, id, Arc::downgrade(&self.inner)))
    }

    /// 리스너를 해제합니다. 마지막 리스너면 업스트림 구독도 해제합니다.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> StreamResult<()> {
        self.inner.detach(handle).await
    }

    /// 등록된 구독 요청 목록.
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.inner.registry.subscriptions().await
    }

    /// 키의 리스너 수.
    pub async fn listener_count(&self, key: &SubscriptionKey) -> usize {
        self.inner.registry.listener_count(key).await
    }

    /// 체결 구독.
    pub async fn subscribe_trades<F>(
        &self,
        coin: impl Into<String>,
        callback: F,
    ) -> StreamResult<SubscriptionHandle>
    where
        F: Fn(&[Trade]) + Send + Sync + 'static,
    {
        self.subscribe(Subscription::trades(coin), move |event| {
            if let ChannelEvent::Trades(trades) = event {
                callback(trades);
            }
        })
        .await
    }

    /// L2 호가 구독.
    pub async fn subscribe_l2_book<F>(
        &self,
        coin: impl Into<String>,
        callback: F,
    ) -> StreamResult<SubscriptionHandle>
    where
        F: Fn(&L2Book) + Send + Sync + 'static,
    {
        self.subscribe(Subscription::l2_book(coin), move |event| {
            if let ChannelEvent::L2Book(book) = event {
                callback(book);
            }
        })
        .await
    }

    /// 캔들 구독.
    pub async fn subscribe_candles<F>(
        &self,
        coin: impl Into<String>,
        interval: CandleInterval,
        callback: F,
    ) -> StreamResult<SubscriptionHandle>
    where
        F: Fn(&Candle) + Send + Sync + 'static,
    {
        self.subscribe(Subscription::candle(coin, interval), move |event| {
            if let ChannelEvent::Candle(candle) = event {
                callback(candle);
            }
        })
        .await
    }

    /// 전체 중간가 구독. `dex`가 없으면 기본 DEX.
    pub async fn subscribe_all_mids<F>(
        &self,
        dex: Option<String>,
        callback: F,
    ) -> StreamResult<SubscriptionHandle>
    where
        F: Fn(&AllMids) + Send + Sync + 'static,
    {
        self.subscribe(Subscription::AllMids { dex }, move |event| {
            if let ChannelEvent::AllMids(mids) = event {
                callback(mids);
            }
        })
        .await
    }

    /// 최우선 호가 구독.
    pub async fn subscribe_bbo<F>(
        &self,
        coin: impl Into<String>,
        callback: F,
    ) -> StreamResult<SubscriptionHandle>
    where
        F: Fn(&Bbo) + Send + Sync + 'static,
    {
        self.subscribe(Subscription::bbo(coin), move |event| {
            if let ChannelEvent::Bbo(bbo) = event {
                callback(bbo);
            }
        })
        .await
    }

    /// 자산 컨텍스트 구독.
    pub async fn subscribe_active_asset_ctx<F>(
        &self,
        coin: impl Into<String>,
        callback: F,
    ) -> StreamResult<SubscriptionHandle>
    where
        F: Fn(&ActiveAssetCtx) + Send + Sync + 'static,
    {
        self.subscribe(Subscription::active_asset_ctx(coin), move |event| {
            if let ChannelEvent::ActiveAssetCtx(ctx) = event {
                callback(ctx);
            }
        })
        .await
    }

    /// 주문 업데이트 구독.
    pub async fn subscribe_order_updates<F>(
        &self,
        user: impl Into<String>,
        callback: F,
    ) -> StreamResult<SubscriptionHandle>
    where
        F: Fn(&[OrderUpdate]) + Send + Sync + 'static,
    {
        self.subscribe(Subscription::order_updates(user), move |event| {
            if let ChannelEvent::OrderUpdates(updates) = event {
                callback(updates);
            }
        })
        .await
    }

    /// 사용자 체결 구독.
    pub async fn subscribe_user_fills<F>(
        &self,
        user: impl Into<String>,
        callback: F,
    ) -> StreamResult<SubscriptionHandle>
    where
        F: Fn(&UserFills) + Send + Sync + 'static,
    {
        self.subscribe(Subscription::user_fills(user), move |event| {
            if let ChannelEvent::UserFills(fills) = event {
                callback(fills);
            }
        })
        .await
    }

    /// 사용자 알림 구독.
    pub async fn subscribe_notifications<F>(
        &self,
        user: impl Into<String>,
        callback: F,
    ) -> StreamResult<SubscriptionHandle>
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.subscribe(Subscription::notification(user), move |event| {
            if let ChannelEvent::Notification(notification) = event {
                callback(notification);
            }
        })
        .await
    }

    /// 사용자 이벤트 구독 (원본 JSON).
    pub async fn subscribe_user_events<F>(
        &self,
        user: impl Into<String>,
        callback: F,
    ) -> StreamResult<SubscriptionHandle>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(Subscription::user_events(user), move |event| {
            if let ChannelEvent::UserEvents(value) = event {
                callback(value);
            }
        })
        .await
    }

    /// 웹 대시보드 집계 구독 (원본 JSON).
    pub async fn subscribe_web_data2<F>(
        &self,
        user: impl Into<String>,
        callback: F,
    ) -> StreamResult<SubscriptionHandle>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(Subscription::web_data2(user), move |event| {
            if let ChannelEvent::WebData2(value) = event {
                callback(value);
            }
        })
        .await
    }

    /// 펀딩 지급 내역 구독 (원본 JSON).
    pub async fn subscribe_user_fundings<F>(
        &self,
        user: impl Into<String>,
        callback: F,
    ) -> StreamResult<SubscriptionHandle>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(Subscription::user_fundings(user), move |event| {
            if let ChannelEvent::UserFundings(value) = event {
                callback(value);
            }
        })
        .await
    }

    /// 펀딩 외 원장 변경 구독 (원본 JSON).
    pub async fn subscribe_user_non_funding_ledger_updates<F>(
        &self,
        user: impl Into<String>,
        callback: F,
    ) -> StreamResult<SubscriptionHandle>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(
            Subscription::user_non_funding_ledger_updates(user),
            move |event| {
                if let ChannelEvent::UserNonFundingLedgerUpdates(value) = event {
                    callback(value);
                }
            },
        )
        .await
    }
}

impl ClientInner {
    fn read_link(&self) -> std::sync::RwLockReadGuard<'_, Link> {
        self.link.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_link(&self) -> std::sync::RwLockWriteGuard<'_, Link> {
        self.link.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 상태가 `from`일 때만 `to`로 바꿉니다.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let mut link = self.write_link();
        if link.state == from {
            link.state = to;
            true
        } else {
            false
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // 수신기가 없으면 버림
        let _ = self.events.send(event);
    }

    pub(crate) async fn detach(&self, handle: &SubscriptionHandle) -> StreamResult<()> {
        self.registry
            .detach(handle.key(), handle.id(), &self.writer)
            .await
    }

    /// 연결을 열고 구독을 복원한 뒤 수신/하트비트 태스크를 시작합니다.
    async fn open_connection(self: &Arc<Self>) -> StreamResult<u64> {
        let connect = self.transport.connect(&self.url);
        let (sink, stream) = timeout(self.config.connect_timeout(), connect)
            .await
            .map_err(|_| StreamError::Timeout(format!("connect to {}", self.url)))??;

        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);

        let restored = match self
            .registry
            .replay(self.writer.install(epoch, sink), &self.writer)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                error!(epoch, error = %e, "구독 복원 실패");
                self.writer.discard(epoch).await;
                return Err(e);
            }
        };

        let token = {
            let mut link = self.write_link();
            if link.state == ConnectionState::Closed {
                None
            } else {
                let token = self.shutdown.child_token();
                link.state = ConnectionState::Connected;
                link.epoch = epoch;
                link.token = Some(token.clone());
                Some(token)
            }
        };
        let Some(token) = token else {
            self.writer.discard(epoch).await;
            return Err(StreamError::ConnectionClosed);
        };

        tokio::spawn(self.clone().read_loop(epoch, stream, token.clone()));
        tokio::spawn(self.clone().heartbeat_loop(epoch, token));

        info!(epoch, restored, url = %self.url, "WebSocket 연결 성공");
        self.emit(ConnectionEvent::Connected { epoch, restored });
        Ok(epoch)
    }

    async fn read_loop(self: Arc<Self>, epoch: u64, mut stream: FrameStream, token: CancellationToken) {
        let idle = self.config.read_idle_timeout();

        loop {
            let frame = tokio::select! {
                _ = token.cancelled() => {
                    debug!(epoch, "수신 루프 종료");
                    return;
                }
                frame = timeout(idle, stream.next()) => frame,
            };

            match frame {
                Ok(Some(Ok(text))) => self.handle_frame(&text).await,
                Ok(Some(Err(e))) => {
                    error!(epoch, error = %e, "WebSocket 수신 에러");
                    self.on_disconnect(epoch, DisconnectReason::ReadError(e.to_string()));
                    return;
                }
                Ok(None) => {
                    info!(epoch, "WebSocket 연결 종료");
                    self.on_disconnect(epoch, DisconnectReason::ClosedByPeer);
                    return;
                }
                Err(_) => {
                    warn!(epoch, idle_secs = idle.as_secs(), "수신 유휴 타임아웃");
                    self.on_disconnect(epoch, DisconnectReason::HeartbeatTimeout);
                    return;
                }
            }
        }
    }

    async fn handle_frame(&self, text: &str) {
        if text == CONNECTION_ESTABLISHED {
            debug!("연결 안내 메시지 수신");
            return;
        }

        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, frame = %text, "메시지 파싱 실패");
                return;
            }
        };

        match self.dispatchers.route(&envelope, &self.registry).await {
            Ok(delivered) => trace!(channel = %envelope.channel, delivered, "메시지 전달"),
            Err(StreamError::UnknownChannel(channel)) => {
                debug!(channel = %channel, "알 수 없는 채널");
            }
            Err(e) => warn!(channel = %envelope.channel, error = %e, "메시지 처리 실패"),
        }
    }

    async fn heartbeat_loop(self: Arc<Self>, epoch: u64, token: CancellationToken) {
        let period = self.config.ping_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = ticker.tick() => {
                    trace!(epoch, "Ping 전송");
                    if let Err(e) = self.writer.send_command(&WsCommand::ping()).await {
                        error!(epoch, error = %e, "Ping 전송 실패");
                        self.on_disconnect(epoch, DisconnectReason::WriteError(e.to_string()));
                        return;
                    }
                }
            }
        }
    }

    /// 연결 종료 처리. 현재 세대의 연결일 때만 동작하며, 재연결 루프는 최대 하나만 시작됩니다.
    fn on_disconnect(self: &Arc<Self>, epoch: u64, reason: DisconnectReason) {
        let reconnect = reason.should_reconnect();
        {
            let mut link = self.write_link();
            if link.epoch != epoch || link.state != ConnectionState::Connected {
                return;
            }
            if let Some(token) = link.token.take() {
                token.cancel();
            }
            link.state = if reconnect {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Disconnected
            };
        }

        warn!(epoch, reason = %reason, "연결 끊김");
        self.emit(ConnectionEvent::Disconnected {
            epoch,
            reason,
        });

        let inner = self.clone();
        tokio::spawn(async move {
            inner.writer.discard(epoch).await;
            if reconnect {
                inner.reconnect_loop().await;
            }
        });
    }

    async fn reconnect_loop(self: Arc<Self>) {
        let mut backoff = Backoff::new(
            self.config.reconnect_initial_delay(),
            self.config.reconnect_max_delay(),
        );

        loop {
            if self.shutdown.is_cancelled()
                || !self.transition(ConnectionState::Reconnecting, ConnectionState::Connecting)
            {
                debug!("재연결 중단");
                return;
            }

            match self.open_connection().await {
                Ok(epoch) => {
                    info!(epoch, attempts = backoff.attempts() + 1, "재연결 성공");
                    return;
                }
                Err(e) => {
                    self.transition(ConnectionState::Connecting, ConnectionState::Reconnecting);
                    let delay = backoff.next_delay();
                    let attempt = backoff.attempts();
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "재연결 실패, 대기 후 재시도"
                    );
                    self.emit(ConnectionEvent::Reconnecting { attempt, delay });

                    tokio::select! {
                        _ = self.shutdown.cancelled() => return,
                        _ = sleep(delay) => {}
                    }
                }
            }
        }
    }
}
