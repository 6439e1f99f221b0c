//! 채널별 디스패처.
//!
//! 수신 봉투의 채널 이름으로 디스패처를 고르고, 디스패처는 페이로드를 디코딩해
//! 일치하는 그룹의 리스너에게 전달합니다. 채널별 매칭 규칙:
//!
//! | 채널 | 규칙 |
//! |------|------|
//! | trades, l2Book, candle, bbo, activeAssetCtx, allMids | 페이로드에서 키를 계산해 해당 그룹에만 전달 |
//! | userFills | 페이로드의 `user`와 일치하는 그룹에만 전달, 없으면 브로드캐스트 |
//! | 그 외 사용자 채널 | 채널의 모든 그룹에 브로드캐스트 |
//! | subscriptionResponse, pong, error | 로그만 남김 |

use std::collections::HashMap;

use hl_core::{
    ActiveAssetCtx, AllMids, Bbo, CandleBatch, Channel, Envelope, L2Book, Trade,
};
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use crate::event::ChannelEvent;
use crate::registry::{GroupSnapshot, SubscriberRegistry};
use crate::subscription::SubscriptionKey;
use crate::{StreamError, StreamResult};

/// 페이로드 내용으로 자신의 구독 키를 계산할 수 있는 메시지.
pub trait Subscriptable: DeserializeOwned {
    /// 키별로 나눈 이벤트 목록.
    fn route(self) -> Vec<(SubscriptionKey, ChannelEvent)>;
}

impl Subscriptable for Vec<Trade> {
    /// 여러 코인이 섞인 묶음은 코인별로 나눠 각 그룹에 전달합니다 (순서 유지).
    fn route(self) -> Vec<(SubscriptionKey, ChannelEvent)> {
        let mut order: Vec<String> = Vec::new();
        let mut by_coin: HashMap<String, Vec<Trade>> = HashMap::new();
        for trade in self {
            if !by_coin.contains_key(&trade.coin) {
                order.push(trade.coin.clone());
            }
            by_coin.entry(trade.coin.clone()).or_default().push(trade);
        }
        order
            .into_iter()
            .filter_map(|coin| {
                let trades = by_coin.remove(&coin)?;
                Some((
                    SubscriptionKey::for_coin(Channel::Trades, &coin),
                    ChannelEvent::Trades(trades),
                ))
            })
            .collect()
    }
}

impl Subscriptable for L2Book {
    fn route(self) -> Vec<(SubscriptionKey, ChannelEvent)> {
        vec![(
            SubscriptionKey::for_coin(Channel::L2Book, &self.coin),
            ChannelEvent::L2Book(self),
        )]
    }
}

impl Subscriptable for CandleBatch {
    fn route(self) -> Vec<(SubscriptionKey, ChannelEvent)> {
        self.into_vec()
            .into_iter()
            .map(|candle| {
                (
                    SubscriptionKey::for_candle(&candle.symbol, &candle.interval),
                    ChannelEvent::Candle(candle),
                )
            })
            .collect()
    }
}

impl Subscriptable for Bbo {
    fn route(self) -> Vec<(SubscriptionKey, ChannelEvent)> {
        vec![(
            SubscriptionKey::for_coin(Channel::Bbo, &self.coin),
            ChannelEvent::Bbo(self),
        )]
    }
}

impl Subscriptable for ActiveAssetCtx {
    fn route(self) -> Vec<(SubscriptionKey, ChannelEvent)> {
        vec![(
            SubscriptionKey::for_coin(Channel::ActiveAssetCtx, &self.coin),
            ChannelEvent::ActiveAssetCtx(self),
        )]
    }
}

impl Subscriptable for AllMids {
    fn route(self) -> Vec<(SubscriptionKey, ChannelEvent)> {
        vec![(
            SubscriptionKey::for_all_mids(self.dex.as_deref()),
            ChannelEvent::AllMids(self),
        )]
    }
}

/// 채널 디스패처.
pub trait MessageDispatcher: Send + Sync {
    /// 봉투를 디코딩해 그룹에 전달하고 리스너 호출 횟수를 반환합니다.
    fn dispatch(&self, envelope: &Envelope, groups: &[GroupSnapshot]) -> StreamResult<usize>;

    /// 디스패치에 레지스트리 스냅샷이 필요한지 여부.
    fn needs_subscribers(&self) -> bool {
        true
    }
}

fn decode<T: DeserializeOwned>(envelope: &Envelope) -> StreamResult<T> {
    envelope.decode().map_err(|e| StreamError::Decode {
        channel: envelope.channel.clone(),
        message: e.to_string(),
    })
}

/// 페이로드에서 계산한 키로 전달하는 디스패처.
pub struct KeyedDispatcher<T> {
    _payload: std::marker::PhantomData<fn() -> T>,
}

impl<T: Subscriptable> KeyedDispatcher<T> {
    pub fn new() -> Self {
        Self {
            _payload: std::marker::PhantomData,
        }
    }
}

impl<T: Subscriptable> Default for KeyedDispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Subscriptable> MessageDispatcher for KeyedDispatcher<T> {
    fn dispatch(&self, envelope: &Envelope, groups: &[GroupSnapshot]) -> StreamResult<usize> {
        let payload: T = decode(envelope)?;
        let mut delivered = 0;
        for (key, event) in payload.route() {
            match groups.iter().find(|group| group.key == key) {
                Some(group) => delivered += group.deliver(&event),
                None => trace!(key = %key, "구독자 없음"),
            }
        }
        Ok(delivered)
    }
}

/// 사용자 단위 채널 디스패처.
///
/// 페이로드가 사용자 주소를 되돌려 주면 해당 사용자의 그룹에만,
/// 그렇지 않으면 채널의 모든 그룹에 전달합니다.
pub struct UserScopedDispatcher<T> {
    wrap: fn(T) -> ChannelEvent,
}

impl<T: DeserializeOwned> UserScopedDispatcher<T> {
    pub fn new(wrap: fn(T) -> ChannelEvent) -> Self {
        Self { wrap }
    }
}

impl<T: DeserializeOwned> MessageDispatcher for UserScopedDispatcher<T> {
    fn dispatch(&self, envelope: &Envelope, groups: &[GroupSnapshot]) -> StreamResult<usize> {
        let event = (self.wrap)(decode(envelope)?);
        let delivered = match event.echoed_user() {
            Some(user) => groups
                .iter()
                .filter(|group| group.matches_user(user))
                .map(|group| group.deliver(&event))
                .sum(),
            None => groups.iter().map(|group| group.deliver(&event)).sum(),
        };
        Ok(delivered)
    }
}

/// 제어 채널 디스패처. 리스너에게 전달하지 않고 로그만 남깁니다.
pub struct AckDispatcher;

impl MessageDispatcher for AckDispatcher {
    fn dispatch(&self, envelope: &Envelope, _groups: &[GroupSnapshot]) -> StreamResult<usize> {
        match envelope.channel.as_str() {
            "error" => warn!(data = %envelope.data, "업스트림 에러 통지"),
            "pong" => trace!("pong 수신"),
            _ => debug!(channel = %envelope.channel, data = %envelope.data, "구독 응답"),
        }
        Ok(0)
    }

    fn needs_subscribers(&self) -> bool {
        false
    }
}

/// 채널 → 디스패처 테이블. 클라이언트 생성 시 한 번 만들고 이후 읽기만 합니다.
pub struct DispatcherTable {
    dispatchers: HashMap<Channel, Box<dyn MessageDispatcher>>,
}

impl DispatcherTable {
    /// 빈 테이블.
    pub fn empty() -> Self {
        Self {
            dispatchers: HashMap::new(),
        }
    }

    /// 알려진 모든 채널의 기본 디스패처.
    pub fn standard() -> Self {
        let table = Self::empty()
            .with(Channel::Trades, KeyedDispatcher::<Vec<Trade>>::new())
            .with(Channel::L2Book, KeyedDispatcher::<L2Book>::new())
            .with(Channel::Candle, KeyedDispatcher::<CandleBatch>::new())
            .with(Channel::Bbo, KeyedDispatcher::<Bbo>::new())
            .with(Channel::ActiveAssetCtx, KeyedDispatcher::<ActiveAssetCtx>::new())
            .with(Channel::AllMids, KeyedDispatcher::<AllMids>::new())
            .with(
                Channel::OrderUpdates,
                UserScopedDispatcher::new(ChannelEvent::OrderUpdates),
            )
            .with(
                Channel::Notification,
                UserScopedDispatcher::new(ChannelEvent::Notification),
            )
            .with(
                Channel::UserFills,
                UserScopedDispatcher::new(ChannelEvent::UserFills),
            )
            .with(
                Channel::UserEvents,
                UserScopedDispatcher::new(ChannelEvent::UserEvents),
            )
            .with(
                Channel::UserFundings,
                UserScopedDispatcher::new(ChannelEvent::UserFundings),
            )
            .with(
                Channel::UserNonFundingLedgerUpdates,
                UserScopedDispatcher::new(ChannelEvent::UserNonFundingLedgerUpdates),
            )
            .with(
                Channel::WebData2,
                UserScopedDispatcher::new(ChannelEvent::WebData2),
            );

        Channel::ALL
            .into_iter()
            .filter(|channel| channel.is_control())
            .fold(table, |table, channel| table.with(channel, AckDispatcher))
    }

    /// 디스패처를 등록하거나 교체합니다.
    pub fn with(mut self, channel: Channel, dispatcher: impl MessageDispatcher + 'static) -> Self {
        self.dispatchers.insert(channel, Box::new(dispatcher));
        self
    }

    pub fn get(&self, channel: Channel) -> Option<&dyn MessageDispatcher> {
        self.dispatchers.get(&channel).map(|d| d.as_ref())
    }

    /// 봉투를 라우팅합니다. 레지스트리 락은 스냅샷을 만드는 동안만 잡습니다.
    pub async fn route(
        &self,
        envelope: &Envelope,
        registry: &SubscriberRegistry,
    ) -> StreamResult<usize> {
        let channel = envelope.known_channel()?;
        let dispatcher = self
            .get(channel)
            .ok_or_else(|| StreamError::UnknownChannel(envelope.channel.clone()))?;

        if !dispatcher.needs_subscribers() {
            return dispatcher.dispatch(envelope, &[]);
        }

        let groups = registry.snapshot(channel).await;
        if groups.is_empty() {
            trace!(channel = %channel, "구독 그룹 없음, 메시지 무시");
            return Ok(0);
        }
        dispatcher.dispatch(envelope, &groups)
    }
}

impl Default for DispatcherTable {
    fn default() -> Self {
        Self::standard()
    }
}
