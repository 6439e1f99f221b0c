//! 구독 키별 리스너 레지스트리.
//!
//! 키마다 업스트림 구독은 하나만 유지하고 로컬 리스너는 여러 개 붙입니다.
//! - 첫 리스너가 붙을 때 업스트림 subscribe
//! - 마지막 리스너가 떨어질 때 업스트림 unsubscribe
//!
//! 두 경우 모두 업스트림 쓰기가 끝날 때까지 레지스트리 락을 유지합니다.
//! 락 순서는 항상 레지스트리 → 라이터입니다.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hl_core::{Channel, WsCommand};
use tokio::sync::Mutex;
use tracing::debug;

use crate::event::ChannelEvent;
use crate::subscription::{normalize_user, Subscription, SubscriptionKey};
use crate::{StreamError, StreamResult};

/// 리스너 콜백.
pub type Listener = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// 프로세스 내에서 고유한 리스너 ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 업스트림 명령 송신자.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send_command(&self, command: &WsCommand) -> StreamResult<()>;
}

/// 등록된 리스너와 활성 플래그.
///
/// 플래그는 레지스트리 락 안에서만 내려가며, 스냅샷에 복사된 뒤 해제된 리스너는
/// 호출되지 않습니다.
#[derive(Clone)]
pub struct ListenerSlot {
    listener: Listener,
    live: Arc<AtomicBool>,
}

impl ListenerSlot {
    pub fn new(listener: Listener) -> Self {
        Self {
            listener,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn retire(&self) {
        self.live.store(false, Ordering::Release);
    }

    /// 활성 상태일 때만 호출합니다.
    fn call(&self, event: &ChannelEvent) -> bool {
        if !self.is_live() {
            return false;
        }
        (self.listener)(event);
        true
    }
}

struct SubscriberGroup {
    /// 처음 등록된 요청. subscribe/unsubscribe/재구독에 그대로 사용
    request: Subscription,
    /// ID 오름차순 = 등록 순서
    listeners: BTreeMap<ListenerId, ListenerSlot>,
}

/// 디스패치용 그룹 스냅샷. 락 없이 콜백을 호출하기 위해 복사합니다.
#[derive(Clone)]
pub struct GroupSnapshot {
    pub key: SubscriptionKey,
    /// 정규화된 사용자 주소 (사용자 단위 구독인 경우)
    pub user: Option<String>,
    pub listeners: Vec<ListenerSlot>,
}

impl GroupSnapshot {
    /// 아직 해제되지 않은 리스너에게 이벤트를 전달하고 호출 횟수를 반환합니다.
    pub fn deliver(&self, event: &ChannelEvent) -> usize {
        self.listeners
            .iter()
            .filter(|slot| slot.call(event))
            .count()
    }

    /// 사용자 주소가 일치하는지 확인 (대소문자 무시).
    pub fn matches_user(&self, user: &str) -> bool {
        self.user.as_deref() == Some(normalize_user(user).as_str())
    }
}

impl fmt::Debug for GroupSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupSnapshot")
            .field("key", &self.key)
            .field("user", &self.user)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// 구독 그룹 레지스트리.
pub struct SubscriberRegistry {
    groups: Mutex<HashMap<SubscriptionKey, SubscriberGroup>>,
    next_id: AtomicU64,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// 리스너를 등록합니다.
    ///
    /// 그룹이 없으면 업스트림 subscribe가 성공한 뒤에만 그룹을 만듭니다.
    /// 송신이 실패하면 레지스트리는 변경되지 않습니다.
    pub async fn attach(
        &self,
        request: Subscription,
        listener: Listener,
        upstream: &dyn CommandSink,
    ) -> StreamResult<(SubscriptionKey, ListenerId)> {
        request.validate()?;
        let key = request.key();
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let mut groups = self.groups.lock().await;
        match groups.get_mut(&key) {
            Some(group) => {
                group.listeners.insert(id, ListenerSlot::new(listener));
                debug!(key = %key, listener = %id, count = group.listeners.len(), "리스너 추가");
            }
            None => {
                upstream
                    .send_command(&WsCommand::subscribe(&request)?)
                    .await?;
                let mut listeners = BTreeMap::new();
                listeners.insert(id, ListenerSlot::new(listener));
                groups.insert(key.clone(), SubscriberGroup { request, listeners });
                debug!(key = %key, listener = %id, "업스트림 구독 생성");
            }
        }

        Ok((key, id))
    }

    /// 리스너를 해제합니다. 그룹이 비면 그룹을 제거하고 업스트림 unsubscribe를 보냅니다.
    ///
    /// 연결이 없는 상태에서의 해제는 성공으로 처리합니다 (재연결 시 재구독 대상에서 빠짐).
    pub async fn detach(
        &self,
        key: &SubscriptionKey,
        id: ListenerId,
        upstream: &dyn CommandSink,
    ) -> StreamResult<()> {
        let mut groups = self.groups.lock().await;

        let group = groups
            .get_mut(key)
            .ok_or_else(|| StreamError::SubscriptionNotFound(format!("{}#{}", key, id)))?;
        let Some(slot) = group.listeners.remove(&id) else {
            return Err(StreamError::SubscriptionNotFound(format!("{}#{}", key, id)));
        };
        slot.retire();
        if !group.listeners.is_empty() {
            debug!(key = %key, listener = %id, remaining = group.listeners.len(), "리스너 해제");
            return Ok(());
        }

        let Some(group) = groups.remove(key) else {
            return Ok(());
        };
        debug!(key = %key, "마지막 리스너 해제, 업스트림 구독 해제");
        match upstream
            .send_command(&WsCommand::unsubscribe(&group.request)?)
            .await
        {
            Err(StreamError::ConnectionClosed) => {
                debug!(key = %key, "연결 없음, unsubscribe 생략");
                Ok(())
            }
            other => other,
        }
    }

    /// 한 채널의 그룹 스냅샷.
    pub async fn snapshot(&self, channel: Channel) -> Vec<GroupSnapshot> {
        let groups = self.groups.lock().await;
        let mut snapshot: Vec<GroupSnapshot> = groups
            .iter()
            .filter(|(_, group)| group.request.channel() == channel)
            .map(|(key, group)| GroupSnapshot {
                key: key.clone(),
                user: group.request.user().map(normalize_user),
                listeners: group.listeners.values().cloned().collect(),
            })
            .collect();
        snapshot.sort_by(|a, b| a.key.cmp(&b.key));
        snapshot
    }

    /// 새 연결에 현재 구독 전체를 다시 보냅니다.
    ///
    /// `install`은 레지스트리 락을 잡은 뒤 실행되므로, 동시에 진행되는 attach가
    /// 새 연결에 프레임을 중복 송신하거나 누락하지 않습니다.
    pub async fn replay<F>(&self, install: F, upstream: &dyn CommandSink) -> StreamResult<usize>
    where
        F: Future<Output = ()> + Send,
    {
        let groups = self.groups.lock().await;
        install.await;

        let mut requests: Vec<(&SubscriptionKey, &Subscription)> = groups
            .iter()
            .map(|(key, group)| (key, &group.request))
            .collect();
        requests.sort_by(|a, b| a.0.cmp(b.0));

        for (key, request) in &requests {
            upstream
                .send_command(&WsCommand::subscribe(request)?)
                .await?;
            debug!(key = %key, "구독 복원");
        }
        Ok(requests.len())
    }

    /// 업스트림 명령 없이 모든 그룹을 제거합니다. 제거된 그룹 수를 반환합니다.
    pub async fn clear_all(&self) -> usize {
        let mut groups = self.groups.lock().await;
        let count = groups.len();
        for group in groups.values() {
            group.listeners.values().for_each(ListenerSlot::retire);
        }
        groups.clear();
        count
    }

    /// 등록된 구독 요청 목록 (키 순).
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        let groups = self.groups.lock().await;
        let mut entries: Vec<(&SubscriptionKey, &SubscriberGroup)> = groups.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
            .into_iter()
            .map(|(_, group)| group.request.clone())
            .collect()
    }

    pub async fn group_count(&self) -> usize {
        self.groups.lock().await.len()
    }

    pub async fn listener_count(&self, key: &SubscriptionKey) -> usize {
        self.groups
            .lock()
            .await
            .get(key)
            .map(|group| group.listeners.len())
            .unwrap_or(0)
    }

    pub async fn contains(&self, key: &SubscriptionKey) -> bool {
        self.groups.lock().await.contains_key(key)
    }
}
