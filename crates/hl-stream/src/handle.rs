//! 구독 핸들.

use std::fmt;
use std::sync::Weak;

use crate::client::ClientInner;
use crate::registry::ListenerId;
use crate::subscription::SubscriptionKey;
use crate::{StreamError, StreamResult};

/// 등록된 리스너 하나를 가리키는 핸들.
///
/// 핸들을 버려도 구독은 해제되지 않습니다. [`SubscriptionHandle::unsubscribe`]나
/// `StreamClient::unsubscribe`로 명시적으로 해제해야 합니다.
#[derive(Clone)]
pub struct SubscriptionHandle {
    key: SubscriptionKey,
    id: ListenerId,
    client: Weak<ClientInner>,
}

impl SubscriptionHandle {
    pub(crate) fn new(key: SubscriptionKey, id: ListenerId, client: Weak<ClientInner>) -> Self {
        Self { key, id, client }
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// 리스너를 해제합니다. 클라이언트가 이미 해제되었으면 `ConnectionClosed`.
    pub async fn unsubscribe(&self) -> StreamResult<()> {
        let client = self.client.upgrade().ok_or(StreamError::ConnectionClosed)?;
        client.detach(self).await
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.id)
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
