use std::{
    fmt,
    sync::{Arc, Weak},
};

use async_trait::async_trait;

use super::{LocalRouter, Matcher, SubscriptionId};
use crate::{PubSubError, PubSubResult};

/// Механизм отмены подписки, которым владеет выдавшая её стратегия.
///
/// Локальные стратегии отменяют подписку в своём [`LocalRouter`];
/// адаптеры удалённых брокеров реализуют трейт сами.
#[async_trait]
pub trait Cancel: Send + Sync {
    async fn cancel(
        &self,
        id: SubscriptionId,
    ) -> PubSubResult<()>;
}

/// Активная подписка, возвращаемая `subscribe`.
///
/// Держит только дескриптор для собственной отмены. В отличие от
/// каналов `broadcast`, удаление значения подписку **не** отменяет:
/// обработчик продолжает вызываться, пока не будет вызван
/// [`Subscription::unsubscribe`] или соединение не будет закрыто.
pub struct Subscription {
    /// Идентификатор подписки внутри соединения.
    pub id: SubscriptionId,
    /// Фильтр, на который оформлена подписка.
    pub filter: Matcher,
    canceller: Arc<dyn Cancel>,
}

impl Subscription {
    pub fn new(
        id: SubscriptionId,
        filter: Matcher,
        canceller: Arc<dyn Cancel>,
    ) -> Self {
        Self {
            id,
            filter,
            canceller,
        }
    }

    /// Отменяет подписку.
    ///
    /// # Ошибки
    /// `NotOpen`, если соединение, выдавшее подписку, уже закрыто.
    pub async fn unsubscribe(self) -> PubSubResult<()> {
        self.canceller.cancel(self.id).await
    }

    /// Возвращает фильтр подписки.
    pub fn filter(&self) -> &Matcher {
        &self.filter
    }
}

impl fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("filter", &self.filter.as_str())
            .finish_non_exhaustive()
    }
}

/// Отмена подписки в локальном роутере.
///
/// Держит слабую ссылку: закрытое соединение отбрасывает роутер, и
/// запоздалая отмена завершается ошибкой `NotOpen`, а не обращается к
/// роутеру следующего `open`.
pub struct RouterCanceller {
    router: Weak<LocalRouter>,
    strategy: &'static str,
}

impl RouterCanceller {
    pub fn new(
        router: &Arc<LocalRouter>,
        strategy: &'static str,
    ) -> Arc<Self> {
        Arc::new(Self {
            router: Arc::downgrade(router),
            strategy,
        })
    }
}

#[async_trait]
impl Cancel for RouterCanceller {
    async fn cancel(
        &self,
        id: SubscriptionId,
    ) -> PubSubResult<()> {
        let router = self
            .router
            .upgrade()
            .filter(|r| !r.is_closed())
            .ok_or(PubSubError::NotOpen {
                strategy: self.strategy,
            })?;
        if !router.off(id) {
            tracing::debug!(subscription = %id, "subscription already removed");
        }
        Ok(())
    }
}
