use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use super::Strategy;
use crate::{
    config::Settings,
    pubsub::{
        compile, validate_topic, Handler, HandlerFailure, LocalRouter, RouterCanceller,
        Subscription,
    },
    PubSubError, PubSubResult,
};

const STRATEGY: &str = "spm";

/// Стратегия одного процесса: публикация сразу доставляется локальным
/// подписчикам.
///
/// Роутер создаётся при `open` и отбрасывается при `close`, поэтому
/// подписки не переживают переоткрытие соединения.
pub struct InProcess {
    failures: broadcast::Sender<HandlerFailure>,
    router: Mutex<Option<Arc<LocalRouter>>>,
}

impl InProcess {
    pub fn new() -> Self {
        Self::with_settings(&Settings::default())
    }

    pub fn with_settings(settings: &Settings) -> Self {
        let (failures, _) = broadcast::channel(settings.failure_capacity.max(1));
        Self {
            failures,
            router: Mutex::new(None),
        }
    }

    fn router(&self) -> PubSubResult<Arc<LocalRouter>> {
        self.router
            .lock()
            .clone()
            .ok_or(PubSubError::NotOpen { strategy: STRATEGY })
    }
}

impl Default for InProcess {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Strategy for InProcess {
    fn name(&self) -> &'static str {
        STRATEGY
    }

    async fn open(&self) -> PubSubResult<()> {
        let mut slot = self.router.lock();
        if slot.is_some() {
            return Err(PubSubError::AlreadyOpen { strategy: STRATEGY });
        }
        *slot = Some(Arc::new(LocalRouter::new(self.failures.clone())));
        tracing::debug!(strategy = STRATEGY, "connection opened");
        Ok(())
    }

    async fn publish(
        &self,
        channel: &str,
        value: Value,
    ) -> PubSubResult<()> {
        let router = self.router()?;
        validate_topic(channel)?;
        router.emit(channel, &value);
        Ok(())
    }

    async fn subscribe(
        &self,
        filter: &str,
        handler: Handler,
    ) -> PubSubResult<Subscription> {
        let router = self.router()?;
        let matcher = compile(filter)?;
        let id = router.on(matcher.clone(), handler);
        Ok(Subscription::new(
            id,
            matcher,
            RouterCanceller::new(&router, STRATEGY),
        ))
    }

    async fn close(&self) -> PubSubResult<()> {
        let router = self
            .router
            .lock()
            .take()
            .ok_or(PubSubError::NotOpen { strategy: STRATEGY })?;
        router.shutdown();
        tracing::debug!(strategy = STRATEGY, "connection closed");
        Ok(())
    }

    fn failures(&self) -> broadcast::Receiver<HandlerFailure> {
        self.failures.subscribe()
    }
}
