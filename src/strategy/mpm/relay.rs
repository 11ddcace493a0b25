use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    watch, Mutex as AsyncMutex,
};

use super::{EnvelopeKind, ProcessChannel, ProcessRole, RelayEnvelope, WorkerSet};
use crate::{
    config::Settings,
    pubsub::{
        compile, validate_topic, Handler, HandlerFailure, LocalRouter, RouterCanceller,
        Subscription,
    },
    strategy::Strategy,
    FailedRecipient, PubSubError, PubSubResult,
};

const STRATEGY: &str = "mpm";

/// Стратегия группы процессов: один координатор и N воркеров.
///
/// Публикация воркера уходит координатору, координатор доставляет её
/// локально и рассылает всем воркерам, включая отправителя. Каждый
/// процесс, в том числе публикующий, видит сообщение ровно один раз.
pub struct ProcessGroup {
    group_id: Arc<str>,
    role: ProcessRole,
    failures: broadcast::Sender<HandlerFailure>,
    session: Mutex<Option<Session>>,
}

/// Состояние открытого соединения.
///
/// Удаление сессии закрывает `shutdown`: слушатели дорабатывают текущее
/// сообщение (включая начатую рассылку) и завершаются.
struct Session {
    relay: Arc<Relay>,
    shutdown: watch::Sender<()>,
}

impl Drop for Session {
    fn drop(&mut self) {
        // слушателей уже может не быть
        let _ = self.shutdown.send(());
    }
}

/// Роутер и собеседники, зафиксированные при `open`.
struct Relay {
    group_id: Arc<str>,
    router: Arc<LocalRouter>,
    /// Координатор: каналы ко всем воркерам. Воркер: канал к координатору.
    peers: Vec<Arc<dyn ProcessChannel>>,
    coordinator: bool,
    /// Локальная доставка и рассылка одного сообщения не перемежаются с
    /// другими, поэтому все процессы видят один и тот же порядок.
    fanout: AsyncMutex<()>,
}

impl Relay {
    /// Локальная доставка и рассылка всем воркерам.
    ///
    /// Завершается после попытки отправки каждому воркеру; неудачные
    /// отправки не отменяют уже выполненные.
    async fn fan_out(
        &self,
        channel: &str,
        value: Value,
    ) -> PubSubResult<()> {
        let _turn = self.fanout.lock().await;
        self.router.emit(channel, &value);

        let message = RelayEnvelope::to_worker(&self.group_id, channel, value)
            .to_value()
            .map_err(|source| PubSubError::RelaySend {
                peer: "*".to_string(),
                source,
            })?;

        let sends = self.peers.iter().map(|peer| {
            let message = message.clone();
            async move {
                peer.send(message).await.map_err(|error| FailedRecipient {
                    peer: peer.peer().to_string(),
                    error,
                })
            }
        });

        let failed: Vec<FailedRecipient> = join_all(sends)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();

        if failed.is_empty() {
            Ok(())
        } else {
            Err(PubSubError::RelayFanout { failed })
        }
    }

    /// Отправка запроса на публикацию координатору.
    async fn forward(
        &self,
        channel: &str,
        value: Value,
    ) -> PubSubResult<()> {
        let Some(coordinator) = self.peers.first() else {
            return Err(PubSubError::NotOpen { strategy: STRATEGY });
        };
        let peer = coordinator.peer().to_string();
        let message = RelayEnvelope::to_coordinator(&self.group_id, channel, value)
            .to_value()
            .map_err(|source| PubSubError::RelaySend {
                peer: peer.clone(),
                source,
            })?;
        coordinator
            .send(message)
            .await
            .map_err(|source| PubSubError::RelaySend { peer, source })
    }

    /// Обработка одного входящего сообщения от собеседника.
    async fn handle(
        &self,
        from: &str,
        raw: Value,
    ) {
        let Some(envelope) = RelayEnvelope::parse(&raw, &self.group_id) else {
            tracing::trace!(peer = from, "ignoring foreign message");
            return;
        };

        match (self.coordinator, envelope.kind) {
            (true, EnvelopeKind::ToCoordinator) => {
                if let Err(e) = self.fan_out(&envelope.channel, envelope.value).await {
                    tracing::warn!(
                        group = %self.group_id,
                        origin = from,
                        channel = %envelope.channel,
                        error = %e,
                        "relayed publish was not delivered to every worker"
                    );
                }
            }
            (false, EnvelopeKind::ToWorker) => {
                self.router.emit(&envelope.channel, &envelope.value);
            }
            _ => {
                tracing::trace!(peer = from, kind = ?envelope.kind, "ignoring misdirected envelope");
            }
        }
    }
}

/// Цикл слушателя одного канала. Сообщения одного канала обрабатываются
/// строго по порядку поступления.
///
/// Остановка проверяется только между сообщениями: начатая обработка
/// всегда доводится до конца.
async fn listen_loop(
    relay: Arc<Relay>,
    peer: String,
    mut inbox: broadcast::Receiver<Value>,
    mut shutdown: watch::Receiver<()>,
) {
    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            received = inbox.recv() => received,
        };
        match received {
            Ok(raw) => relay.handle(&peer, raw).await,
            Err(RecvError::Lagged(skipped)) => {
                // отстающий слушатель теряет самые старые сообщения
                tracing::warn!(peer = %peer, skipped, "relay listener lagged, messages lost");
            }
            Err(RecvError::Closed) => {
                tracing::debug!(peer = %peer, "relay channel closed");
                break;
            }
        }
    }
    tracing::trace!(peer = %peer, "relay listener stopped");
}

impl ProcessGroup {
    pub fn new(
        group_id: &str,
        role: ProcessRole,
    ) -> Self {
        Self::with_settings(group_id, role, &Settings::default())
    }

    pub fn with_settings(
        group_id: &str,
        role: ProcessRole,
        settings: &Settings,
    ) -> Self {
        let (failures, _) = broadcast::channel(settings.failure_capacity.max(1));
        Self {
            group_id: Arc::from(group_id),
            role,
            failures,
            session: Mutex::new(None),
        }
    }

    /// Координатор без воркеров (удобно для одиночного запуска).
    pub fn coordinator(group_id: &str) -> Self {
        Self::new(group_id, ProcessRole::coordinator(Arc::new(WorkerSet::new())))
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn role(&self) -> &ProcessRole {
        &self.role
    }

    fn relay(&self) -> PubSubResult<Arc<Relay>> {
        self.session
            .lock()
            .as_ref()
            .map(|session| Arc::clone(&session.relay))
            .ok_or(PubSubError::NotOpen { strategy: STRATEGY })
    }
}

#[async_trait]
impl Strategy for ProcessGroup {
    fn name(&self) -> &'static str {
        STRATEGY
    }

    async fn open(&self) -> PubSubResult<()> {
        let mut slot = self.session.lock();
        if slot.is_some() {
            return Err(PubSubError::AlreadyOpen { strategy: STRATEGY });
        }

        let (peers, coordinator) = match &self.role {
            ProcessRole::Coordinator(workers) => (workers.snapshot(), true),
            ProcessRole::Worker(channel) => (vec![Arc::clone(channel)], false),
        };

        // слушатели регистрируются до запуска задач, чтобы не потерять
        // сообщения, пришедшие сразу после open
        let inboxes: Vec<(String, broadcast::Receiver<Value>)> = peers
            .iter()
            .map(|peer| (peer.peer().to_string(), peer.listen()))
            .collect();

        let relay = Arc::new(Relay {
            group_id: Arc::clone(&self.group_id),
            router: Arc::new(LocalRouter::new(self.failures.clone())),
            peers,
            coordinator,
            fanout: AsyncMutex::new(()),
        });

        let (shutdown, stop) = watch::channel(());
        for (peer, inbox) in inboxes {
            tokio::spawn(listen_loop(Arc::clone(&relay), peer, inbox, stop.clone()));
        }

        tracing::debug!(
            group = %self.group_id,
            coordinator,
            peers = relay.peers.len(),
            "process group opened"
        );
        *slot = Some(Session { relay, shutdown });
        Ok(())
    }

    async fn publish(
        &self,
        channel: &str,
        value: Value,
    ) -> PubSubResult<()> {
        let relay = self.relay()?;
        validate_topic(channel)?;
        if relay.coordinator {
            relay.fan_out(channel, value).await
        } else {
            relay.forward(channel, value).await
        }
    }

    async fn subscribe(
        &self,
        filter: &str,
        handler: Handler,
    ) -> PubSubResult<Subscription> {
        let relay = self.relay()?;
        let matcher = compile(filter)?;
        let id = relay.router.on(matcher.clone(), handler);
        Ok(Subscription::new(
            id,
            matcher,
            RouterCanceller::new(&relay.router, STRATEGY),
        ))
    }

    async fn close(&self) -> PubSubResult<()> {
        let session = self
            .session
            .lock()
            .take()
            .ok_or(PubSubError::NotOpen { strategy: STRATEGY })?;
        session.relay.router.shutdown();
        drop(session);
        tracing::debug!(group = %self.group_id, "process group closed");
        Ok(())
    }

    fn failures(&self) -> broadcast::Receiver<HandlerFailure> {
        self.failures.subscribe()
    }
}
