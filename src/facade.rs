use std::{fmt, str::FromStr, sync::Arc};

use serde_json::Value;
use tokio::sync::broadcast;

use crate::{
    config::Settings,
    pubsub::{handler, Handler, HandlerFailure, HandlerResult, Subscription},
    strategy::{
        mpm::{ProcessRole, WorkerSet},
        rpm::{Backend, Connectors, RemoteDescriptor},
        InProcess, ProcessGroup, Strategy,
    },
    PubSubError, PubSubResult,
};

/// Разобранный дескриптор соединения.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    /// `spm`
    InProcess,
    /// `mpm:<groupId>`; идентификатор может быть пустым (`mpm:`)
    ProcessGroup { group_id: String },
    /// `rpm+<backend>://...`
    Remote(RemoteDescriptor),
}

impl FromStr for Descriptor {
    type Err = PubSubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "spm" {
            return Ok(Self::InProcess);
        }
        if let Some(group_id) = s.strip_prefix("mpm:") {
            return Ok(Self::ProcessGroup {
                group_id: group_id.to_string(),
            });
        }
        if s.starts_with("rpm") {
            return RemoteDescriptor::parse(s).map(Self::Remote);
        }
        Err(PubSubError::UnknownStrategy {
            descriptor: s.to_string(),
            reason: "expected 'spm', 'mpm:<group>' or 'rpm+<backend>://...'".to_string(),
        })
    }
}

/// Выбранная реализация.
enum Selected {
    InProcess(InProcess),
    ProcessGroup(ProcessGroup),
    Remote(Box<dyn Strategy>),
}

/// Единый pub/sub API поверх выбранной по дескриптору стратегии.
///
/// Все операции передаются стратегии без изменений, включая ошибки.
///
/// ```ignore
/// let ps = PubSub::new("spm")?;
/// ps.open().await?;
/// let sub = ps.subscribe_fn("foo/#", |value, topic| {
///     println!("{topic}: {value}");
///     Ok(())
/// }).await?;
/// ps.publish("foo/bar", json!("x")).await?;
/// sub.unsubscribe().await?;
/// ps.close().await?;
/// ```
pub struct PubSub {
    descriptor: String,
    strategy: Selected,
}

impl PubSub {
    /// Создаёт соединение с настройками по умолчанию.
    ///
    /// # Ошибки
    /// `UnknownStrategy` или `InvalidDescriptor` до любого `open`.
    pub fn new(descriptor: &str) -> PubSubResult<Self> {
        Self::builder(descriptor).build()
    }

    pub fn builder(descriptor: &str) -> PubSubBuilder {
        PubSubBuilder {
            descriptor: descriptor.to_string(),
            role: None,
            connectors: Connectors::new(),
            settings: Settings::default(),
        }
    }

    /// Исходная строка дескриптора.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy().name()
    }

    fn strategy(&self) -> &dyn Strategy {
        match &self.strategy {
            Selected::InProcess(s) => s,
            Selected::ProcessGroup(s) => s,
            Selected::Remote(s) => s.as_ref(),
        }
    }

    pub async fn open(&self) -> PubSubResult<()> {
        self.strategy().open().await
    }

    pub async fn publish(
        &self,
        channel: &str,
        value: impl Into<Value>,
    ) -> PubSubResult<()> {
        self.strategy().publish(channel, value.into()).await
    }

    pub async fn subscribe(
        &self,
        filter: &str,
        handler: Handler,
    ) -> PubSubResult<Subscription> {
        self.strategy().subscribe(filter, handler).await
    }

    /// Подписка с замыканием вместо готового [`Handler`].
    pub async fn subscribe_fn<F>(
        &self,
        filter: &str,
        f: F,
    ) -> PubSubResult<Subscription>
    where
        F: Fn(&Value, &str) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(filter, handler(f)).await
    }

    pub async fn close(&self) -> PubSubResult<()> {
        self.strategy().close().await
    }

    /// Канал сбоев обработчиков.
    pub fn failures(&self) -> broadcast::Receiver<HandlerFailure> {
        self.strategy().failures()
    }
}

impl fmt::Debug for PubSub {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("PubSub")
            .field("descriptor", &self.descriptor)
            .field("strategy", &self.strategy_name())
            .finish()
    }
}

/// Построитель [`PubSub`].
pub struct PubSubBuilder {
    descriptor: String,
    role: Option<ProcessRole>,
    connectors: Connectors,
    settings: Settings,
}

impl PubSubBuilder {
    /// Роль процесса для `mpm`. По умолчанию определяется по окружению
    /// (см. [`ProcessRole::detect`]).
    pub fn role(
        mut self,
        role: ProcessRole,
    ) -> Self {
        self.role = Some(role);
        self
    }

    /// Регистрирует адаптер удалённого брокера.
    pub fn connector<F>(
        mut self,
        backend: Backend,
        connector: F,
    ) -> Self
    where
        F: Fn(&RemoteDescriptor, &Settings) -> PubSubResult<Box<dyn Strategy>> + Send + Sync + 'static,
    {
        self.connectors.register(backend, connector);
        self
    }

    /// Заменяет реестр адаптеров целиком.
    pub fn connectors(
        mut self,
        connectors: Connectors,
    ) -> Self {
        self.connectors = connectors;
        self
    }

    pub fn settings(
        mut self,
        settings: Settings,
    ) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> PubSubResult<PubSub> {
        let descriptor: Descriptor = self.descriptor.parse()?;

        let strategy = match descriptor {
            Descriptor::InProcess => Selected::InProcess(InProcess::with_settings(&self.settings)),
            Descriptor::ProcessGroup { group_id } => {
                let role = self.role.unwrap_or_else(|| {
                    ProcessRole::detect(Arc::new(WorkerSet::new()), self.settings.channel_capacity)
                });
                Selected::ProcessGroup(ProcessGroup::with_settings(&group_id, role, &self.settings))
            }
            Descriptor::Remote(remote) => {
                Selected::Remote(self.connectors.connect(&remote, &self.settings)?)
            }
        };

        tracing::debug!(descriptor = %self.descriptor, "strategy selected");
        Ok(PubSub {
            descriptor: self.descriptor,
            strategy,
        })
    }
}
