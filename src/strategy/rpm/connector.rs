use std::{collections::HashMap, fmt, sync::Arc};

use super::{Backend, RemoteDescriptor};
use crate::{config::Settings, strategy::Strategy, PubSubError, PubSubResult};

/// Фабрика адаптера удалённого брокера.
///
/// Получает разобранный дескриптор и настройки, возвращает стратегию,
/// которая подключается к брокеру при `open`.
pub type RemoteConnector =
    Arc<dyn Fn(&RemoteDescriptor, &Settings) -> PubSubResult<Box<dyn Strategy>> + Send + Sync>;

/// Реестр адаптеров удалённых брокеров.
#[derive(Clone, Default)]
pub struct Connectors {
    registry: HashMap<Backend, RemoteConnector>,
}

impl Connectors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Регистрирует адаптер, заменяя предыдущий для того же брокера.
    pub fn register<F>(
        &mut self,
        backend: Backend,
        connector: F,
    ) where
        F: Fn(&RemoteDescriptor, &Settings) -> PubSubResult<Box<dyn Strategy>> + Send + Sync + 'static,
    {
        self.registry.insert(backend, Arc::new(connector));
    }

    pub fn contains(
        &self,
        backend: Backend,
    ) -> bool {
        self.registry.contains_key(&backend)
    }

    /// Создаёт стратегию для дескриптора.
    ///
    /// # Ошибки
    /// `UnknownStrategy`, если для брокера не зарегистрирован адаптер;
    /// иначе ошибка самого адаптера без изменений.
    pub fn connect(
        &self,
        descriptor: &RemoteDescriptor,
        settings: &Settings,
    ) -> PubSubResult<Box<dyn Strategy>> {
        let connector = self
            .registry
            .get(&descriptor.backend)
            .ok_or_else(|| PubSubError::UnknownStrategy {
                descriptor: descriptor.as_str().to_string(),
                reason: format!("no adapter registered for backend '{}'", descriptor.backend),
            })?;
        connector(descriptor, settings)
    }
}

impl fmt::Debug for Connectors {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut backends: Vec<Backend> = self.registry.keys().copied().collect();
        backends.sort();
        f.debug_struct("Connectors")
            .field("backends", &backends)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::InProcess;

    #[test]
    fn test_missing_adapter_is_unknown_strategy() {
        let connectors = Connectors::new();
        let d = RemoteDescriptor::parse("rpm+redis://localhost").unwrap();
        let err = connectors.connect(&d, &Settings::default()).err().unwrap();
        assert!(matches!(err, PubSubError::UnknownStrategy { ref reason, .. } if reason.contains("redis")));
    }

    #[test]
    fn test_registered_adapter_is_used() {
        let mut connectors = Connectors::new();
        connectors.register(Backend::Mqtt, |_, settings| {
            Ok(Box::new(InProcess::with_settings(settings)) as Box<dyn Strategy>)
        });
        assert!(connectors.contains(Backend::Mqtt));
        assert!(!connectors.contains(Backend::Nats));

        let d = RemoteDescriptor::parse("rpm+mqtt://localhost").unwrap();
        let strategy = connectors.connect(&d, &Settings::default()).unwrap();
        assert_eq!(strategy.name(), "spm");
        assert!(format!("{connectors:?}").contains("Mqtt"));
    }
}
