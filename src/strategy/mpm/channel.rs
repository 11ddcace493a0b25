use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::ChannelError;

/// Имя координатора как собеседника воркера.
pub const COORDINATOR_PEER: &str = "coordinator";

/// Двунаправленный канал между координатором и одним воркером.
///
/// Абстрагирует транспорт, который предоставляет среда исполнения
/// (pipe дочернего процесса, in-memory пара в тестах).
#[async_trait]
pub trait ProcessChannel: Send + Sync {
    /// Имя процесса на другом конце канала.
    fn peer(&self) -> &str;

    /// Отправляет сообщение собеседнику. Завершается, когда транспорт
    /// принял запись.
    async fn send(
        &self,
        message: Value,
    ) -> Result<(), ChannelError>;

    /// Регистрирует слушателя входящих сообщений.
    ///
    /// Каждый вызов создаёт отдельного слушателя; удаление приёмника
    /// снимает его.
    fn listen(&self) -> broadcast::Receiver<Value>;
}

/// Один конец in-memory канала.
pub struct MemoryChannel {
    peer: Arc<str>,
    inbox: broadcast::Sender<Value>,
    outbox: broadcast::Sender<Value>,
    disconnected: Arc<AtomicBool>,
}

/// Создаёт пару связанных концов: `(сторона координатора, сторона воркера)`.
///
/// Сторона координатора видит собеседника как `worker_id`, сторона
/// воркера как [`COORDINATOR_PEER`]. Каждое направление сохраняет
/// порядок сообщений.
pub fn memory_pair(
    worker_id: &str,
    capacity: usize,
) -> (MemoryChannel, MemoryChannel) {
    let capacity = capacity.max(1);
    let (to_coordinator, _) = broadcast::channel(capacity);
    let (to_worker, _) = broadcast::channel(capacity);
    let disconnected = Arc::new(AtomicBool::new(false));

    let coordinator_side = MemoryChannel {
        peer: Arc::from(worker_id),
        inbox: to_coordinator.clone(),
        outbox: to_worker.clone(),
        disconnected: Arc::clone(&disconnected),
    };
    let worker_side = MemoryChannel {
        peer: Arc::from(COORDINATOR_PEER),
        inbox: to_worker,
        outbox: to_coordinator,
        disconnected,
    };
    (coordinator_side, worker_side)
}

impl MemoryChannel {
    /// Рвёт канал в обе стороны: последующие отправки завершаются
    /// `ChannelError::Disconnected`. Имитирует завершение процесса.
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::Release);
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }
}

#[async_trait]
impl ProcessChannel for MemoryChannel {
    fn peer(&self) -> &str {
        &self.peer
    }

    async fn send(
        &self,
        message: Value,
    ) -> Result<(), ChannelError> {
        if self.is_disconnected() {
            return Err(ChannelError::Disconnected {
                peer: self.peer.to_string(),
            });
        }
        // собеседник без слушателей просто теряет сообщение
        let _ = self.outbox.send(message);
        Ok(())
    }

    fn listen(&self) -> broadcast::Receiver<Value> {
        self.inbox.subscribe()
    }
}
