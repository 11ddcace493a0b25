//! Стратегии доставки сообщений.
//!
//! - `spm`: один процесс, доставка через локальный роутер.
//! - `mpm`: группа процессов (координатор и воркеры) поверх
//!   межпроцессных каналов.
//! - `rpm`: удалённые брокеры; сами клиенты брокеров подключаются
//!   извне через реестр коннекторов.

pub mod mpm;
pub mod rpm;
pub mod spm;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

pub use mpm::ProcessGroup;
pub use spm::InProcess;

use crate::{
    pubsub::{Handler, HandlerFailure, Subscription},
    PubSubResult,
};

/// Единый набор операций, который реализует каждая стратегия.
///
/// Жизненный цикл соединения: `closed → open → closed`. Повторный `open`
/// завершается ошибкой `AlreadyOpen`, любая операция на закрытом
/// соединении `NotOpen`.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Короткое имя стратегии (`spm`, `mpm`, `rpm+mqtt`, ...).
    fn name(&self) -> &'static str;

    async fn open(&self) -> PubSubResult<()>;

    /// Публикует значение в топик.
    async fn publish(
        &self,
        channel: &str,
        value: Value,
    ) -> PubSubResult<()>;

    /// Подписывает обработчик на фильтр топиков.
    async fn subscribe(
        &self,
        filter: &str,
        handler: Handler,
    ) -> PubSubResult<Subscription>;

    async fn close(&self) -> PubSubResult<()>;

    /// Канал сбоев обработчиков этого соединения.
    ///
    /// Переживает повторные `open`/`close`.
    fn failures(&self) -> broadcast::Receiver<HandlerFailure>;
}
