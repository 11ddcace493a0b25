use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use super::{Matcher, Message};
use crate::{GenericError, LogLevel, StackError, StackResult, StatusCode};

/// Результат вызова обработчика подписки.
pub type HandlerResult = StackResult<()>;

/// Обработчик подписки: получает нагрузку и фактический топик публикации.
pub type Handler = Arc<dyn Fn(&Value, &str) -> HandlerResult + Send + Sync>;

/// Оборачивает замыкание в [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Value, &str) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Обработчик, пересылающий доставки в `mpsc`-канал.
///
/// Превращает подписку в асинхронный поток [`Message`]. Если приёмник
/// уже закрыт, доставка считается неудачной и попадает в канал ошибок.
pub fn forward_to(tx: mpsc::UnboundedSender<Message>) -> Handler {
    handler(move |payload, topic| {
        tx.send(Message::new(topic, payload.clone())).map_err(|_| {
            StackError::new(GenericError::new(
                StatusCode::HandlerFailed,
                format!("receiver for '{topic}' is gone"),
            ))
        })
    })
}

/// Идентификатор подписки внутри одного роутера.
///
/// Выдаётся монотонно, поэтому порядок идентификаторов совпадает с
/// порядком регистрации.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Идентификатор из сырого значения (для адаптеров удалённых брокеров).
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Сбой обработчика, опубликованный в канал ошибок роутера.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub subscription: SubscriptionId,
    pub filter: Arc<str>,
    pub topic: String,
    pub error: StackError,
}

struct Route {
    matcher: Matcher,
    handler: Handler,
}

/// Внутрипроцессная таблица подписок.
///
/// Поддерживает:
/// - подписки по скомпилированным фильтрам (`+`, `#`)
/// - доставку в порядке регистрации
/// - изоляцию сбоев обработчиков (ошибки и паники)
/// - единый наблюдаемый канал ошибок обработчиков
/// - статистику публикаций, доставок и сбоев
pub struct LocalRouter {
    /// Подписки, упорядоченные по `SubscriptionId`
    routes: RwLock<BTreeMap<SubscriptionId, Arc<Route>>>,
    /// Следующий идентификатор подписки
    next_id: AtomicU64,
    /// Роутер остановлен (`shutdown`)
    closed: AtomicBool,
    /// Канал сбоев обработчиков
    failures: broadcast::Sender<HandlerFailure>,
    /// Общее количество вызовов `emit`
    pub emit_count: AtomicUsize,
    /// Количество вызовов обработчиков
    pub delivery_count: AtomicUsize,
    /// Количество сбоев обработчиков
    pub failure_count: AtomicUsize,
}

impl LocalRouter {
    /// Создаёт роутер, публикующий сбои в переданный канал.
    ///
    /// Канал принадлежит владельцу соединения и переживает повторные
    /// `open`/`close`.
    pub fn new(failures: broadcast::Sender<HandlerFailure>) -> Self {
        Self {
            routes: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            failures,
            emit_count: AtomicUsize::new(0),
            delivery_count: AtomicUsize::new(0),
            failure_count: AtomicUsize::new(0),
        }
    }

    /// Создаёт роутер с собственным каналом ошибок заданной ёмкости.
    pub fn with_capacity(failure_capacity: usize) -> Self {
        Self::new(broadcast::channel(failure_capacity.max(1)).0)
    }

    /// Регистрирует обработчик. Действует начиная со следующего `emit`.
    pub fn on(
        &self,
        matcher: Matcher,
        handler: Handler,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.routes
            .write()
            .insert(id, Arc::new(Route { matcher, handler }));
        tracing::trace!(subscription = %id, "route registered");
        id
    }

    /// Удаляет подписку. Возвращает `false`, если её уже нет.
    pub fn off(
        &self,
        id: SubscriptionId,
    ) -> bool {
        self.routes.write().remove(&id).is_some()
    }

    /// Доставляет нагрузку всем подпискам, чей фильтр совпал с топиком.
    ///
    /// Набор получателей фиксируется в момент начала вызова: подписки,
    /// добавленные или удалённые обработчиками по ходу доставки, на этот
    /// `emit` не влияют. Сбой одного обработчика не мешает остальным и
    /// публикуется в канал ошибок.
    ///
    /// Возвращает количество вызванных обработчиков.
    pub fn emit(
        &self,
        topic: &str,
        payload: &Value,
    ) -> usize {
        self.emit_count.fetch_add(1, Ordering::Relaxed);

        let matched: Vec<(SubscriptionId, Arc<Route>)> = self
            .routes
            .read()
            .iter()
            .filter(|(_, route)| route.matcher.matches(topic))
            .map(|(id, route)| (*id, Arc::clone(route)))
            .collect();

        for (id, route) in &matched {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (route.handler)(payload, topic)));
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(panic) => StackError::new(GenericError::new(
                    StatusCode::HandlerPanicked,
                    format!("handler panicked: {}", panic_message(panic.as_ref())),
                )),
            };
            self.report(*id, &route.matcher, topic, error);
        }

        self.delivery_count
            .fetch_add(matched.len(), Ordering::Relaxed);
        matched.len()
    }

    /// Подписка на канал сбоев обработчиков.
    pub fn failures(&self) -> broadcast::Receiver<HandlerFailure> {
        self.failures.subscribe()
    }

    /// Количество активных подписок.
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Останавливает роутер: очищает таблицу и помечает его закрытым.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.routes.write().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn report(
        &self,
        subscription: SubscriptionId,
        matcher: &Matcher,
        topic: &str,
        error: StackError,
    ) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        if error.log_level() == LogLevel::Error {
            tracing::error!(
                subscription = %subscription,
                filter = matcher.as_str(),
                topic,
                status = %error.status_code(),
                error = %error,
                "subscription handler crashed"
            );
        } else {
            tracing::warn!(
                subscription = %subscription,
                filter = matcher.as_str(),
                topic,
                status = %error.status_code(),
                error = %error,
                "subscription handler failed"
            );
        }
        // отсутствие слушателей не ошибка: сбой уже залогирован
        let _ = self.failures.send(HandlerFailure {
            subscription,
            filter: Arc::from(matcher.as_str()),
            topic: topic.to_string(),
            error,
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
