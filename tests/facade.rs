use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use ipc_pubsub::{
    bail, forward_to, memory_pair, Backend, ErrorExt, Handler, HandlerFailure, InProcess, ProcessRole,
    PubSub, PubSubError, PubSubResult, RemoteDescriptor, Settings, StatusCode, Strategy,
    Subscription, WorkerSet,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::{sync::broadcast, time::timeout};

/// Тест проверяет, что две подписки на один шаблон получают сообщение
/// ровно один раз в порядке регистрации, а после отписки остаётся
/// только вторая.
#[tokio::test]
async fn test_spm_order_and_unsubscribe() {
    let ps = PubSub::new("spm").unwrap();
    ps.open().await.unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let first_log = Arc::clone(&log);
    let first = ps
        .subscribe_fn("news/#", move |v, _| {
            first_log.lock().push(format!("first:{v}"));
            Ok(())
        })
        .await
        .unwrap();
    let second_log = Arc::clone(&log);
    let _second = ps
        .subscribe_fn("news/#", move |v, _| {
            second_log.lock().push(format!("second:{v}"));
            Ok(())
        })
        .await
        .unwrap();

    ps.publish("news/today", 1).await.unwrap();
    first.unsubscribe().await.unwrap();
    ps.publish("news/today", 2).await.unwrap();

    assert_eq!(*log.lock(), vec!["first:1", "second:1", "second:2"]);
    ps.close().await.unwrap();
}

#[tokio::test]
async fn test_lifecycle_errors_pass_through() {
    let ps = PubSub::new("spm").unwrap();
    assert_eq!(
        ps.publish("a", json!(1)).await,
        Err(PubSubError::NotOpen { strategy: "spm" })
    );
    ps.open().await.unwrap();
    assert_eq!(
        ps.open().await,
        Err(PubSubError::AlreadyOpen { strategy: "spm" })
    );
    ps.close().await.unwrap();
    assert_eq!(
        ps.close().await,
        Err(PubSubError::NotOpen { strategy: "spm" })
    );
}

/// Тест проверяет, что сбой обработчика изолирован и виден в канале
/// ошибок фасада.
#[tokio::test]
async fn test_handler_failures_are_observable() {
    let ps = PubSub::new("spm").unwrap();
    let mut failures = ps.failures();
    ps.open().await.unwrap();

    let delivered = Arc::new(AtomicUsize::new(0));
    let _bad = ps
        .subscribe_fn("orders/+", |value, _| {
            if value.get("id").is_none() {
                bail!(StatusCode::InvalidArgs, "order without id");
            }
            Ok(())
        })
        .await
        .unwrap();
    let counter = Arc::clone(&delivered);
    let _good = ps
        .subscribe_fn("orders/+", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

    ps.publish("orders/new", json!({})).await.unwrap();

    let failure = timeout(Duration::from_secs(1), failures.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failure.topic, "orders/new");
    assert_eq!(failure.error.status_code(), StatusCode::InvalidArgs);
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unknown_strategy_at_construction() {
    for descriptor in ["", "ipc", "spm:x", "rpm+amqp://h", "rpm://h"] {
        let err = PubSub::new(descriptor).unwrap_err();
        assert!(
            matches!(err, PubSubError::UnknownStrategy { .. }),
            "{descriptor:?} -> {err:?}"
        );
    }
}

/// Тест проверяет, что брокер без зарегистрированного адаптера
/// отвергается при создании, а не при `open`.
#[test]
fn test_remote_without_adapter() {
    let err = PubSub::new("rpm+mqtt://localhost/app").unwrap_err();
    assert_eq!(err.status_code(), StatusCode::UnknownStrategy);
}

#[test]
fn test_pgsql_requires_database() {
    let err = PubSub::builder("rpm+pgsql://localhost")
        .connector(Backend::Pgsql, |_, s| Ok(Box::new(InProcess::with_settings(s)) as Box<dyn Strategy>))
        .build()
        .unwrap_err();
    assert!(matches!(err, PubSubError::InvalidDescriptor { .. }));
}

/// Адаптер-заглушка: запоминает вызовы и отвечает ошибкой на `close`.
struct RecordingBroker {
    descriptor: RemoteDescriptor,
    calls: Arc<Mutex<Vec<String>>>,
    failures: broadcast::Sender<HandlerFailure>,
}

#[async_trait]
impl Strategy for RecordingBroker {
    fn name(&self) -> &'static str {
        self.descriptor.backend.strategy_name()
    }

    async fn open(&self) -> PubSubResult<()> {
        self.calls.lock().push(format!("open {}", self.descriptor.address()));
        Ok(())
    }

    async fn publish(
        &self,
        channel: &str,
        value: Value,
    ) -> PubSubResult<()> {
        self.calls.lock().push(format!("publish {channel} {value}"));
        Ok(())
    }

    async fn subscribe(
        &self,
        filter: &str,
        _handler: Handler,
    ) -> PubSubResult<Subscription> {
        Err(PubSubError::InvalidPattern {
            pattern: filter.to_string(),
            reason: "recording broker".to_string(),
        })
    }

    async fn close(&self) -> PubSubResult<()> {
        Err(PubSubError::NotOpen {
            strategy: self.name(),
        })
    }

    fn failures(&self) -> broadcast::Receiver<HandlerFailure> {
        self.failures.subscribe()
    }
}

/// Тест проверяет, что фасад передаёт вызовы и ошибки адаптера без изменений.
#[tokio::test]
async fn test_remote_calls_forwarded_verbatim() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&calls);
    let ps = PubSub::builder("rpm+nats://broker/app")
        .connector(Backend::Nats, move |descriptor, _| {
            Ok(Box::new(RecordingBroker {
                descriptor: descriptor.clone(),
                calls: Arc::clone(&recorded),
                failures: broadcast::channel(4).0,
            }) as Box<dyn Strategy>)
        })
        .build()
        .unwrap();

    assert_eq!(ps.strategy_name(), "rpm+nats");
    ps.open().await.unwrap();
    ps.publish("a/b", "x").await.unwrap();
    assert!(matches!(
        ps.subscribe("a/#", forward_to(tokio::sync::mpsc::unbounded_channel().0)).await,
        Err(PubSubError::InvalidPattern { ref reason, .. }) if reason == "recording broker"
    ));
    assert_eq!(
        ps.close().await,
        Err(PubSubError::NotOpen { strategy: "rpm+nats" })
    );
    assert_eq!(*calls.lock(), vec!["open broker:4242", "publish a/b \"x\""]);
}

#[tokio::test]
async fn test_mpm_with_explicit_role() {
    let members = Arc::new(WorkerSet::new());
    let (coordinator_side, worker_side) = memory_pair("w", 16);
    members.attach(Arc::new(coordinator_side));

    let coordinator = PubSub::builder("mpm:room")
        .role(ProcessRole::coordinator(members))
        .settings(Settings::default())
        .build()
        .unwrap();
    let worker = PubSub::builder("mpm:room")
        .role(ProcessRole::worker(worker_side))
        .build()
        .unwrap();
    assert_eq!(coordinator.strategy_name(), "mpm");

    coordinator.open().await.unwrap();
    worker.open().await.unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _sub = coordinator.subscribe("room/#", forward_to(tx)).await.unwrap();

    worker.publish("room/msg", json!("hi")).await.unwrap();
    let msg = timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg.payload, json!("hi"));
}
