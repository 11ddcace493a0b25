use std::{sync::Arc, time::Duration};

use ipc_pubsub::{
    bail, forward_to, handler, memory_pair,
    strategy::mpm::{LineChannel, RelayEnvelope},
    Message, ProcessChannel, ProcessGroup, ProcessRole, PubSubError, StatusCode, Strategy,
    WorkerSet,
};
use serde_json::{json, Value};
use tokio::{
    io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::mpsc::{unbounded_channel, UnboundedReceiver},
    time::{sleep, timeout},
};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(50);

/// Координатор и воркеры, связанные in-memory каналами.
struct Cluster {
    coordinator: ProcessGroup,
    workers: Vec<ProcessGroup>,
}

fn cluster(
    group_id: &str,
    size: usize,
) -> Cluster {
    let members = Arc::new(WorkerSet::new());
    let workers = (0..size)
        .map(|i| {
            let (coordinator_side, worker_side) = memory_pair(&format!("worker-{i}"), 1024);
            members.attach(Arc::new(coordinator_side));
            ProcessGroup::new(group_id, ProcessRole::worker(worker_side))
        })
        .collect();
    Cluster {
        coordinator: ProcessGroup::new(group_id, ProcessRole::coordinator(members)),
        workers,
    }
}

impl Cluster {
    async fn open(&self) {
        self.coordinator.open().await.unwrap();
        for w in &self.workers {
            w.open().await.unwrap();
        }
    }
}

async fn record(
    strategy: &ProcessGroup,
    filter: &str,
) -> UnboundedReceiver<Message> {
    let (tx, rx) = unbounded_channel();
    // подписка живёт до закрытия соединения
    let _ = strategy.subscribe(filter, forward_to(tx)).await.unwrap();
    rx
}

async fn next(rx: &mut UnboundedReceiver<Message>) -> Message {
    timeout(WAIT, rx.recv())
        .await
        .expect("delivery timed out")
        .expect("recorder dropped")
}

async fn assert_silent(rx: &mut UnboundedReceiver<Message>) {
    sleep(QUIET).await;
    assert!(rx.try_recv().is_err(), "unexpected extra delivery");
}

/// Тест проверяет сквозной сценарий: координатор и два воркера, воркер A
/// подписан на `foo/#`, воркер B публикует `foo/bar`. Каждый, включая
/// публикующего, видит сообщение ровно один раз.
#[tokio::test]
async fn test_worker_publish_reaches_everyone_once() {
    let c = cluster("demo", 2);
    c.open().await;

    let mut at_coordinator = record(&c.coordinator, "foo/#").await;
    let mut at_a = record(&c.workers[0], "foo/#").await;
    let mut at_b = record(&c.workers[1], "foo/#").await;

    c.workers[1].publish("foo/bar", json!("x")).await.unwrap();

    let expected = Message::new("foo/bar", "x");
    assert_eq!(next(&mut at_coordinator).await, expected);
    assert_eq!(next(&mut at_a).await, expected);
    assert_eq!(next(&mut at_b).await, expected);

    assert_silent(&mut at_coordinator).await;
    assert_silent(&mut at_a).await;
    assert_silent(&mut at_b).await;
}

#[tokio::test]
async fn test_coordinator_publish_fans_out() {
    let c = cluster("demo", 3);
    c.open().await;

    let mut local = record(&c.coordinator, "jobs/+").await;
    let mut remote = Vec::new();
    for w in &c.workers {
        remote.push(record(w, "jobs/+").await);
    }

    c.coordinator.publish("jobs/42", json!({"id": 42})).await.unwrap();

    assert_eq!(next(&mut local).await.payload, json!({"id": 42}));
    for rx in &mut remote {
        assert_eq!(next(rx).await.channel, "jobs/42");
        assert_silent(rx).await;
    }
}

/// Тест проверяет, что сообщения одного воркера приходят в порядке
/// отправки.
#[tokio::test]
async fn test_order_from_one_publisher_is_kept() {
    let c = cluster("demo", 2);
    c.open().await;
    let mut at_a = record(&c.workers[0], "seq").await;

    for n in 0..20 {
        c.workers[1].publish("seq", json!(n)).await.unwrap();
    }
    for n in 0..20 {
        assert_eq!(next(&mut at_a).await.payload, json!(n));
    }
}

/// Тест проверяет, что две группы на одних и тех же физических каналах
/// не получают сообщения друг друга.
#[tokio::test]
async fn test_groups_sharing_channels_are_isolated() {
    let (coordinator_side, worker_side) = memory_pair("worker-0", 64);
    let coordinator_side: Arc<dyn ProcessChannel> = Arc::new(coordinator_side);
    let worker_side: Arc<dyn ProcessChannel> = Arc::new(worker_side);

    let mut coordinators = Vec::new();
    let mut workers = Vec::new();
    for group in ["alpha", "beta"] {
        let members = Arc::new(WorkerSet::new());
        members.attach(Arc::clone(&coordinator_side));
        coordinators.push(ProcessGroup::new(group, ProcessRole::coordinator(members)));
        workers.push(ProcessGroup::new(group, ProcessRole::Worker(Arc::clone(&worker_side))));
    }
    for s in coordinators.iter().chain(workers.iter()) {
        s.open().await.unwrap();
    }

    let mut alpha = record(&workers[0], "#").await;
    let mut beta = record(&workers[1], "#").await;

    coordinators[0].publish("t", json!("for alpha")).await.unwrap();
    assert_eq!(next(&mut alpha).await.payload, json!("for alpha"));
    assert_silent(&mut beta).await;
}

/// Тест проверяет частичный сбой: мёртвый воркер попадает в ошибку
/// рассылки, живые получают сообщение.
#[tokio::test]
async fn test_dead_worker_reported() {
    let members = Arc::new(WorkerSet::new());
    let (alive, alive_worker) = memory_pair("alive", 16);
    let (dead, _dead_worker) = memory_pair("dead", 16);
    dead.disconnect();
    members.attach(Arc::new(alive));
    members.attach(Arc::new(dead));

    let coordinator = ProcessGroup::new("g", ProcessRole::coordinator(members));
    let worker = ProcessGroup::new("g", ProcessRole::worker(alive_worker));
    coordinator.open().await.unwrap();
    worker.open().await.unwrap();
    let mut at_alive = record(&worker, "#").await;
    let mut at_coordinator = record(&coordinator, "#").await;

    let err = coordinator.publish("a/b", json!(1)).await.unwrap_err();
    match err {
        PubSubError::RelayFanout { ref failed } => {
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].peer, "dead");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(next(&mut at_alive).await.channel, "a/b");
    assert_eq!(next(&mut at_coordinator).await.channel, "a/b");
}

#[tokio::test]
async fn test_unsubscribe_stops_relay_delivery() {
    let c = cluster("demo", 1);
    c.open().await;

    let (tx, mut rx) = unbounded_channel();
    let sub = c.workers[0].subscribe("x/#", forward_to(tx)).await.unwrap();
    c.coordinator.publish("x/1", json!(1)).await.unwrap();
    assert_eq!(next(&mut rx).await.payload, json!(1));

    sub.unsubscribe().await.unwrap();
    c.coordinator.publish("x/2", json!(2)).await.unwrap();
    assert_silent(&mut rx).await;
}

/// Тест проверяет, что закрытое соединение можно открыть снова, а
/// старые подписки при этом не возвращаются.
#[tokio::test]
async fn test_reopen_after_close() {
    let c = cluster("demo", 1);
    c.open().await;
    let mut before = record(&c.workers[0], "#").await;

    c.workers[0].close().await.unwrap();
    assert!(matches!(
        c.workers[0].subscribe("#", forward_to(unbounded_channel().0)).await,
        Err(PubSubError::NotOpen { .. })
    ));
    c.workers[0].open().await.unwrap();
    let mut after = record(&c.workers[0], "#").await;

    c.coordinator.publish("t", json!("again")).await.unwrap();
    assert_eq!(next(&mut after).await.payload, json!("again"));
    assert!(before.try_recv().is_err());
}

/// Тест проверяет, что при одновременных публикациях двух воркеров
/// координатор и сторонний воркер видят сообщения в одном порядке.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishers_agree_on_order() {
    const PER_PUBLISHER: usize = 200;

    let c = cluster("demo", 3);
    c.open().await;
    let mut at_coordinator = record(&c.coordinator, "#").await;
    let mut at_observer = record(&c.workers[2], "#").await;

    let Cluster {
        coordinator: _coordinator,
        workers,
    } = c;
    let workers: Vec<Arc<ProcessGroup>> = workers.into_iter().map(Arc::new).collect();

    let publishers: Vec<_> = ["a", "b"]
        .into_iter()
        .zip(&workers)
        .map(|(prefix, worker)| {
            let worker = Arc::clone(worker);
            tokio::spawn(async move {
                for n in 0..PER_PUBLISHER {
                    worker
                        .publish("seq", json!(format!("{prefix}{n}")))
                        .await
                        .unwrap();
                }
            })
        })
        .collect();
    for publisher in publishers {
        publisher.await.unwrap();
    }

    let mut coordinator_order = Vec::new();
    let mut observer_order = Vec::new();
    for _ in 0..2 * PER_PUBLISHER {
        coordinator_order.push(next(&mut at_coordinator).await.payload);
        observer_order.push(next(&mut at_observer).await.payload);
    }
    assert_eq!(coordinator_order, observer_order);
}

/// Тест проверяет, что `close` не обрывает начатую рассылку: после
/// повторного `open` обе строки в канале воркера целые.
#[tokio::test]
async fn test_close_lets_relayed_fanout_finish() {
    let (ours, theirs) = duplex(64);
    let (our_read, our_write) = split(ours);
    let members = Arc::new(WorkerSet::new());
    members.attach(Arc::new(LineChannel::new("worker-0", our_read, our_write, 16)));
    let coordinator = ProcessGroup::new("g", ProcessRole::coordinator(members));
    coordinator.open().await.unwrap();

    let (their_read, mut their_write) = split(theirs);
    let big = "x".repeat(2000);
    let request = RelayEnvelope::to_coordinator("g", "t", json!(&big))
        .to_value()
        .unwrap();
    their_write
        .write_all(format!("{request}\n").as_bytes())
        .await
        .unwrap();
    // рассылка упирается в непрочитанный канал воркера
    sleep(QUIET).await;

    coordinator.close().await.unwrap();
    coordinator.open().await.unwrap();

    let mut lines = BufReader::new(their_read).lines();
    let (published, received) = tokio::join!(coordinator.publish("t", json!("small")), async {
        let mut received = Vec::new();
        for _ in 0..2 {
            let line = timeout(WAIT, lines.next_line())
                .await
                .expect("line timed out")
                .unwrap()
                .expect("channel closed");
            received.push(serde_json::from_str::<Value>(&line).expect("torn line"));
        }
        received
    });

    published.unwrap();
    assert_eq!(received[0]["kind"], "to-worker");
    assert_eq!(received[0]["value"], json!(big));
    assert_eq!(received[1]["value"], "small");
}

/// Тест проверяет, что сбои обработчиков на пути ретрансляции приходят
/// в канал сбоев своего процесса и не мешают остальным подписчикам.
#[tokio::test]
async fn test_relay_handler_failures_reported() {
    let c = cluster("demo", 2);
    c.open().await;
    let mut worker_failures = c.workers[0].failures();
    let mut coordinator_failures = c.coordinator.failures();

    let _rejecting = c.workers[0]
        .subscribe(
            "jobs/#",
            handler(|_, topic| bail!(StatusCode::HandlerFailed, "cannot take {}", topic)),
        )
        .await
        .unwrap();
    let _crashing = c
        .coordinator
        .subscribe("jobs/#", handler(|_, _| panic!("coordinator handler exploded")))
        .await
        .unwrap();
    let mut at_worker = record(&c.workers[0], "jobs/#").await;

    c.workers[1].publish("jobs/7", json!(7)).await.unwrap();

    let rejected = timeout(WAIT, worker_failures.recv())
        .await
        .expect("worker failure timed out")
        .unwrap();
    assert_eq!(rejected.topic, "jobs/7");
    assert_eq!(rejected.error.status_code(), StatusCode::HandlerFailed);

    let crashed = timeout(WAIT, coordinator_failures.recv())
        .await
        .expect("coordinator failure timed out")
        .unwrap();
    assert_eq!(crashed.topic, "jobs/7");
    assert_eq!(crashed.error.status_code(), StatusCode::HandlerPanicked);

    assert_eq!(next(&mut at_worker).await.payload, json!(7));
}
