use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use ipc_pubsub::{
    init_logging,
    strategy::mpm::{spawn_worker, worker_id, WorkerProcess},
    Descriptor, LoggingConfig, ProcessRole, PubSub, Settings, WorkerSet,
};
use serde_json::json;
use tokio::process::Command;

/// Демонстрация: каждый процесс подписывается, публикует и логирует доставки.
#[derive(Debug, Parser)]
#[command(name = "ipc-pubsub", version, about)]
struct Args {
    /// Дескриптор соединения: spm, mpm:<group>, rpm+<backend>://...
    #[arg(short, long, default_value = "spm")]
    descriptor: String,
    /// Количество воркеров для mpm.
    #[arg(short, long, default_value_t = 2)]
    workers: usize,
    /// Фильтр подписки.
    #[arg(short, long, default_value = "sample/#")]
    filter: String,
    /// Топик публикации.
    #[arg(short, long, default_value = "sample/hello")]
    topic: String,
    /// Сколько ждать доставок перед закрытием, мс.
    #[arg(long, default_value_t = 500)]
    linger_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(args));
    // блокирующее чтение stdin воркера нельзя отменить, не ждём его
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    init_logging(LoggingConfig::from_settings(&settings))?;

    let name = worker_id().unwrap_or_else(|| "coordinator".to_string());
    let mut builder = PubSub::builder(&args.descriptor).settings(settings.clone());

    // координатор mpm запускает копии самого себя воркерами
    let mut children = Vec::new();
    let process_group = matches!(
        args.descriptor.parse::<Descriptor>(),
        Ok(Descriptor::ProcessGroup { .. })
    );
    if process_group && worker_id().is_none() {
        let workers = Arc::new(WorkerSet::new());
        children = spawn_workers(args.workers, settings.channel_capacity)?;
        for child in &children {
            workers.attach(child.channel());
        }
        builder = builder.role(ProcessRole::coordinator(workers));
    }

    let pubsub = builder.build()?;
    pubsub.open().await?;

    let me = name.clone();
    let subscription = pubsub
        .subscribe_fn(&args.filter, move |value, topic| {
            tracing::info!(process = %me, topic, value = %value, "delivered");
            Ok(())
        })
        .await?;

    let linger = Duration::from_millis(args.linger_ms);
    tokio::time::sleep(linger / 2).await;

    if let Err(e) = pubsub
        .publish(&args.topic, json!({ "from": name }))
        .await
    {
        tracing::warn!(process = %name, error = %e, "publish failed");
    }

    tokio::time::sleep(linger).await;
    subscription.unsubscribe().await?;
    pubsub.close().await?;

    for child in children {
        let id = child.id().to_string();
        let status = child.wait().await?;
        tracing::info!(worker_id = %id, %status, "worker exited");
    }
    Ok(())
}

fn spawn_workers(
    count: usize,
    capacity: usize,
) -> anyhow::Result<Vec<WorkerProcess>> {
    let exe = std::env::current_exe().context("cannot locate own executable")?;
    (1..=count)
        .map(|n| {
            let mut command = Command::new(&exe);
            command.args(std::env::args().skip(1));
            spawn_worker(command, &format!("worker-{n}"), capacity).map_err(anyhow::Error::from)
        })
        .collect()
}
