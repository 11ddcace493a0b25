use std::{fmt, process::Stdio, sync::Arc};

use parking_lot::RwLock;
use tokio::process::{Child, Command};

use super::{LineChannel, ProcessChannel};
use crate::{GenericError, ResultExt, StackError, StackResult, StatusCode};

/// Переменная окружения, по которой процесс узнаёт, что он воркер.
///
/// Значение равно идентификатору воркера.
pub const WORKER_ID_ENV: &str = "IPC_PUBSUB_WORKER_ID";

/// Известные координатору воркеры.
///
/// Ретранслятор снимает копию состава при `open`; воркеры, добавленные
/// позже, этому соединению не видны.
#[derive(Default)]
pub struct WorkerSet {
    members: RwLock<Vec<Arc<dyn ProcessChannel>>>,
}

impl WorkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавляет канал к воркеру.
    pub fn attach(
        &self,
        channel: Arc<dyn ProcessChannel>,
    ) {
        tracing::debug!(peer = channel.peer(), "worker attached");
        self.members.write().push(channel);
    }

    /// Удаляет все каналы к воркеру с данным именем.
    pub fn detach(
        &self,
        peer: &str,
    ) -> bool {
        let mut members = self.members.write();
        let before = members.len();
        members.retain(|ch| ch.peer() != peer);
        members.len() != before
    }

    /// Текущий состав в порядке добавления.
    pub fn snapshot(&self) -> Vec<Arc<dyn ProcessChannel>> {
        self.members.read().clone()
    }

    pub fn peers(&self) -> Vec<String> {
        self.members
            .read()
            .iter()
            .map(|ch| ch.peer().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }
}

impl fmt::Debug for WorkerSet {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WorkerSet")
            .field("peers", &self.peers())
            .finish()
    }
}

/// Роль текущего процесса в группе.
#[derive(Clone)]
pub enum ProcessRole {
    /// Координатор: владеет составом группы и выполняет рассылку.
    Coordinator(Arc<WorkerSet>),
    /// Воркер: общается только с координатором по единственному каналу.
    Worker(Arc<dyn ProcessChannel>),
}

impl ProcessRole {
    pub fn coordinator(workers: Arc<WorkerSet>) -> Self {
        Self::Coordinator(workers)
    }

    pub fn worker<C>(channel: C) -> Self
    where
        C: ProcessChannel + 'static,
    {
        Self::Worker(Arc::new(channel))
    }

    /// Определяет роль по окружению.
    ///
    /// Если задана [`WORKER_ID_ENV`], процесс воркер и говорит с
    /// родителем через stdin/stdout. Иначе координатор с переданным
    /// составом.
    pub fn detect(
        workers: Arc<WorkerSet>,
        capacity: usize,
    ) -> Self {
        match worker_id() {
            Some(id) => {
                tracing::debug!(worker_id = %id, "running as process group worker");
                Self::Worker(Arc::new(LineChannel::stdio(capacity)))
            }
            None => Self::Coordinator(workers),
        }
    }

    pub fn is_coordinator(&self) -> bool {
        matches!(self, Self::Coordinator(_))
    }
}

impl fmt::Debug for ProcessRole {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Coordinator(workers) => f.debug_tuple("Coordinator").field(workers).finish(),
            Self::Worker(channel) => f.debug_tuple("Worker").field(&channel.peer()).finish(),
        }
    }
}

/// Идентификатор воркера из окружения, если процесс запущен воркером.
pub fn worker_id() -> Option<String> {
    std::env::var(WORKER_ID_ENV)
        .ok()
        .filter(|id| !id.is_empty())
}

/// Запущенный дочерний процесс-воркер.
pub struct WorkerProcess {
    id: String,
    child: Child,
    channel: Arc<LineChannel>,
}

impl WorkerProcess {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Канал к воркеру для [`WorkerSet::attach`].
    pub fn channel(&self) -> Arc<dyn ProcessChannel> {
        self.channel.clone()
    }

    /// Ожидает завершения воркера.
    pub async fn wait(mut self) -> StackResult<std::process::ExitStatus> {
        let id = self.id.clone();
        self.child
            .wait()
            .await
            .with_context(|| format!("waiting for worker '{id}'"))
    }

    /// Принудительно завершает воркера.
    pub async fn kill(&mut self) -> StackResult<()> {
        let id = self.id.clone();
        self.child
            .kill()
            .await
            .with_context(|| format!("killing worker '{id}'"))
    }
}

/// Запускает воркера: stdin/stdout дочернего процесса становятся
/// его каналом, stderr наследуется.
pub fn spawn_worker(
    mut command: Command,
    id: &str,
    capacity: usize,
) -> StackResult<WorkerProcess> {
    command
        .env(WORKER_ID_ENV, id)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning worker '{id}'"))?;

    let stdin = child.stdin.take().ok_or_else(|| not_piped(id, "stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| not_piped(id, "stdout"))?;

    tracing::info!(worker_id = id, pid = ?child.id(), "worker spawned");

    Ok(WorkerProcess {
        id: id.to_string(),
        child,
        channel: Arc::new(LineChannel::new(id, stdout, stdin, capacity)),
    })
}

fn not_piped(
    id: &str,
    stream: &str,
) -> StackError {
    StackError::new(GenericError::new(
        StatusCode::Io,
        format!("{stream} of worker '{id}' is not piped"),
    ))
}
