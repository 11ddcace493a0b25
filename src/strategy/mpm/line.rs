use std::{
    io::ErrorKind,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    runtime::Handle,
    sync::broadcast,
    task::JoinHandle,
};

use super::{ProcessChannel, COORDINATOR_PEER};
use crate::ChannelError;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Сторона записи с признаком оборванной строки.
///
/// Если `send` отменили посреди `write_all`, в потоке остаётся кусок
/// строки. Следующая запись сначала завершает его переводом строки, и
/// получатель отбрасывает обрывок как не-JSON, не склеивая его со
/// следующим сообщением.
struct LineWriter {
    inner: BoxedWriter,
    torn: bool,
}

impl LineWriter {
    async fn write_line(
        &mut self,
        line: &[u8],
    ) -> std::io::Result<()> {
        if self.torn {
            self.inner.write_all(b"\n").await?;
            self.torn = false;
        }
        self.torn = true;
        self.inner.write_all(line).await?;
        self.torn = false;
        self.inner.flush().await
    }
}

/// Канал поверх потоковой пары чтения/записи: один JSON-документ на строку.
///
/// Используется между родительским процессом и воркером (stdin/stdout
/// дочернего процесса). Строки, которые не разбираются как JSON,
/// пропускаются. Конец потока чтения помечает канал разорванным.
///
/// Чтение запускается при первом вызове [`ProcessChannel::listen`] внутри
/// рантайма Tokio.
pub struct LineChannel {
    peer: Arc<str>,
    writer: tokio::sync::Mutex<LineWriter>,
    inbox: broadcast::Sender<Value>,
    reader: Mutex<Option<BoxedReader>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    disconnected: Arc<AtomicBool>,
}

impl LineChannel {
    pub fn new<R, W>(
        peer: &str,
        reader: R,
        writer: W,
        capacity: usize,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (inbox, _) = broadcast::channel(capacity.max(1));
        Self {
            peer: Arc::from(peer),
            writer: tokio::sync::Mutex::new(LineWriter {
                inner: Box::new(writer),
                torn: false,
            }),
            inbox,
            reader: Mutex::new(Some(Box::new(reader))),
            reader_task: Mutex::new(None),
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Канал воркера к родителю через собственные stdin/stdout.
    pub fn stdio(capacity: usize) -> Self {
        Self::new(
            COORDINATOR_PEER,
            tokio::io::stdin(),
            tokio::io::stdout(),
            capacity,
        )
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    fn start_reader(&self) {
        let mut slot = self.reader.lock();
        if slot.is_none() {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!(peer = %self.peer, "no Tokio runtime, channel reader not started");
            return;
        };
        if let Some(reader) = slot.take() {
            let task = handle.spawn(read_lines(
                Arc::clone(&self.peer),
                reader,
                self.inbox.clone(),
                Arc::clone(&self.disconnected),
            ));
            *self.reader_task.lock() = Some(task);
        }
    }

    fn io_error(
        &self,
        error: std::io::Error,
    ) -> ChannelError {
        if matches!(
            error.kind(),
            ErrorKind::BrokenPipe
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::UnexpectedEof
        ) {
            self.disconnected.store(true, Ordering::Release);
            ChannelError::Disconnected {
                peer: self.peer.to_string(),
            }
        } else {
            ChannelError::Io {
                peer: self.peer.to_string(),
                reason: error.to_string(),
            }
        }
    }
}

async fn read_lines(
    peer: Arc<str>,
    reader: BoxedReader,
    inbox: broadcast::Sender<Value>,
    disconnected: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(line) {
                    Ok(message) => {
                        // слушателей может не быть: сообщение теряется
                        let _ = inbox.send(message);
                    }
                    Err(e) => {
                        tracing::trace!(peer = %peer, error = %e, "skipping non-JSON line");
                    }
                }
            }
            Ok(None) => {
                tracing::debug!(peer = %peer, "channel closed by peer");
                break;
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                tracing::warn!(peer = %peer, "ignoring invalid UTF-8 from peer");
            }
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "channel read failed");
                break;
            }
        }
    }

    disconnected.store(true, Ordering::Release);
}

#[async_trait]
impl ProcessChannel for LineChannel {
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

        let mut line = serde_json::to_string(&message).map_err(|e| ChannelError::Serialization {
            reason: e.to_string(),
        })?;
        line.push('\n');

        self.writer
            .lock()
            .await
            .write_line(line.as_bytes())
            .await
            .map_err(|e| self.io_error(e))
    }

    fn listen(&self) -> broadcast::Receiver<Value> {
        let receiver = self.inbox.subscribe();
        self.start_reader();
        receiver
    }
}

impl Drop for LineChannel {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.get_mut().take() {
            task.abort();
        }
    }
}
