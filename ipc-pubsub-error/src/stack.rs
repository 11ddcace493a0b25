use std::{fmt, panic::Location, sync::Arc};

use crate::{ErrorExt, LogLevel, StatusCode};

/// Ошибка с цепочкой контекстов.
///
/// Дешёво клонируется (`Arc` внутри), поэтому одна и та же ошибка
/// обработчика может уйти и в лог, и всем слушателям канала сбоев.
#[derive(Clone)]
pub struct StackError {
    root: Arc<dyn ErrorExt>,
    frames: Arc<[ErrorContext]>,
}

/// Один уровень контекста: сообщение и место, где он добавлен.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: String,
    pub location: Option<&'static Location<'static>>,
}

impl fmt::Display for ErrorContext {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "{} at {}:{}", self.message, loc.file(), loc.line()),
            None => f.write_str(&self.message),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StackError {
    #[track_caller]
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            root: Arc::new(err),
            frames: Arc::from(Vec::new()),
        }
    }

    /// Оборачивает ошибку ещё одним уровнем контекста.
    #[track_caller]
    pub fn context(
        self,
        msg: impl Into<String>,
    ) -> Self {
        let mut frames = self.frames.to_vec();
        frames.push(ErrorContext {
            message: msg.into(),
            location: Some(Location::caller()),
        });
        Self {
            root: self.root,
            frames: frames.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.root.status_code()
    }

    /// Сообщение без внутренних деталей.
    pub fn client_message(&self) -> String {
        self.root.client_message()
    }

    /// Исходная ошибка, без контекстов.
    pub fn root(&self) -> &dyn ErrorExt {
        self.root.as_ref()
    }

    /// Контексты от самого раннего к самому позднему.
    pub fn contexts(&self) -> &[ErrorContext] {
        &self.frames
    }

    pub fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        self.root.metrics_tags()
    }

    pub fn downcast_ref<T: ErrorExt + 'static>(&self) -> Option<&T> {
        self.root.as_any().downcast_ref::<T>()
    }

    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    pub fn is_retryable(&self) -> bool {
        self.status_code().is_retryable()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StackError
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let frames: Vec<String> = self.frames.iter().map(ToString::to_string).collect();
        f.debug_struct("StackError")
            .field("code", &self.status_code())
            .field("root", &self.root.to_string())
            .field("contexts", &frames)
            .finish()
    }
}

/// Внешний контекст первым: `outer: inner: root`.
impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for frame in self.frames.iter().rev() {
            write!(f, "{}: ", frame.message)?;
        }
        write!(f, "{}", self.root)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.root.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    #[track_caller]
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
