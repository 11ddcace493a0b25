use std::fmt;

use num_enum::TryFromPrimitive;

/// Код ошибки pub/sub.
///
/// Тысячи задают категорию (см. [`Category`]), поэтому код можно
/// передать соседнему процессу числом и восстановить через
/// `StatusCode::try_from(u32)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    Unknown = 1000,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,

    AlreadyOpen = 2000,
    NotOpen = 2001,

    InvalidPattern = 3000,

    UnknownStrategy = 4000,
    InvalidDescriptor = 4001,

    HandlerFailed = 5000,
    HandlerPanicked = 5001,

    Io = 6000,
    ConnectionClosed = 6001,
    Timeout = 6002,
    SendFailed = 6003,
    FanoutFailed = 6004,
    SerializationFailed = 6005,
}

/// Категория кода, по тысячам.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    General,
    Lifecycle,
    Pattern,
    Strategy,
    Handler,
    Transport,
}

/// Уровень, с которым ошибку стоит писать в лог.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub fn category(self) -> Category {
        match self.code() / 1000 {
            2 => Category::Lifecycle,
            3 => Category::Pattern,
            4 => Category::Strategy,
            5 => Category::Handler,
            6 => Category::Transport,
            _ => Category::General,
        }
    }

    /// Короткое имя для логов: `not_open`, `fanout_failed`...
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Unexpected => "unexpected",
            Self::Internal => "internal",
            Self::InvalidArgs => "invalid_args",
            Self::AlreadyOpen => "already_open",
            Self::NotOpen => "not_open",
            Self::InvalidPattern => "invalid_pattern",
            Self::UnknownStrategy => "unknown_strategy",
            Self::InvalidDescriptor => "invalid_descriptor",
            Self::HandlerFailed => "handler_failed",
            Self::HandlerPanicked => "handler_panicked",
            Self::Io => "io",
            Self::ConnectionClosed => "connection_closed",
            Self::Timeout => "timeout",
            Self::SendFailed => "send_failed",
            Self::FanoutFailed => "fanout_failed",
            Self::SerializationFailed => "serialization_failed",
        }
    }

    /// Операцию можно повторить позже. Сама библиотека ничего не
    /// повторяет, решение за вызывающей стороной.
    pub fn is_retryable(self) -> bool {
        self.category() == Category::Transport && self != Self::SerializationFailed
    }

    /// Ошибка использования API, обнаруживается до побочных эффектов.
    pub fn is_client_error(self) -> bool {
        matches!(
            self.category(),
            Category::Lifecycle | Category::Pattern | Category::Strategy
        ) || self == Self::InvalidArgs
    }

    /// Текст такой ошибки не показывают за пределами процесса.
    pub fn is_internal(self) -> bool {
        matches!(self, Self::Unknown | Self::Unexpected | Self::Internal)
    }

    pub fn log_level(self) -> LogLevel {
        match self {
            Self::AlreadyOpen | Self::NotOpen => LogLevel::Debug,
            _ if self.is_client_error() => LogLevel::Info,
            Self::HandlerPanicked => LogLevel::Error,
            _ if self.is_internal() => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

/// `not_open/2001`
impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}", self.as_str(), self.code())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
