//! Подсистема Publish–Subscribe (pub/sub).
//!
//! Общее ядро всех стратегий доставки:
//!
//! - `pattern`: компиляция фильтров топиков с подстановками `+` и `#`.
//! - `router`: внутрипроцессная таблица подписок и доставка сообщений.
//! - `message`: доставленное сообщение для потоковых потребителей.
//! - `subscription`: дескриптор подписки и механизм её отмены.
//!
//! Публичный API переэкспортирует все вложенные модули.

pub mod message;
pub mod pattern;
pub mod router;
pub mod subscription;

// Публичный экспорт всех типов и функций из вложенных
// модулей, чтобы упростить доступ к ним из внешнего кода.
pub use message::*;
pub use pattern::*;
pub use router::*;
pub use subscription::*;
