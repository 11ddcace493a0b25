//! Удалённые брокеры (`rpm+mqtt`, `rpm+redis`, `rpm+nats`, `rpm+pgsql`).
//!
//! Клиенты брокеров подключаются снаружи через [`Connectors`]; здесь
//! разбор дескриптора и перевод адресации, общие для всех адаптеров.

pub mod addressing;
pub mod connector;
pub mod descriptor;

pub use connector::*;
pub use descriptor::*;
