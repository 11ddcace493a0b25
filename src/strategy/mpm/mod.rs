//! Группа процессов: координатор и воркеры без внешнего брокера.
//!
//! - `envelope`: конверт сообщений ретранслятора.
//! - `channel`: абстракция межпроцессного канала и in-memory пара.
//! - `line`: канал поверх stdin/stdout дочернего процесса.
//! - `process`: роль процесса, состав группы, запуск воркеров.
//! - `relay`: стратегия `ProcessGroup`.

pub mod channel;
pub mod envelope;
pub mod line;
pub mod process;
pub mod relay;

pub use channel::*;
pub use envelope::*;
pub use line::*;
pub use process::*;
pub use relay::*;
