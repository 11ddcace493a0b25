pub mod ext;
pub mod macros;
pub mod stack;
pub mod status_code;
pub mod types;

// Publicly re-export all error types and functions from the submodules to
// simplify access from external code.
pub use ext::*;
pub use macros::*;
pub use stack::*;
pub use status_code::*;
pub use types::*;

/// Результат операций pub/sub API.
pub type PubSubResult<T> = Result<T, PubSubError>;

/// Результат вспомогательных операций с контекстом ошибки.
pub type StackResult<T> = Result<T, StackError>;
