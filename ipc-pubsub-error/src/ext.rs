use std::{any::Any, error::Error};

use crate::StatusCode;

/// Общий трейт ошибок pub/sub (object-safe).
///
/// Любая ошибка, реализующая его, превращается в [`StackError`](crate::StackError)
/// через `?` и может быть возвращена из обработчика подписки.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// По умолчанию [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    fn as_any(&self) -> &dyn Any;

    /// Текст, который можно показать за пределами процесса (например,
    /// отправить соседу по группе). Внутренние ошибки скрываются.
    fn client_message(&self) -> String {
        if self.status_code().is_internal() {
            "internal error".to_string()
        } else {
            self.to_string()
        }
    }

    /// Поля для структурированного лога.
    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![("status_code", self.status_code().to_string())]
    }
}
