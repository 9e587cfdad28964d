use std::error::Error;

use crate::StatusCode;

/// Расширение для ошибок библиотеки (object-safe).
///
/// Связывает ошибку с [`StatusCode`], который попадает в поле `status`
/// структурированных логов.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Статус ошибки.
    ///
    /// По умолчанию возвращает [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }
}
