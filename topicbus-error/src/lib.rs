pub mod ext;
pub mod status_code;
pub mod types;

// Публичный реэкспорт всех типов ошибок, чтобы упростить доступ к ним из
// внешнего кода.
pub use ext::*;
pub use status_code::*;
pub use types::*;

pub type TopicResult<T> = Result<T, TopicError>;
