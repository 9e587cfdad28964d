//! Ошибки крейта.
//!
//! Ошибки доставки и топиков живут в `topicbus-error` и реэкспортируются
//! здесь; локально определены только ошибки окружения (логирование).

pub mod logging;

pub use ::config::ConfigError;
pub use logging::LoggingError;
pub use topicbus_error::{ErrorExt, StatusCode, SubscriberError, TopicError, TopicResult};
