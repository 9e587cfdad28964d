use thiserror::Error;
use topicbus_error::{ErrorExt, StatusCode};

/// Ошибки настройки логирования.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoggingError {
    #[error("Invalid log level: '{0}'")]
    InvalidLevel(String),

    #[error("Invalid log format: '{0}' (expected pretty, compact or json)")]
    InvalidFormat(String),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

impl ErrorExt for LoggingError {
    fn status_code(&self) -> StatusCode {
        match self {
            LoggingError::InvalidLevel(_) | LoggingError::InvalidFormat(_) => {
                StatusCode::InvalidConfig
            }
            LoggingError::AlreadyInitialized(_) => StatusCode::Unexpected,
        }
    }
}
