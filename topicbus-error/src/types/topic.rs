use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки работы с именованными топиками брокера.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    /// Топик с таким именем уже создан с другим типом полезной нагрузки.
    #[error("topic '{name}' carries '{actual}', requested '{expected}'")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl ErrorExt for TopicError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::TypeMismatch { .. } => StatusCode::TopicTypeMismatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_display() {
        let err = TopicError::TypeMismatch {
            name: "clicks".to_string(),
            expected: "u32",
            actual: "alloc::string::String",
        };
        assert_eq!(
            err.to_string(),
            "topic 'clicks' carries 'alloc::string::String', requested 'u32'"
        );
        assert_eq!(err.status_code(), StatusCode::TopicTypeMismatch);
    }
}
