use std::{any::Any, sync::Arc};

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибка вызова подписчика во время доставки сообщения.
///
/// Никогда не возвращается издателю: планировщик перехватывает её в точке
/// вызова, логирует и продолжает доставку остальным подписчикам.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriberError {
    /// Колбэк подписчика запаниковал.
    #[error("subscriber {subscriber} on topic '{topic}' panicked: {message}")]
    Panicked {
        topic: Arc<str>,
        subscriber: u64,
        message: String,
    },

    /// Колбэк подписчика вернул ошибку.
    #[error("subscriber {subscriber} on topic '{topic}' failed: {reason}")]
    Failed {
        topic: Arc<str>,
        subscriber: u64,
        reason: String,
    },
}

impl SubscriberError {
    /// Собирает ошибку из payload паники, полученного от `catch_unwind`.
    pub fn from_panic(
        topic: Arc<str>,
        subscriber: u64,
        payload: &(dyn Any + Send),
    ) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked {
            topic,
            subscriber,
            message,
        }
    }

    /// Имя топика, на котором произошла ошибка.
    pub fn topic(&self) -> &str {
        match self {
            Self::Panicked { topic, .. } | Self::Failed { topic, .. } => topic,
        }
    }

    /// Идентификатор подписчика.
    pub fn subscriber(&self) -> u64 {
        match self {
            Self::Panicked { subscriber, .. } | Self::Failed { subscriber, .. } => *subscriber,
        }
    }
}

impl ErrorExt for SubscriberError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Panicked { .. } => StatusCode::SubscriberPanicked,
            Self::Failed { .. } => StatusCode::SubscriberFailed,
        }
    }
}
