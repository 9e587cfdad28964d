//! Структурированное логирование на `tracing`.
//!
//! Библиотека сама ничего не инициализирует: события планировщика и топиков
//! пишутся через макросы `tracing`, а подписчика ставит приложение. Для
//! простого случая есть [`init_logging`].

pub mod config;
mod filters;
mod formatter;

pub use self::config::{LogFormat, LoggingConfig, ENV_LOG_FORMAT, ENV_LOG_LEVEL};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::LoggingError;

/// Устанавливает глобальный подписчик `tracing` по конфигурации.
///
/// Переменные окружения `TOPICBUS_LOG_LEVEL` и `TOPICBUS_LOG_FORMAT`
/// применяются поверх `config`, `RUST_LOG` имеет приоритет над уровнем.
///
/// # Ошибки
/// - [`LoggingError::InvalidLevel`], если уровень не распознан
/// - [`LoggingError::AlreadyInitialized`], если глобальный подписчик уже стоит
pub fn init_logging(mut config: LoggingConfig) -> Result<(), LoggingError> {
    config.apply_env_overrides();
    config.validate()?;

    let env_filter = filters::build_filter_from_config(&config);
    let console = formatter::build_formatter_from_config(&config);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        format = %config.format,
        "Logging system initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    /// Тест проверяет, что некорректный уровень отклоняется до установки
    /// подписчика.
    #[test]
    #[serial]
    fn test_init_rejects_invalid_level() {
        std::env::remove_var(ENV_LOG_LEVEL);
        let cfg = LoggingConfig {
            level: "shouting".to_string(),
            ..LoggingConfig::default()
        };
        assert!(matches!(
            init_logging(cfg),
            Err(LoggingError::InvalidLevel(l)) if l == "shouting"
        ));
    }

    /// Тест проверяет, что повторная инициализация возвращает ошибку, а не
    /// паникует.
    #[test]
    #[serial]
    fn test_second_init_fails() {
        std::env::remove_var(ENV_LOG_LEVEL);
        let _ = init_logging(LoggingConfig::default());
        assert!(matches!(
            init_logging(LoggingConfig::default()),
            Err(LoggingError::AlreadyInitialized(_))
        ));
    }
}
