use serde::{Deserialize, Serialize};

use config::{Config, ConfigError, Environment};

use crate::{logging::LoggingConfig, pubsub::SchedulerConfig};

/// Префикс переменных окружения: `TOPICBUS__SCHEDULER__MODE=immediate`.
pub const ENV_PREFIX: &str = "TOPICBUS";

/// Настройки библиотеки.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Загружает настройки из значений по умолчанию и переменных окружения с
    /// префиксом [`ENV_PREFIX`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_prefix(ENV_PREFIX)
    }

    pub fn load_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            // Добавляем значения по умолчанию
            .set_default("scheduler.mode", "deferred")?
            .set_default("scheduler.flush", "spawn")?
            .set_default("logging.level", "info")?
            // Добавляем переменные окружения с префиксом, секции через `__`
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        // Десериализуем конфигурацию в нашу структуру
        cfg.try_deserialize()
    }
}
