use std::{env, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::LoggingError;

/// Переменная окружения, переопределяющая уровень логирования.
pub const ENV_LOG_LEVEL: &str = "TOPICBUS_LOG_LEVEL";
/// Переменная окружения, переопределяющая формат вывода.
pub const ENV_LOG_FORMAT: &str = "TOPICBUS_LOG_FORMAT";

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Формат вывода консольного лога.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(LoggingError::InvalidFormat(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        };
        f.write_str(s)
    }
}

/// Конфигурация логирования.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень (`info`) или полная директива `EnvFilter`
    /// (`topicbus=debug,warn`).
    pub level: String,
    pub format: LogFormat,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Применяет переопределения из переменных окружения.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            self.level = level;
        }
        if let Ok(format) = env::var(ENV_LOG_FORMAT) {
            match format.parse() {
                Ok(format) => self.format = format,
                Err(e) => eprintln!("Ignoring {ENV_LOG_FORMAT}: {e}"),
            }
        }
    }

    /// Проверяет уровень: либо одно из известных имён, либо директива с `=`.
    pub fn validate(&self) -> Result<(), LoggingError> {
        let level = self.level.trim();
        if level.is_empty() {
            return Err(LoggingError::InvalidLevel(self.level.clone()));
        }
        if level.contains('=') || LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            Ok(())
        } else {
            Err(LoggingError::InvalidLevel(self.level.clone()))
        }
    }

    /// Директива для `EnvFilter`.
    pub fn build_filter_directive(&self) -> String {
        self.level.trim().to_ascii_lowercase()
    }
}
