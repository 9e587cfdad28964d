use tracing_subscriber::EnvFilter;

use crate::logging::config::LoggingConfig;

const FALLBACK_DIRECTIVE: &str = "info";

/// Собирает `EnvFilter`.
///
/// Если задан `RUST_LOG`, он имеет приоритет над конфигурацией.
pub fn build_filter_from_config(config: &LoggingConfig) -> EnvFilter {
    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        return env_filter;
    }

    let directive = config.build_filter_directive();
    match EnvFilter::try_new(&directive) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!(
                "Invalid log filter directive '{directive}': {e}; falling back to '{FALLBACK_DIRECTIVE}'"
            );
            EnvFilter::new(FALLBACK_DIRECTIVE)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        sync::{Arc, Mutex},
    };

    use serial_test::serial;
    use tracing_subscriber::{fmt, prelude::*, registry::Registry};

    use super::*;

    // Мини-буферный writer для тестов
    struct VecMakeWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> fmt::MakeWriter<'a> for VecMakeWriter {
        type Writer = VecWriterGuard;

        fn make_writer(&'a self) -> Self::Writer {
            VecWriterGuard(self.0.clone())
        }
    }

    struct VecWriterGuard(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for VecWriterGuard {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn config_with_level(level: &str) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
            ..LoggingConfig::default()
        }
    }

    fn capture(
        filter: EnvFilter,
        emit: impl FnOnce(),
    ) -> String {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber = Registry::default().with(filter).with(
            fmt::layer()
                .with_writer(VecMakeWriter(buffer.clone()))
                .with_ansi(false),
        );
        tracing::subscriber::with_default(subscriber, emit);
        let bytes = buffer.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    /// Тест проверяет, что директива "warn" из конфигурации отсекает info.
    #[test]
    #[serial]
    fn test_config_directive_filters_levels() {
        env::remove_var("RUST_LOG");
        let filter = build_filter_from_config(&config_with_level("warn"));

        let out = capture(filter, || {
            tracing::info!("quiet message");
            tracing::warn!("loud message");
        });

        assert!(!out.contains("quiet message"));
        assert!(out.contains("loud message"));
    }

    /// Тест проверяет, что RUST_LOG важнее конфигурации.
    #[test]
    #[serial]
    fn test_rust_log_wins_over_config() {
        env::set_var("RUST_LOG", "debug");
        let filter = build_filter_from_config(&config_with_level("error"));
        env::remove_var("RUST_LOG");

        let out = capture(filter, || tracing::debug!("debug message"));
        assert!(out.contains("debug message"));
    }

    /// Тест проверяет откат на "info" при некорректной директиве.
    #[test]
    #[serial]
    fn test_invalid_directive_falls_back_to_info() {
        env::remove_var("RUST_LOG");
        let filter = build_filter_from_config(&config_with_level("topicbus=[[["));

        let out = capture(filter, || {
            tracing::debug!("hidden");
            tracing::info!("visible");
        });

        assert!(!out.contains("hidden"));
        assert!(out.contains("visible"));
    }
}
