use std::io::{self, Stderr};

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::Layer as LayerTrait,
    registry::LookupSpan,
};

use crate::logging::config::{LogFormat, LoggingConfig};

/// Консольный слой в выбранном формате.
///
/// Тип формата стирается в boxed trait-объект, чтобы json/pretty/compact
/// имели один тип возврата.
pub fn build_formatter_from_config<S>(config: &LoggingConfig) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    // Лог идёт в stderr, stdout остаётся за приложением.
    let writer: fn() -> Stderr = io::stderr;

    match config.format {
        LogFormat::Json => {
            let json_fmt = fmt::format().json().with_current_span(true);
            let layer = fmt::layer()
                .event_format(json_fmt)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_line_number(config.with_line_numbers);
            Box::new(layer)
        }
        LogFormat::Pretty => {
            let pretty_fmt = fmt::format().pretty();
            let layer = fmt::layer()
                .event_format(pretty_fmt)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer)
                .with_ansi(config.ansi)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_line_number(config.with_line_numbers);
            Box::new(layer)
        }
        LogFormat::Compact => {
            let compact_fmt = fmt::format().compact();
            let layer = fmt::layer()
                .event_format(compact_fmt)
                .with_writer(writer)
                .with_ansi(config.ansi)
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_line_number(config.with_line_numbers);
            Box::new(layer)
        }
    }
}
