//! Log subscriber setup for binaries and tests that embed stratum.

use std::{fmt::Debug, io::IsTerminal};

use nu_ansi_term::Color::{Blue, Green, Magenta, Red, Yellow};
use stratum_config::Config;
use tracing::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use tracing_subscriber::{
    fmt::{
        self,
        format::{FmtSpan, Writer},
        FmtContext, FormatEvent, FormatFields,
    },
    registry::LookupSpan,
    EnvFilter,
};

use crate::error::{DbError, Result};

#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    fields: Vec<String>,
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push(format!("{}={value}", field.name()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields.push(format!("{}={value:?}", field.name()));
        }
    }
}

/// `[LEVEL] message key=value ...`, one line per event.
pub struct LevelFormatter {
    ansi: bool,
}

impl LevelFormatter {
    pub fn new(ansi: bool) -> Self {
        Self { ansi }
    }

    fn render(&self, level: Level, visitor: EventVisitor) -> String {
        let (color, tag) = match level {
            Level::TRACE => (Magenta, "[TRACE]"),
            Level::DEBUG => (Blue, "[DEBUG]"),
            Level::INFO => (Green, "[INFO]"),
            Level::WARN => (Yellow, "[WARN]"),
            Level::ERROR => (Red, "[ERROR]"),
        };

        let mut line = if self.ansi {
            color.paint(tag).to_string()
        } else {
            tag.to_string()
        };
        if let Some(message) = visitor.message {
            line.push(' ');
            line.push_str(&message);
        }
        for field in visitor.fields {
            line.push(' ');
            line.push_str(&field);
        }
        line
    }
}

impl<S, N> FormatEvent<S, N> for LevelFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        writeln!(writer, "{}", self.render(*event.metadata().level(), visitor))
    }
}

/// The filter used when `RUST_LOG` is unset: `stratum=<level>`, which
/// covers every `stratum_*` crate.
pub fn default_directive(level: &str) -> String {
    format!("stratum={level}")
}

/// Installs the global subscriber. Writes to stderr; JSON lines when
/// `logging.json` is set, coloured level tags on a terminal otherwise.
///
/// Fails if a global subscriber is already installed.
pub fn setup_logging(config: &Config) -> Result<()> {
    let level = config.log_level()?;
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => {
            EnvFilter::try_new(directives).map_err(|e| DbError::Logging(e.to_string()))?
        }
        _ => EnvFilter::new(default_directive(&level)),
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr)
        .compact()
        .without_time();

    let subscriber: Box<dyn Subscriber + Send + Sync> = if config.log_json() {
        Box::new(builder.json().flatten_event(true).finish())
    } else {
        let ansi = std::io::stderr().is_terminal();
        Box::new(builder.event_format(LevelFormatter::new(ansi)).finish())
    };

    tracing::subscriber::set_global_default(subscriber).map_err(|e| DbError::Logging(e.to_string()))
}
