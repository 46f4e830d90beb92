//! Logging setup.
//!
//! Level selection, highest priority first: `VODSYNC_LOG` environment
//! variable, then command-line verbosity, then `info`.
//! - 0: info
//! - 1: debug
//! - 2: trace for this crate only, dependencies stay at info
//! - 3+: trace everywhere

use chrono::{Datelike, Local, Timelike};
use tracing_subscriber::{
    fmt::{self, format::Writer, FormatEvent, FormatFields},
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Registry,
};

/// Environment variable overriding the verbosity flag
pub const LOG_ENV: &str = "VODSYNC_LOG";

const CRATE_TARGET: &str = "vodsync";

fn build_filter(verbosity: u8) -> EnvFilter {
    match verbosity {
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("debug"),
        2 => EnvFilter::new(format!("info,{}=trace", CRATE_TARGET)),
        _ => EnvFilter::new("trace"),
    }
}

/// Install the global subscriber. Fails if one is already set.
pub fn init(verbosity: u8) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| build_filter(verbosity));

    // Logs go to stderr so command output on stdout stays clean
    let console_layer = fmt::Layer::default()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .event_format(ConsoleFormatter)
        .with_filter(filter);

    Registry::default().with(console_layer).try_init()
}

/// Coloured level, timestamp with milliseconds, message
struct ConsoleFormatter;

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = Local::now();
        let meta = event.metadata();
        let color = match *meta.level() {
            tracing::Level::ERROR => "\x1b[31m",
            tracing::Level::WARN => "\x1b[33m",
            tracing::Level::INFO => "\x1b[32m",
            _ => "\x1b[34m",
        };
        write!(
            writer,
            "[{:02}-{:02} {:02}:{:02}:{:02}.{:03}] {}{:5}\x1b[0m {} > ",
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
            now.timestamp_subsec_millis(),
            color,
            meta.level(),
            meta.target(),
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
