//! Structured logging.
//!
//! # Responsibilities
//! - Select the log destination (stdout, stderr, rotating file)
//! - Parse and enforce the minimum level
//! - Serialize writers so concurrent lines never interleave
//!
//! # Design Decisions
//! - The sink owns its `tracing` dispatcher instead of installing a global one;
//!   `install_global` is an explicit, one-time opt-in
//! - Destination and level are fixed once configured
//! - Empty field values are printed as `""` so operators can tell them apart
//!   from missing fields

use std::borrow::Cow;
use std::fmt::{self, Write as _};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::field::{Field, Visit};
use tracing::Dispatch;
use tracing_subscriber::field::RecordFields;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::{FormatFields, Writer};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

use crate::config::{LogConfig, LogOutput};
use crate::error::ConfigError;
use crate::observability::rotation::{RotatingFile, RotationPolicy};

/// Parse a level name: trace, debug, info, warn(ing), error, fatal or panic, any case.
pub fn parse_level(level: &str) -> Result<LevelFilter, ConfigError> {
    match level.to_ascii_lowercase().as_str() {
        "panic" | "fatal" | "error" => Ok(LevelFilter::ERROR),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        _ => Err(ConfigError::InvalidLevel(level.to_string())),
    }
}

type BoxedWriter = Box<dyn Write + Send>;

/// Shared, mutex-serialized destination.
#[derive(Clone)]
pub struct SinkWriter {
    inner: Arc<Mutex<BoxedWriter>>,
}

impl SinkWriter {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoxedWriter> {
        // A panic mid-write leaves at worst a torn line; keep logging.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write one complete line. Failures are dropped.
    pub fn write_line(&self, line: &str) {
        let mut guard = self.lock();
        let _ = guard
            .write_all(line.as_bytes())
            .and_then(|()| guard.flush());
    }
}

/// Exclusive handle held for the duration of one formatted event.
pub struct SinkGuard<'a>(MutexGuard<'a, BoxedWriter>);

impl Write for SinkGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for SinkWriter {
    type Writer = SinkGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SinkGuard(self.lock())
    }
}

/// In-memory destination. Cloned handles share the same buffer.
#[derive(Clone, Default)]
pub struct MemoryWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Written lines, in order.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Field formatter: bare message, `key=value` pairs, empty values quoted.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotedFields;

impl<'writer> FormatFields<'writer> for QuotedFields {
    fn format_fields<R: RecordFields>(&self, writer: Writer<'writer>, fields: R) -> fmt::Result {
        let mut visitor = QuotingVisitor {
            writer,
            result: Ok(()),
            first: true,
        };
        fields.record(&mut visitor);
        visitor.result
    }
}

struct QuotingVisitor<'a> {
    writer: Writer<'a>,
    result: fmt::Result,
    first: bool,
}

impl QuotingVisitor<'_> {
    fn write_field(&mut self, name: &str, value: &str) {
        if self.result.is_err() || name.starts_with("log.") {
            return;
        }
        let sep = if self.first { "" } else { " " };
        self.first = false;
        self.result = match name {
            "message" if !value.is_empty() => write!(self.writer, "{sep}{value}"),
            "message" => write!(self.writer, "{sep}{}", quote_value(value)),
            _ => write!(self.writer, "{sep}{name}={}", quote_value(value)),
        };
    }
}

impl Visit for QuotingVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.write_field(field.name(), value);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.write_field(field.name(), &format!("{value:?}"));
    }
}

/// Quote a field value unless it is non-empty and made only of safe characters.
pub fn quote_value(value: &str) -> Cow<'_, str> {
    let plain = |c: char| c.is_ascii_alphanumeric() || "-._/@^+".contains(c);
    if value.is_empty() {
        Cow::Borrowed("\"\"")
    } else if value.chars().all(plain) {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("{value:?}"))
    }
}

/// Process-wide log destination owned by the gateway.
pub struct LogSink {
    dispatch: Dispatch,
    writer: SinkWriter,
    level: LevelFilter,
    output: LogOutput,
}

impl LogSink {
    /// Build a sink from configuration. An unknown level is the only failure.
    pub fn configure(config: &LogConfig) -> Result<Self, ConfigError> {
        let level = parse_level(&config.level)?;
        let writer = match &config.output {
            LogOutput::Stdout => SinkWriter::new(io::stdout()),
            LogOutput::Stderr => SinkWriter::new(io::stderr()),
            LogOutput::File(path) => {
                SinkWriter::new(RotatingFile::new(path, RotationPolicy::from(config)))
            }
        };
        Ok(Self::build(config.output.clone(), level, writer))
    }

    /// Build a sink over an arbitrary writer, e.g. a [`MemoryWriter`].
    pub fn with_writer<W>(level: &str, writer: W) -> Result<Self, ConfigError>
    where
        W: Write + Send + 'static,
    {
        let level = parse_level(level)?;
        Ok(Self::build(LogOutput::Stdout, level, SinkWriter::new(writer)))
    }

    fn build(output: LogOutput, level: LevelFilter, writer: SinkWriter) -> Self {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer.clone())
            .with_ansi(false)
            .with_timer(ChronoLocal::rfc_3339())
            .fmt_fields(QuotedFields)
            .with_filter(level);
        let subscriber = tracing_subscriber::registry().with(layer);

        Self {
            dispatch: Dispatch::new(subscriber),
            writer,
            level,
            output,
        }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn output(&self) -> &LogOutput {
        &self.output
    }

    /// Dispatcher for attaching to futures via `WithSubscriber`.
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Write a pre-formatted line straight to the destination, bypassing the level filter.
    pub fn write_line(&self, line: &str) {
        self.writer.write_line(line);
    }

    /// Run `f` with this sink as the current `tracing` dispatcher.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Make this sink the process-wide default. Only the first call succeeds.
    pub fn install_global(&self) -> bool {
        match tracing::dispatcher::set_global_default(self.dispatch.clone()) {
            Ok(()) => true,
            Err(_) => {
                self.in_scope(|| {
                    tracing::warn!("Global logger already installed, keeping the existing one")
                });
                false
            }
        }
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("level", &self.level)
            .field("output", &self.output)
            .finish()
    }
}
