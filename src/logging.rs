//! Log subscriber setup with an optional JSON line format.
//!
//! Log format:
//! ```json
//! {"ts":"2024-12-28T15:04:05.123Z","level":"info","type":"app","msg":"pool started","ctx":{"service":"chain_pool"},"data":{"pool":"ingest","workers":4}}
//! ```

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Install the global subscriber described by `config`.
///
/// Fails if a global subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_new(&config.filter)
        .unwrap_or_else(|_| EnvFilter::new("chain_pool=info"));

    match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .event_format(JsonFormatter::new(config.service_name.clone())),
            )
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_thread_names(true))
            .try_init(),
    }
}

/// Log entry with unified structure.
#[derive(Serialize)]
pub struct LogEntry<'a> {
    /// ISO 8601 timestamp with milliseconds, UTC
    pub ts: &'a str,
    /// Log level: debug, info, warn, error
    pub level: &'a str,
    /// Log type: app, error
    #[serde(rename = "type")]
    pub log_type: &'a str,
    /// Short human-readable message
    pub msg: &'a str,
    /// Context: service, thread
    pub ctx: LogContext<'a>,
    /// Event fields
    pub data: HashMap<String, serde_json::Value>,
}

/// Log context.
#[derive(Serialize, Default)]
pub struct LogContext<'a> {
    /// Service name
    pub service: &'a str,
    /// Name of the emitting thread (e.g. "ingest-3")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<&'a str>,
}

/// Custom JSON formatter for tracing.
pub struct JsonFormatter {
    service_name: String,
}

impl JsonFormatter {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();
        let level = match *meta.level() {
            Level::TRACE => "debug",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };

        let log_type = if *meta.level() == Level::ERROR {
            "error"
        } else {
            "app"
        };

        // Collect fields
        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        let ts = Iso8601Timestamp::now();
        let current = std::thread::current();
        let msg = visitor.message.unwrap_or_default();

        let entry = LogEntry {
            ts: ts.as_str(),
            level,
            log_type,
            msg: &msg,
            ctx: LogContext {
                service: &self.service_name,
                thread: current.name(),
            },
            data: visitor.fields,
        };

        writeln!(
            writer,
            "{}",
            serde_json::to_string(&entry).unwrap_or_default()
        )
    }
}

/// Field visitor for collecting tracing fields.
struct FieldVisitor {
    message: Option<String>,
    fields: HashMap<String, serde_json::Value>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: HashMap::new(),
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value).trim_matches('"').to_string());
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(format!("{:?}", value)),
            );
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }
}

/// ISO 8601 UTC timestamp with milliseconds: `2024-12-28T15:04:05.123Z`.
///
/// Stack-allocated, no heap allocation.
#[derive(Clone, Copy)]
pub struct Iso8601Timestamp {
    buf: [u8; 24],
}

impl Iso8601Timestamp {
    /// Create a new timestamp for the current time.
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::from_duration(now)
    }

    /// Create from a Duration since UNIX_EPOCH.
    pub fn from_duration(duration: Duration) -> Self {
        let secs = duration.as_secs();
        let millis = duration.subsec_millis() as u16;

        let day_secs = secs % 86400;
        let hours = (day_secs / 3600) as u8;
        let minutes = ((day_secs % 3600) / 60) as u8;
        let seconds = (day_secs % 60) as u8;

        let mut year = 1970u16;
        let mut remaining = secs / 86400;
        loop {
            let year_days = if is_leap_year(year) { 366 } else { 365 };
            if remaining < year_days {
                break;
            }
            remaining -= year_days;
            year += 1;
        }

        let month_days: [u64; 12] = if is_leap_year(year) {
            [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
        } else {
            [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
        };

        let mut month = 1u8;
        for &days_in_month in &month_days {
            if remaining < days_in_month {
                break;
            }
            remaining -= days_in_month;
            month += 1;
        }
        let day = remaining as u8 + 1;

        // YYYY-MM-DDTHH:MM:SS.mmmZ
        let mut buf = *b"0000-00-00T00:00:00.000Z";
        write_digits(&mut buf[0..4], year as u32);
        write_digits(&mut buf[5..7], month as u32);
        write_digits(&mut buf[8..10], day as u32);
        write_digits(&mut buf[11..13], hours as u32);
        write_digits(&mut buf[14..16], minutes as u32);
        write_digits(&mut buf[17..19], seconds as u32);
        write_digits(&mut buf[20..23], millis as u32);
        Self { buf }
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII digits and separators are ever written.
        std::str::from_utf8(&self.buf).unwrap_or("1970-01-01T00:00:00.000Z")
    }
}

impl std::fmt::Display for Iso8601Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for Iso8601Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Write `val` zero-padded into all of `buf`.
fn write_digits(buf: &mut [u8], mut val: u32) {
    for slot in buf.iter_mut().rev() {
        *slot = b'0' + (val % 10) as u8;
        val /= 10;
    }
}
