//! In-memory tracing sink for asserting on worker log output

use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// One emitted event: message plus its structured fields
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl LogRecord {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn render(&self) -> String {
        let mut line = format!("{} {}", self.level, self.message);
        for (key, value) in &self.fields {
            line.push_str(&format!(" {}={}", key, value));
        }
        line
    }
}

#[derive(Default)]
struct EventFields {
    message: String,
    fields: Vec<(String, String)>,
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        // Format args arrive here, so Display-like output for the message
        if field.name() == "message" {
            self.message = format!("{:?}", value).trim_matches('"').to_string();
        } else {
            self.fields.push((field.name().to_string(), format!("{:?}", value)));
        }
    }
}

/// Shared buffer that doubles as a `Layer`
#[derive(Clone, Default)]
pub struct LogCapture {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(&self) -> MutexGuard<'_, Vec<LogRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.buffer().clone()
    }

    /// Records whose message or any field value mentions `needle`
    pub fn matching(&self, needle: &str) -> Vec<LogRecord> {
        self.buffer()
            .iter()
            .filter(|r| r.message.contains(needle) || r.fields.iter().any(|(_, v)| v.contains(needle)))
            .cloned()
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        !self.matching(needle).is_empty()
    }

    pub fn count_at(&self, level: Level, needle: &str) -> usize {
        self.matching(needle).iter().filter(|r| r.level == level).count()
    }

    pub fn assert_contains(&self, needle: &str) {
        if self.contains(needle) {
            return;
        }
        let dump: Vec<String> = self.buffer().iter().map(LogRecord::render).collect();
        panic!("no log line mentions '{}'; captured:\n{}", needle, dump.join("\n"));
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visited = EventFields::default();
        event.record(&mut visited);

        let meta = event.metadata();
        self.buffer().push(LogRecord {
            level: *meta.level(),
            target: meta.target().to_string(),
            message: visited.message,
            fields: visited.fields,
        });
    }
}

/// Install a global subscriber that feeds the returned capture
///
/// Only the first call in a test binary installs anything; call it from a
/// single test per binary.
pub fn init_test_logging() -> LogCapture {
    let capture = LogCapture::new();

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("insight_ai=debug"))
        .with(capture.clone())
        .try_init();

    capture
}
