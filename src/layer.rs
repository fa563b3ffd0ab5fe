use crate::attributes::{merge_into, Attributes, EXC_INFO};
use crate::context::ContextRegistry;
use crate::exception::ExceptionInfo;
use crate::formatter::Formatter;
use crate::merger::ContextMerger;
use crate::record::LogRecord;
use std::io::{self, Write};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Event field naming the emitting logger. Takes precedence over the
/// event target as the record name.
pub const LOGGER_FIELD: &str = "logger";

/// Event field carrying an already merged attribute bag as JSON text.
pub const ATTRIBUTES_FIELD: &str = "attributes";

/// Per-logger level table.
///
/// Logger names are hierarchical: `billing` covers `billing.api` and
/// `billing::api`. The longest matching entry decides, falling back to the
/// default level.
#[derive(Debug, Clone)]
pub struct Routing {
    default: LevelFilter,
    loggers: Vec<(String, LevelFilter)>,
}

impl Routing {
    pub fn new(default: LevelFilter) -> Self {
        Self {
            default,
            loggers: Vec::new(),
        }
    }

    /// Set the level of `name` and its descendants.
    pub fn logger(mut self, name: impl Into<String>, level: LevelFilter) -> Self {
        let name = name.into();
        self.loggers.retain(|(existing, _)| *existing != name);
        self.loggers.push((name, level));
        self.loggers.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    pub fn level_for(&self, name: &str) -> LevelFilter {
        self.loggers
            .iter()
            .find(|(prefix, _)| is_descendant(name, prefix))
            .map(|(_, level)| *level)
            .unwrap_or(self.default)
    }

    pub fn enabled(&self, name: &str, level: &Level) -> bool {
        *level <= self.level_for(name)
    }
}

impl Default for Routing {
    fn default() -> Self {
        Self::new(LevelFilter::TRACE)
    }
}

pub(crate) fn is_descendant(name: &str, prefix: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('.') || rest.starts_with("::"),
        None => false,
    }
}

/// `tracing_subscriber` layer that turns events into enriched
/// [`LogRecord`]s, formats them and writes one line per record.
///
/// Events emitted through [`ContextualLogger`](crate::logger::ContextualLogger)
/// arrive with their bag already merged. Plain `tracing` events are merged
/// here: global context first, event fields on top, then the registry's
/// processors. Records that fail to merge or format are reported on stderr
/// and dropped.
pub struct ContextLayer<W = fn() -> io::Stdout> {
    registry: Arc<ContextRegistry>,
    formatter: Formatter,
    make_writer: W,
    routing: Routing,
    /// Total events seen by the layer (before routing).
    pub total_events: Arc<AtomicU64>,
    /// Records successfully written.
    pub written_events: Arc<AtomicU64>,
    /// Records dropped because they failed to merge, format or write.
    pub failed_events: Arc<AtomicU64>,
}

impl ContextLayer {
    /// JSON records on stdout, every level enabled.
    pub fn new(registry: Arc<ContextRegistry>) -> Self {
        Self {
            registry,
            formatter: Formatter::default(),
            make_writer: io::stdout,
            routing: Routing::default(),
            total_events: Arc::new(AtomicU64::new(0)),
            written_events: Arc::new(AtomicU64::new(0)),
            failed_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<W> ContextLayer<W> {
    pub fn with_writer<W2>(self, make_writer: W2) -> ContextLayer<W2>
    where
        W2: for<'a> MakeWriter<'a> + 'static,
    {
        ContextLayer {
            registry: self.registry,
            formatter: self.formatter,
            make_writer,
            routing: self.routing,
            total_events: self.total_events,
            written_events: self.written_events,
            failed_events: self.failed_events,
        }
    }

    pub fn with_formatter(mut self, formatter: impl Into<Formatter>) -> Self {
        self.formatter = formatter.into();
        self
    }

    pub fn with_routing(mut self, routing: Routing) -> Self {
        self.routing = routing;
        self
    }

    fn fail(&self, name: &str, error: &dyn std::fmt::Display) {
        self.failed_events.fetch_add(1, Ordering::Relaxed);
        eprintln!("dropping log record from '{}': {}", name, error);
    }
}

impl<W> ContextLayer<W>
where
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn write(&self, meta: &Metadata<'_>, line: &str) -> io::Result<()> {
        let mut writer = self.make_writer.make_writer_for(meta);
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl<S, W> Layer<S> for ContextLayer<W>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let meta = event.metadata();
        let name = visitor.logger.take().unwrap_or_else(|| meta.target().to_string());
        if !self.routing.enabled(&name, meta.level()) {
            return;
        }

        let attributes = match visitor.carried.take() {
            Some(mut carried) => {
                merge_into(&mut carried, &visitor.fields);
                carried
            }
            None => match ContextMerger::from_registry(&self.registry)
                .enrich(&Attributes::new(), &visitor.fields)
            {
                Ok(attributes) => attributes,
                Err(e) => return self.fail(&name, &e),
            },
        };

        let mut record = LogRecord::new(*meta.level(), name).with_attributes(attributes);
        record.target = meta.target().to_string();
        record.module_path = meta.module_path().map(|s| s.to_string());
        record.file = meta.file().map(|s| s.to_string());
        record.line = meta.line();
        record.message = visitor.message.take();

        let line = match self.formatter.format(&record) {
            Ok(line) => line,
            Err(e) => return self.fail(&record.name, &e),
        };

        match self.write(meta, &line) {
            Ok(()) => {
                self.written_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.fail(&record.name, &e),
        }
    }
}

use tracing::field::{Field, Visit};

#[derive(Default)]
pub struct FieldVisitor {
    pub fields: Attributes,
    pub message: Option<String>,
    pub logger: Option<String>,
    pub carried: Option<Attributes>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            LOGGER_FIELD => self.logger = Some(value.to_string()),
            ATTRIBUTES_FIELD => match serde_json::from_str::<Attributes>(value) {
                Ok(carried) => self.carried = Some(carried),
                Err(_) => self.insert(field, serde_json::Value::String(value.to_string())),
            },
            _ => self.insert(field, serde_json::Value::String(value.to_string())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let info = ExceptionInfo::from_error_without_backtrace(value);
        self.fields.insert(EXC_INFO.to_string(), info.to_value());
        self.insert(field, serde_json::Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{:?}", value);
        match field.name() {
            "message" => self.message = Some(rendered),
            LOGGER_FIELD => self.logger = Some(rendered),
            _ => self.insert(field, serde_json::Value::String(rendered)),
        }
    }
}
