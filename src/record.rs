use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::Level;

use crate::attributes::{Attributes, MESSAGE};

/// A log record as produced by the backbone: standard fields assigned by
/// `tracing` plus the enriched attribute bag of the call.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub created: DateTime<Utc>,
    #[serde(serialize_with = "serialize_level")]
    pub level: Level,
    /// Logger name; the event target unless the event named its logger.
    pub name: String,
    pub target: String,
    pub module_path: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub thread_name: Option<String>,
    pub thread_id: String,
    pub process_id: u32,
    pub message: Option<String>,
    pub attributes: Attributes,
}

impl LogRecord {
    /// Create a record stamped with the current time and thread.
    pub fn new(level: Level, name: impl Into<String>) -> Self {
        let name = name.into();
        let thread = std::thread::current();
        Self {
            created: Utc::now(),
            level,
            target: name.clone(),
            name,
            module_path: None,
            file: None,
            line: None,
            thread_name: thread.name().map(str::to_string),
            thread_id: format!("{:?}", thread.id()),
            process_id: std::process::id(),
            message: None,
            attributes: Attributes::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Flat view of the record: the attribute bag overlaid with the
    /// standard fields, keyed by their conventional names (`levelname`,
    /// `created`, `lineno`, ...). Standard fields win over attributes of the
    /// same name.
    pub fn to_attributes(&self) -> Attributes {
        let mut view = self.attributes.clone();

        let mut set = |key: &str, value: Value| {
            view.insert(key.to_string(), value);
        };

        let micros = self.created.timestamp_micros();
        set("name", self.name.clone().into());
        set("target", self.target.clone().into());
        set("levelname", level_name(&self.level).into());
        set("levelno", level_number(&self.level).into());
        set("created", (micros as f64 / 1_000_000.0).into());
        set("msecs", (micros.rem_euclid(1_000_000) as f64 / 1_000.0).into());
        if let Some(module) = &self.module_path {
            set("module", module.clone().into());
        }
        if let Some(file) = &self.file {
            set("pathname", file.clone().into());
            let filename = file.rsplit(['/', '\\']).next().unwrap_or(file);
            set("filename", filename.into());
        }
        if let Some(line) = self.line {
            set("lineno", line.into());
        }
        set("thread", self.thread_id.clone().into());
        if let Some(thread_name) = &self.thread_name {
            set("threadName", thread_name.clone().into());
        }
        set("process", self.process_id.into());
        if let Some(message) = &self.message {
            set(MESSAGE, message.clone().into());
        }

        view
    }
}

/// Conventional upper-case level name (`WARNING` rather than `WARN`).
pub fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        _ => "TRACE",
    }
}

/// Conventional numeric level: 5 for TRACE up to 40 for ERROR.
pub fn level_number(level: &Level) -> u8 {
    match *level {
        Level::ERROR => 40,
        Level::WARN => 30,
        Level::INFO => 20,
        Level::DEBUG => 10,
        _ => 5,
    }
}

fn serialize_level<S: serde::Serializer>(level: &Level, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(level_name(level))
}
