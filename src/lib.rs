//! Context-enriched structured logging on top of `tracing`.
//!
//! A [`ContextualLogger`] merges global, local and per-call attributes, runs
//! them through [`Processor`]s and hands the result to `tracing`. The
//! [`ContextLayer`] turns events into JSON (or text) lines, enriching plain
//! `tracing` events with the same global context.

pub mod attributes;
pub mod exception;
pub mod model;
pub mod processor;

pub mod context;
pub mod merger;
pub mod record;

pub mod formatter;
pub mod layer;
pub mod logger;

pub mod config;
pub mod env;
pub mod init;

pub use attributes::Attributes;
pub use config::{ConfigError, LoggingConfig, CONFIGURATION_FILENAME};
pub use context::ContextRegistry;
pub use exception::ExceptionInfo;
pub use formatter::{FormatError, Formatter, JsonFormatter, TextFormatter};
pub use init::{
    build_layers, init, init_from_env, init_from_path, init_with_config, InitError, LayerConfig,
};
pub use layer::{ContextLayer, Routing};
pub use logger::{ContextualLogger, LogError};
pub use merger::ContextMerger;
pub use model::{AttributeRecord, CommonRecord, CustomRecord, ErrorRecord, HttpRecord, Record};
pub use processor::{
    CommonProcessor, ErrorProcessor, HttpProcessor, HttpRequestSnapshot, HttpResponseSnapshot,
    ProcessError, Processor,
};
pub use record::LogRecord;
