//! Declarative logging configuration, loaded once at startup.
//!
//! ```yaml
//! version: 1
//!
//! formatters:
//!   simple:
//!     format: '%(asctime)s - %(name)s - %(levelname)s - %(message)s'
//!     datefmt: '%Y-%m-%d %H:%M:%S'
//!   json:
//!     class: json
//!
//! handlers:
//!   console-json:
//!     class: console
//!     stream: stdout
//!     formatter: json
//!   audit-file:
//!     class: file
//!     filename: /var/log/app/audit.log
//!     formatter: json
//!     level: INFO
//!
//! loggers:
//!   billing:
//!     level: DEBUG
//!     handlers: [console-json]
//!     propagate: no
//!
//! root:
//!   level: ERROR
//!   handlers: [console-json]
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;

use crate::formatter::{
    Formatter, JsonFormatter, TextFormatter, DEFAULT_DATE_FORMAT, DEFAULT_TEXT_FORMAT,
};
use crate::layer::is_descendant;

/// Conventional configuration file name.
pub const CONFIGURATION_FILENAME: &str = "logging_config.yaml";

/// The only supported schema version.
pub const SUPPORTED_VERSION: u32 = 1;

/// Error type returned when loading a configuration file.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Supplied configuration file is not found at: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read the supplied configuration file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing the supplied configuration file: {reason}")]
    Parse { reason: String },
}

impl ConfigError {
    fn parse(reason: impl fmt::Display) -> Self {
        ConfigError::Parse {
            reason: reason.to_string(),
        }
    }
}

/// A level name: `TRACE`, `DEBUG`, `INFO`, `WARN`/`WARNING`,
/// `ERROR`/`CRITICAL`, `OFF`, or `NOTSET` (everything), case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevel(pub LevelFilter);

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" | "NOTSET" => LevelFilter::TRACE,
            "DEBUG" => LevelFilter::DEBUG,
            "INFO" => LevelFilter::INFO,
            "WARN" | "WARNING" => LevelFilter::WARN,
            "ERROR" | "CRITICAL" | "FATAL" => LevelFilter::ERROR,
            "OFF" => LevelFilter::OFF,
            other => return Err(format!("unknown log level '{}'", other)),
        };
        Ok(LogLevel(level))
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel(LevelFilter::TRACE)
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

/// Output format of a handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatterKind {
    Json,
    #[default]
    Text,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatterConfig {
    /// `json` or `text`; defaults to `text`.
    #[serde(rename = "class")]
    pub kind: FormatterKind,
    /// `%(key)s` template for text output.
    pub format: Option<String>,
    /// strftime layout of `%(asctime)s`.
    pub datefmt: Option<String>,
}

impl FormatterConfig {
    pub fn build(&self) -> Result<Formatter, ConfigError> {
        match self.kind {
            FormatterKind::Json => Ok(JsonFormatter::new().into()),
            FormatterKind::Text => TextFormatter::new(
                self.format.as_deref().unwrap_or(DEFAULT_TEXT_FORMAT),
                self.datefmt.as_deref().unwrap_or(DEFAULT_DATE_FORMAT),
            )
            .map(Formatter::from)
            .map_err(ConfigError::parse),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    #[default]
    Console,
    File,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    #[default]
    Stderr,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandlerConfig {
    /// `console` (default) or `file`.
    #[serde(rename = "class")]
    pub kind: HandlerKind,
    /// Console stream; defaults to stderr.
    pub stream: Stream,
    /// Target path of a `file` handler, opened in append mode.
    pub filename: Option<PathBuf>,
    /// Name of an entry in `formatters`; JSON output when omitted.
    pub formatter: Option<String>,
    /// Minimum level handled; everything when omitted.
    pub level: Option<LogLevel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerConfig {
    pub level: Option<LogLevel>,
    pub handlers: Vec<String>,
    /// Whether records also reach the root handlers.
    #[serde(deserialize_with = "deserialize_flag")]
    pub propagate: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: None,
            handlers: Vec::new(),
            propagate: true,
        }
    }
}

/// Root of the logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    pub version: u32,
    #[serde(default)]
    pub formatters: BTreeMap<String, FormatterConfig>,
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerConfig>,
    #[serde(default)]
    pub loggers: BTreeMap<String, LoggerConfig>,
    #[serde(default = "default_root")]
    pub root: LoggerConfig,
}

fn default_root() -> LoggerConfig {
    LoggerConfig {
        level: Some(LogLevel(LevelFilter::WARN)),
        ..LoggerConfig::default()
    }
}

impl LoggingConfig {
    /// Load and validate a YAML configuration file.
    ///
    /// **Errors**
    /// - [`ConfigError::NotFound`] when `path` does not exist.
    /// - [`ConfigError::Parse`] when the content is not valid YAML, does not
    ///   match the schema, or references unknown formatters/handlers.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound {
                path: path.to_path_buf(),
            },
            _ => ConfigError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let config = Self::from_yaml(&content)?;
        tracing::debug!(
            path = %path.display(),
            handlers = config.handlers.len(),
            "logging configuration loaded"
        );
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: LoggingConfig = serde_yaml::from_str(content).map_err(ConfigError::parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_VERSION {
            return Err(ConfigError::parse(format!(
                "unsupported version {} (expected {})",
                self.version, SUPPORTED_VERSION
            )));
        }

        for (name, handler) in &self.handlers {
            if let Some(formatter) = &handler.formatter {
                let formatter_config = self.formatters.get(formatter).ok_or_else(|| {
                    ConfigError::parse(format!(
                        "handler '{}' references unknown formatter '{}'",
                        name, formatter
                    ))
                })?;
                formatter_config.build()?;
            }
            if handler.kind == HandlerKind::File && handler.filename.is_none() {
                return Err(ConfigError::parse(format!(
                    "file handler '{}' has no filename",
                    name
                )));
            }
        }

        let loggers = self.loggers.iter().map(|(name, logger)| (name.as_str(), logger));
        for (name, logger) in loggers.chain(std::iter::once(("root", &self.root))) {
            for handler in &logger.handlers {
                if !self.handlers.contains_key(handler) {
                    return Err(ConfigError::parse(format!(
                        "logger '{}' references unknown handler '{}'",
                        name, handler
                    )));
                }
            }
        }

        Ok(())
    }

    /// Level at which `handler` accepts records from each logger.
    ///
    /// A logger without a level inherits the level of its nearest configured
    /// ancestor (`billing` for `billing.api`), then the root's. Records reach
    /// the handlers of the logger and of every ancestor up to and including
    /// the first one with `propagate: no`; the root handlers only when no such
    /// logger stops them. The handler's own level applies on top.
    ///
    /// Returns the default level (for loggers without an entry) and the
    /// per-logger overrides.
    pub fn handler_routes(&self, handler: &str) -> (LevelFilter, Vec<(String, LevelFilter)>) {
        let handler_level = self
            .handlers
            .get(handler)
            .and_then(|h| h.level)
            .map(|l| l.0)
            .unwrap_or(LevelFilter::TRACE);
        let root_level = self.root_level();
        let on_root = self.root.handlers.iter().any(|h| h == handler);

        let default = if on_root {
            root_level.min(handler_level)
        } else {
            LevelFilter::OFF
        };

        let loggers = self
            .loggers
            .keys()
            .map(|name| {
                let chain = self.ancestry(name);
                let level = chain
                    .iter()
                    .find_map(|(_, logger)| logger.level)
                    .map(|l| l.0)
                    .unwrap_or(root_level);

                let mut reached = on_root;
                for (_, logger) in &chain {
                    if logger.handlers.iter().any(|h| h == handler) {
                        reached = true;
                        break;
                    }
                    if !logger.propagate {
                        reached = false;
                        break;
                    }
                }

                let routed = if reached {
                    level.min(handler_level)
                } else {
                    LevelFilter::OFF
                };
                (name.clone(), routed)
            })
            .collect();

        (default, loggers)
    }

    fn root_level(&self) -> LevelFilter {
        self.root
            .level
            .map(|l| l.0)
            .unwrap_or(LevelFilter::WARN)
    }

    /// `name` and its configured ancestors, nearest first.
    fn ancestry(&self, name: &str) -> Vec<(&str, &LoggerConfig)> {
        let mut chain: Vec<(&str, &LoggerConfig)> = self
            .loggers
            .iter()
            .filter(|(candidate, _)| is_descendant(name, candidate.as_str()))
            .map(|(candidate, logger)| (candidate.as_str(), logger))
            .collect();
        chain.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        chain
    }
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    struct FlagVisitor;

    impl<'de> Visitor<'de> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a boolean or one of yes/no/on/off/true/false/1/0")
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<bool, E> {
            Ok(value)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<bool, E> {
            match value {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Unsigned(value), &self)),
            }
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<bool, E> {
            match value {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Signed(value), &self)),
            }
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<bool, E> {
            match value.to_ascii_lowercase().as_str() {
                "yes" | "y" | "on" | "true" | "1" => Ok(true),
                "no" | "n" | "off" | "false" | "0" => Ok(false),
                _ => Err(E::invalid_value(de::Unexpected::Str(value), &self)),
            }
        }
    }

    deserializer.deserialize_any(FlagVisitor)
}
