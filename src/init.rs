use crate::attributes::Attributes;
use crate::config::{ConfigError, HandlerKind, LoggingConfig, Stream, CONFIGURATION_FILENAME};
use crate::context::ContextRegistry;
use crate::env::{env_opt, env_or, CONTEXTUAL_LOG_APPLICATION_NAME_ENV, CONTEXTUAL_LOG_CONFIG_ENV};
use crate::formatter::Formatter;
use crate::layer::{ContextLayer, Routing};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry};

/// Layers ready to be stacked on a [`Registry`].
pub type BoxedLayers = Vec<Box<dyn Layer<Registry> + Send + Sync>>;

/// Error type returned when installing the global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open log file {}: {source}", .path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to set global subscriber: {0}")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Configuration of the default single-handler setup.
///
/// **Fields**
/// - `level`: maximum verbosity written by the [`ContextLayer`].
/// - `stream`: console stream receiving the JSON lines.
/// - `formatter`: output format, JSON by default.
/// - `enable_fmt`: if `true`, a human readable
///   `tracing_subscriber::fmt::Layer` on stderr is stacked next to the
///   [`ContextLayer`].
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub level: LevelFilter,
    pub stream: Stream,
    pub formatter: Formatter,
    pub enable_fmt: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            stream: Stream::Stdout,
            formatter: Formatter::default(),
            enable_fmt: false,
        }
    }
}

fn console_writer(stream: Stream) -> BoxMakeWriter {
    match stream {
        Stream::Stdout => BoxMakeWriter::new(io::stdout),
        Stream::Stderr => BoxMakeWriter::new(io::stderr),
    }
}

fn file_writer(path: &Path) -> Result<BoxMakeWriter, InitError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| InitError::OpenFile {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(BoxMakeWriter::new(Mutex::new(file)))
}

/// Build one [`ContextLayer`] per configured handler.
///
/// **Parameters**
/// - `config`: a validated [`LoggingConfig`].
/// - `registry`: the context registry every layer merges plain `tracing`
///   events with.
///
/// **Returns**
///
/// The layers in handler-name order. Handlers no logger routes to are
/// skipped. File handlers are opened in append mode here.
pub fn build_layers(
    config: &LoggingConfig,
    registry: Arc<ContextRegistry>,
) -> Result<BoxedLayers, InitError> {
    let mut layers: BoxedLayers = Vec::with_capacity(config.handlers.len());

    for (name, handler) in &config.handlers {
        let (default, loggers) = config.handler_routes(name);
        let unrouted = loggers.iter().all(|(_, level)| *level == LevelFilter::OFF);
        if default == LevelFilter::OFF && unrouted {
            continue;
        }

        let routing = loggers
            .into_iter()
            .fold(Routing::new(default), |routing, (logger, level)| routing.logger(logger, level));

        let formatter = match &handler.formatter {
            Some(formatter) => config
                .formatters
                .get(formatter)
                .map(|f| f.build())
                .transpose()?
                .unwrap_or_default(),
            None => Formatter::default(),
        };

        let writer = match (handler.kind, &handler.filename) {
            (HandlerKind::File, Some(path)) => file_writer(path)?,
            _ => console_writer(handler.stream),
        };

        let layer = ContextLayer::new(Arc::clone(&registry))
            .with_writer(writer)
            .with_formatter(formatter)
            .with_routing(routing);
        layers.push(Box::new(layer));
    }

    Ok(layers)
}

/// Initialize the global `tracing` subscriber with a single
/// [`ContextLayer`] configured by [`LayerConfig`].
///
/// **Parameters**
/// - `config`: level, stream and format of the layer.
///
/// **Effects**
///
/// Installs a [`Registry`] combined with the layer as the global default
/// subscriber, using the process-wide [`ContextRegistry::shared`].
pub fn init_with_config(config: LayerConfig) -> Result<(), InitError> {
    let layer = ContextLayer::new(ContextRegistry::shared())
        .with_writer(console_writer(config.stream))
        .with_formatter(config.formatter)
        .with_routing(Routing::new(config.level));

    let mut layers: BoxedLayers = Vec::with_capacity(2);
    layers.push(Box::new(layer));
    if config.enable_fmt {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(config.level)
                .boxed(),
        );
    }

    install(layers)
}

/// Initialize tracing with sensible defaults: JSON lines on stdout at INFO.
///
/// Equivalent to calling [`init_with_config`] with [`LayerConfig::default`].
pub fn init() -> Result<(), InitError> {
    init_with_config(LayerConfig::default())
}

/// Load a YAML configuration file and install its handlers globally.
pub fn init_from_path(path: impl AsRef<Path>) -> Result<(), InitError> {
    let config = LoggingConfig::from_path(path)?;
    install(build_layers(&config, ContextRegistry::shared())?)
}

/// Same as [`init_from_path`], with the path taken from
/// `CONTEXTUAL_LOG_CONFIG` (default `logging_config.yaml`).
///
/// When `CONTEXTUAL_LOG_APPLICATION_NAME` is set it is stored as the
/// application name of the global context.
pub fn init_from_env() -> Result<(), InitError> {
    if let Some(app_name) = env_opt(CONTEXTUAL_LOG_APPLICATION_NAME_ENV) {
        ContextRegistry::shared().set_global_context(app_name, Attributes::new());
    }
    init_from_path(env_or(CONTEXTUAL_LOG_CONFIG_ENV, CONFIGURATION_FILENAME))
}

fn install(layers: BoxedLayers) -> Result<(), InitError> {
    let subscriber = Registry::default().with(layers);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
