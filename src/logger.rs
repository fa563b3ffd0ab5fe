use std::error::Error;
use std::fmt;
use std::sync::Arc;

use tracing::Level;

use crate::attributes::{Attributes, EXC_INFO};
use crate::context::ContextRegistry;
use crate::exception::ExceptionInfo;
use crate::merger::ContextMerger;
use crate::processor::ProcessError;

/// Error returned by a log call.
#[derive(thiserror::Error, Debug)]
pub enum LogError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("failed to serialize log attributes: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Emits a `tracing` event at a level only known at runtime.
macro_rules! dispatch {
    ($level:expr, $($rest:tt)+) => {
        match $level {
            Level::ERROR => tracing::event!(Level::ERROR, $($rest)+),
            Level::WARN => tracing::event!(Level::WARN, $($rest)+),
            Level::INFO => tracing::event!(Level::INFO, $($rest)+),
            Level::DEBUG => tracing::event!(Level::DEBUG, $($rest)+),
            _ => tracing::event!(Level::TRACE, $($rest)+),
        }
    };
}

/// A logger that adds context to every message it emits.
///
/// Context comes from two scopes, merged in this order (later wins):
///
/// 1. **Global context**, held by the [`ContextRegistry`] and shared by every
///    logger using that registry. Typically the application name and
///    environment, set once at startup.
/// 2. **Local context**, owned by this logger instance. Unlike per-call
///    `extra` attributes it persists across calls until changed or cleared,
///    e.g. the file or job a logger is dedicated to.
///
/// One-off attributes are passed as `extra` on each call and win over both.
///
/// ```
/// use contextual_log::{attributes::from_json, ContextRegistry, ContextualLogger};
/// use serde_json::json;
///
/// let registry = std::sync::Arc::new(ContextRegistry::new());
/// registry.set_global_context("billing", from_json(json!({"env": "prod"})));
///
/// let mut logger = ContextualLogger::with_registry("billing.invoices", registry);
/// logger.local_context_mut().insert("job".into(), json!("monthly-run"));
///
/// logger.info("invoice sent", from_json(json!({"correlation_id": "1234"}))).unwrap();
/// ```
#[derive(Clone)]
pub struct ContextualLogger {
    name: String,
    local_context: Attributes,
    registry: Arc<ContextRegistry>,
}

impl ContextualLogger {
    /// Logger named `name` using the process-wide registry.
    pub fn create(name: impl Into<String>) -> Self {
        Self::with_registry(name, ContextRegistry::shared())
    }

    pub fn with_registry(name: impl Into<String>, registry: Arc<ContextRegistry>) -> Self {
        Self {
            name: name.into(),
            local_context: Attributes::new(),
            registry,
        }
    }

    pub fn with_local_context(mut self, local_context: Attributes) -> Self {
        self.local_context = local_context;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    pub fn local_context(&self) -> &Attributes {
        &self.local_context
    }

    pub fn local_context_mut(&mut self) -> &mut Attributes {
        &mut self.local_context
    }

    pub fn set_local_context(&mut self, local_context: Attributes) {
        self.local_context = local_context;
    }

    pub fn clear_local_context(&mut self) {
        self.local_context.clear();
    }

    /// Merge global, local and `extra` context and run the registry's
    /// processors, producing the bag a log call would carry.
    pub fn process(&self, extra: &Attributes) -> Result<Attributes, ProcessError> {
        ContextMerger::from_registry(&self.registry).enrich(&self.local_context, extra)
    }

    /// Emit `message` at `level` with the merged context.
    ///
    /// **Returns**
    /// - `Ok(())` once the event has been handed to `tracing`.
    /// - `Err(..)` if a processor rejected the attributes; nothing is
    ///   emitted in that case.
    pub fn log(
        &self,
        level: Level,
        message: impl fmt::Display,
        extra: impl Into<Option<Attributes>>,
    ) -> Result<(), LogError> {
        let extra = extra.into().unwrap_or_default();
        let attributes = self.process(&extra)?;
        let payload = serde_json::to_string(&attributes)?;
        let name = self.name.as_str();

        dispatch!(
            level,
            logger = name,
            attributes = payload.as_str(),
            "{}",
            message
        );
        Ok(())
    }

    pub fn trace(
        &self,
        message: impl fmt::Display,
        extra: impl Into<Option<Attributes>>,
    ) -> Result<(), LogError> {
        self.log(Level::TRACE, message, extra)
    }

    pub fn debug(
        &self,
        message: impl fmt::Display,
        extra: impl Into<Option<Attributes>>,
    ) -> Result<(), LogError> {
        self.log(Level::DEBUG, message, extra)
    }

    pub fn info(
        &self,
        message: impl fmt::Display,
        extra: impl Into<Option<Attributes>>,
    ) -> Result<(), LogError> {
        self.log(Level::INFO, message, extra)
    }

    pub fn warn(
        &self,
        message: impl fmt::Display,
        extra: impl Into<Option<Attributes>>,
    ) -> Result<(), LogError> {
        self.log(Level::WARN, message, extra)
    }

    pub fn error(
        &self,
        message: impl fmt::Display,
        extra: impl Into<Option<Attributes>>,
    ) -> Result<(), LogError> {
        self.log(Level::ERROR, message, extra)
    }

    /// Log at ERROR with `error` attached as exception info, which the JSON
    /// formatter renders under the `error` key.
    pub fn exception<E>(
        &self,
        message: impl fmt::Display,
        error: &E,
        extra: impl Into<Option<Attributes>>,
    ) -> Result<(), LogError>
    where
        E: Error + ?Sized + 'static,
    {
        let mut extra = extra.into().unwrap_or_default();
        extra.insert(EXC_INFO.to_string(), ExceptionInfo::from_error(error).to_value());
        self.log(Level::ERROR, message, extra)
    }
}

impl fmt::Debug for ContextualLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextualLogger")
            .field("name", &self.name)
            .field("local_context", &self.local_context)
            .finish_non_exhaustive()
    }
}
