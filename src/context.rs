use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use serde_json::Value;

use crate::attributes::Attributes;
use crate::model::CommonRecord;
use crate::processor::Processor;

/// Ordered list of processors run on every log call.
pub type Processors = Vec<Arc<dyn Processor>>;

/// Global context and processor registry shared by every logger holding a
/// reference to it.
///
/// Both values are replaced wholesale, never merged: the last writer wins.
/// Readers take a consistent snapshot per log call, so updates are safe
/// while logging, but the intended use is to configure once at startup.
///
/// Most applications use the process-wide [`ContextRegistry::shared`]
/// instance; tests and embedders can create isolated registries and inject
/// them into [`ContextualLogger`](crate::logger::ContextualLogger) and
/// [`ContextLayer`](crate::layer::ContextLayer).
pub struct ContextRegistry {
    context: ArcSwap<Attributes>,
    processors: ArcSwap<Processors>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self {
            context: ArcSwap::from_pointee(Attributes::new()),
            processors: ArcSwap::from_pointee(Processors::new()),
        }
    }

    /// The process-wide registry.
    pub fn shared() -> Arc<ContextRegistry> {
        static SHARED: OnceLock<Arc<ContextRegistry>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(ContextRegistry::new())))
    }

    /// Replace the global context with `extra` plus the application name.
    ///
    /// `application_name` overrides any `application_name` key in `extra`.
    pub fn set_global_context(&self, application_name: impl Into<String>, extra: Attributes) {
        let mut context = extra;
        context.insert(
            CommonRecord::APPLICATION_NAME.to_string(),
            Value::String(application_name.into()),
        );
        self.replace_global_context(context);
    }

    /// Replace the global context verbatim.
    pub fn replace_global_context(&self, context: Attributes) {
        let keys = context.len();
        self.context.store(Arc::new(context));
        tracing::debug!(keys, "global log context replaced");
    }

    pub fn global_context(&self) -> Arc<Attributes> {
        self.context.load_full()
    }

    /// Replace the registered processors. They run in the given order;
    /// registering the same instance twice keeps only the first occurrence.
    pub fn set_global_processors<I>(&self, processors: I)
    where
        I: IntoIterator<Item = Arc<dyn Processor>>,
    {
        let mut unique: Processors = Vec::new();
        for processor in processors {
            if !unique.iter().any(|p| Arc::ptr_eq(p, &processor)) {
                unique.push(processor);
            }
        }
        let count = unique.len();
        self.processors.store(Arc::new(unique));
        tracing::debug!(count, "global log processors replaced");
    }

    pub fn global_processors(&self) -> Arc<Processors> {
        self.processors.load_full()
    }

    /// Drop the global context and all processors.
    pub fn reset(&self) {
        self.context.store(Arc::new(Attributes::new()));
        self.processors.store(Arc::new(Processors::new()));
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let processors = self.processors.load();
        f.debug_struct("ContextRegistry")
            .field("context", &**self.context.load())
            .field(
                "processors",
                &processors.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::from_json;
    use crate::processor::{ErrorProcessor, HttpProcessor};
    use serde_json::json;

    #[test]
    fn application_name_is_added_to_global_context() {
        let registry = ContextRegistry::new();

        registry.set_global_context("billing", from_json(json!({"key": "value"})));

        assert_eq!(
            Value::Object((*registry.global_context()).clone()),
            json!({"key": "value", "application_name": "billing"})
        );
    }

    #[test]
    fn last_writer_wins() {
        let registry = ContextRegistry::new();

        registry.set_global_context("first", from_json(json!({"stale": true})));
        registry.set_global_context("second", Attributes::new());

        assert_eq!(
            Value::Object((*registry.global_context()).clone()),
            json!({"application_name": "second"})
        );
    }

    #[test]
    fn processors_are_replaced_and_deduplicated() {
        let registry = ContextRegistry::new();
        let error: Arc<dyn Processor> = Arc::new(ErrorProcessor);

        registry.set_global_processors([Arc::new(HttpProcessor) as Arc<dyn Processor>]);
        registry.set_global_processors([Arc::clone(&error), Arc::clone(&error)]);

        let processors = registry.global_processors();
        assert_eq!(processors.len(), 1);
        assert_eq!(processors[0].name(), "ErrorProcessor");
    }

    #[test]
    fn reset_clears_everything() {
        let registry = ContextRegistry::new();
        registry.set_global_context("billing", Attributes::new());
        registry.set_global_processors([Arc::new(ErrorProcessor) as Arc<dyn Processor>]);

        registry.reset();

        assert!(registry.global_context().is_empty());
        assert!(registry.global_processors().is_empty());
    }
}
