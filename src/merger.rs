use std::sync::Arc;

use crate::attributes::{merge_into, merge_layers, Attributes};
use crate::context::{ContextRegistry, Processors};
use crate::processor::ProcessError;

/// Merges the context sources of one log call and runs the processor chain.
///
/// A merger holds a snapshot of the global context and processors taken
/// when it was created, so a single call never observes a half-applied
/// registry update.
#[derive(Clone)]
pub struct ContextMerger {
    global: Arc<Attributes>,
    processors: Arc<Processors>,
}

impl ContextMerger {
    pub fn new(global: Arc<Attributes>, processors: Arc<Processors>) -> Self {
        Self { global, processors }
    }

    /// Snapshot the current state of `registry`.
    pub fn from_registry(registry: &ContextRegistry) -> Self {
        Self::new(registry.global_context(), registry.global_processors())
    }

    /// Overwrite-merge global, local and per-call attributes, in that order
    /// of increasing precedence.
    pub fn merge(&self, local: &Attributes, extra: &Attributes) -> Attributes {
        merge_layers([self.global.as_ref(), local, extra])
    }

    /// Run every processor against `merged` and overlay their flattened
    /// output. Processors see only the merged attributes, never each other's
    /// output; on key collisions the later processor wins, and processor
    /// output always wins over raw attributes.
    pub fn process(&self, merged: Attributes) -> Result<Attributes, ProcessError> {
        let mut derived = Attributes::new();
        for processor in self.processors.iter() {
            if let Some(record) = processor.process(&merged)? {
                merge_into(&mut derived, &record.flatten());
            }
        }

        let mut enriched = merged;
        merge_into(&mut enriched, &derived);
        Ok(enriched)
    }

    /// [`merge`](Self::merge) followed by [`process`](Self::process).
    pub fn enrich(
        &self,
        local: &Attributes,
        extra: &Attributes,
    ) -> Result<Attributes, ProcessError> {
        self.process(self.merge(local, extra))
    }
}
