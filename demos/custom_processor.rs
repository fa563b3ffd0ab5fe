use std::sync::Arc;

use contextual_log::attributes::{from_json, Attributes};
use contextual_log::init::init;
use contextual_log::processor::http::{REQUEST, RESPONSE, RESPONSE_DURATION_MS};
use contextual_log::{
    ContextRegistry, ContextualLogger, CustomRecord, HttpProcessor, HttpRequestSnapshot,
    HttpResponseSnapshot, ProcessError, Processor, Record,
};
use serde_json::{json, Value};

/// Breaks an internal `_user` object down into a `user` namespace, keeping
/// only the fields that are safe to log.
struct UserProcessor;

impl Processor for UserProcessor {
    fn process(&self, attributes: &Attributes) -> Result<Option<Record>, ProcessError> {
        let user = match attributes.get("_user") {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Object(user)) => user,
            Some(_) => return Err(self.invalid("_user", "expected an object")),
        };

        let free = json!("free");
        let id = self.extract_required(user, "id", None)?;
        let plan = self.extract_required(user, "plan", Some(&free))?;

        Ok(Some(
            CustomRecord::namespaced("user")
                .with("id", id.clone())
                .with("plan", plan.clone())
                .into(),
        ))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init()?;

    let registry = ContextRegistry::shared();
    registry.set_global_context("storefront", Attributes::new());
    registry.set_global_processors([
        Arc::new(HttpProcessor) as Arc<dyn Processor>,
        Arc::new(UserProcessor),
    ]);

    let logger = ContextualLogger::create("storefront.http");

    let request = HttpRequestSnapshot::new("POST", "https://shop.example/cart?promo=spring")
        .header("X-Request-Id", "7d2a");
    let mut extra = from_json(json!({
        "_user": {"id": 17, "email": "not-logged@example.com"},
    }));
    extra.insert(REQUEST.into(), request.to_value());
    extra.insert(RESPONSE.into(), HttpResponseSnapshot::new(201).to_value());
    extra.insert(RESPONSE_DURATION_MS.into(), json!(8.4));
    logger.info("cart updated", extra)?;

    let anonymous = from_json(json!({"_user": {"plan": "pro"}}));
    if let Err(e) = logger.info("anonymous checkout", anonymous) {
        eprintln!("log call rejected: {}", e);
    }

    Ok(())
}
