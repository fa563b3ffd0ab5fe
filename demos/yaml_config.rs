use contextual_log::attributes::from_json;
use contextual_log::env::{env_or, CONTEXTUAL_LOG_CONFIG_ENV};
use contextual_log::init::init_from_path;
use contextual_log::{ContextRegistry, ContextualLogger};
use serde_json::json;

/// Routes `orders` to JSON on stdout and everything else, at WARNING and
/// above, to a text handler on stderr.
///
/// Run with `CONTEXTUAL_LOG_CONFIG=path/to/config.yaml` to try another file.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = env_or(CONTEXTUAL_LOG_CONFIG_ENV, "demos/logging_config.yaml");
    init_from_path(&path)?;

    ContextRegistry::shared()
        .set_global_context("orders-service", from_json(json!({"region": "eu-west-1"})));

    let orders = ContextualLogger::create("orders.checkout");
    let inventory = ContextualLogger::create("inventory");

    orders.debug("cart priced", from_json(json!({"items": 3})))?;
    orders.info("order placed", from_json(json!({"order_id": "A-981"})))?;
    inventory.info("stock reserved", None)?;
    inventory.warn("stock below threshold", from_json(json!({"sku": "X-1", "remaining": 2})))?;

    Ok(())
}
