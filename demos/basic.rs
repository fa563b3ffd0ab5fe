use contextual_log::attributes::from_json;
use contextual_log::init::init;
use contextual_log::{ContextRegistry, ContextualLogger};
use serde_json::json;

#[derive(thiserror::Error, Debug)]
#[error("card declined by issuer")]
struct CardDeclined;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init()?;

    ContextRegistry::shared()
        .set_global_context("billing-service", from_json(json!({"environment": "dev"})));

    let mut logger = ContextualLogger::create("billing.invoices");
    logger.local_context_mut().insert("job".into(), json!("monthly-run"));

    logger.info("invoice batch started", None)?;
    logger.info("invoice sent", from_json(json!({"correlation_id": "4f1c", "invoice_id": 1042})))?;
    logger.exception(
        "invoice charge failed",
        &CardDeclined,
        from_json(json!({"invoice_id": 1043})),
    )?;

    // Plain tracing events are enriched with the global context too.
    tracing::warn!(target: "billing.scheduler", delayed_by_s = 30, "next batch delayed");

    Ok(())
}
