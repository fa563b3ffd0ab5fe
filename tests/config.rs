use std::fs;
use std::path::Path;
use std::sync::Arc;

use contextual_log::attributes::from_json;
use contextual_log::{build_layers, ConfigError, ContextRegistry, ContextualLogger, LoggingConfig};
use serde_json::{json, Value};
use tracing_subscriber::layer::SubscriberExt;

fn read_records(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn messages(path: &Path) -> Vec<String> {
    read_records(path)
        .into_iter()
        .map(|record| record["message"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn missing_file_is_reported_with_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logging_config.yaml");

    let err = LoggingConfig::from_path(&path).unwrap_err();

    assert!(matches!(err, ConfigError::NotFound { .. }));
    assert_eq!(
        err.to_string(),
        format!("Supplied configuration file is not found at: {}", path.display())
    );
}

#[test]
fn malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logging_config.yaml");
    fs::write(&path, "version: 1\nhandlers: [unclosed\n").unwrap();

    let err = LoggingConfig::from_path(&path).unwrap_err();

    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err
        .to_string()
        .starts_with("Error parsing the supplied configuration file: "));
}

#[test]
fn handlers_follow_logger_levels_and_propagation() {
    let dir = tempfile::tempdir().unwrap();
    let root_log = dir.path().join("root.log");
    let billing_log = dir.path().join("billing.log");
    let config_path = dir.path().join("logging_config.yaml");
    fs::write(
        &config_path,
        format!(
            r#"
version: 1
formatters:
  json:
    class: json
handlers:
  root-file:
    class: file
    filename: '{root}'
    formatter: json
  billing-file:
    class: file
    filename: '{billing}'
loggers:
  billing:
    level: DEBUG
    handlers: [billing-file]
    propagate: no
  audit:
    level: INFO
    handlers: [billing-file]
root:
  level: ERROR
  handlers: [root-file]
"#,
            root = root_log.display(),
            billing = billing_log.display(),
        ),
    )
    .unwrap();

    let registry = Arc::new(ContextRegistry::new());
    registry.set_global_context("test_app", from_json(json!({})));
    let config = LoggingConfig::from_path(&config_path).unwrap();
    let layers = build_layers(&config, Arc::clone(&registry)).unwrap();
    assert_eq!(layers.len(), 2);

    let billing = ContextualLogger::with_registry("billing.invoices", Arc::clone(&registry));
    let audit = ContextualLogger::with_registry("audit", Arc::clone(&registry));
    let other = ContextualLogger::with_registry("other", Arc::clone(&registry));

    let subscriber = tracing_subscriber::registry().with(layers);
    tracing::subscriber::with_default(subscriber, || {
        billing.debug("billing debug", None).unwrap();
        billing.error("billing error", None).unwrap();
        audit.debug("audit debug", None).unwrap();
        audit.info("audit info", None).unwrap();
        other.warn("other warn", None).unwrap();
        other.error("other error", None).unwrap();
    });

    assert_eq!(
        messages(&billing_log),
        vec!["billing debug", "billing error", "audit info"]
    );
    assert_eq!(messages(&root_log), vec!["audit info", "other error"]);

    let record = &read_records(&root_log)[0];
    assert_eq!(record["application_name"], json!("test_app"));
    assert_eq!(record["log_level"], json!("INFO"));
}

#[test]
fn child_loggers_inherit_parent_level_and_handlers() {
    let dir = tempfile::tempdir().unwrap();
    let parent_log = dir.path().join("billing.log");
    let child_log = dir.path().join("billing-api.log");
    let yaml = format!(
        r#"
version: 1
handlers:
  child-file:
    class: file
    filename: '{child}'
  parent-file:
    class: file
    filename: '{parent}'
loggers:
  billing:
    level: DEBUG
    handlers: [parent-file]
  billing.api:
    handlers: [child-file]
root:
  level: WARNING
"#,
        child = child_log.display(),
        parent = parent_log.display(),
    );

    let registry = Arc::new(ContextRegistry::new());
    registry.set_global_context("test_app", from_json(json!({})));
    let config = LoggingConfig::from_yaml(&yaml).unwrap();
    let layers = build_layers(&config, Arc::clone(&registry)).unwrap();
    let api = ContextualLogger::with_registry("billing.api", Arc::clone(&registry));
    let orders = ContextualLogger::with_registry("billing.api.orders", Arc::clone(&registry));
    let billing = ContextualLogger::with_registry("billing", Arc::clone(&registry));

    tracing::subscriber::with_default(tracing_subscriber::registry().with(layers), || {
        api.info("api info", None).unwrap();
        orders.debug("orders debug", None).unwrap();
        billing.info("billing info", None).unwrap();
    });

    assert_eq!(messages(&child_log), vec!["api info", "orders debug"]);
    assert_eq!(
        messages(&parent_log),
        vec!["api info", "orders debug", "billing info"]
    );
}

#[test]
fn file_handler_appends_text_lines() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("app.log");
    fs::write(&log, "existing line\n").unwrap();
    let yaml = format!(
        r#"
version: 1
formatters:
  simple:
    format: '%(levelname)s %(name)s: %(message)s'
handlers:
  file:
    class: file
    filename: '{}'
    formatter: simple
    level: WARNING
root:
  level: DEBUG
  handlers: [file]
"#,
        log.display()
    );

    let registry = Arc::new(ContextRegistry::new());
    registry.set_global_context("test_app", from_json(json!({})));
    let config = LoggingConfig::from_yaml(&yaml).unwrap();
    let layers = build_layers(&config, Arc::clone(&registry)).unwrap();
    let logger = ContextualLogger::with_registry("jobs", Arc::clone(&registry));

    tracing::subscriber::with_default(tracing_subscriber::registry().with(layers), || {
        logger.info("below handler level", None).unwrap();
        logger.warn("disk almost full", None).unwrap();
    });

    assert_eq!(
        fs::read_to_string(&log).unwrap(),
        "existing line\nWARNING jobs: disk almost full\n"
    );
}
