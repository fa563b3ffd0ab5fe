use serde_json::{Map, Value};

/// Ordered bag of contextual attributes attached to a single log call.
///
/// Keys keep their insertion order (`serde_json` is built with
/// `preserve_order`), so serialized output is stable across runs.
pub type Attributes = Map<String, Value>;

/// Attributes whose key starts with this prefix are treated as internal
/// transit values: processors may read them, formatters never emit them.
pub const INTERNAL_PREFIX: &str = "_";

/// Uniquely identifies a request across services, usually taken from the
/// `x-request-id` header. Passed through verbatim.
pub const REQUEST_ID: &str = "request_id";

/// Identifies a whole chain of requests/messages (a.k.a. transit id),
/// usually taken from the `x-correlation-id` header. Passed through verbatim.
pub const CORRELATION_ID: &str = "correlation_id";

/// Key under which the exception-info triple travels in the bag.
pub const EXC_INFO: &str = "exc_info";

/// Rendered log message. Optional and passed through by the JSON formatter.
pub const MESSAGE: &str = "message";

/// Standard fields the backbone attaches to every record. They are replaced
/// by processor-derived fields in the JSON output and never passed through.
pub const DEFAULT_RECORD_ATTRIBUTES: &[&str] = &[
    "args",
    "asctime",
    "created",
    "exc_info",
    "exc_text",
    "filename",
    "funcName",
    "levelname",
    "levelno",
    "lineno",
    "module",
    "msecs",
    "msg",
    "name",
    "pathname",
    "process",
    "processName",
    "relativeCreated",
    "stack_info",
    "target",
    "taskName",
    "thread",
    "threadName",
];

/// Returns `true` for keys that must never leave the process.
pub fn is_internal(key: &str) -> bool {
    key.starts_with(INTERNAL_PREFIX)
}

/// Returns `true` for standard backbone fields.
pub fn is_default_attribute(key: &str) -> bool {
    DEFAULT_RECORD_ATTRIBUTES.contains(&key)
}

/// Overwrite-merge `source` into `target`: keys from `source` win.
///
/// A key that already exists keeps its original position, new keys are
/// appended.
pub fn merge_into(target: &mut Attributes, source: &Attributes) {
    for (key, value) in source {
        target.insert(key.clone(), value.clone());
    }
}

/// Merge several layers of attributes, lowest precedence first.
pub fn merge_layers<'a, I>(layers: I) -> Attributes
where
    I: IntoIterator<Item = &'a Attributes>,
{
    let mut merged = Attributes::new();
    for layer in layers {
        merge_into(&mut merged, layer);
    }
    merged
}

/// Returns `true` when a value counts as "empty" for sparse output:
/// null, empty string, numeric zero, empty array or empty object.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) => false,
    }
}

/// Build an [`Attributes`] value from a `serde_json::json!` object literal.
///
/// Non-object values produce an empty bag.
pub fn from_json(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        _ => Attributes::new(),
    }
}
