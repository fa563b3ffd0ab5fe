//! Final shaping of a [`LogRecord`] into one output line.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use serde_json::Value;

use crate::attributes::{is_default_attribute, is_internal, Attributes};
use crate::model::{CommonRecord, ErrorRecord};
use crate::processor::{CommonProcessor, ErrorProcessor, ProcessError, Processor};
use crate::record::LogRecord;

/// Default `TextFormatter` layout.
pub const DEFAULT_TEXT_FORMAT: &str = "%(asctime)s - %(name)s - %(levelname)s - %(message)s";

/// Default `asctime` layout.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Error type returned when a record cannot be formatted.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("failed to serialize log record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid date format: {0}")]
    DateFormat(String),
}

/// Serializes records as one JSON object per line.
///
/// The object holds, in order:
/// - the common fields (`application_name`, `timestamp`, `log_level`);
/// - every remaining attribute that is neither internal (`_` prefixed), a
///   standard backbone field, nor a field of the common or error record;
/// - the `error` namespace when the record carries exception info.
///
/// Missing common attributes make formatting fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter {
    common: CommonProcessor,
    error: ErrorProcessor,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shape the flat view of a record into the output object.
    pub fn to_object(&self, view: &Attributes) -> Result<Attributes, FormatError> {
        let common = self.common.process(view)?.map(|r| r.flatten()).unwrap_or_default();
        let error = self.error.process(view)?.map(|r| r.flatten()).unwrap_or_default();

        let mut output = common;
        for (key, value) in view {
            if is_internal(key)
                || is_default_attribute(key)
                || CommonRecord::FIELDS.contains(&key.as_str())
                || ErrorRecord::FIELDS.contains(&key.as_str())
                || output.contains_key(key)
                || error.contains_key(key)
            {
                continue;
            }
            output.insert(key.clone(), value.clone());
        }
        output.extend(error);

        Ok(output)
    }

    pub fn format(&self, record: &LogRecord) -> Result<String, FormatError> {
        let object = self.to_object(&record.to_attributes())?;
        Ok(serde_json::to_string(&object)?)
    }
}

/// Renders records through a `%(key)s` template, e.g.
/// `"%(asctime)s - %(name)s - %(levelname)s - %(message)s"`.
///
/// Any key of the record's flat view can be referenced; `asctime` is
/// rendered from `created` using the strftime `datefmt`. Unknown keys render
/// as empty strings and `%%` yields a literal `%`.
#[derive(Debug, Clone)]
pub struct TextFormatter {
    format: String,
    datefmt: String,
}

impl TextFormatter {
    pub fn new(format: impl Into<String>, datefmt: impl Into<String>) -> Result<Self, FormatError> {
        let datefmt = datefmt.into();
        if StrftimeItems::new(&datefmt).any(|item| matches!(item, Item::Error)) {
            return Err(FormatError::DateFormat(datefmt));
        }
        Ok(Self {
            format: format.into(),
            datefmt,
        })
    }

    pub fn format(&self, record: &LogRecord) -> Result<String, FormatError> {
        let view = record.to_attributes();
        let mut out = String::with_capacity(self.format.len() + 64);
        let mut rest = self.format.as_str();

        while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];

            if let Some(after) = tail.strip_prefix("%%") {
                out.push('%');
                rest = after;
                continue;
            }

            let placeholder = tail
                .strip_prefix("%(")
                .and_then(|inner| inner.find(")s").map(|end| (&inner[..end], &inner[end + 2..])));

            match placeholder {
                Some((key, after)) => {
                    self.render_key(&mut out, record, &view, key)?;
                    rest = after;
                }
                None => {
                    out.push('%');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);

        Ok(out)
    }

    fn render_key(
        &self,
        out: &mut String,
        record: &LogRecord,
        view: &Attributes,
        key: &str,
    ) -> Result<(), FormatError> {
        if key == "asctime" {
            return write!(out, "{}", record.created.format(&self.datefmt))
                .map_err(|_| FormatError::DateFormat(self.datefmt.clone()));
        }

        match view.get(key) {
            Some(Value::String(s)) => out.push_str(s),
            Some(Value::Null) | None => {}
            Some(other) => out.push_str(&other.to_string()),
        }
        Ok(())
    }
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            format: DEFAULT_TEXT_FORMAT.to_string(),
            datefmt: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

/// Output format of a [`ContextLayer`](crate::layer::ContextLayer).
#[derive(Debug, Clone)]
pub enum Formatter {
    Json(JsonFormatter),
    Text(TextFormatter),
}

impl Formatter {
    pub fn format(&self, record: &LogRecord) -> Result<String, FormatError> {
        match self {
            Formatter::Json(formatter) => formatter.format(record),
            Formatter::Text(formatter) => formatter.format(record),
        }
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Formatter::Json(JsonFormatter::new())
    }
}

impl From<JsonFormatter> for Formatter {
    fn from(formatter: JsonFormatter) -> Self {
        Formatter::Json(formatter)
    }
}

impl From<TextFormatter> for Formatter {
    fn from(formatter: TextFormatter) -> Self {
        Formatter::Text(formatter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{from_json, DEFAULT_RECORD_ATTRIBUTES};
    use crate::exception::ExceptionInfo;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tracing::Level;

    fn a_valid_record(extra: Value) -> LogRecord {
        let mut attributes = from_json(json!({"application_name": "test_app"}));
        attributes.extend(from_json(extra));
        let mut record = LogRecord::new(Level::INFO, "test")
            .with_message("Test message")
            .with_attributes(attributes);
        record.created = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        record.file = Some(file!().to_string());
        record.line = Some(10);
        record.module_path = Some(module_path!().to_string());
        record
    }

    fn format_json(record: &LogRecord) -> Attributes {
        let line = JsonFormatter::new().format(record).unwrap();
        match serde_json::from_str::<Value>(&line) {
            Ok(Value::Object(map)) => map,
            other => panic!("formatter output is not a JSON object: {:?}", other),
        }
    }

    #[test]
    fn outputs_common_fields_and_message() {
        let output = format_json(&a_valid_record(json!({})));

        assert_eq!(
            Value::Object(output),
            json!({
                "application_name": "test_app",
                "timestamp": "2023-11-14T22:13:20.000000+00:00",
                "log_level": "INFO",
                "message": "Test message",
            })
        );
    }

    #[test]
    fn excludes_internal_attributes() {
        let output = format_json(&a_valid_record(json!({"_private_attribute": "secret"})));
        assert!(!output.contains_key("_private_attribute"));
    }

    #[test]
    fn excludes_every_default_attribute() {
        let extra: Attributes = DEFAULT_RECORD_ATTRIBUTES
            .iter()
            .filter(|key| **key != "created" && **key != "levelname" && **key != "exc_info")
            .map(|key| (key.to_string(), json!("value")))
            .collect();
        let output = format_json(&a_valid_record(Value::Object(extra)));

        for key in DEFAULT_RECORD_ATTRIBUTES {
            assert!(!output.contains_key(*key), "'{key}' should not be in the output");
        }
    }

    #[test]
    fn passes_through_optional_attributes() {
        let output = format_json(&a_valid_record(json!({
            "request_id": "test_request_id_value",
            "correlation_id": "test_correlation_id_value",
            "nested": {"list": [1, {"deep": null}], "flag": true},
        })));

        assert_eq!(output["request_id"], json!("test_request_id_value"));
        assert_eq!(output["correlation_id"], json!("test_correlation_id_value"));
        assert_eq!(output["nested"], json!({"list": [1, {"deep": null}], "flag": true}));
    }

    #[test]
    fn output_is_valid_json_for_any_shape() {
        let shapes = [
            json!([{"id": 1, "tags": ["a", "b"]}, {"id": 2, "tags": []}]),
            json!({"a": {"b": {"c": {"d": {"e": {"f": [[[{"g": null}]]]}}}}}}),
            json!("résumé ✓ 日本語 🚀"),
            json!("quote \" backslash \\ newline \n tab \t bell \u{7} nul \u{0}"),
            json!({"ключ": "значение", "key\nwith\tcontrol\u{1}": "v"}),
            json!(u64::MAX),
            json!(i64::MIN),
            json!(123_456_789_012_345.0),
            json!(9.5367431640625e-7),
            json!([true, false, null, 0, -0.5, ""]),
        ];

        for shape in shapes {
            let record = a_valid_record(json!({"payload": shape.clone()}));
            let line = JsonFormatter::new().format(&record).unwrap();

            assert!(!line.contains('\n'), "line break in output: {line}");
            let parsed: Value = serde_json::from_str(&line).unwrap();
            assert_eq!(parsed["payload"], shape);
        }
    }

    #[test]
    fn missing_application_name_fails() {
        let mut record = a_valid_record(json!({}));
        record.attributes.remove("application_name");

        let err = JsonFormatter::new().format(&record).unwrap_err();

        assert_eq!(
            err.to_string(),
            "CommonProcessor: 'application_name' attribute is required"
        );
    }

    #[test]
    fn error_namespace_is_last_and_not_overridable() {
        let info = ExceptionInfo::new("ValueError", "boom");
        let output = format_json(&a_valid_record(json!({
            "exc_info": info.to_value(),
            "error": "raw value",
            "exception_type": "raw value",
        })));

        assert_eq!(output.keys().last().map(String::as_str), Some("error"));
        assert_eq!(
            output["error"],
            json!({
                "exception_type": "ValueError",
                "exception_message": "boom",
                "exception_stack_trace": "ValueError: boom\n",
            })
        );
        assert!(!output.contains_key("exception_type"));
    }

    #[test]
    fn raw_error_key_passes_through_without_exception() {
        let output = format_json(&a_valid_record(json!({"error": "quota exceeded"})));
        assert_eq!(output["error"], json!("quota exceeded"));
    }

    #[test]
    fn text_formatter_renders_template() {
        let formatter = TextFormatter::new(
            "%(asctime)s|%(name)s|%(levelname)s|%(lineno)s|%(missing)s|100%%|%(message)s",
            "%Y-%m-%d %H:%M:%S",
        )
        .unwrap();

        let line = formatter.format(&a_valid_record(json!({}))).unwrap();

        assert_eq!(line, "2023-11-14 22:13:20|test|INFO|10||100%|Test message");
    }

    #[test]
    fn text_formatter_rejects_bad_datefmt() {
        assert!(matches!(
            TextFormatter::new(DEFAULT_TEXT_FORMAT, "%Y %!"),
            Err(FormatError::DateFormat(_))
        ));
    }
}
