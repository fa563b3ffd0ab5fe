use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::attributes::Attributes;
use crate::model::{CommonRecord, Record};
use crate::processor::{value_to_string, ProcessError, Processor};

/// Attribute holding the level name set by the backbone.
pub const LEVEL_NAME: &str = "levelname";

/// Attribute holding the record creation time as epoch seconds.
pub const CREATED: &str = "created";

/// Produces the fields every record must carry: application name, level
/// and timestamp.
///
/// A missing application name or level is a configuration mistake and fails
/// the call. The timestamp falls back to the current time when `created`
/// is absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonProcessor;

impl CommonProcessor {
    fn timestamp(&self, attributes: &Attributes) -> Result<String, ProcessError> {
        let created = match attributes.get(CREATED) {
            None | Some(Value::Null) => Utc::now(),
            Some(value) => {
                let seconds = epoch_seconds(value).ok_or_else(|| {
                    self.invalid(CREATED, format!("expected epoch seconds, got {}", value))
                })?;
                DateTime::<Utc>::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)
                    .ok_or_else(|| self.invalid(CREATED, format!("{} is out of range", seconds)))?
            }
        };

        Ok(format_timestamp(&created))
    }
}

impl Processor for CommonProcessor {
    fn process(&self, attributes: &Attributes) -> Result<Option<Record>, ProcessError> {
        let application_name =
            self.extract_required(attributes, CommonRecord::APPLICATION_NAME, None)?;
        let log_level = self.extract_required(attributes, LEVEL_NAME, None)?;

        Ok(Some(
            CommonRecord {
                application_name: value_to_string(application_name),
                timestamp: self.timestamp(attributes)?,
                log_level: value_to_string(log_level),
            }
            .into(),
        ))
    }
}

/// UTC ISO-8601 with microsecond precision and an explicit `+00:00` offset.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, false)
}

fn epoch_seconds(value: &Value) -> Option<f64> {
    let seconds = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    seconds.is_finite().then_some(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::from_json;
    use serde_json::json;

    fn common(attributes: &Attributes) -> Result<CommonRecord, ProcessError> {
        match CommonProcessor.process(attributes)? {
            Some(Record::Common(record)) => Ok(record),
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[test]
    fn builds_record_from_all_attributes() {
        let attributes = from_json(json!({
            "application_name": "billing",
            "levelname": "INFO",
            "created": 1_700_000_000.25,
        }));

        let record = common(&attributes).unwrap();

        assert_eq!(record.application_name, "billing");
        assert_eq!(record.log_level, "INFO");
        assert_eq!(record.timestamp, "2023-11-14T22:13:20.250000+00:00");
    }

    #[test]
    fn missing_application_name_names_processor_and_attribute() {
        let attributes = from_json(json!({"levelname": "INFO", "created": 1.0}));

        let err = common(&attributes).unwrap_err();

        assert_eq!(
            err.to_string(),
            "CommonProcessor: 'application_name' attribute is required"
        );
    }

    #[test]
    fn missing_level_fails() {
        let attributes = from_json(json!({"application_name": "billing"}));

        let err = common(&attributes).unwrap_err();

        assert_eq!(err.to_string(), "CommonProcessor: 'levelname' attribute is required");
    }

    #[test]
    fn falls_back_to_current_time() {
        let attributes = from_json(json!({"application_name": "billing", "levelname": "DEBUG"}));
        let before = Utc::now();

        let record = common(&attributes).unwrap();

        let parsed = DateTime::parse_from_rfc3339(&record.timestamp).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
        assert!(parsed.with_timezone(&Utc) >= before - chrono::Duration::seconds(1));
        assert!(record.timestamp.ends_with("+00:00"));
        assert_eq!(record.timestamp.split('.').nth(1).map(|f| f.len()), Some(6 + 6));
    }

    #[test]
    fn accepts_numeric_strings_and_rejects_garbage() {
        let numeric = from_json(json!({
            "application_name": "billing",
            "levelname": "INFO",
            "created": "0.5",
        }));
        assert_eq!(
            common(&numeric).unwrap().timestamp,
            "1970-01-01T00:00:00.500000+00:00"
        );

        let garbage = from_json(json!({
            "application_name": "billing",
            "levelname": "INFO",
            "created": "invalid_time",
        }));
        assert!(matches!(
            common(&garbage),
            Err(ProcessError::InvalidAttribute { ref attribute, .. }) if attribute == "created"
        ));
    }
}
