//! Structured sub-records produced by processors.
//!
//! Every record flattens to a sparse [`Attributes`] map: keys holding null,
//! `""`, `0`, `0.0`, `[]` or `{}` are dropped. Namespaced records nest their
//! fields under a fixed key (`"error"`, `"http"`), and an all-empty
//! namespaced record produces no key at all.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::attributes::{is_empty_value, Attributes};

/// Common behaviour of every structured log record.
pub trait AttributeRecord {
    /// Key under which [`flatten`](AttributeRecord::flatten) nests the fields.
    fn namespace(&self) -> Option<&str> {
        None
    }

    /// Sparse field map, without the namespace wrapper.
    fn fields(&self) -> Attributes;

    /// Sparse field map, nested under [`namespace`](AttributeRecord::namespace)
    /// when the record has one.
    fn flatten(&self) -> Attributes {
        let fields = self.fields();
        match self.namespace() {
            Some(namespace) => {
                let mut wrapped = Attributes::new();
                if !fields.is_empty() {
                    wrapped.insert(namespace.to_string(), Value::Object(fields));
                }
                wrapped
            }
            None => fields,
        }
    }
}

/// Serialize `value` and keep only its non-empty top-level fields.
pub fn sparse_fields<T: Serialize + ?Sized>(value: &T) -> Attributes {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .filter(|(_, v)| !is_empty_value(v))
            .collect(),
        _ => Attributes::new(),
    }
}

/// Declares a record struct together with one `&'static str` constant per
/// field, so code that refers to a field by name stops compiling when the
/// field is renamed.
macro_rules! attribute_record {
    (@namespace) => { None };
    (@namespace $namespace:literal) => { Some($namespace) };
    (
        $(#[$meta:meta])*
        pub struct $name:ident $(in $namespace:literal)? {
            $(
                $(#[$field_meta:meta])*
                $constant:ident => $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize)]
        pub struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $ty,
            )*
        }

        impl $name {
            $(
                pub const $constant: &'static str = stringify!($field);
            )*

            /// Names of every field, in declaration order.
            pub const FIELDS: &'static [&'static str] = &[$(stringify!($field)),*];
        }

        impl AttributeRecord for $name {
            fn namespace(&self) -> Option<&str> {
                attribute_record!(@namespace $($namespace)?)
            }

            fn fields(&self) -> Attributes {
                sparse_fields(self)
            }
        }
    };
}

attribute_record! {
    /// Fields every emitted record must carry.
    pub struct CommonRecord {
        APPLICATION_NAME => application_name: String,
        TIMESTAMP => timestamp: String,
        LOG_LEVEL => log_level: String,
    }
}

attribute_record! {
    /// Details of an error attached to the log call.
    pub struct ErrorRecord in "error" {
        EXCEPTION_TYPE => exception_type: String,
        EXCEPTION_MESSAGE => exception_message: String,
        EXCEPTION_STACK_TRACE => exception_stack_trace: String,
    }
}

attribute_record! {
    /// Request/response summary for HTTP access logs.
    pub struct HttpRecord in "http" {
        REQUEST_ID => request_id: String,
        REQUEST_METHOD => request_method: String,
        REQUEST_URL => request_url: String,
        REQUEST_QUERY_PARAMS => request_query_params: BTreeMap<String, String>,
        REQUEST_HEADERS => request_headers: BTreeMap<String, String>,
        RESPONSE_STATUS => response_status: u16,
        RESPONSE_HEADERS => response_headers: BTreeMap<String, String>,
        RESPONSE_DURATION_MS => response_duration_ms: f64,
    }
}

impl ErrorRecord {
    /// Namespace key of the flattened error record.
    pub const NAMESPACE: &'static str = "error";
}

impl HttpRecord {
    /// Namespace key of the flattened HTTP record.
    pub const NAMESPACE: &'static str = "http";
}

/// User-defined record for processors whose output does not fit the
/// built-in types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomRecord {
    pub namespace: Option<String>,
    pub fields: Attributes,
}

impl CustomRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nest the flattened fields under `namespace`.
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            fields: Attributes::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

impl AttributeRecord for CustomRecord {
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn fields(&self) -> Attributes {
        sparse_fields(&self.fields)
    }
}

/// Output of a [`Processor`](crate::processor::Processor).
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Common(CommonRecord),
    Error(ErrorRecord),
    Http(HttpRecord),
    Custom(CustomRecord),
}

impl Record {
    pub fn flatten(&self) -> Attributes {
        match self {
            Record::Common(record) => record.flatten(),
            Record::Error(record) => record.flatten(),
            Record::Http(record) => record.flatten(),
            Record::Custom(record) => record.flatten(),
        }
    }
}

impl From<CommonRecord> for Record {
    fn from(record: CommonRecord) -> Self {
        Record::Common(record)
    }
}

impl From<ErrorRecord> for Record {
    fn from(record: ErrorRecord) -> Self {
        Record::Error(record)
    }
}

impl From<HttpRecord> for Record {
    fn from(record: HttpRecord) -> Self {
        Record::Http(record)
    }
}

impl From<CustomRecord> for Record {
    fn from(record: CustomRecord) -> Self {
        Record::Custom(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn common_record_skips_empty_application_name() {
        let record = CommonRecord {
            application_name: String::new(),
            timestamp: "2024-01-01T00:00:00.000000+00:00".into(),
            log_level: "INFO".into(),
        };

        let flat = record.flatten();

        assert!(!flat.contains_key(CommonRecord::APPLICATION_NAME));
        assert_eq!(flat[CommonRecord::LOG_LEVEL], json!("INFO"));
    }

    #[test]
    fn error_record_nests_under_namespace() {
        let record = ErrorRecord {
            exception_type: "ValueError".into(),
            exception_message: "boom".into(),
            exception_stack_trace: String::new(),
        };

        let flat = record.flatten();

        assert_eq!(
            Value::Object(flat),
            json!({"error": {"exception_type": "ValueError", "exception_message": "boom"}})
        );
    }

    #[test]
    fn empty_namespaced_record_produces_nothing() {
        assert!(HttpRecord::default().flatten().is_empty());
        assert!(ErrorRecord::default().flatten().is_empty());
    }

    #[test]
    fn http_record_drops_zero_status_and_empty_maps() {
        let record = HttpRecord {
            request_method: "GET".into(),
            response_duration_ms: 12.5,
            ..HttpRecord::default()
        };

        assert_eq!(
            Value::Object(record.flatten()),
            json!({"http": {"request_method": "GET", "response_duration_ms": 12.5}})
        );
    }

    #[test]
    fn field_constants_match_serialized_names() {
        let record = CommonRecord {
            application_name: "a".into(),
            timestamp: "t".into(),
            log_level: "l".into(),
        };
        let keys: Vec<_> = record.fields().keys().cloned().collect();
        assert_eq!(keys, CommonRecord::FIELDS);
        assert_eq!(ErrorRecord::FIELDS.len(), 3);
        assert_eq!(HttpRecord::FIELDS.len(), 8);
    }

    #[test]
    fn custom_record_keeps_booleans_and_namespace() {
        let record = CustomRecord::namespaced("audit")
            .with("allowed", false)
            .with("user", "")
            .with("attempts", 2);

        assert_eq!(
            Value::Object(Record::from(record).flatten()),
            json!({"audit": {"allowed": false, "attempts": 2}})
        );
    }
}
