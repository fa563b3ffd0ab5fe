//! Processors turn raw attributes into structured [`Record`]s.
//!
//! A common use is breaking down transit objects passed as internal
//! attributes (for example `_request`) into flat, documented fields.

use serde_json::Value;

use crate::attributes::Attributes;
use crate::exception::short_type_name;
use crate::model::Record;

pub mod common;
pub mod error;
pub mod http;

pub use common::CommonProcessor;
pub use error::ErrorProcessor;
pub use http::{HttpProcessor, HttpRequestSnapshot, HttpResponseSnapshot};

/// Error raised by a processor while reading the attribute bag.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProcessError {
    #[error("{processor}: '{attribute}' attribute is required")]
    MissingAttribute { processor: String, attribute: String },

    #[error("{processor}: '{attribute}' attribute is invalid: {reason}")]
    InvalidAttribute {
        processor: String,
        attribute: String,
        reason: String,
    },
}

/// Derives a structured record from the attributes of one log call.
///
/// Implementations must be stateless and free of side effects: the same
/// processor instance is shared by every logger and may run on any thread.
pub trait Processor: Send + Sync {
    /// Name used in error messages. Defaults to the short type name.
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Build a record from `attributes`.
    ///
    /// **Returns**
    /// - `Ok(Some(..))` with the record to merge into the bag.
    /// - `Ok(None)` when the optional data this processor looks for is absent.
    /// - `Err(..)` when a mandatory attribute is missing or malformed; the
    ///   error is returned to the code issuing the log call.
    fn process(&self, attributes: &Attributes) -> Result<Option<Record>, ProcessError>;

    /// Look up `key`, falling back to `default`.
    ///
    /// Null values count as missing. Fails with
    /// [`ProcessError::MissingAttribute`] when neither is usable.
    fn extract_required<'a>(
        &self,
        attributes: &'a Attributes,
        key: &str,
        default: Option<&'a Value>,
    ) -> Result<&'a Value, ProcessError> {
        attributes
            .get(key)
            .filter(|value| !value.is_null())
            .or_else(|| default.filter(|value| !value.is_null()))
            .ok_or_else(|| self.missing(key))
    }

    /// Shorthand for a [`ProcessError::MissingAttribute`] owned by this processor.
    fn missing(&self, key: &str) -> ProcessError {
        ProcessError::MissingAttribute {
            processor: self.name().to_string(),
            attribute: key.to_string(),
        }
    }

    /// Shorthand for a [`ProcessError::InvalidAttribute`] owned by this processor.
    fn invalid(&self, key: &str, reason: impl ToString) -> ProcessError
    where
        Self: Sized,
    {
        ProcessError::InvalidAttribute {
            processor: self.name().to_string(),
            attribute: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Render a scalar attribute as text; strings are taken verbatim.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
