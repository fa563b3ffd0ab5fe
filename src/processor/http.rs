//! Adapts request/response summaries passed as internal attributes into an
//! [`HttpRecord`].
//!
//! Web frameworks hand their request and response objects to the logger as
//! transit attributes, e.g.
//!
//! ```ignore
//! let mut extra = Attributes::new();
//! extra.insert(REQUEST.into(), HttpRequestSnapshot::from_parts(&parts).to_value());
//! extra.insert(RESPONSE_DURATION_MS.into(), 12.5.into());
//! logger.info("request served", extra)?;
//! ```
//!
//! Being internal (`_` prefixed), the raw objects never reach the output;
//! only the flattened `http` namespace does.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::attributes::{Attributes, REQUEST_ID};
use crate::model::{HttpRecord, Record};
use crate::processor::{value_to_string, ProcessError, Processor};

/// Internal attribute carrying an [`HttpRequestSnapshot`].
pub const REQUEST: &str = "_request";

/// Internal attribute carrying an [`HttpResponseSnapshot`].
pub const RESPONSE: &str = "_response";

/// Internal attribute carrying the response time in milliseconds.
pub const RESPONSE_DURATION_MS: &str = "_response_duration_ms";

/// Header that takes precedence over the `request_id` attribute.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Framework-neutral view of an incoming request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRequestSnapshot {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

/// Framework-neutral view of an outgoing response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpResponseSnapshot {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
}

impl HttpRequestSnapshot {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Add a header; names are lower-cased.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Build a snapshot from `http` request parts. Relative URIs are
    /// resolved against the `host` header; non UTF-8 header values are
    /// skipped.
    #[cfg(feature = "http")]
    pub fn from_parts(parts: &::http::request::Parts) -> Self {
        let headers = header_map(&parts.headers);
        let url = match (parts.uri.scheme_str(), headers.get("host")) {
            (None, Some(host)) => format!("http://{}{}", host, parts.uri),
            _ => parts.uri.to_string(),
        };

        Self {
            method: parts.method.as_str().to_string(),
            url,
            headers,
        }
    }
}

impl HttpResponseSnapshot {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
        }
    }

    /// Add a header; names are lower-cased.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    #[cfg(feature = "http")]
    pub fn from_parts(parts: &::http::response::Parts) -> Self {
        Self {
            status: parts.status.as_u16(),
            headers: header_map(&parts.headers),
        }
    }
}

#[cfg(feature = "http")]
fn header_map(headers: &::http::HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

/// Builds the `http` namespace from [`REQUEST`], [`RESPONSE`] and
/// [`RESPONSE_DURATION_MS`]. Whatever is missing stays at its zero value and
/// is dropped when the record is flattened.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpProcessor;

impl HttpProcessor {
    fn snapshot<T>(&self, attributes: &Attributes, key: &str) -> Result<Option<T>, ProcessError>
    where
        T: for<'de> Deserialize<'de>,
    {
        match attributes.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| self.invalid(key, e)),
        }
    }
}

impl Processor for HttpProcessor {
    fn process(&self, attributes: &Attributes) -> Result<Option<Record>, ProcessError> {
        let mut record = HttpRecord::default();

        if let Some(request) = self.snapshot::<HttpRequestSnapshot>(attributes, REQUEST)? {
            record.request_query_params = query_params(&request.url);
            record.request_id = request
                .headers
                .get(REQUEST_ID_HEADER)
                .cloned()
                .or_else(|| {
                    attributes
                        .get(REQUEST_ID)
                        .filter(|v| !v.is_null())
                        .map(value_to_string)
                })
                .unwrap_or_default();
            record.request_method = request.method;
            record.request_url = request.url;
            record.request_headers = request.headers;
        }

        if let Some(response) = self.snapshot::<HttpResponseSnapshot>(attributes, RESPONSE)? {
            record.response_status = response.status;
            record.response_headers = response.headers;
        }

        match attributes.get(RESPONSE_DURATION_MS) {
            None | Some(Value::Null) => {}
            Some(value) => {
                record.response_duration_ms = value
                    .as_f64()
                    .ok_or_else(|| self.invalid(RESPONSE_DURATION_MS, "expected a number"))?;
            }
        }

        Ok(Some(record.into()))
    }
}

fn query_params(url: &str) -> BTreeMap<String, String> {
    match Url::parse(url) {
        Ok(url) => url.query_pairs().into_owned().collect(),
        Err(_) => url
            .split_once('?')
            .map(|(_, query)| url::form_urlencoded::parse(query.as_bytes()).into_owned().collect())
            .unwrap_or_default(),
    }
}
