use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;

use serde_json::Value;

/// Exception-info triple `(type, message, traceback)` carried in the
/// attribute bag under [`EXC_INFO`](crate::attributes::EXC_INFO).
///
/// On the wire it is a three element JSON array; `traceback` is either
/// `null` or an array of strings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionInfo {
    pub type_name: String,
    pub message: String,
    pub traceback: Option<Vec<String>>,
}

impl ExceptionInfo {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            traceback: None,
        }
    }

    pub fn with_traceback(mut self, traceback: Vec<String>) -> Self {
        self.traceback = Some(traceback);
        self
    }

    /// Capture an error: its short type name, its `Display` message, its
    /// `source()` chain and, when `RUST_BACKTRACE` enables it, the frames of
    /// a backtrace taken at the call site.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: Error + ?Sized + 'static,
    {
        Self::capture(error, true)
    }

    /// Same as [`from_error`](Self::from_error) without a backtrace, for
    /// errors observed away from where they were raised (e.g. event fields
    /// seen by a layer).
    pub fn from_error_without_backtrace<E>(error: &E) -> Self
    where
        E: Error + ?Sized + 'static,
    {
        Self::capture(error, false)
    }

    fn capture<E>(error: &E, with_backtrace: bool) -> Self
    where
        E: Error + ?Sized + 'static,
    {
        let mut traceback = Vec::new();

        let mut source = error.source();
        while let Some(cause) = source {
            traceback.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        if with_backtrace {
            let backtrace = Backtrace::capture();
            if backtrace.status() == BacktraceStatus::Captured {
                traceback.extend(
                    backtrace
                        .to_string()
                        .lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(str::to_string),
                );
            }
        }

        Self {
            type_name: error_type_name(error),
            message: error.to_string(),
            traceback: if traceback.is_empty() { None } else { Some(traceback) },
        }
    }

    pub fn to_value(&self) -> Value {
        let traceback = match &self.traceback {
            Some(lines) => Value::from(lines.clone()),
            None => Value::Null,
        };
        Value::Array(vec![
            Value::from(self.type_name.clone()),
            Value::from(self.message.clone()),
            traceback,
        ])
    }

    /// Parse the wire form. Anything that is not a well-formed triple with a
    /// string type name yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let [type_name, message, traceback] = value.as_array()?.as_slice() else {
            return None;
        };

        let type_name = type_name.as_str()?.to_string();
        let message = match message {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let traceback = match traceback {
            Value::Array(lines) => Some(
                lines
                    .iter()
                    .map(|line| match line {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            _ => None,
        };

        Some(Self {
            type_name,
            message,
            traceback,
        })
    }

    /// Full rendering: the `Type: message` header followed by one indented
    /// line per traceback entry.
    pub fn render(&self) -> String {
        let mut out = if self.message.is_empty() {
            format!("{}\n", self.type_name)
        } else {
            format!("{}: {}\n", self.type_name, self.message)
        };
        for line in self.traceback.iter().flatten() {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Short name of the concrete error type.
///
/// Trait objects erase it from `type_name`, so for `dyn Error` the name is
/// read from the leading identifier of the `Debug` output, which is the type
/// name for derived `Debug` impls.
fn error_type_name<E>(error: &E) -> String
where
    E: Error + ?Sized,
{
    let full = std::any::type_name::<E>();
    if !full.starts_with("dyn ") {
        return short_type_name(full).to_string();
    }

    let debug = format!("{:?}", error);
    let ident: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    match ident.chars().next() {
        Some(first) if first.is_alphabetic() => ident,
        _ => short_type_name(full).to_string(),
    }
}

/// Last path segment of a type name, keeping generic arguments intact.
pub(crate) fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}
