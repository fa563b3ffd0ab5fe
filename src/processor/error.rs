use crate::attributes::{Attributes, EXC_INFO};
use crate::exception::ExceptionInfo;
use crate::model::{ErrorRecord, Record};
use crate::processor::{ProcessError, Processor};

/// Extracts exception type, message and stack trace from the
/// [`EXC_INFO`] attribute, as attached by
/// [`ContextualLogger::exception`](crate::logger::ContextualLogger::exception).
///
/// Absent or malformed exception info is not an error: no record is
/// produced and the output simply carries no `error` key.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorProcessor;

impl Processor for ErrorProcessor {
    fn process(&self, attributes: &Attributes) -> Result<Option<Record>, ProcessError> {
        let Some(info) = attributes.get(EXC_INFO).and_then(ExceptionInfo::from_value) else {
            return Ok(None);
        };

        Ok(Some(
            ErrorRecord {
                exception_stack_trace: info.render(),
                exception_type: info.type_name,
                exception_message: info.message,
            }
            .into(),
        ))
    }
}
