use std::fmt;

use miette::{Diagnostic, LabeledSpan, SourceCode, SourceOffset, SourceSpan};
use thiserror::Error;

use crate::eval::error::{ErrorCategory, RuntimeError};

/// A runtime failure attached to the source text it came from.
///
/// [`RuntimeError`] carries line and column positions; this wrapper
/// resolves them against the original source so that miette can
/// render a labeled snippet.
#[derive(Error, Debug, PartialEq, Clone)]
#[error(
    "{}: {} [line {}, column {}]",
    .cause.category(),
    .cause,
    .cause.range().start.line,
    .cause.range().start.column
)]
pub struct Error {
    cause: RuntimeError,
    source_code: String,
    location: SourceSpan,
}

impl Error {
    pub fn from_runtime(cause: RuntimeError, source_code: String) -> Self {
        let range = cause.range();
        let start = SourceOffset::from_location(
            &source_code,
            range.start.line as usize,
            range.start.column,
        );
        let end = SourceOffset::from_location(
            &source_code,
            range.end.line as usize,
            range.end.column,
        );
        let length = end.offset().saturating_sub(start.offset()).max(1);
        Self {
            cause,
            source_code,
            location: SourceSpan::new(start, length),
        }
    }

    pub fn cause(&self) -> &RuntimeError {
        &self.cause
    }

    pub fn category(&self) -> ErrorCategory {
        self.cause.category()
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("blaise::eval::{}", self.cause.name())))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let help = match self.cause.category() {
            ErrorCategory::Type => "Check the types of the operands involved in this operation",
            ErrorCategory::Runtime => "Check the values this statement operates on",
            ErrorCategory::Contract => "An assertion in the program did not hold",
            ErrorCategory::Internal => {
                "This should not happen, please report it as a bug in the runtime"
            }
        };
        Some(Box::new(help))
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        Some(&self.source_code)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some(self.cause.to_string()),
            self.location,
        ))))
    }
}
