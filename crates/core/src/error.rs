//! Kinded errors with location stacks
//!
//! Every failure in East carries a kind (what class of thing went wrong)
//! and a stack of source locations (where it went wrong, in call order).
//! Layers push their own location before re-raising, so a decode failure
//! five nodes deep in an IR tree names the node that was being decoded.
//! Errors may wrap a host-level cause.

use crate::location::SourceLocation;
use std::fmt;

/// Classification of East errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Declared vs inferred type conflict in IR; wire type hash mismatch.
    TypeMismatch,
    /// Decoded tag index out of range, or an unhandled match tag.
    UnknownVariantTag,
    /// Struct parsing: a declared field was absent.
    MissingField,
    /// Struct parsing: an undeclared field was present.
    ExtraField,
    /// IR references a platform function name not in the table.
    MissingPlatform,
    /// Table entry's declared signature does not match the IR's expectation.
    PlatformSignatureMismatch,
    /// The host implementation raised; the cause is attached.
    PlatformFailure,
    /// Datetime-format invariant violated, or an unknown format token.
    InvalidFormat,
    /// Write to a frozen container.
    FrozenMutation,
    /// Byte-level problem while encoding.
    EncodingError,
    /// Byte-level problem while decoding (truncation, invalid UTF-8,
    /// LEB128 overrun, impossible length, invalid base64).
    DecodingError,
    /// Operation impossible at the value level (integer division by zero).
    ArithmeticError,
}

impl ErrorKind {
    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::UnknownVariantTag => "unknown variant tag",
            ErrorKind::MissingField => "missing field",
            ErrorKind::ExtraField => "extra field",
            ErrorKind::MissingPlatform => "missing platform function",
            ErrorKind::PlatformSignatureMismatch => "platform signature mismatch",
            ErrorKind::PlatformFailure => "platform failure",
            ErrorKind::InvalidFormat => "invalid format",
            ErrorKind::FrozenMutation => "mutation of frozen value",
            ErrorKind::EncodingError => "encoding error",
            ErrorKind::DecodingError => "decoding error",
            ErrorKind::ArithmeticError => "arithmetic error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An East error: kind, human message, location stack, optional cause.
///
/// The location stack is ordered outermost-first: the first entry is where
/// the operation was entered, the last is the innermost point of failure.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    locations: Vec<SourceLocation>,
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            locations: Vec::new(),
            cause: None,
        }
    }

    pub fn with_cause(
        kind: ErrorKind,
        message: impl Into<String>,
        cause: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Error {
            kind,
            message: message.into(),
            locations: Vec::new(),
            cause: Some(cause),
        }
    }

    /// Push a location onto the stack. Called by each layer as the error
    /// propagates outward; unknown locations are skipped.
    pub fn at(mut self, loc: &SourceLocation) -> Self {
        if !loc.is_unknown() {
            self.locations.insert(0, loc.clone());
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn locations(&self) -> &[SourceLocation] {
        &self.locations
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(innermost) = self.locations.last() {
            write!(f, " at {}", innermost)?;
            for outer in self.locations.iter().rev().skip(1) {
                write!(f, ", via {}", outer)?;
            }
        }
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {})", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_locations() {
        let err = Error::new(ErrorKind::TypeMismatch, "expected Integer, found String")
            .at(&SourceLocation::new("inner.rs", 5, 2))
            .at(&SourceLocation::new("outer.rs", 1, 1));
        let text = format!("{}", err);
        assert!(text.starts_with("type mismatch: expected Integer, found String"));
        assert!(text.contains("at inner.rs:5:2"));
        assert!(text.contains("via outer.rs:1:1"));
    }

    #[test]
    fn test_location_stack_in_call_order() {
        let err = Error::new(ErrorKind::DecodingError, "truncated input")
            .at(&SourceLocation::new("leaf.rs", 9, 1))
            .at(&SourceLocation::new("root.rs", 3, 1));
        assert_eq!(err.locations().len(), 2);
        assert_eq!(err.locations()[0].file, "root.rs");
        assert_eq!(err.locations()[1].file, "leaf.rs");
    }

    #[test]
    fn test_unknown_locations_skipped() {
        let err =
            Error::new(ErrorKind::EncodingError, "oops").at(&SourceLocation::unknown());
        assert!(err.locations().is_empty());
    }

    #[test]
    fn test_cause_is_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "host exploded");
        let err = Error::with_cause(ErrorKind::PlatformFailure, "trace raised", Box::new(io));
        assert!(std::error::Error::source(&err).is_some());
        assert!(format!("{}", err).contains("host exploded"));
    }
}
