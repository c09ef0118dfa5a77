//! Source locations for IR nodes and error reporting
//!
//! Every IR node records where in the host program it was authored, so a
//! failure deep inside evaluation or decoding can point back at the
//! expression that produced it. Locations travel on the wire with the IR.

use std::fmt;

/// A position in host source: file, 1-based line and column, and an
/// optional span length in characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceLocation {
    pub file: String,
    /// 1-based line. Zero means "unknown".
    pub line: u32,
    /// 1-based column. Zero means "unknown".
    pub column: u32,
    /// Length of the span in characters, when the host recorded one.
    pub span: Option<u32>,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        SourceLocation {
            file: file.into(),
            line,
            column,
            span: None,
        }
    }

    pub fn with_span(file: impl Into<String>, line: u32, column: u32, span: u32) -> Self {
        SourceLocation {
            file: file.into(),
            line,
            column,
            span: Some(span),
        }
    }

    /// Location for synthesized nodes (builder helpers, decoded IR with no
    /// recorded position).
    pub fn unknown() -> Self {
        SourceLocation {
            file: String::new(),
            line: 0,
            column: 0,
            span: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.file.is_empty() && self.line == 0
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}:{}:{}", self.file, self.line, self.column)
        }
    }
}
