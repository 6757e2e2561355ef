//! Error types for the spreadcall engine

use std::fmt;
use thiserror::Error;

/// Source location in JavaScript code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed)
    pub column: u32,
    /// Byte offset in source
    pub offset: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Format a source context with caret pointer for errors
pub fn format_error_context(source: &str, location: &SourceLocation) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let line_idx = (location.line.saturating_sub(1)) as usize;

    if line_idx >= lines.len() {
        return String::new();
    }

    let mut result = String::new();
    let width = format!("{}", location.line + 1).len().max(3);

    if line_idx > 0 {
        result.push_str(&format!(
            "{:>width$} | {}\n",
            location.line - 1,
            lines[line_idx - 1],
            width = width
        ));
    }

    result.push_str(&format!(
        "{:>width$} | {}\n",
        location.line,
        lines[line_idx],
        width = width
    ));

    let pointer_offset = (location.column.saturating_sub(1)) as usize;
    result.push_str(&format!(
        "{:>width$} | {}^\n",
        "",
        " ".repeat(pointer_offset),
        width = width
    ));

    if line_idx + 1 < lines.len() {
        result.push_str(&format!(
            "{:>width$} | {}\n",
            location.line + 1,
            lines[line_idx + 1],
            width = width
        ));
    }

    result
}

/// A single frame in a JavaScript stack trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Function name (or `"<anonymous>"` for anonymous functions)
    pub function_name: String,
    /// Source file name (if known)
    pub file_name: Option<String>,
    /// Line number in source (1-indexed)
    pub line: u32,
}

impl StackFrame {
    pub fn new(function_name: impl Into<String>, line: u32) -> Self {
        Self {
            function_name: function_name.into(),
            file_name: None,
            line,
        }
    }

    pub fn with_file(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.file_name {
            Some(ref file) => write!(f, "    at {} ({}:{})", self.function_name, file, self.line),
            None => write!(f, "    at {} (<anonymous>:{})", self.function_name, self.line),
        }
    }
}

/// A JavaScript stack trace, innermost frame first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackTrace {
    pub frames: Vec<StackFrame>,
}

impl StackTrace {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            writeln!(f, "{}", frame)?;
        }
        Ok(())
    }
}

fn trailer(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!("\n{}", text.trim_end())
    }
}

/// Main error type for spreadcall
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Lexer error - invalid token or character
    #[error("SyntaxError: {message} at {location}{}", trailer(source_context))]
    LexerError {
        message: String,
        location: SourceLocation,
        source_context: String,
    },

    /// Parser error - invalid syntax
    #[error("SyntaxError: {message} at {location}{}", trailer(source_context))]
    ParseError {
        message: String,
        location: SourceLocation,
        source_context: String,
    },

    /// Runtime error - TypeError, ReferenceError, etc.
    #[error("{kind}: {message}{}", trailer(&stack_trace.to_string()))]
    RuntimeError {
        kind: ErrorKind,
        message: String,
        stack_trace: StackTrace,
    },

    /// `assertEq` mismatch. Fatal: there is no recovery path.
    #[error(
        "AssertionError: got {actual}, expected {expected}{}{}",
        message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default(),
        trailer(&stack_trace.to_string())
    )]
    AssertionError {
        actual: String,
        expected: String,
        message: Option<String>,
        stack_trace: StackTrace,
    },

    /// Invalid runtime or optimizer configuration
    #[error("ConfigError: {0}")]
    ConfigError(String),

    /// Internal engine error
    #[error("InternalError: {0}")]
    InternalError(String),

    /// IO error
    #[error("IOError: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

/// JavaScript error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum ErrorKind {
    /// TypeError - wrong type for operation
    TypeError,
    /// ReferenceError - undefined variable
    ReferenceError,
    /// RangeError - value out of range
    RangeError,
    /// SyntaxError - invalid syntax detected at runtime
    SyntaxError,
    /// InternalError - internal engine error
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TypeError => write!(f, "TypeError"),
            ErrorKind::ReferenceError => write!(f, "ReferenceError"),
            ErrorKind::RangeError => write!(f, "RangeError"),
            ErrorKind::SyntaxError => write!(f, "SyntaxError"),
            ErrorKind::InternalError => write!(f, "InternalError"),
        }
    }
}

impl Error {
    /// Create a new lexer error
    pub fn lexer_error(message: impl Into<String>, location: SourceLocation) -> Self {
        Error::LexerError {
            message: message.into(),
            location,
            source_context: String::new(),
        }
    }

    /// Create a new parse error
    pub fn parse_error(message: impl Into<String>, location: SourceLocation) -> Self {
        Error::ParseError {
            message: message.into(),
            location,
            source_context: String::new(),
        }
    }

    /// Add source context to an existing syntax error
    pub fn with_source_context(self, source: &str) -> Self {
        match self {
            Error::LexerError {
                message, location, ..
            } => Error::LexerError {
                message,
                source_context: format_error_context(source, &location),
                location,
            },
            Error::ParseError {
                message, location, ..
            } => Error::ParseError {
                message,
                source_context: format_error_context(source, &location),
                location,
            },
            other => other,
        }
    }

    /// Create a TypeError
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::runtime(ErrorKind::TypeError, message)
    }

    /// Create a ReferenceError
    pub fn reference_error(message: impl Into<String>) -> Self {
        Error::runtime(ErrorKind::ReferenceError, message)
    }

    /// Create a RangeError
    pub fn range_error(message: impl Into<String>) -> Self {
        Error::runtime(ErrorKind::RangeError, message)
    }

    /// Create a SyntaxError raised while compiling
    pub fn syntax_error(message: impl Into<String>) -> Self {
        Error::runtime(ErrorKind::SyntaxError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::InternalError(message.into())
    }

    fn runtime(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error::RuntimeError {
            kind,
            message: message.into(),
            stack_trace: StackTrace::new(),
        }
    }

    /// Create an assertion failure from display forms of both operands
    pub fn assertion_failed(
        actual: impl Into<String>,
        expected: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        Error::AssertionError {
            actual: actual.into(),
            expected: expected.into(),
            message,
            stack_trace: StackTrace::new(),
        }
    }

    /// Attach a stack trace unless one is already present
    pub fn with_stack_trace(self, trace: StackTrace) -> Self {
        match self {
            Error::RuntimeError {
                kind,
                message,
                stack_trace,
            } if stack_trace.is_empty() => Error::RuntimeError {
                kind,
                message,
                stack_trace: trace,
            },
            Error::AssertionError {
                actual,
                expected,
                message,
                stack_trace,
            } if stack_trace.is_empty() => Error::AssertionError {
                actual,
                expected,
                message,
                stack_trace: trace,
            },
            other => other,
        }
    }

    /// Runtime error kind, if this is a script-level runtime error
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::RuntimeError { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_assertion_failure(&self) -> bool {
        matches!(self, Error::AssertionError { .. })
    }
}

/// Result type alias for spreadcall
pub type Result<T> = std::result::Result<T, Error>;

/// Standardized error message templates
pub mod messages {
    pub const NOT_A_FUNCTION: &str = "is not a function";
    pub const NOT_ITERABLE: &str = "is not iterable";
    pub const IS_NOT_DEFINED: &str = "is not defined";
    pub const MAXIMUM_CALL_STACK: &str = "Maximum call stack size exceeded";
    pub const ITERATOR_RESULT_NOT_OBJECT: &str = "iterator result is not an object";
    pub const ITERATOR_NOT_OBJECT: &str = "Result of the Symbol.iterator method is not an object";
    pub const INVALID_ARRAY_LENGTH: &str = "Invalid array length";

    /// Format a "X is not a function" error message
    pub fn not_a_function(name: &str) -> String {
        format!("{} {}", name, NOT_A_FUNCTION)
    }

    /// Format a "X is not iterable" error message
    pub fn not_iterable(name: &str) -> String {
        format!("{} {}", name, NOT_ITERABLE)
    }

    /// Format a "X is not defined" error message
    pub fn not_defined(name: &str) -> String {
        format!("{} {}", name, IS_NOT_DEFINED)
    }

    /// Format a "Cannot read property 'X' of Y" error message
    pub fn cannot_read_property(prop: &str, of: &str) -> String {
        format!("Cannot read property '{}' of {}", prop, of)
    }

    /// Format a "Cannot set property 'X' of Y" error message
    pub fn cannot_set_property(prop: &str, of: &str) -> String {
        format!("Cannot set property '{}' of {}", prop, of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_context_points_at_column() {
        let source = "var a = 1;\nvar b = ;\nvar c = 3;";
        let loc = SourceLocation {
            line: 2,
            column: 9,
            offset: 19,
        };
        let context = format_error_context(source, &loc);
        assert!(context.contains("  2 | var b = ;"));
        assert!(context.contains("        ^"));
        assert!(context.contains("  1 | var a = 1;"));
        assert!(context.contains("  3 | var c = 3;"));
    }

    #[test]
    fn test_assertion_display() {
        let err = Error::assertion_failed("7", "3", None);
        assert_eq!(err.to_string(), "AssertionError: got 7, expected 3");

        let err = Error::assertion_failed("7", "3", Some("iteration 12".into()));
        assert_eq!(err.to_string(), "AssertionError: got 7, expected 3: iteration 12");
        assert!(err.is_assertion_failure());
    }

    #[test]
    fn test_stack_trace_attached_once() {
        let mut first = StackTrace::new();
        first.push(StackFrame::new("inner", 3));
        let mut second = StackTrace::new();
        second.push(StackFrame::new("outer", 9));

        let err = Error::type_error("x is not a function")
            .with_stack_trace(first)
            .with_stack_trace(second);
        let text = err.to_string();
        assert!(text.starts_with("TypeError: x is not a function"));
        assert!(text.contains("at inner (<anonymous>:3)"));
        assert!(!text.contains("outer"));
        assert_eq!(err.kind(), Some(ErrorKind::TypeError));
    }
}
