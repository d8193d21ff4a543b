// Oryx Error Handling Module
// Error kinds raised by dispatch, directory and stem operations, with a message-send trace

use colored::*;
use std::fmt;
use thiserror::Error;

/// Types of errors in Oryx
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No method (and no UNKNOWN) for a message
    NoMethod,
    /// Private method called from outside its scope
    PrivateMethod,
    /// Package-scope method called from another package
    PackageMethod,
    /// Scope override that is not one of the receiver's scopes
    InvalidScope,
    InvalidArgument,
    /// A stem was offered as the default value of a stem
    InvalidStemValue,
    SortMissingSize,
    SortNonNumericSize,
    SortBounds,
    SortSparse,
    NoValue,
    /// A stale object, method or class id
    DeadObject,
    Activity,
    Config,
    RuntimeError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NoMethod => write!(f, "NoMethod"),
            ErrorKind::PrivateMethod => write!(f, "PrivateMethod"),
            ErrorKind::PackageMethod => write!(f, "PackageMethod"),
            ErrorKind::InvalidScope => write!(f, "InvalidScope"),
            ErrorKind::InvalidArgument => write!(f, "InvalidArgument"),
            ErrorKind::InvalidStemValue => write!(f, "InvalidStemValue"),
            ErrorKind::SortMissingSize => write!(f, "SortMissingSize"),
            ErrorKind::SortNonNumericSize => write!(f, "SortNonNumericSize"),
            ErrorKind::SortBounds => write!(f, "SortBounds"),
            ErrorKind::SortSparse => write!(f, "SortSparse"),
            ErrorKind::NoValue => write!(f, "NoValue"),
            ErrorKind::DeadObject => write!(f, "DeadObject"),
            ErrorKind::Activity => write!(f, "Activity"),
            ErrorKind::Config => write!(f, "Config"),
            ErrorKind::RuntimeError => write!(f, "RuntimeError"),
        }
    }
}

/// A method invocation recorded while an error propagated out of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub method: String,
    pub scope: String,
}

impl StackFrame {
    pub fn new(method: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            scope: scope.into(),
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  at {} (scope {})", self.method, self.scope)
    }
}

/// Main error type for Oryx
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct OryxError {
    pub kind: ErrorKind,
    pub message: String,
    pub help: Option<String>,
    pub stack_trace: Vec<StackFrame>,
}

impl OryxError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            help: None,
            stack_trace: Vec::new(),
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn push_frame(&mut self, frame: StackFrame) {
        self.stack_trace.push(frame);
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Format the error for display (with colors)
    pub fn format(&self) -> String {
        let mut output = format!("{}: {}\n", self.kind.to_string().red().bold(), self.message.white().bold());

        if let Some(ref help) = self.help {
            output.push_str(&format!("\n      {}: {}\n", "Help".cyan().bold(), help));
        }

        if !self.stack_trace.is_empty() {
            output.push_str(&format!("\n{}:\n", "Send trace".yellow().bold()));
            for frame in &self.stack_trace {
                output.push_str(&format!("{}\n", frame));
            }
        }

        output
    }
}

/// Result type for Oryx operations
pub type OryxResult<T> = Result<T, OryxError>;

// Convenience constructors for common errors
impl OryxError {
    pub fn no_method(receiver: &str, message: &str) -> Self {
        Self::new(
            ErrorKind::NoMethod,
            format!("Object \"{}\" does not understand message \"{}\"", receiver, message),
        )
    }

    pub fn private_method(receiver: &str, message: &str) -> Self {
        Self::new(
            ErrorKind::PrivateMethod,
            format!("Private method \"{}\" of object \"{}\" is not accessible from this context", message, receiver),
        )
    }

    pub fn package_method(receiver: &str, message: &str) -> Self {
        Self::new(
            ErrorKind::PackageMethod,
            format!("Package method \"{}\" of object \"{}\" is not accessible from this package", message, receiver),
        )
    }

    pub fn invalid_scope(receiver: &str, scope: &str) -> Self {
        Self::new(
            ErrorKind::InvalidScope,
            format!("Class \"{}\" is not a valid class for object \"{}\"", scope, receiver),
        )
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn no_value(name: &str) -> Self {
        Self::new(ErrorKind::NoValue, format!("Variable \"{}\" has no value", name))
    }

    pub fn dead_object(what: &str) -> Self {
        Self::new(ErrorKind::DeadObject, format!("Reference to a collected {}", what))
    }

    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeError, message)
    }
}

/// Check argument count of a native method
pub fn check_arity(expected: usize, got: usize) -> OryxResult<()> {
    if expected != got {
        return Err(OryxError::invalid_argument(format!(
            "Expected {} arguments but got {}",
            expected, got
        )));
    }
    Ok(())
}

/// Check argument count against an inclusive range
pub fn check_arity_range(min: usize, max: usize, got: usize) -> OryxResult<()> {
    if got < min || got > max {
        return Err(OryxError::invalid_argument(format!(
            "Expected {} to {} arguments but got {}",
            min, max, got
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_kind_and_message() {
        let err = OryxError::no_method("a FOO", "BAR");
        assert_eq!(
            err.to_string(),
            "NoMethod: Object \"a FOO\" does not understand message \"BAR\""
        );
    }

    #[test]
    fn test_format_includes_trace() {
        let mut err = OryxError::private_method("a FOO", "SECRET").with_help("call it from FOO");
        err.push_frame(StackFrame::new("SECRET", "FOO"));
        let text = err.format();
        assert!(text.contains("SECRET"));
        assert!(text.contains("call it from FOO"));
        assert!(text.contains("scope FOO"));
    }

    #[test]
    fn test_check_arity() {
        assert!(check_arity(1, 1).is_ok());
        assert!(check_arity(1, 2).unwrap_err().is(ErrorKind::InvalidArgument));
        assert!(check_arity_range(0, 2, 3).is_err());
    }
}
