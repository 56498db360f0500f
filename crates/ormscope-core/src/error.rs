//! Error types shared by every ormscope crate.
//!
//! Compilation errors (`Shape`, `Compile`, `Hook`, `Argument`) are produced before any
//! statement reaches a backend. `Execution` always carries the backend's own error.

use std::error::Error as StdError;
use std::fmt;

/// Result alias used throughout ormscope.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all ormscope operations.
#[derive(Debug)]
pub enum Error {
    /// A record shape cannot be mapped to a table.
    Shape(ShapeError),
    /// No dialect implementation exists for the requested name.
    UnsupportedDialect(String),
    /// Malformed caller input.
    Argument(String),
    /// A hook stage rejected the operation.
    Hook {
        /// Name of the stage that failed.
        stage: String,
        /// Underlying cause returned by the stage.
        source: Box<Error>,
    },
    /// A dialect could not render a fragment.
    Compile(String),
    /// The backend rejected or failed a statement.
    Execution(ExecutionError),
}

/// Why a record shape could not be mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeError {
    /// Name of the offending shape.
    pub shape: String,
    /// Human readable reason.
    pub message: String,
}

impl ShapeError {
    pub fn new(shape: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            shape: shape.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.shape, self.message)
    }
}

/// A failure reported by the execution sink.
#[derive(Debug)]
pub struct ExecutionError {
    /// The statement that failed, when known.
    pub sql: Option<String>,
    /// The backend's own error.
    pub source: Box<dyn StdError + Send + Sync>,
}

impl ExecutionError {
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            sql: None,
            source: source.into(),
        }
    }

    /// Attach the SQL text that was being executed.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql {
            Some(sql) => write!(f, "{} (while executing: {})", self.source, sql),
            None => write!(f, "{}", self.source),
        }
    }
}

impl Error {
    /// Build a shape error for the named shape.
    pub fn shape(shape: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Shape(ShapeError::new(shape, message))
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Error::Argument(message.into())
    }

    pub fn compile(message: impl Into<String>) -> Self {
        Error::Compile(message.into())
    }

    /// Wrap a backend error.
    pub fn execution(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Error::Execution(ExecutionError::new(source))
    }

    /// Wrap an error returned by a hook stage.
    pub fn hook(stage: impl Into<String>, source: Error) -> Self {
        Error::Hook {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error was raised before any I/O happened.
    pub const fn is_compile_time(&self) -> bool {
        !matches!(self, Error::Execution(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Shape(err) => write!(f, "shape error: {}", err),
            Error::UnsupportedDialect(name) => write!(f, "unsupported dialect: {}", name),
            Error::Argument(msg) => write!(f, "argument error: {}", msg),
            Error::Hook { stage, source } => write!(f, "hook {} failed: {}", stage, source),
            Error::Compile(msg) => write!(f, "compile error: {}", msg),
            Error::Execution(err) => write!(f, "execution error: {}", err),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Hook { source, .. } => Some(source.as_ref()),
            Error::Execution(err) => Some(err.source.as_ref()),
            _ => None,
        }
    }
}

impl From<ShapeError> for Error {
    fn from(err: ShapeError) -> Self {
        Error::Shape(err)
    }
}

impl From<ExecutionError> for Error {
    fn from(err: ExecutionError) -> Self {
        Error::Execution(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_error_keeps_stage_and_cause() {
        let err = Error::hook("timestamps", Error::argument("clock unavailable"));
        assert_eq!(
            err.to_string(),
            "hook timestamps failed: argument error: clock unavailable"
        );
        let source = err.source().expect("hook error has a source");
        assert_eq!(source.to_string(), "argument error: clock unavailable");
    }

    #[test]
    fn test_execution_error_wraps_backend_error() {
        let backend = std::io::Error::other("disk full");
        let err = Error::Execution(ExecutionError::new(backend).with_sql("INSERT INTO t VALUES (1)"));
        assert!(err.to_string().contains("disk full"));
        assert!(err.to_string().contains("INSERT INTO t"));
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("disk full"));
        assert!(!err.is_compile_time());
    }

    #[test]
    fn test_compile_time_classification() {
        assert!(Error::shape("User", "no fields").is_compile_time());
        assert!(Error::compile("no type").is_compile_time());
        assert!(Error::UnsupportedDialect("x".into()).is_compile_time());
    }
}
