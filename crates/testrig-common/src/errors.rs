//! Error types for the testrig engine.
//!
//! # Rust Learning Note
//!
//! Operational failures that are *expected* (a probe that gets connection
//! refused, a benchmark line that does not parse) are modelled as plain
//! values elsewhere. The enums in this module are reserved for conditions
//! that stop an operation: a missing tool, a process that cannot be spawned,
//! an artifact that cannot be written.
//!
//! ```rust
//! use testrig_common::{Error, Result, ResultExt};
//!
//! fn find_tool() -> Result<()> {
//!     Err(Error::environment("go", "not found on PATH"))
//! }
//!
//! fn setup() -> Result<()> {
//!     find_tool().context("Environment validation failed")
//! }
//!
//! assert!(setup().unwrap_err().to_string().contains("not found on PATH"));
//! ```

use thiserror::Error;

/// Result type alias for testrig operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for orchestration operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A required external tool is missing or unusable.
    #[error("Environment error: {tool} - {reason}")]
    Environment { tool: String, reason: String },

    /// A setup stage (dependent service, build, service under test) failed.
    #[error("Setup failed at {stage}: {reason}")]
    Setup { stage: String, reason: String },

    /// Invalid input or configuration.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// An external tool could not be invoked.
    #[error("Tool invocation failed: {tool} - {reason}")]
    Tool { tool: String, reason: String },

    /// Report or configuration (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (shouldn't happen in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error with added context.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        source: Box<Error>,
    },
}

impl Error {
    /// Creates an Environment error.
    pub fn environment(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Environment {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Creates a Setup error.
    pub fn setup(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Setup {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Creates a Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a Tool error.
    pub fn tool(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    /// Adds context to an error.
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::WithContext {
            message: message.into(),
            source: Box::new(self),
        }
    }
}

// Convenience methods for Result types
pub trait ResultExt<T> {
    /// Adds context to an error result.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(message))
    }
}

// ==============================================================================
// Process Supervision Errors
// ==============================================================================

/// Errors raised by a process supervisor.
///
/// `name` is the supervisor's label (e.g. `dependent-service`).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SupervisorError {
    #[error("Supervisor '{name}' already owns a running process (PID {pid})")]
    AlreadyRunning { name: String, pid: u32 },

    #[error("Process spawn failed: {name} - {reason}")]
    SpawnFailed { name: String, reason: String },

    #[error("Process stop failed: {name} - {reason}")]
    StopFailed { name: String, reason: String },

    #[error("Signal delivery failed: {name} - {reason}")]
    SignalFailed { name: String, reason: String },

    #[error("Supervisor '{name}' has no running process")]
    NotRunning { name: String },
}

impl SupervisorError {
    pub fn spawn_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn stop_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StopFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn signal_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn not_running(name: impl Into<String>) -> Self {
        Self::NotRunning { name: name.into() }
    }
}

/// Result type for supervisor operations.
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

impl From<SupervisorError> for Error {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::SpawnFailed { name, reason } => Error::setup(name, reason),
            other => Error::Internal(other.to_string()),
        }
    }
}
