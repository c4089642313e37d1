// ============================================================================
// transq-core/src/error.rs
// ============================================================================
//
// ERROR HANDLING: Custom Error Types for transq-core
//
// This module defines the error type used throughout the library. Per-job
// failures are never fatal for the scheduler; they are surfaced as
// `CoreError` values only at construction time and otherwise reported through
// job completion notifications.
//
// KEY COMPONENTS:
// - CoreError: Main error enum with variants for each error category
// - CoreResult: Type alias for Result<T, CoreError>
// - Helper functions for building command errors

use std::io;
use std::process::ExitStatus;
use thiserror::Error;

use crate::engine::ElementRole;

/// Custom error type for transq-core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    // ---- I/O and File System Errors ----
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Path error: {0}")]
    PathError(String),

    // ---- Request Validation ----
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Invalid caps '{0}': missing media type")]
    InvalidCaps(String),

    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    // ---- Pipeline Construction ----
    /// No registered element offers the requested role for the mimetype.
    #[error("No {role} found for {mime_type}")]
    NoSuitableElement { role: ElementRole, mime_type: String },

    /// A registered element could not be instantiated.
    #[error("Could not create element '{name}' from factory '{factory}': {reason}")]
    ElementCreation {
        factory: String,
        name: String,
        reason: String,
    },

    #[error("Pipeline graph error: {0}")]
    Graph(String),

    // ---- External Process Errors ----
    #[error("Failed to start command '{0}': {1}")]
    CommandStart(String, #[source] io::Error),

    #[error("Failed to wait for command '{0}': {1}")]
    CommandWait(String, #[source] io::Error),

    #[error("Command '{cmd}' failed with status {status}. Stderr: {stderr}")]
    CommandFailed {
        cmd: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Required dependency '{0}' not found")]
    DependencyNotFound(String),

    #[error("ffprobe failed: {0}")]
    Probe(String),

    // ---- Configuration ----
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl CoreError {
    /// Whether this error happened while assembling a pipeline, before any
    /// processing began.
    pub fn is_construction_failure(&self) -> bool {
        matches!(
            self,
            CoreError::NoSuitableElement { .. }
                | CoreError::InvalidCaps(_)
                | CoreError::ElementCreation { .. }
                | CoreError::Graph(_)
        )
    }
}

/// Result type alias for transq-core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Creates a `CoreError::CommandStart` error.
pub fn command_start_error(cmd: impl Into<String>, err: io::Error) -> CoreError {
    CoreError::CommandStart(cmd.into(), err)
}

/// Creates a `CoreError::CommandWait` error.
pub fn command_wait_error(cmd: impl Into<String>, err: io::Error) -> CoreError {
    CoreError::CommandWait(cmd.into(), err)
}

/// Creates a `CoreError::CommandFailed` error.
pub fn command_failed_error(
    cmd: impl Into<String>,
    status: ExitStatus,
    stderr: impl Into<String>,
) -> CoreError {
    CoreError::CommandFailed {
        cmd: cmd.into(),
        status,
        stderr: stderr.into(),
    }
}
