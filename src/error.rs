//! Unified error handling for forktree
//!
//! Every error in the coordination core is fatal: nothing here is retried
//! and no partial tree is ever rendered. Each variant carries the operation
//! that failed and the platform diagnostic so the process that hits it can
//! report both before it terminates.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum ForkTreeError {
    /// The shared segment could not be created or mapped
    #[error("Allocation error ({operation}): {message}")]
    Allocation {
        operation: &'static str,
        message: String,
        source: Option<BoxedSource>,
    },

    /// Release of the shared segment was attempted on an invalid handle
    #[error("Detach error ({operation}): {message}")]
    Detach {
        operation: &'static str,
        message: String,
    },

    /// The process-shared mutex failed at the platform level
    #[error("Sync primitive error ({operation}): {message}")]
    SyncPrimitive {
        operation: &'static str,
        message: String,
    },

    /// The process-creation primitive (or reaping a child) failed
    #[error("Process creation error ({operation}): {message}")]
    ProcessCreation {
        operation: &'static str,
        message: String,
        source: Option<BoxedSource>,
    },

    /// A spawn log line could not be parsed into a record
    #[error("Malformed spawn record at line {line_number}: {line:?} ({reason})")]
    MalformedRecord {
        line_number: usize,
        line: String,
        reason: String,
    },

    /// A descendant terminated abnormally, so the subtree is incomplete
    #[error("Descendant {pid} failed: {status}")]
    DescendantFailed { pid: u32, status: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        field: Option<String>,
    },

    /// Spawn log I/O errors
    #[error("I/O error ({operation}) on {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        source: io::Error,
    },
}

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Allocation,
    Detach,
    Sync,
    Process,
    Integrity,
    Config,
    Filesystem,
}

impl ErrorCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            ErrorCategory::Allocation => "Allocation",
            ErrorCategory::Detach => "Detach",
            ErrorCategory::Sync => "Synchronization",
            ErrorCategory::Process => "Process",
            ErrorCategory::Integrity => "Integrity",
            ErrorCategory::Config => "Configuration",
            ErrorCategory::Filesystem => "Filesystem",
        }
    }
}

impl ForkTreeError {
    pub fn allocation(
        operation: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ForkTreeError::Allocation {
            operation,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn sync(operation: &'static str, message: impl Into<String>) -> Self {
        ForkTreeError::SyncPrimitive {
            operation,
            message: message.into(),
        }
    }

    pub fn process(operation: &'static str, source: nix::Error) -> Self {
        ForkTreeError::ProcessCreation {
            operation,
            message: source.desc().to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        ForkTreeError::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        ForkTreeError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            ForkTreeError::Allocation { .. } => ErrorCategory::Allocation,
            ForkTreeError::Detach { .. } => ErrorCategory::Detach,
            ForkTreeError::SyncPrimitive { .. } => ErrorCategory::Sync,
            ForkTreeError::ProcessCreation { .. } | ForkTreeError::DescendantFailed { .. } => {
                ErrorCategory::Process
            }
            ForkTreeError::MalformedRecord { .. } => ErrorCategory::Integrity,
            ForkTreeError::Config { .. } => ErrorCategory::Config,
            ForkTreeError::Io { .. } => ErrorCategory::Filesystem,
        }
    }

    /// Nothing in this crate is recoverable; the caller terminates.
    pub fn is_fatal(&self) -> bool {
        true
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            ForkTreeError::Allocation { message, .. } => {
                format!("Could not set up the shared counter segment: {}", message)
            }
            ForkTreeError::Detach { message, .. } => {
                format!("Could not release the shared counter segment: {}", message)
            }
            ForkTreeError::SyncPrimitive { message, .. } => {
                format!("Shared lock failure: {}", message)
            }
            ForkTreeError::ProcessCreation { message, .. } => {
                format!("Could not create a process: {}", message)
            }
            ForkTreeError::MalformedRecord {
                line_number, line, ..
            } => {
                format!("Spawn log line {} is not a valid record: {:?}", line_number, line)
            }
            ForkTreeError::DescendantFailed { pid, status } => {
                format!("Process {} terminated abnormally ({}); no tree shown", pid, status)
            }
            ForkTreeError::Config { message, field } => match field {
                Some(field) => format!("Configuration problem in '{}': {}", field, message),
                None => format!("Configuration problem: {}", message),
            },
            ForkTreeError::Io { path, source, .. } => {
                format!("File system problem with {}: {}", path.display(), source)
            }
        }
    }
}

/// Result type alias for convenience
pub type ForkTreeResult<T> = Result<T, ForkTreeError>;
