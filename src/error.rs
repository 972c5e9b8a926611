//! Error types for audiobook-provisioner
//!
//! This module provides the error taxonomy for the library:
//! - Domain-specific error types (Install, Script, Download)
//! - Severity mapping so every failure lands in the error log exactly once
//! - Context information (path, name, operand) carried on each variant

use crate::types::Severity;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for audiobook-provisioner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for audiobook-provisioner
///
/// Filesystem and network failures are converted into one of these variants at the
/// lowest level that still knows the failing path or name, then turned into a
/// [`LogEntry`](crate::types::LogEntry) by the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "volumes")
        key: Option<String>,
    },

    /// Install-related error
    #[error("{0}")]
    Install(#[from] InstallError),

    /// Script parsing or execution error
    #[error("{0}")]
    Script(#[from] ScriptError),

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip archive could not be read
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Mailbox access or report delivery failed
    #[error("mail error: {0}")]
    Mail(String),

    /// Book or candidate not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation not supported (transport not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors raised while placing a candidate into a library volume
#[derive(Debug, Error)]
pub enum InstallError {
    /// The destination directory already exists; installs never overwrite
    #[error("destination already exists: {}", path.display())]
    DestinationExists {
        /// The destination that was already present
        path: PathBuf,
    },

    /// The candidate's name is already used by a book in the library
    #[error("a book named \"{name}\" is already installed")]
    NameCollision {
        /// The colliding library directory name
        name: String,
    },

    /// No configured volume is present, writable and above the free-space floor
    #[error("all library filesystems are full or unavailable")]
    FilesystemsFull,

    /// A rename or copy into place failed
    #[error("failed to move {} to {}: {reason}", source_path.display(), dest_path.display())]
    MoveFailed {
        /// The source path being moved
        source_path: PathBuf,
        /// The destination path
        dest_path: PathBuf,
        /// Why the move failed
        reason: String,
    },

    /// Archive extraction failed
    #[error("extraction failed for {}: {reason}", archive.display())]
    ExtractionFailed {
        /// The archive that failed to extract
        archive: PathBuf,
        /// Why extraction failed
        reason: String,
    },

    /// A directory could not be created
    #[error("failed to create directory {}: {reason}", path.display())]
    CreateDirFailed {
        /// Directory that could not be created
        path: PathBuf,
        /// Why creation failed
        reason: String,
    },

    /// Source removal after a successful install failed
    #[error("failed to delete {}: {reason}", path.display())]
    DeleteFailed {
        /// Path that could not be deleted
        path: PathBuf,
        /// Why deletion failed
        reason: String,
    },
}

/// Errors raised while parsing or dispatching a script line
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The dispatch keyword is not known
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// An operand was left unconsumed by its handler
    #[error("unrecognized operand: {0}")]
    UnrecognizedOperand(String),

    /// A required operand is missing
    #[error("{command} requires {expected}")]
    MissingOperand {
        /// The command that was missing an operand
        command: String,
        /// Description of the missing operand
        expected: String,
    },

    /// An operand was present but malformed
    #[error("invalid {what}: {value}")]
    InvalidOperand {
        /// What kind of value was expected
        what: String,
        /// The offending text
        value: String,
    },

    /// A partial title matched zero or several books
    #[error("no unique match for \"{pattern}\" ({matches} matches)")]
    NoUniqueMatch {
        /// The partial title operand
        pattern: String,
        /// How many entries matched
        matches: usize,
    },

    /// A quoted string was never closed
    #[error("unterminated quoted string")]
    UnterminatedQuote,
}

/// Download-related errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The download manager reported a terminal failure
    #[error("download of {uri} failed (reason {reason})")]
    Failed {
        /// Requested URI
        uri: String,
        /// Reason code reported by the manager
        reason: i32,
    },

    /// The request stalled with progress more often than the retry budget allows
    #[error("download of {uri} stalled after {retries} retries")]
    RetriesExhausted {
        /// Requested URI
        uri: String,
        /// Retries that were performed
        retries: u32,
    },

    /// The request never started within the cancel budget
    #[error("download of {uri} never started after {polls} polls")]
    NeverStarted {
        /// Requested URI
        uri: String,
        /// Polls spent pending
        polls: u32,
    },

    /// The server answered with a non-success HTTP status
    #[error("server returned HTTP {status} for {uri}")]
    HttpStatus {
        /// Requested URI
        uri: String,
        /// HTTP status code
        status: u16,
    },

    /// The transfer was cancelled by the user
    #[error("download of {uri} was cancelled")]
    Cancelled {
        /// Requested URI
        uri: String,
    },
}

impl Error {
    /// Severity this error is reported with in the error log
    ///
    /// Everything is SEVERE except the conditions that leave the batch able to
    /// continue with a different resource.
    pub fn severity(&self) -> Severity {
        match self {
            Error::Script(ScriptError::NoUniqueMatch { .. }) => Severity::Mild,
            _ => Severity::Severe,
        }
    }

    /// Create a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_operand_message_names_the_operand() {
        let err = Error::from(ScriptError::UnrecognizedOperand("extra".to_string()));
        assert_eq!(err.to_string(), "unrecognized operand: extra");
    }

    #[test]
    fn no_unique_match_is_mild() {
        let err = Error::from(ScriptError::NoUniqueMatch {
            pattern: "Bear".to_string(),
            matches: 2,
        });
        assert_eq!(err.severity(), Severity::Mild);
        assert!(err.to_string().starts_with("no unique match"));
    }

    #[test]
    fn destination_exists_is_severe_and_names_path() {
        let err = Error::from(InstallError::DestinationExists {
            path: PathBuf::from("/books/Alpha"),
        });
        assert_eq!(err.severity(), Severity::Severe);
        assert!(err.to_string().contains("/books/Alpha"));
    }

    #[test]
    fn config_helper_sets_key() {
        match Error::config("volumes", "at least one volume is required") {
            Error::Config { key, message } => {
                assert_eq!(key.as_deref(), Some("volumes"));
                assert!(message.contains("volume"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
