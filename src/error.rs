//! Error types for ontology-pull
//!
//! This module provides the crate-wide [`Error`] enum plus the domain-specific
//! sub-errors for the database, remote fetching, parsing and processing stages.
//! Field-level validation failures from the metadata store are carried as
//! [`FieldError`] lists so callers can report exactly what was rejected.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for ontology-pull operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ontology-pull
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "repository_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote fetch failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Parsing oracle rejected a file
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Record failed store-level validation
    #[error("validation failed: {}", format_field_errors(.0))]
    Validation(Vec<FieldError>),

    /// Processing stage failed
    #[error("stage error: {0}")]
    Stage(#[from] StageError),

    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation exceeded its time budget
    #[error("timed out after {seconds}s: {operation}")]
    Timeout {
        /// What was being waited on
        operation: String,
        /// Budget in seconds
        seconds: u64,
    },

    /// External tool execution failed (parser, annotator)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, no-op collaborator)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A per-item task panicked and was contained
    #[error("task panicked: {0}")]
    Panicked(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Stored row could not be decoded into a domain type
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Remote fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// Nothing exists at the pull location
    #[error("no file at pull location {url}")]
    RemoteMissing {
        /// The pull location that was checked
        url: String,
    },

    /// Server answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    Status {
        /// The requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// The URL could not be parsed
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Parser message
        reason: String,
    },
}

/// Parsing oracle errors
#[derive(Debug, Error)]
pub enum ParseError {
    /// The oracle refused the file
    #[error("{file} was rejected: {cause}")]
    Rejected {
        /// The file that was parsed
        file: String,
        /// Descriptive cause reported by the oracle
        cause: String,
    },
}

/// Processing stage errors
#[derive(Debug, Error)]
pub enum StageError {
    /// A stage's prerequisite status was not reached
    #[error("{stage} cannot run on {submission}: {reason}")]
    PreconditionFailed {
        /// Stage name
        stage: &'static str,
        /// Submission identifier
        submission: String,
        /// Why the stage could not run
        reason: String,
    },

    /// The submission has no local file and no pull location to recover it from
    #[error("submission {submission} has no local file to process")]
    MissingFile {
        /// Submission identifier
        submission: String,
    },
}

/// A single field-level validation failure
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the offending field
    pub field: String,
    /// Why the value is invalid
    pub message: String,
}

impl FieldError {
    /// Create a new field error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
