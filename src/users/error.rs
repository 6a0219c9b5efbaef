//! Error types for the user system
//!
//! Domain errors use thiserror. Absent lookups are `Option::None`, never errors,
//! and predicates evaluated without a bound user return `false`.

use thiserror::Error;

use super::record::UserId;

/// Top-level user system error
#[derive(Debug, Error)]
pub enum UserSystemError {
    /// Username already taken
    #[error("Username '{0}' is already taken")]
    DuplicateUsername(String),

    /// Stored value is not a valid encoding
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Value could not be encoded
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Condition lookup or argument errors
    #[error("Condition error: {0}")]
    Condition(#[from] ConditionError),

    /// Referenced user row does not exist
    #[error("User {0} not found")]
    UserNotFound(UserId),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A stored `raw_value` that is not valid canonical text
#[derive(Debug, Error)]
#[error("malformed value {raw:?}: {source}")]
pub struct DecodeError {
    /// The offending stored text
    pub raw: String,
    /// Parser failure
    #[source]
    pub source: serde_json::Error,
}

/// Canonical serialization failure
#[derive(Debug, Error)]
#[error("canonical serialization failed: {0}")]
pub struct EncodeError(#[from] pub serde_json::Error);

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("Unique constraint violated on {table}: {detail}")]
    UniqueViolation {
        /// Table whose index rejected the row
        table: &'static str,
        /// Backend-specific detail
        detail: String,
    },

    /// Foreign key target is missing
    #[error("User {0} not found")]
    UserNotFound(UserId),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// True when the error is a uniqueness rejection on `table`
    pub fn is_unique_violation_on(&self, expected: &str) -> bool {
        matches!(self, StoreError::UniqueViolation { table, .. } if *table == expected)
    }
}

/// Convenience result alias for storage operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Condition registry errors
#[derive(Debug, Error)]
pub enum ConditionError {
    /// No pack registered under this name
    #[error("Condition pack '{0}' is not registered")]
    UnknownPack(String),

    /// Pack exists but has no such condition
    #[error("Condition '{pack}.{condition}' is not registered")]
    UnknownCondition {
        /// Pack name
        pack: String,
        /// Condition name
        condition: String,
    },

    /// Pack registered twice
    #[error("Condition pack '{0}' is already registered")]
    DuplicatePack(String),

    /// Condition registered twice within a pack
    #[error("Condition '{pack}.{condition}' is already registered")]
    DuplicateCondition {
        /// Pack name
        pack: String,
        /// Condition name
        condition: String,
    },

    /// Condition requires an argument but none was given
    #[error("Condition '{pack}.{condition}' requires an argument")]
    MissingArgument {
        /// Pack name
        pack: String,
        /// Condition name
        condition: String,
    },

    /// Argument has the wrong shape
    #[error("Invalid argument for '{pack}.{condition}': {detail}")]
    InvalidArgument {
        /// Pack name
        pack: String,
        /// Condition name
        condition: String,
        /// What was wrong
        detail: String,
    },
}

/// Convenience result alias for condition operations
pub type ConditionResult<T> = std::result::Result<T, ConditionError>;

/// Result type using UserSystemError
pub type Result<T> = std::result::Result<T, UserSystemError>;
