use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A fan-out found no registered device for the user. Every client
    /// registers before submitting, so this means a corrupt or unknown user.
    #[error("found no devices associated with user_id={user_id}")]
    NoDevices { user_id: String },

    /// A dump batch contained an entry owned by another user.
    #[error("batch contains an entry with user_id={found}, when the request is for user_id={expected}")]
    UserMismatch { expected: String, found: String },

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Failed to encode or decode a JSON column.
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
