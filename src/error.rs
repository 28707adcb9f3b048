//! Error types for mailwatch.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid mailbox URI: {0}")]
    InvalidUri(String),

    #[error("Unsupported mailbox scheme: {0} (expected imap, imap+ssl or imap+tls)")]
    UnsupportedScheme(String),
}

/// Database-related errors. Persistence failures skip the affected
/// message only; the cycle continues.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

/// Session-level errors. Any of these aborts the mailbox's cycle; the
/// next scheduled tick is the retry mechanism.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Connection to {host}:{port} failed: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with {host} failed: {reason}")]
    Tls { host: String, reason: String },

    #[error("Authentication rejected for {username}@{host}")]
    AuthRejected { host: String, username: String },

    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session already closed")]
    Closed,
}

/// Errors raised by session operations after a folder is selected.
///
/// `Selection` aborts the mailbox's cycle. `Fetch` skips the affected
/// candidate. `Mutation` and `Archive` are logged; the recorded message
/// is never rolled back.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Candidate listing rejected: {0}")]
    Selection(String),

    #[error("Fetch of message {uid} failed: {reason}")]
    Fetch { uid: u32, reason: String },

    #[error("Flag mutation on message {uid} failed: {reason}")]
    Mutation { uid: u32, reason: String },

    #[error("Archive operation on folder {folder} failed: {reason}")]
    Archive { folder: String, reason: String },
}

/// Result type alias for mailwatch.
pub type Result<T> = std::result::Result<T, Error>;
