//! Persistence layer: mailbox configuration and the message archive.

pub mod libsql_backend;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{MailStore, NewMessageRecord, RecordOutcome, StoredMessage};
