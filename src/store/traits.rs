//! `MailStore` trait, the async interface the sync core sees.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::MailboxConfig;
use crate::error::DatabaseError;

/// Result of a duplicate-guarded insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The message was new; holds the generated row id.
    Recorded(String),
    /// A message with this stable id already exists. A normal skip,
    /// not an error.
    AlreadyExists,
}

/// A message about to be recorded.
#[derive(Debug, Clone, Copy)]
pub struct NewMessageRecord<'a> {
    pub stable_id: &'a str,
    pub mailbox: &'a str,
    pub sender: &'a str,
    pub subject: Option<&'a str>,
    pub raw: &'a [u8],
    pub received_at: DateTime<Utc>,
}

/// A persisted message, as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub stable_id: String,
    pub mailbox: String,
    pub sender: String,
    pub subject: Option<String>,
    pub raw: Vec<u8>,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic store covering mailbox configs and message records.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Active mailbox configs only; inactive entries are never returned
    /// and therefore never scheduled.
    async fn list_active_mailboxes(&self) -> Result<Vec<MailboxConfig>, DatabaseError>;

    /// Insert the message unless its stable id is already present.
    ///
    /// Atomic with respect to concurrent callers: implemented as an
    /// insert-if-absent keyed on the stable id.
    async fn record_if_new(
        &self,
        record: &NewMessageRecord<'_>,
    ) -> Result<RecordOutcome, DatabaseError>;

    /// Read back one message by stable id.
    async fn get_message(&self, stable_id: &str) -> Result<Option<StoredMessage>, DatabaseError>;

    /// Register a mailbox. Fails on a duplicate name.
    async fn insert_mailbox(&self, config: &MailboxConfig) -> Result<(), DatabaseError>;

    /// Flip a mailbox's active flag.
    async fn set_mailbox_active(&self, name: &str, active: bool) -> Result<(), DatabaseError>;
}
