//! libSQL backend: async `MailStore` implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is `Send + Sync` and
//! safe for concurrent async use, which is what makes `record_if_new`
//! safe under concurrent cycles.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::MailboxConfig;
use crate::error::DatabaseError;
use crate::store::traits::{MailStore, NewMessageRecord, RecordOutcome, StoredMessage};

const MESSAGE_COLUMNS: &str =
    "id, stable_id, mailbox, sender, subject, raw_content, received_at, created_at";

/// libSQL-backed store.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to create in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS mailboxes (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    uri TEXT NOT NULL,
                    folder TEXT NOT NULL DEFAULT 'INBOX',
                    archive_folder TEXT,
                    active INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS messages (
                    id TEXT PRIMARY KEY,
                    stable_id TEXT NOT NULL UNIQUE,
                    mailbox TEXT NOT NULL,
                    sender TEXT NOT NULL,
                    subject TEXT,
                    raw_content BLOB NOT NULL,
                    received_at TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_messages_mailbox ON messages(mailbox);",
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("init_schema: {e}")))?;
        Ok(())
    }
}

/// Parse an RFC 3339 datetime string written by this backend.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn opt_text(v: Option<&str>) -> libsql::Value {
    match v {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn row_to_message(row: &libsql::Row) -> Result<StoredMessage, libsql::Error> {
    let received: String = row.get(6)?;
    let created: String = row.get(7)?;
    Ok(StoredMessage {
        id: row.get(0)?,
        stable_id: row.get(1)?,
        mailbox: row.get(2)?,
        sender: row.get(3)?,
        subject: row.get(4)?,
        raw: row.get(5)?,
        received_at: parse_datetime(&received),
        created_at: parse_datetime(&created),
    })
}

fn row_to_mailbox(row: &libsql::Row) -> Result<MailboxConfig, libsql::Error> {
    let active: i64 = row.get(4)?;
    Ok(MailboxConfig {
        name: row.get(0)?,
        uri: row.get(1)?,
        folder: row.get(2)?,
        archive_folder: row.get(3)?,
        active: active != 0,
    })
}

#[async_trait]
impl MailStore for LibSqlStore {
    async fn list_active_mailboxes(&self) -> Result<Vec<MailboxConfig>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT name, uri, folder, archive_folder, active
                 FROM mailboxes WHERE active = 1 ORDER BY name",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_active_mailboxes: {e}")))?;

        let mut mailboxes = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_mailbox(&row) {
                Ok(m) => mailboxes.push(m),
                Err(e) => tracing::warn!("Skipping mailbox row: {e}"),
            }
        }
        Ok(mailboxes)
    }

    async fn record_if_new(
        &self,
        record: &NewMessageRecord<'_>,
    ) -> Result<RecordOutcome, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "INSERT INTO messages (id, stable_id, mailbox, sender, subject, raw_content,
                    received_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(stable_id) DO NOTHING",
                params![
                    id.clone(),
                    record.stable_id,
                    record.mailbox,
                    record.sender,
                    opt_text(record.subject),
                    record.raw.to_vec(),
                    record.received_at.to_rfc3339(),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_if_new: {e}")))?;

        if changed == 0 {
            Ok(RecordOutcome::AlreadyExists)
        } else {
            debug!(id = %id, stable_id = record.stable_id, "Message recorded");
            Ok(RecordOutcome::Recorded(id))
        }
    }

    async fn get_message(&self, stable_id: &str) -> Result<Option<StoredMessage>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE stable_id = ?1"),
                params![stable_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_message: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let msg = row_to_message(&row)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                Ok(Some(msg))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_message: {e}"))),
        }
    }

    async fn insert_mailbox(&self, config: &MailboxConfig) -> Result<(), DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO mailboxes (id, name, uri, folder, archive_folder, active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    config.name.clone(),
                    config.uri.clone(),
                    config.folder.clone(),
                    opt_text(config.archive_folder.as_deref()),
                    config.active as i64,
                    now,
                ],
            )
            .await
            .map_err(|e| {
                let text = e.to_string();
                if text.contains("UNIQUE") {
                    DatabaseError::Constraint(format!("mailbox name taken: {}", config.name))
                } else {
                    DatabaseError::Query(format!("insert_mailbox: {text}"))
                }
            })?;
        info!(name = %config.name, "Mailbox registered");
        Ok(())
    }

    async fn set_mailbox_active(&self, name: &str, active: bool) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "UPDATE mailboxes SET active = ?1 WHERE name = ?2",
                params![active as i64, name],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_mailbox_active: {e}")))?;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record<'a>(stable_id: &'a str, raw: &'a [u8]) -> NewMessageRecord<'a> {
        NewMessageRecord {
            stable_id,
            mailbox: "work",
            sender: "alice@example.com",
            subject: Some("hello"),
            raw,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn record_if_new_then_duplicate() {
        let store = LibSqlStore::new_memory().await.unwrap();

        let first = store.record_if_new(&record("m1", b"raw one")).await.unwrap();
        assert!(matches!(first, RecordOutcome::Recorded(_)));

        let second = store.record_if_new(&record("m1", b"raw one")).await.unwrap();
        assert_eq!(second, RecordOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn get_message_roundtrip() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store.record_if_new(&record("m2", b"\x00binary\xffbody")).await.unwrap();

        let loaded = store.get_message("m2").await.unwrap().unwrap();
        assert_eq!(loaded.stable_id, "m2");
        assert_eq!(loaded.mailbox, "work");
        assert_eq!(loaded.sender, "alice@example.com");
        assert_eq!(loaded.subject.as_deref(), Some("hello"));
        assert_eq!(loaded.raw, b"\x00binary\xffbody");

        assert!(store.get_message("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inactive_mailboxes_are_not_listed() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store
            .insert_mailbox(&MailboxConfig::new("work", "imap+ssl://a:b@host"))
            .await
            .unwrap();
        store
            .insert_mailbox(&MailboxConfig::new("personal", "imap+ssl://c:d@host"))
            .await
            .unwrap();
        store.set_mailbox_active("personal", false).await.unwrap();

        let active = store.list_active_mailboxes().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "work");
    }

    #[tokio::test]
    async fn duplicate_mailbox_name_rejected() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store
            .insert_mailbox(&MailboxConfig::new("work", "imap+ssl://a:b@host"))
            .await
            .unwrap();

        let err = store
            .insert_mailbox(&MailboxConfig::new("work", "imap+ssl://x:y@other"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn local_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mail.db");

        {
            let store = LibSqlStore::new_local(&path).await.unwrap();
            store.record_if_new(&record("m9", b"persisted")).await.unwrap();
        }

        let reopened = LibSqlStore::new_local(&path).await.unwrap();
        let loaded = reopened.get_message("m9").await.unwrap().unwrap();
        assert_eq!(loaded.raw, b"persisted");

        let dup = reopened.record_if_new(&record("m9", b"persisted")).await.unwrap();
        assert_eq!(dup, RecordOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn archive_folder_persists() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let mut cfg = MailboxConfig::new("work", "imap+ssl://a:b@host");
        cfg.archive_folder = Some("Processed".into());
        store.insert_mailbox(&cfg).await.unwrap();

        let listed = store.list_active_mailboxes().await.unwrap();
        assert_eq!(listed[0].archive_folder.as_deref(), Some("Processed"));
    }
}
