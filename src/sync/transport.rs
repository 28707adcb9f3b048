//! Session traits, the seam between the cycle orchestrator and the
//! IMAP plumbing.
//!
//! The orchestrator receives a `MailTransport` rather than opening
//! connections itself, so tests can substitute an in-memory session
//! and production wires in `ImapTransport`.

use async_trait::async_trait;

use crate::config::MailboxConfig;
use crate::error::{Error, SyncError};
use crate::imap::ImapSession;
use crate::message::RemoteMessage;
use crate::sync::strategy::Selection;

/// One open, folder-selected session. Exclusive to the cycle that
/// opened it; never shared across tasks.
#[async_trait]
pub trait MailSession: Send {
    /// Snapshot of candidate UIDs for the given selection, oldest first.
    async fn list_candidates(&mut self, selection: Selection) -> Result<Vec<u32>, SyncError>;

    /// Fetch one message without mutating its flags.
    async fn fetch(&mut self, uid: u32) -> Result<RemoteMessage, SyncError>;

    /// Add the `\Seen` flag to one message.
    async fn add_seen_flag(&mut self, uid: u32) -> Result<(), SyncError>;

    /// Copy one message to another folder.
    async fn copy_to(&mut self, uid: u32, folder: &str) -> Result<(), SyncError>;

    /// Create the folder if it does not exist.
    async fn ensure_folder(&mut self, folder: &str) -> Result<(), SyncError>;

    /// Release the connection. Idempotent; called on every cycle exit path.
    async fn close(&mut self);
}

/// Opens sessions for mailbox configs.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Connect, authenticate and select the mailbox's folder.
    async fn open(&self, mailbox: &MailboxConfig) -> Result<Box<dyn MailSession>, Error>;
}

/// Production transport backed by `imap::ImapSession`.
pub struct ImapTransport;

#[async_trait]
impl MailTransport for ImapTransport {
    async fn open(&self, mailbox: &MailboxConfig) -> Result<Box<dyn MailSession>, Error> {
        let descriptor = mailbox.descriptor()?;
        let session = ImapSession::open(&descriptor, &mailbox.folder).await?;
        Ok(Box::new(session))
    }
}

#[async_trait]
impl MailSession for ImapSession {
    async fn list_candidates(&mut self, selection: Selection) -> Result<Vec<u32>, SyncError> {
        ImapSession::list_candidates(self, selection).await
    }

    async fn fetch(&mut self, uid: u32) -> Result<RemoteMessage, SyncError> {
        ImapSession::fetch(self, uid).await
    }

    async fn add_seen_flag(&mut self, uid: u32) -> Result<(), SyncError> {
        ImapSession::add_seen_flag(self, uid).await
    }

    async fn copy_to(&mut self, uid: u32, folder: &str) -> Result<(), SyncError> {
        ImapSession::copy_to(self, uid, folder).await
    }

    async fn ensure_folder(&mut self, folder: &str) -> Result<(), SyncError> {
        ImapSession::ensure_folder(self, folder).await
    }

    async fn close(&mut self) {
        ImapSession::close(self).await;
    }
}
