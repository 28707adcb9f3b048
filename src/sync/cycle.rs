//! Per-mailbox cycle orchestration.
//!
//! One cycle walks a single mailbox: open session → list candidates →
//! fetch → duplicate check → persist → post-process → close. A failure
//! while connecting or listing aborts the mailbox's cycle (the next
//! scheduled tick is the retry); a failure on one candidate skips that
//! candidate only.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::config::MailboxConfig;
use crate::notify::Notifier;
use crate::store::{MailStore, NewMessageRecord, RecordOutcome};
use crate::sync::strategy::{PostAction, Strategy};
use crate::sync::transport::MailTransport;

/// Terminal status of one mailbox cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleStatus {
    /// Every candidate was handled (persisted or skipped as duplicate).
    Success,
    /// At least one candidate failed; the rest were still processed.
    PartialFailure,
    /// The cycle aborted before candidates could be processed.
    Failed(String),
}

/// Per-mailbox, per-cycle result, consumed by the scheduler and the CLI.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub mailbox: String,
    pub candidates: usize,
    pub persisted: usize,
    pub duplicates: usize,
    pub failures: usize,
    pub status: CycleStatus,
}

impl CycleOutcome {
    fn aborted(mailbox: &str, cause: String) -> Self {
        Self {
            mailbox: mailbox.to_string(),
            candidates: 0,
            persisted: 0,
            duplicates: 0,
            failures: 0,
            status: CycleStatus::Failed(cause),
        }
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            CycleStatus::Failed(cause) => write!(f, "{}: failed ({cause})", self.mailbox),
            status => write!(
                f,
                "{}: {} candidates, {} persisted, {} duplicates, {} failures ({})",
                self.mailbox,
                self.candidates,
                self.persisted,
                self.duplicates,
                self.failures,
                match status {
                    CycleStatus::Success => "success",
                    _ => "partial failure",
                }
            ),
        }
    }
}

/// Run one synchronization cycle over one mailbox.
///
/// The session is closed on every exit path. The shutdown flag is
/// consulted between candidates: the in-flight candidate completes,
/// the remainder is abandoned until the next run.
pub async fn run_cycle(
    transport: &dyn MailTransport,
    store: &dyn MailStore,
    notifier: Option<&Notifier>,
    mailbox: &MailboxConfig,
    strategy: Strategy,
    shutdown: &AtomicBool,
) -> CycleOutcome {
    info!(mailbox = %mailbox.name, strategy = %strategy, "Starting cycle");

    let mut session = match transport.open(mailbox).await {
        Ok(session) => session,
        Err(e) => {
            warn!(mailbox = %mailbox.name, "Cycle aborted, session not opened: {e}");
            return CycleOutcome::aborted(&mailbox.name, e.to_string());
        }
    };

    // Archive folder is best-effort: a failure here disables copying
    // for this cycle but does not stop message processing.
    let mut archive = mailbox.archive_folder.as_deref();
    if let Some(folder) = archive {
        if let Err(e) = session.ensure_folder(folder).await {
            warn!(mailbox = %mailbox.name, "Archive folder unavailable: {e}");
            archive = None;
        }
    }

    let candidates = match session.list_candidates(strategy.selection()).await {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!(mailbox = %mailbox.name, "Cycle aborted, candidate listing failed: {e}");
            session.close().await;
            return CycleOutcome::aborted(&mailbox.name, e.to_string());
        }
    };
    debug!(mailbox = %mailbox.name, count = candidates.len(), "Candidates listed");

    let mut persisted = 0usize;
    let mut duplicates = 0usize;
    let mut failures = 0usize;

    for &uid in &candidates {
        if shutdown.load(Ordering::Relaxed) {
            info!(mailbox = %mailbox.name, "Shutdown requested, abandoning remaining candidates");
            break;
        }

        let message = match session.fetch(uid).await {
            Ok(message) => message,
            Err(e) => {
                warn!(mailbox = %mailbox.name, uid, "Skipping candidate: {e}");
                failures += 1;
                continue;
            }
        };

        if let Some(folder) = archive {
            if let Err(e) = session.copy_to(uid, folder).await {
                warn!(mailbox = %mailbox.name, uid, "Archive copy failed: {e}");
            }
        }

        let record = NewMessageRecord {
            stable_id: &message.stable_id,
            mailbox: &mailbox.name,
            sender: &message.sender,
            subject: message.subject.as_deref(),
            raw: &message.raw,
            received_at: message.received_at,
        };

        match store.record_if_new(&record).await {
            Ok(RecordOutcome::Recorded(id)) => {
                persisted += 1;
                debug!(mailbox = %mailbox.name, uid, id = %id, "Message persisted");

                if let Some(notifier) = notifier {
                    notifier.notify_new_message(&mailbox.name, &message).await;
                }

                // Mutation strictly follows durable persistence; a
                // rejected STORE leaves the message recorded.
                if strategy.post_action() == PostAction::MarkSeen {
                    if let Err(e) = session.add_seen_flag(uid).await {
                        warn!(mailbox = %mailbox.name, uid, "Post-processing failed: {e}");
                    }
                }
            }
            Ok(RecordOutcome::AlreadyExists) => {
                duplicates += 1;
                debug!(mailbox = %mailbox.name, uid, stable_id = %message.stable_id,
                    "Duplicate skipped");
            }
            Err(e) => {
                warn!(mailbox = %mailbox.name, uid, "Persistence failed, skipping: {e}");
                failures += 1;
            }
        }
    }

    session.close().await;

    let status = if failures > 0 {
        CycleStatus::PartialFailure
    } else {
        CycleStatus::Success
    };
    let outcome = CycleOutcome {
        mailbox: mailbox.name.clone(),
        candidates: candidates.len(),
        persisted,
        duplicates,
        failures,
        status,
    };
    info!(mailbox = %mailbox.name, "Cycle finished: {outcome}");
    outcome
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_display_success() {
        let outcome = CycleOutcome {
            mailbox: "work".into(),
            candidates: 3,
            persisted: 2,
            duplicates: 1,
            failures: 0,
            status: CycleStatus::Success,
        };
        assert_eq!(
            outcome.to_string(),
            "work: 3 candidates, 2 persisted, 1 duplicates, 0 failures (success)"
        );
    }

    #[test]
    fn outcome_display_failed() {
        let outcome = CycleOutcome::aborted("work", "connection refused".into());
        assert_eq!(outcome.to_string(), "work: failed (connection refused)");
    }
}
