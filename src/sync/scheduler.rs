//! Recurring scheduler. Drives synchronization passes at a fixed
//! interval without letting passes pile up.
//!
//! One pass covers every active mailbox, sequentially, loading the
//! config set fresh from the store at tick time. A tick that fires
//! while the previous pass is still in flight is skipped, not queued,
//! so a slow server never builds a backlog.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::notify::Notifier;
use crate::store::MailStore;
use crate::sync::cycle::{CycleOutcome, run_cycle};
use crate::sync::strategy::Strategy;
use crate::sync::transport::MailTransport;

/// Cooperative stop signal shared between the scheduler task and the
/// binary's signal handler.
///
/// Triggering prevents new passes from starting and lets the in-flight
/// candidate finish; the caller enforces the grace period.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake the scheduler if it is sleeping.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Relaxed);
        self.notify.notify_one();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// The raw flag, consulted between candidates inside a cycle.
    pub fn flag(&self) -> &AtomicBool {
        &self.flag
    }

    async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Runs synchronization passes over all active mailboxes.
pub struct Scheduler {
    transport: Arc<dyn MailTransport>,
    store: Arc<dyn MailStore>,
    notifier: Option<Arc<Notifier>>,
    strategy: Strategy,
    interval: Duration,
    /// Held for the duration of one pass; `try_lock` failure means a
    /// pass is still in flight and the tick is dropped.
    pass_guard: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        store: Arc<dyn MailStore>,
        notifier: Option<Arc<Notifier>>,
        strategy: Strategy,
        interval: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            notifier,
            strategy,
            interval,
            pass_guard: Mutex::new(()),
        }
    }

    /// Run one pass over every active mailbox.
    ///
    /// Returns `None` when the pass did not run (previous pass still in
    /// flight, or the config set could not be loaded).
    pub async fn run_pass(&self, shutdown: &AtomicBool) -> Option<Vec<CycleOutcome>> {
        let Ok(_guard) = self.pass_guard.try_lock() else {
            warn!("Previous pass still in flight, skipping this tick");
            return None;
        };

        let mailboxes = match self.store.list_active_mailboxes().await {
            Ok(mailboxes) => mailboxes,
            Err(e) => {
                error!("Failed to load mailbox configs, skipping tick: {e}");
                return None;
            }
        };
        if mailboxes.is_empty() {
            debug!("No active mailboxes configured");
            return Some(Vec::new());
        }

        let mut outcomes = Vec::with_capacity(mailboxes.len());
        for mailbox in &mailboxes {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, remaining mailboxes deferred");
                break;
            }
            outcomes.push(
                run_cycle(
                    self.transport.as_ref(),
                    self.store.as_ref(),
                    self.notifier.as_deref(),
                    mailbox,
                    self.strategy,
                    shutdown,
                )
                .await,
            );
        }

        let persisted: usize = outcomes.iter().map(|o| o.persisted).sum();
        let duplicates: usize = outcomes.iter().map(|o| o.duplicates).sum();
        let failures: usize = outcomes.iter().map(|o| o.failures).sum();
        info!(
            mailboxes = outcomes.len(),
            persisted, duplicates, failures, "Pass finished"
        );
        Some(outcomes)
    }
}

/// Spawn the scheduler loop: one pass immediately, then one per
/// interval until the returned signal is triggered.
pub fn spawn_scheduler(scheduler: Arc<Scheduler>) -> (JoinHandle<()>, ShutdownSignal) {
    let shutdown = ShutdownSignal::new();
    let signal = shutdown.clone();

    let handle = tokio::spawn(async move {
        info!(
            interval_secs = scheduler.interval.as_secs(),
            strategy = %scheduler.strategy,
            "Scheduler started"
        );

        // Initial fetch before entering the interval loop.
        scheduler.run_pass(signal.flag()).await;

        let mut tick = tokio::time::interval(scheduler.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // An interval's first tick completes immediately; the initial
        // pass already ran, so consume it.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if signal.is_triggered() {
                        info!("Scheduler shutting down");
                        return;
                    }
                    scheduler.run_pass(signal.flag()).await;
                }
                _ = signal.notified() => {
                    info!("Scheduler shutting down");
                    return;
                }
            }
        }
    });

    (handle, shutdown)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_signal_round_trip() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());
        signal.trigger();
        assert!(signal.is_triggered());
        assert!(signal.flag().load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn trigger_wakes_pending_waiter() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        // A permit is stored, so a later waiter returns immediately.
        tokio::time::timeout(Duration::from_millis(100), signal.notified())
            .await
            .expect("notified() should complete after trigger()");
    }
}
