//! Mailbox synchronization engine: strategy variants, the per-mailbox
//! cycle orchestrator and the recurring scheduler.

pub mod cycle;
pub mod scheduler;
pub mod strategy;
pub mod transport;

pub use cycle::{CycleOutcome, CycleStatus, run_cycle};
pub use scheduler::{Scheduler, ShutdownSignal, spawn_scheduler};
pub use strategy::{PostAction, Selection, Strategy};
pub use transport::{ImapTransport, MailSession, MailTransport};
