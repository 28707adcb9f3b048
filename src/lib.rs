//! mailwatch: non-destructive IMAP mailbox poller.

pub mod cli;
pub mod config;
pub mod error;
pub mod imap;
pub mod message;
pub mod notify;
pub mod store;
pub mod sync;
