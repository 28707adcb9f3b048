//! Raw IMAP client plumbing: stream setup and a minimal session.

pub mod session;
pub mod stream;

pub use session::ImapSession;
