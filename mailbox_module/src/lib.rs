//! Blocking IMAP mailbox access.
//!
//! [`MailboxClient`] opens a TLS session against an IMAP server, lists and
//! fetches messages, and mutates read/unread flags. All socket operations
//! carry a bounded timeout so a dead server cannot stall a polling loop.

mod client;
mod config;
mod error;
mod message;

pub use client::MailboxClient;
pub use config::MailboxConfig;
pub use error::MailboxError;
pub use message::Message;
