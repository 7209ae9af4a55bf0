//! Mail collaborators: outbound relay and inbound mailbox poller.
//!
//! The orchestration core only depends on the narrow traits here. The
//! SMTP relay is implemented with lettre; the mailbox protocol itself
//! (IMAP or otherwise) is a collaborator concern, the engine only
//! relies on the cursor contract of [`MailboxPoller`].

pub mod maildir;
pub mod parse;
pub mod smtp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MailError;
use crate::model::Account;

pub use maildir::MaildirPoller;
pub use parse::{parse_inbound, strip_quoted_text};
pub use smtp::{SmtpConfig, SmtpRelay};

/// The folder the reply detector watches.
pub const DEFAULT_FOLDER: &str = "INBOX";

/// A fetched inbound message, not yet parsed.
#[derive(Debug, Clone)]
pub struct RawInbound {
    /// Mailbox position of this message; the watermark advances to it
    /// once the message has been processed.
    pub cursor: String,
    /// Raw RFC 822 bytes.
    pub raw: Vec<u8>,
}

/// A parsed inbound message.
#[derive(Debug, Clone)]
pub struct InboundEmail {
    /// Message-ID header value.
    pub external_id: String,
    /// Normalized (trimmed, lower-cased) sender address.
    pub sender: String,
    pub subject: String,
    /// Quote-stripped body text.
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// Outbound mail relay.
#[async_trait]
pub trait MailRelay: Send + Sync {
    async fn send(
        &self,
        account: &Account,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), MailError>;

    /// Refresh the account's outbound credential, returning the new
    /// expiry. Password-auth relays need no refresh.
    async fn refresh(&self, _account: &Account) -> Result<Option<DateTime<Utc>>, MailError> {
        Ok(None)
    }
}

/// Inbound mailbox poller. Implementations must return messages in
/// mailbox order so the watermark can advance monotonically.
#[async_trait]
pub trait MailboxPoller: Send + Sync {
    /// The mailbox's current position, used to bootstrap the watermark
    /// the first time an (account, folder) pair is observed.
    async fn current_cursor(&self, account: &Account, folder: &str) -> Result<String, MailError>;

    /// Messages strictly newer than `cursor`, oldest first.
    async fn fetch_since(
        &self,
        account: &Account,
        folder: &str,
        cursor: &str,
    ) -> Result<Vec<RawInbound>, MailError>;
}
