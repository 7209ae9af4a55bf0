//! Sending account record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A mailbox the engine sends from and polls for replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub owner: String,
    /// The account's own address, also used for self-loop filtering.
    pub address: String,
    pub display_name: Option<String>,
    /// When the outbound credential expires, for token-based auth.
    /// `None` means the credential never expires (password auth).
    pub token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(owner: impl Into<String>, address: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            address: address.trim().to_lowercase(),
            display_name: None,
            token_expires_at: None,
            created_at: Utc::now(),
        }
    }

    /// Whether the outbound credential must be refreshed before sending.
    ///
    /// A small lead time avoids sending with a token that expires mid-call.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.token_expires_at {
            Some(expires) => expires <= now + chrono::Duration::minutes(5),
            None => false,
        }
    }
}
