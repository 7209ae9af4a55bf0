//! Inbound message records and classifier categories.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classifier-assigned label on an inbound message.
///
/// Serde names match [`Category::as_str`] so the API and storage share
/// one label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Interested,
    #[serde(rename = "Not Interested")]
    NotInterested,
    #[serde(rename = "Out of Office")]
    OutOfOffice,
    Spam,
    Other,
}

impl Category {
    /// Categories that must never trigger an automatic reply.
    pub fn do_not_contact(&self) -> bool {
        matches!(self, Category::Spam | Category::NotInterested)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Interested => "Interested",
            Category::NotInterested => "Not Interested",
            Category::OutOfOffice => "Out of Office",
            Category::Spam => "Spam",
            Category::Other => "Other",
        }
    }

    /// All labels, in the order they are offered to the classifier.
    pub fn all() -> &'static [Category] {
        &[
            Category::Interested,
            Category::NotInterested,
            Category::OutOfOffice,
            Category::Spam,
            Category::Other,
        ]
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Classifier output is free text; match leniently.
        let norm = s.trim().to_lowercase();
        match norm.as_str() {
            "interested" => Ok(Category::Interested),
            "not interested" | "not_interested" => Ok(Category::NotInterested),
            "out of office" | "out_of_office" | "ooo" => Ok(Category::OutOfOffice),
            "spam" => Ok(Category::Spam),
            "other" => Ok(Category::Other),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// A persisted inbound message, kept for thread display and for
/// determining a lead's latest category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredInbound {
    pub id: Uuid,
    /// Channel-native message id (e.g. the Message-ID header).
    pub external_id: String,
    pub account_id: Uuid,
    pub folder: String,
    /// Normalized (trimmed, lower-cased) sender address.
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub category: Option<Category>,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl StoredInbound {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        external_id: impl Into<String>,
        account_id: Uuid,
        folder: impl Into<String>,
        sender: &str,
        subject: impl Into<String>,
        body: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            account_id,
            folder: folder.into(),
            sender: sender.trim().to_lowercase(),
            subject: subject.into(),
            body: body.into(),
            category: None,
            received_at,
            created_at: Utc::now(),
        }
    }
}
