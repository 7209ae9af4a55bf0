//! Lead (recipient) record and its status state machine.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a lead is in the outreach sequence.
///
/// Transitions are closed, see [`LeadStatus::can_transition_to`]. A
/// dispatch task targeting a lead outside {Pending, Contacted} is a
/// no-op, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeadStatus {
    /// Enrolled, nothing sent yet.
    Pending,
    /// At least one step delivered.
    Contacted,
    /// An inbound reply was detected.
    Replied,
    /// We replied back (auto or operator-approved).
    Responded,
    /// Manually or bulk-classified out of the sequence.
    OptedOut,
    /// Delivery retries exhausted. Terminal.
    Failed,
}

impl LeadStatus {
    /// Whether the scheduler and send worker may still act on this lead.
    pub fn is_sendable(&self) -> bool {
        matches!(self, LeadStatus::Pending | LeadStatus::Contacted)
    }

    /// The closed transition table from the recipient state machine.
    pub fn can_transition_to(&self, target: LeadStatus) -> bool {
        use LeadStatus::*;
        matches!(
            (self, target),
            (Pending, Contacted)
                | (Contacted, Contacted)
                | (Contacted, Replied)
                | (Replied, Responded)
                | (Contacted, OptedOut)
                | (Replied, OptedOut)
                | (Pending, Failed)
                | (Contacted, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Pending => "pending",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Replied => "replied",
            LeadStatus::Responded => "responded",
            LeadStatus::OptedOut => "opted-out",
            LeadStatus::Failed => "failed",
        }
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LeadStatus::Pending),
            "contacted" => Ok(LeadStatus::Contacted),
            "replied" => Ok(LeadStatus::Replied),
            "responded" => Ok(LeadStatus::Responded),
            "opted-out" => Ok(LeadStatus::OptedOut),
            "failed" => Ok(LeadStatus::Failed),
            other => Err(format!("unknown lead status: {other}")),
        }
    }
}

/// One target address enrolled in a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub campaign_id: Uuid,
    /// Stored lower-cased; unique per campaign.
    pub email: String,
    pub status: LeadStatus,
    /// Order of the last step successfully sent, or -1 if none.
    pub current_step: i32,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Enroll a new lead. The address is case-folded here so every
    /// downstream comparison is exact.
    pub fn new(campaign_id: Uuid, email: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            email: email.trim().to_lowercase(),
            status: LeadStatus::Pending,
            current_step: -1,
            last_contacted_at: None,
            replied_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a transition if the state machine allows it.
    ///
    /// Returns `false` (leaving the lead untouched) for any edge not in
    /// the transition table.
    pub fn transition_to(&mut self, target: LeadStatus) -> bool {
        if !self.status.can_transition_to(target) {
            return false;
        }
        self.status = target;
        self.updated_at = Utc::now();
        true
    }
}
