//! Campaign, step, and schedule types.

use std::str::FromStr;

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::message::Category;

/// Lifecycle status of a campaign.
///
/// Only `Active` campaigns are considered by the scheduler and the
/// reply detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
        }
    }
}

impl FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "active" => Ok(CampaignStatus::Active),
            "paused" => Ok(CampaignStatus::Paused),
            "completed" => Ok(CampaignStatus::Completed),
            other => Err(format!("unknown campaign status: {other}")),
        }
    }
}

/// One templated message in a campaign's ordered sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// 0-based position in the sequence. Exactly one step has order 0.
    pub order: i32,
    /// Days that must elapse after the previous step. Step 0 is immediate.
    pub delay_days: i64,
    pub subject: String,
    pub body: String,
}

impl Step {
    /// Render the body template for a recipient address.
    ///
    /// Template support is deliberately minimal: `{{email}}` is the only
    /// placeholder the engine substitutes.
    pub fn render_body(&self, email: &str) -> String {
        self.body.replace("{{email}}", email)
    }
}

/// The recurring window in which a campaign may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// IANA timezone identifier, e.g. "America/New_York".
    pub timezone: String,
    /// Hour of day (0-23) in the campaign timezone.
    pub send_hour: u32,
    /// Minute (0-59).
    pub send_minute: u32,
    /// Weekdays on which sending is allowed.
    pub send_days: Vec<Weekday>,
}

impl Schedule {
    /// Resolve the configured timezone, falling back to UTC when the
    /// identifier is unknown.
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }
}

/// Denormalized campaign counters, maintained via atomic increments.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CampaignStats {
    pub total_leads: i64,
    pub sent: i64,
    pub replied: i64,
    pub failed: i64,
}

/// Counter fields on `CampaignStats` that the engine increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatField {
    TotalLeads,
    Sent,
    Replied,
    Failed,
}

impl StatField {
    pub fn column(&self) -> &'static str {
        match self {
            StatField::TotalLeads => "stat_total_leads",
            StatField::Sent => "stat_sent",
            StatField::Replied => "stat_replied",
            StatField::Failed => "stat_failed",
        }
    }
}

/// A configured outreach sequence owned by a user, sent from one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub status: CampaignStatus,
    pub account_id: Uuid,
    /// Ordered by `Step::order`.
    pub steps: Vec<Step>,
    pub schedule: Schedule,
    pub stats: CampaignStats,
    /// Whether detected positive replies trigger automatic responses.
    pub auto_reply_enabled: bool,
    /// Category that counts as a positive reply for auto-reply purposes.
    pub positive_category: Category,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Create a new draft campaign. Steps are sorted by order on the way in.
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        account_id: Uuid,
        mut steps: Vec<Step>,
        schedule: Schedule,
    ) -> Self {
        steps.sort_by_key(|s| s.order);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner: owner.into(),
            name: name.into(),
            status: CampaignStatus::Draft,
            account_id,
            steps,
            schedule,
            stats: CampaignStats::default(),
            auto_reply_enabled: false,
            positive_category: Category::Interested,
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up a step by its order.
    pub fn step_by_order(&self, order: i32) -> Option<&Step> {
        self.steps.iter().find(|s| s.order == order)
    }

    /// Validate the step sequence: contiguous 0-based orders, exactly one
    /// step at order 0.
    pub fn validate_steps(&self) -> Result<(), String> {
        if self.steps.is_empty() {
            return Err("campaign has no steps".to_string());
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.order != i as i32 {
                return Err(format!(
                    "step orders must be contiguous from 0, found {} at position {i}",
                    step.order
                ));
            }
        }
        Ok(())
    }
}
