//! Unified `Store` trait: single async interface for all persistence.
//!
//! Covers campaigns, leads, accounts, mailbox watermarks, inbound
//! messages, and campaign context snippets. Counter updates are atomic
//! single-statement increments, never read-modify-write, so concurrent
//! workers cannot lose updates.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{
    Account, Campaign, CampaignStatus, Category, Lead, LeadStatus, StatField, StoredInbound,
};

/// Backend-agnostic persistence trait.
#[async_trait]
pub trait Store: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), StoreError>;

    // ── Campaigns ───────────────────────────────────────────────────

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), StoreError>;

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError>;

    async fn update_campaign(&self, campaign: &Campaign) -> Result<(), StoreError>;

    /// Delete a campaign and everything it owns (leads, snippets).
    async fn delete_campaign(&self, id: Uuid) -> Result<(), StoreError>;

    async fn set_campaign_status(
        &self,
        id: Uuid,
        status: CampaignStatus,
    ) -> Result<(), StoreError>;

    /// Campaigns the scheduler and reply detector should consider.
    async fn list_active_campaigns(&self) -> Result<Vec<Campaign>, StoreError>;

    /// Atomically add `delta` to one denormalized counter.
    async fn increment_stat(
        &self,
        campaign_id: Uuid,
        field: StatField,
        delta: i64,
    ) -> Result<(), StoreError>;

    // ── Leads ───────────────────────────────────────────────────────

    /// Insert a lead. Returns `false` when the (campaign, email) pair
    /// already exists; the caller counts it as skipped, not an error.
    async fn insert_lead(&self, lead: &Lead) -> Result<bool, StoreError>;

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError>;

    /// Look up a lead by normalized sender address across all campaigns
    /// sending from `account_id`. Used by the reply detector.
    async fn find_lead_by_sender(
        &self,
        account_id: Uuid,
        email: &str,
    ) -> Result<Option<Lead>, StoreError>;

    async fn update_lead(&self, lead: &Lead) -> Result<(), StoreError>;

    /// Page through a campaign's leads filtered by status, ordered by
    /// creation time. Bounds the scheduler's memory use.
    async fn list_leads_page(
        &self,
        campaign_id: Uuid,
        statuses: &[LeadStatus],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Lead>, StoreError>;

    // ── Accounts ────────────────────────────────────────────────────

    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Persist a refreshed credential expiry for an account.
    async fn set_account_token_expiry(
        &self,
        id: Uuid,
        expires_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<(), StoreError>;

    // ── Mailbox watermarks ──────────────────────────────────────────

    /// Cursor of the last processed inbound message for (account, folder).
    async fn get_watermark(
        &self,
        account_id: Uuid,
        folder: &str,
    ) -> Result<Option<String>, StoreError>;

    async fn set_watermark(
        &self,
        account_id: Uuid,
        folder: &str,
        cursor: &str,
    ) -> Result<(), StoreError>;

    // ── Inbound messages ────────────────────────────────────────────

    /// Persist an inbound message for thread display. Duplicate
    /// external ids are ignored.
    async fn insert_inbound(&self, message: &StoredInbound) -> Result<(), StoreError>;

    async fn set_inbound_category(
        &self,
        id: Uuid,
        category: Category,
    ) -> Result<(), StoreError>;

    /// Most recent inbound message from `sender` on this account.
    /// Drives "latest category" decisions in the auto-reply engine.
    async fn latest_inbound_by_sender(
        &self,
        account_id: Uuid,
        folder: &str,
        sender: &str,
    ) -> Result<Option<StoredInbound>, StoreError>;

    /// All inbound messages from `sender`, oldest first (thread order).
    async fn list_inbound_by_sender(
        &self,
        account_id: Uuid,
        sender: &str,
    ) -> Result<Vec<StoredInbound>, StoreError>;

    // ── Context snippets ────────────────────────────────────────────

    async fn insert_context_snippet(
        &self,
        campaign_id: Uuid,
        text: &str,
    ) -> Result<(), StoreError>;

    async fn list_context_snippets(&self, campaign_id: Uuid) -> Result<Vec<String>, StoreError>;
}
