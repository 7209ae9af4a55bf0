//! Auto-reply engine.
//!
//! Four entry points over one shared respond path:
//! - [`AutoReplyEngine::reply_to_inbound`]: detector-triggered, fires when
//!   a classified reply matches the campaign's positive category
//! - [`AutoReplyEngine::bulk_auto_reply`]: respond to every eligible
//!   replied lead in a campaign
//! - [`AutoReplyEngine::generate_draft`] / [`AutoReplyEngine::send_reviewed`]:
//!   operator-in-the-loop review flow
//! - [`AutoReplyEngine::bulk_mark`]: reclassify replied leads by their
//!   latest inbound category, no generation or sending

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::context::ContextIndex;
use crate::error::{EngineError, Result, StoreError};
use crate::llm::ReplyGenerator;
use crate::mail::{DEFAULT_FOLDER, MailRelay};
use crate::model::{Account, Campaign, Category, Lead, LeadStatus, StoredInbound};
use crate::store::Store;

/// How many context snippets feed the generation prompt.
const CONTEXT_TOP_K: usize = 3;

/// A generated reply awaiting operator review.
#[derive(Debug, Clone)]
pub struct DraftReply {
    pub lead_id: Uuid,
    pub draft_text: String,
    pub original_subject: String,
    pub detected_category: Option<Category>,
}

/// Outcome of a bulk auto-reply run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkReplyOutcome {
    pub sent: usize,
    pub failed: usize,
}

/// Outcome of a bulk reclassification run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkMarkOutcome {
    pub marked: usize,
}

pub struct AutoReplyEngine {
    store: Arc<dyn Store>,
    relay: Arc<dyn MailRelay>,
    generator: ReplyGenerator,
    context: Arc<dyn ContextIndex>,
    config: EngineConfig,
}

impl AutoReplyEngine {
    pub fn new(
        store: Arc<dyn Store>,
        relay: Arc<dyn MailRelay>,
        generator: ReplyGenerator,
        context: Arc<dyn ContextIndex>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            relay,
            generator,
            context,
            config,
        }
    }

    /// Generate and send a response to one inbound message. Returns
    /// whether a reply went out.
    ///
    /// Called by the reply detector after classification; the lead is
    /// expected to be in `Replied`.
    pub async fn reply_to_inbound(
        &self,
        campaign: &Campaign,
        lead: &Lead,
        inbound: &StoredInbound,
    ) -> Result<bool> {
        let account = self.account_for(campaign).await?;
        self.respond(campaign, &account, lead, inbound).await
    }

    /// Respond to every replied lead in the campaign whose latest inbound
    /// message carries the campaign's positive category.
    pub async fn bulk_auto_reply(&self, campaign_id: Uuid) -> Result<BulkReplyOutcome> {
        let campaign = self.campaign(campaign_id).await?;
        let account = self.account_for(&campaign).await?;
        let leads = self.replied_leads(campaign_id).await?;

        let mut outcome = BulkReplyOutcome::default();
        for lead in leads {
            // One lead's failure must not abort the rest of the run.
            let inbound = match self.latest_inbound(&account, &lead).await {
                Ok(Some(m)) => m,
                Ok(None) => continue,
                Err(e) => {
                    warn!(lead_id = %lead.id, error = %e, "Bulk reply failed for lead");
                    outcome.failed += 1;
                    continue;
                }
            };
            // Only positively-classified replies get an automated answer.
            if inbound.category != Some(campaign.positive_category) {
                continue;
            }
            match self.respond(&campaign, &account, &lead, &inbound).await {
                Ok(true) => outcome.sent += 1,
                Ok(false) => outcome.failed += 1,
                Err(e) => {
                    warn!(lead_id = %lead.id, error = %e, "Bulk reply failed for lead");
                    outcome.failed += 1;
                }
            }
        }

        info!(
            campaign_id = %campaign_id,
            sent = outcome.sent,
            failed = outcome.failed,
            "Bulk auto-reply finished"
        );
        Ok(outcome)
    }

    /// Generate a draft response for one lead without sending it.
    pub async fn generate_draft(&self, lead_id: Uuid) -> Result<DraftReply> {
        let lead = self.lead(lead_id).await?;
        let campaign = self.campaign(lead.campaign_id).await?;
        let account = self.account_for(&campaign).await?;

        let inbound = self
            .latest_inbound(&account, &lead)
            .await?
            .ok_or_else(|| EngineError::Validation("lead has no inbound message".to_string()))?;

        let draft_text = self
            .generate(&campaign, &inbound)
            .await
            .ok_or_else(|| EngineError::Validation("reply generation produced no text".to_string()))?;

        Ok(DraftReply {
            lead_id: lead.id,
            draft_text,
            original_subject: inbound.subject.clone(),
            detected_category: inbound.category,
        })
    }

    /// Send an operator-reviewed (possibly edited) reply text.
    pub async fn send_reviewed(&self, lead_id: Uuid, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(EngineError::Validation("reply text is empty".to_string()).into());
        }

        let mut lead = self.lead(lead_id).await?;
        let campaign = self.campaign(lead.campaign_id).await?;
        let account = self.account_for(&campaign).await?;

        let inbound = self
            .latest_inbound(&account, &lead)
            .await?
            .ok_or_else(|| EngineError::Validation("lead has no inbound message".to_string()))?;

        self.deliver(&account, &lead, &inbound, text).await?;
        self.mark_responded(&mut lead).await?;
        Ok(())
    }

    /// Move every replied lead whose latest inbound message carries
    /// `category` to `target`. Pure reclassification, nothing is
    /// generated or sent.
    pub async fn bulk_mark(
        &self,
        campaign_id: Uuid,
        category: Category,
        target: LeadStatus,
    ) -> Result<BulkMarkOutcome> {
        if !LeadStatus::Replied.can_transition_to(target) {
            return Err(EngineError::InvalidTransition {
                from: LeadStatus::Replied.as_str().to_string(),
                to: target.as_str().to_string(),
            }
            .into());
        }

        let campaign = self.campaign(campaign_id).await?;
        let account = self.account_for(&campaign).await?;
        let leads = self.replied_leads(campaign_id).await?;

        let mut outcome = BulkMarkOutcome::default();
        for mut lead in leads {
            let Some(inbound) = self.latest_inbound(&account, &lead).await? else {
                continue;
            };
            if inbound.category != Some(category) {
                continue;
            }
            if lead.transition_to(target) {
                self.store.update_lead(&lead).await?;
                outcome.marked += 1;
            }
        }

        info!(
            campaign_id = %campaign_id,
            category = category.as_str(),
            target = target.as_str(),
            marked = outcome.marked,
            "Bulk mark finished"
        );
        Ok(outcome)
    }

    // ── Shared respond path ─────────────────────────────────────────

    /// Generate and deliver a reply, then advance the lead. `Ok(false)`
    /// means generation yielded nothing and the lead was left alone.
    async fn respond(
        &self,
        campaign: &Campaign,
        account: &Account,
        lead: &Lead,
        inbound: &StoredInbound,
    ) -> Result<bool> {
        let Some(text) = self.generate(campaign, inbound).await else {
            return Ok(false);
        };

        self.deliver(account, lead, inbound, &text).await?;
        let mut lead = lead.clone();
        self.mark_responded(&mut lead).await?;
        Ok(true)
    }

    async fn generate(&self, campaign: &Campaign, inbound: &StoredInbound) -> Option<String> {
        let snippets = match self
            .context
            .query(campaign.id, &inbound.body, CONTEXT_TOP_K)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                // Generation still works without context.
                warn!(campaign_id = %campaign.id, error = %e, "Context lookup failed");
                Vec::new()
            }
        };
        self.generator
            .generate(&campaign.name, &snippets, &inbound.body)
            .await
    }

    async fn deliver(
        &self,
        account: &Account,
        lead: &Lead,
        inbound: &StoredInbound,
        text: &str,
    ) -> Result<()> {
        let subject = crate::llm::generate::reply_subject(&inbound.subject);
        let send = self.relay.send(account, &lead.email, &subject, text);
        match tokio::time::timeout(self.config.external_call_timeout, send).await {
            Err(_) => Err(crate::error::MailError::Timeout(self.config.external_call_timeout).into()),
            Ok(result) => Ok(result?),
        }
    }

    async fn mark_responded(&self, lead: &mut Lead) -> Result<()> {
        let from = lead.status;
        if !lead.transition_to(LeadStatus::Responded) {
            return Err(EngineError::InvalidTransition {
                from: from.as_str().to_string(),
                to: LeadStatus::Responded.as_str().to_string(),
            }
            .into());
        }
        self.store.update_lead(lead).await?;
        info!(lead_id = %lead.id, "Lead responded");
        Ok(())
    }

    // ── Lookups ─────────────────────────────────────────────────────

    async fn campaign(&self, id: Uuid) -> Result<Campaign> {
        Ok(self
            .store
            .get_campaign(id)
            .await?
            .ok_or_else(|| StoreError::not_found("campaign", id))?)
    }

    async fn lead(&self, id: Uuid) -> Result<Lead> {
        Ok(self
            .store
            .get_lead(id)
            .await?
            .ok_or_else(|| StoreError::not_found("lead", id))?)
    }

    async fn account_for(&self, campaign: &Campaign) -> Result<Account> {
        Ok(self
            .store
            .get_account(campaign.account_id)
            .await?
            .ok_or_else(|| StoreError::not_found("account", campaign.account_id))?)
    }

    async fn latest_inbound(
        &self,
        account: &Account,
        lead: &Lead,
    ) -> Result<Option<StoredInbound>> {
        Ok(self
            .store
            .latest_inbound_by_sender(account.id, DEFAULT_FOLDER, &lead.email)
            .await?)
    }

    /// All leads currently in `Replied`, fully paged before any mutation
    /// so status changes cannot shift the pages underneath us.
    async fn replied_leads(&self, campaign_id: Uuid) -> Result<Vec<Lead>> {
        let mut leads = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .store
                .list_leads_page(
                    campaign_id,
                    &[LeadStatus::Replied],
                    self.config.lead_page_size,
                    offset,
                )
                .await?;
            let page_len = page.len();
            leads.extend(page);
            if page_len < self.config.lead_page_size {
                break;
            }
            offset += page_len;
        }
        Ok(leads)
    }
}
