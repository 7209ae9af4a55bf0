//! Send worker pool.
//!
//! Workers pop [`DispatchTask`]s from the queue and deliver the step
//! email. Every execution re-reads campaign and lead state and treats a
//! stale task as a no-op, so replayed or duplicated tasks are harmless.
//! Delivery failures go back through the queue's retry policy; once the
//! budget is spent the lead is marked failed.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::mail::MailRelay;
use crate::model::{CampaignStatus, LeadStatus, StatField};
use crate::queue::{DispatchQueue, DispatchTask};
use crate::store::Store;

/// Result of executing one dispatch task.
#[derive(Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Delivered; lead advanced.
    Sent,
    /// State moved underneath the task; nothing done, nothing retried.
    Stale,
    /// Delivery failed; eligible for retry.
    Failed,
}

/// Execute one task against current state.
///
/// Public so integration tests can drive a single execution without a
/// running pool.
pub async fn execute_task(
    store: &Arc<dyn Store>,
    relay: &Arc<dyn MailRelay>,
    config: &EngineConfig,
    task: &DispatchTask,
) -> Result<TaskOutcome, StoreError> {
    let Some(campaign) = store.get_campaign(task.campaign_id).await? else {
        debug!(campaign_id = %task.campaign_id, "Campaign gone, dropping task");
        return Ok(TaskOutcome::Stale);
    };
    if campaign.status != CampaignStatus::Active {
        debug!(campaign_id = %campaign.id, status = campaign.status.as_str(), "Campaign not active");
        return Ok(TaskOutcome::Stale);
    }

    let Some(mut lead) = store.get_lead(task.lead_id).await? else {
        debug!(lead_id = %task.lead_id, "Lead gone, dropping task");
        return Ok(TaskOutcome::Stale);
    };
    if !lead.status.is_sendable() {
        debug!(lead_id = %lead.id, status = lead.status.as_str(), "Lead no longer sendable");
        return Ok(TaskOutcome::Stale);
    }
    // The step this task was cut for must still be the lead's next step.
    if task.step_index != lead.current_step + 1 {
        debug!(
            lead_id = %lead.id,
            task_step = task.step_index,
            current_step = lead.current_step,
            "Stale step index"
        );
        return Ok(TaskOutcome::Stale);
    }

    let Some(step) = campaign.step_by_order(task.step_index) else {
        warn!(campaign_id = %campaign.id, step = task.step_index, "Task references unknown step");
        return Ok(TaskOutcome::Stale);
    };

    // A missing account cannot heal on retry; drop the task instead of
    // spending the retry budget.
    let Some(mut account) = store.get_account(campaign.account_id).await? else {
        error!(account_id = %campaign.account_id, "Sending account missing, dropping task");
        return Ok(TaskOutcome::Stale);
    };

    // Refresh the outbound credential ahead of expiry.
    if account.needs_refresh(Utc::now()) {
        match relay.refresh(&account).await {
            Ok(Some(expires_at)) => {
                store
                    .set_account_token_expiry(account.id, Some(expires_at))
                    .await?;
                account.token_expires_at = Some(expires_at);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(account = %account.address, error = %e, "Credential refresh failed");
                return Ok(TaskOutcome::Failed);
            }
        }
    }

    let body = step.render_body(&lead.email);
    let send = relay.send(&account, &lead.email, &step.subject, &body);
    match tokio::time::timeout(config.external_call_timeout, send).await {
        Err(_) => {
            warn!(lead_id = %lead.id, "Send timed out");
            return Ok(TaskOutcome::Failed);
        }
        Ok(Err(e)) => {
            warn!(lead_id = %lead.id, error = %e, "Send failed");
            return Ok(TaskOutcome::Failed);
        }
        Ok(Ok(())) => {}
    }

    lead.transition_to(LeadStatus::Contacted);
    lead.current_step = task.step_index;
    lead.last_contacted_at = Some(Utc::now());
    store.update_lead(&lead).await?;
    store
        .increment_stat(campaign.id, StatField::Sent, 1)
        .await?;

    info!(
        campaign_id = %campaign.id,
        lead_id = %lead.id,
        step = task.step_index,
        "Step delivered"
    );
    Ok(TaskOutcome::Sent)
}

/// Mark a lead failed after its retry budget is spent.
async fn fail_lead(store: &Arc<dyn Store>, task: &DispatchTask) -> Result<(), StoreError> {
    let Some(mut lead) = store.get_lead(task.lead_id).await? else {
        return Ok(());
    };
    // Only sendable leads can fail; a reply that raced in wins.
    if !lead.transition_to(LeadStatus::Failed) {
        return Ok(());
    }
    store.update_lead(&lead).await?;
    store
        .increment_stat(task.campaign_id, StatField::Failed, 1)
        .await?;
    warn!(lead_id = %lead.id, campaign_id = %task.campaign_id, "Lead failed after retries");
    Ok(())
}

/// Spawn `config.worker_concurrency` workers draining the queue. The
/// pool exits once the queue is closed and drained.
pub fn spawn_send_workers(
    store: Arc<dyn Store>,
    relay: Arc<dyn MailRelay>,
    queue: Arc<DispatchQueue>,
    config: EngineConfig,
) -> Vec<JoinHandle<()>> {
    (0..config.worker_concurrency)
        .map(|worker_id| {
            let store = Arc::clone(&store);
            let relay = Arc::clone(&relay);
            let queue = Arc::clone(&queue);
            let config = config.clone();

            tokio::spawn(async move {
                debug!(worker_id, "Send worker started");
                while let Some(task) = queue.pop().await {
                    match execute_task(&store, &relay, &config, &task).await {
                        Ok(TaskOutcome::Sent) | Ok(TaskOutcome::Stale) => {
                            queue.complete(task).await;
                        }
                        Ok(TaskOutcome::Failed) => {
                            if queue.schedule_retry(task.clone()).await.is_none() {
                                if let Err(e) = fail_lead(&store, &task).await {
                                    error!(lead_id = %task.lead_id, error = %e, "Could not mark lead failed");
                                }
                            }
                        }
                        Err(e) => {
                            error!(lead_id = %task.lead_id, error = %e, "Task hit store error");
                            if queue.schedule_retry(task.clone()).await.is_none() {
                                if let Err(e) = fail_lead(&store, &task).await {
                                    error!(lead_id = %task.lead_id, error = %e, "Could not mark lead failed");
                                }
                            }
                        }
                    }
                }
                debug!(worker_id, "Send worker stopped");
            })
        })
        .collect()
}
