//! Lead upload: free-text address extraction and enrollment.
//!
//! The input is whatever the operator pastes: CSV exports, newline
//! lists, "Name <addr>" pairs. Addresses are pulled out by pattern,
//! case-folded, and deduplicated in first-seen order before enrollment.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::info;
use uuid::Uuid;

use crate::error::{EngineError, Result, StoreError};
use crate::model::{Lead, StatField};
use crate::store::Store;

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}")
        .unwrap_or_else(|e| panic!("invalid address pattern: {e}"))
});

/// Result of an upload: how many leads were enrolled and how many
/// duplicates were skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOutcome {
    pub added: usize,
    pub skipped: usize,
}

/// Extract normalized addresses from free text, first-seen order, no
/// duplicates.
pub fn extract_addresses(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ADDRESS_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|addr| seen.insert(addr.clone()))
        .collect()
}

/// Enroll every address found in `text` into the campaign.
///
/// Text yielding no addresses at all is a validation error. Addresses
/// already enrolled count as skipped. The campaign's lead counter grows
/// by exactly the number added.
pub async fn enroll_leads(
    store: &Arc<dyn Store>,
    campaign_id: Uuid,
    text: &str,
) -> Result<UploadOutcome> {
    let campaign = store
        .get_campaign(campaign_id)
        .await?
        .ok_or_else(|| StoreError::not_found("campaign", campaign_id))?;

    let addresses = extract_addresses(text);
    if addresses.is_empty() {
        return Err(EngineError::Validation("no valid email addresses found".to_string()).into());
    }

    let mut outcome = UploadOutcome::default();
    for address in addresses {
        let lead = Lead::new(campaign.id, &address);
        if store.insert_lead(&lead).await? {
            outcome.added += 1;
        } else {
            outcome.skipped += 1;
        }
    }

    if outcome.added > 0 {
        store
            .increment_stat(campaign.id, StatField::TotalLeads, outcome.added as i64)
            .await?;
    }

    info!(
        campaign_id = %campaign.id,
        added = outcome.added,
        skipped = outcome.skipped,
        "Leads uploaded"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Campaign, Schedule, Step};
    use crate::store::LibSqlBackend;
    use chrono::Weekday;

    #[test]
    fn extracts_from_messy_text() {
        let text = "Alice <Alice@Example.com>, bob@x.org\nnot-an-email, c@d.io;alice@example.com";
        assert_eq!(
            extract_addresses(text),
            vec!["alice@example.com", "bob@x.org", "c@d.io"]
        );
    }

    #[test]
    fn extraction_preserves_first_seen_order() {
        let text = "z@z.com a@a.com Z@Z.COM m@m.com";
        assert_eq!(extract_addresses(text), vec!["z@z.com", "a@a.com", "m@m.com"]);
    }

    #[test]
    fn no_addresses_yields_empty() {
        assert!(extract_addresses("nothing to see here").is_empty());
    }

    async fn seeded_campaign(store: &Arc<dyn Store>) -> Campaign {
        let steps = vec![Step {
            order: 0,
            delay_days: 0,
            subject: "Hello".into(),
            body: "Hi".into(),
        }];
        let schedule = Schedule {
            timezone: "UTC".into(),
            send_hour: 9,
            send_minute: 0,
            send_days: vec![Weekday::Mon],
        };
        let campaign = Campaign::new("owner", "drip", Uuid::new_v4(), steps, schedule);
        store.insert_campaign(&campaign).await.unwrap();
        campaign
    }

    #[tokio::test]
    async fn enroll_counts_added_and_skipped() {
        let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let campaign = seeded_campaign(&store).await;

        let first = enroll_leads(&store, campaign.id, "a@x.com b@x.com")
            .await
            .unwrap();
        assert_eq!(first, UploadOutcome { added: 2, skipped: 0 });

        // Re-upload with one new address.
        let second = enroll_leads(&store, campaign.id, "A@X.COM c@x.com")
            .await
            .unwrap();
        assert_eq!(second, UploadOutcome { added: 1, skipped: 1 });

        let campaign = store.get_campaign(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.stats.total_leads, 3);
    }

    #[tokio::test]
    async fn enroll_rejects_text_without_addresses() {
        let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let campaign = seeded_campaign(&store).await;

        let err = enroll_leads(&store, campaign.id, "no addresses here")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Engine(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn enroll_unknown_campaign_errors() {
        let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let err = enroll_leads(&store, Uuid::new_v4(), "a@x.com")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Store(StoreError::NotFound { .. })
        ));
    }
}
