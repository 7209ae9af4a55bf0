//! Reply detector.
//!
//! Polls each sending account's mailbox past a persisted watermark,
//! parses new messages, matches senders to leads, and advances the
//! state machine. The watermark moves per message, including past
//! messages that fail to parse or match, so nothing is processed twice.
//!
//! Failures degrade, never abort: a classifier outage leaves the
//! message uncategorized, a single bad account is logged and the rest
//! of the tick proceeds.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::AutoReplyEngine;
use crate::error::Error;
use crate::llm::Classifier;
use crate::mail::{DEFAULT_FOLDER, MailboxPoller, RawInbound, parse_inbound};
use crate::model::{Account, CampaignStatus, LeadStatus, StatField, StoredInbound};
use crate::store::Store;

pub struct ReplyDetector {
    store: Arc<dyn Store>,
    poller: Arc<dyn MailboxPoller>,
    classifier: Arc<Classifier>,
    auto_reply: Arc<AutoReplyEngine>,
    config: EngineConfig,
}

impl ReplyDetector {
    pub fn new(
        store: Arc<dyn Store>,
        poller: Arc<dyn MailboxPoller>,
        classifier: Arc<Classifier>,
        auto_reply: Arc<AutoReplyEngine>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            poller,
            classifier,
            auto_reply,
            config,
        }
    }

    /// One polling pass over every account with an active campaign.
    pub async fn poll_once(&self) {
        let campaigns = match self.store.list_active_campaigns().await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "Detector could not list active campaigns");
                return;
            }
        };

        let account_ids: HashSet<Uuid> = campaigns.iter().map(|c| c.account_id).collect();

        // Accounts poll concurrently; each failure is its own log line.
        let polls = account_ids.into_iter().map(|account_id| async move {
            match self.store.get_account(account_id).await {
                Ok(Some(account)) => {
                    if let Err(e) = self.poll_account(&account).await {
                        error!(account = %account.address, error = %e, "Mailbox poll failed");
                    }
                }
                Ok(None) => warn!(account_id = %account_id, "Campaign references missing account"),
                Err(e) => error!(account_id = %account_id, error = %e, "Account lookup failed"),
            }
        });
        join_all(polls).await;
    }

    /// Poll one account's inbox past its watermark.
    async fn poll_account(&self, account: &Account) -> Result<(), Error> {
        let Some(cursor) = self.store.get_watermark(account.id, DEFAULT_FOLDER).await? else {
            // First observation: start from the mailbox's current
            // position, never from historical mail.
            let cursor = self.poller.current_cursor(account, DEFAULT_FOLDER).await?;
            self.store
                .set_watermark(account.id, DEFAULT_FOLDER, &cursor)
                .await?;
            info!(account = %account.address, cursor = %cursor, "Watermark bootstrapped");
            return Ok(());
        };

        let messages = match tokio::time::timeout(
            self.config.external_call_timeout,
            self.poller.fetch_since(account, DEFAULT_FOLDER, &cursor),
        )
        .await
        {
            Err(_) => {
                return Err(
                    crate::error::MailError::Timeout(self.config.external_call_timeout).into(),
                );
            }
            Ok(result) => result?,
        };

        if messages.is_empty() {
            return Ok(());
        }
        debug!(account = %account.address, count = messages.len(), "Fetched inbound messages");

        for raw in messages {
            let cursor = raw.cursor.clone();
            if let Err(e) = self.process_message(account, raw).await {
                warn!(account = %account.address, cursor = %cursor, error = %e, "Message processing failed");
            }
            // Advance unconditionally so a poison message cannot wedge
            // the mailbox.
            self.store
                .set_watermark(account.id, DEFAULT_FOLDER, &cursor)
                .await?;
        }

        Ok(())
    }

    /// Handle one fetched message end to end.
    async fn process_message(&self, account: &Account, raw: RawInbound) -> Result<(), Error> {
        let Some(email) = parse_inbound(&raw.raw) else {
            debug!(cursor = %raw.cursor, "Unparseable message skipped");
            return Ok(());
        };

        // Our own outbound copies show up in some mailbox setups.
        if email.sender == account.address {
            return Ok(());
        }

        let Some(mut lead) = self
            .store
            .find_lead_by_sender(account.id, &email.sender)
            .await?
        else {
            debug!(sender = %email.sender, "No lead for sender");
            return Ok(());
        };
        let Some(campaign) = self.store.get_campaign(lead.campaign_id).await? else {
            return Ok(());
        };

        let inbound = StoredInbound::new(
            email.external_id.clone(),
            account.id,
            DEFAULT_FOLDER,
            &email.sender,
            email.subject.clone(),
            email.body.clone(),
            email.received_at,
        );
        self.store.insert_inbound(&inbound).await?;

        // The message is kept for the thread either way, but only an
        // active campaign reacts to it.
        if campaign.status != CampaignStatus::Active {
            return Ok(());
        }

        // First detected reply flips the lead and counts once; later
        // messages in the thread change neither.
        if lead.transition_to(LeadStatus::Replied) {
            lead.replied_at = Some(Utc::now());
            self.store.update_lead(&lead).await?;
            self.store
                .increment_stat(campaign.id, StatField::Replied, 1)
                .await?;
            info!(campaign_id = %campaign.id, lead_id = %lead.id, "Reply detected");
        }

        let Some(category) = self.classifier.classify(&email.body).await else {
            // Classifier unavailable: the message stays uncategorized,
            // detection itself already succeeded.
            return Ok(());
        };

        // The insert may have been a duplicate no-op; categorize
        // whichever row actually represents the latest message.
        let mut target = self
            .store
            .latest_inbound_by_sender(account.id, DEFAULT_FOLDER, &email.sender)
            .await?
            .unwrap_or(inbound);
        self.store.set_inbound_category(target.id, category).await?;
        target.category = Some(category);

        if category.do_not_contact() {
            if lead.transition_to(LeadStatus::OptedOut) {
                self.store.update_lead(&lead).await?;
                info!(lead_id = %lead.id, category = category.as_str(), "Lead opted out");
            }
            return Ok(());
        }

        if campaign.auto_reply_enabled
            && category == campaign.positive_category
            && lead.status == LeadStatus::Replied
        {
            match self
                .auto_reply
                .reply_to_inbound(&campaign, &lead, &target)
                .await
            {
                Ok(true) => {}
                Ok(false) => debug!(lead_id = %lead.id, "Auto-reply produced no text"),
                Err(e) => warn!(lead_id = %lead.id, error = %e, "Auto-reply failed"),
            }
        }

        Ok(())
    }
}

/// Spawn the detector loop. Returns the task handle and a shutdown flag.
pub fn spawn_reply_detector(detector: Arc<ReplyDetector>) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);
    let interval = detector.config.detector_interval;

    let handle = tokio::spawn(async move {
        info!("Reply detector started (interval: {}s)", interval.as_secs());

        let mut tick = tokio::time::interval(interval);

        // First tick fires immediately
        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Reply detector shutting down");
                return;
            }

            detector.poll_once().await;
        }
    });

    (handle, shutdown_flag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LexicalContextIndex;
    use crate::error::{LlmError, MailError};
    use crate::llm::{LlmProvider, ReplyGenerator};
    use crate::mail::MailRelay;
    use crate::model::{Campaign, CampaignStatus, Lead, Schedule, Step};
    use crate::store::LibSqlBackend;
    use async_trait::async_trait;
    use chrono::Weekday;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedPoller {
        start_cursor: String,
        messages: Mutex<Vec<RawInbound>>,
    }

    #[async_trait]
    impl MailboxPoller for ScriptedPoller {
        async fn current_cursor(
            &self,
            _account: &Account,
            _folder: &str,
        ) -> Result<String, MailError> {
            Ok(self.start_cursor.clone())
        }

        async fn fetch_since(
            &self,
            _account: &Account,
            _folder: &str,
            cursor: &str,
        ) -> Result<Vec<RawInbound>, MailError> {
            let messages = self.messages.lock().unwrap();
            Ok(messages
                .iter()
                .filter(|m| m.cursor.as_str() > cursor)
                .cloned()
                .collect())
        }
    }

    struct FixedLlm(Result<String, ()>);

    #[async_trait]
    impl LlmProvider for FixedLlm {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
            self.0.clone().map_err(|_| LlmError::RequestFailed {
                provider: "fake".into(),
                reason: "down".into(),
            })
        }

        fn model_name(&self) -> &str {
            "fake"
        }
    }

    struct RecordingRelay {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MailRelay for RecordingRelay {
        async fn send(
            &self,
            _account: &Account,
            to: &str,
            subject: &str,
            _body: &str,
        ) -> Result<(), MailError> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    fn raw_message(cursor: &str, from: &str, subject: &str, body: &str) -> RawInbound {
        let raw = format!(
            "From: {from}\r\nTo: me@example.com\r\nSubject: {subject}\r\n\
             Message-ID: <{cursor}@example.com>\r\nDate: Mon, 2 Feb 2026 10:00:00 +0000\r\n\
             Content-Type: text/plain\r\n\r\n{body}"
        );
        RawInbound {
            cursor: cursor.to_string(),
            raw: raw.into_bytes(),
        }
    }

    struct Fixture {
        detector: ReplyDetector,
        poller: Arc<ScriptedPoller>,
        relay: Arc<RecordingRelay>,
        store: Arc<dyn Store>,
        campaign: Campaign,
        account: Account,
    }

    async fn fixture(classifier_output: Result<&str, ()>, auto_reply: bool) -> Fixture {
        let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_memory().await.unwrap());

        let account = Account::new("owner", "me@example.com");
        store.insert_account(&account).await.unwrap();

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
        let mut campaign = Campaign::new("owner", "drip", account.id, steps, schedule);
        campaign.status = CampaignStatus::Active;
        campaign.auto_reply_enabled = auto_reply;
        store.insert_campaign(&campaign).await.unwrap();

        let poller = Arc::new(ScriptedPoller {
            start_cursor: "0000".into(),
            messages: Mutex::new(Vec::new()),
        });
        let relay = Arc::new(RecordingRelay {
            sent: Mutex::new(Vec::new()),
        });

        let classify_llm: Arc<dyn LlmProvider> = Arc::new(FixedLlm(
            classifier_output.map(String::from),
        ));
        let classifier = Arc::new(Classifier::new(classify_llm, Duration::from_secs(5)));

        let generator = ReplyGenerator::new(
            Arc::new(FixedLlm(Ok("Great, here is more detail.".into()))),
            Duration::from_secs(5),
        );
        let context = Arc::new(LexicalContextIndex::new(Arc::clone(&store)));
        let auto_reply_engine = Arc::new(AutoReplyEngine::new(
            Arc::clone(&store),
            relay.clone(),
            generator,
            context,
            EngineConfig::default(),
        ));

        let detector = ReplyDetector::new(
            Arc::clone(&store),
            poller.clone(),
            classifier,
            auto_reply_engine,
            EngineConfig::default(),
        );

        Fixture {
            detector,
            poller,
            relay,
            store,
            campaign,
            account,
        }
    }

    async fn contacted_lead(f: &Fixture, email: &str) -> Lead {
        let mut lead = Lead::new(f.campaign.id, email);
        lead.status = LeadStatus::Contacted;
        lead.current_step = 0;
        lead.last_contacted_at = Some(Utc::now());
        f.store.insert_lead(&lead).await.unwrap();
        lead
    }

    #[tokio::test]
    async fn first_poll_bootstraps_watermark_without_processing() {
        let f = fixture(Ok("Interested"), false).await;
        contacted_lead(&f, "alice@x.com").await;
        f.poller
            .messages
            .lock()
            .unwrap()
            .push(raw_message("0001", "alice@x.com", "Re: Hello", "old mail"));

        f.detector.poll_once().await;

        // Watermark lands at the mailbox's current position; the
        // pre-existing message is never touched.
        let mark = f
            .store
            .get_watermark(f.account.id, DEFAULT_FOLDER)
            .await
            .unwrap();
        assert_eq!(mark.as_deref(), Some("0000"));
        let lead = f
            .store
            .find_lead_by_sender(f.account.id, "alice@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lead.status, LeadStatus::Contacted);
    }

    #[tokio::test]
    async fn reply_flips_lead_and_counts_once() {
        let f = fixture(Ok("Other"), false).await;
        let lead = contacted_lead(&f, "alice@x.com").await;

        f.detector.poll_once().await; // bootstrap
        f.poller
            .messages
            .lock()
            .unwrap()
            .push(raw_message("0001", "alice@x.com", "Re: Hello", "Tell me more"));
        f.detector.poll_once().await;

        let lead = f.store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Replied);
        assert!(lead.replied_at.is_some());

        let campaign = f.store.get_campaign(f.campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.stats.replied, 1);

        // A second message in the thread does not count again.
        f.poller
            .messages
            .lock()
            .unwrap()
            .push(raw_message("0002", "alice@x.com", "Re: Hello", "One more thing"));
        f.detector.poll_once().await;

        let campaign = f.store.get_campaign(f.campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.stats.replied, 1);
        let mark = f
            .store
            .get_watermark(f.account.id, DEFAULT_FOLDER)
            .await
            .unwrap();
        assert_eq!(mark.as_deref(), Some("0002"));

        let thread = f
            .store
            .list_inbound_by_sender(f.account.id, "alice@x.com")
            .await
            .unwrap();
        assert_eq!(thread.len(), 2);
    }

    #[tokio::test]
    async fn negative_classification_opts_lead_out() {
        let f = fixture(Ok("Not Interested"), true).await;
        let lead = contacted_lead(&f, "bob@x.com").await;

        f.detector.poll_once().await;
        f.poller
            .messages
            .lock()
            .unwrap()
            .push(raw_message("0001", "bob@x.com", "Re: Hello", "Please stop"));
        f.detector.poll_once().await;

        let lead = f.store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::OptedOut);
        // Do-not-contact never auto-replies, even with auto-reply on.
        assert!(f.relay.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn positive_classification_triggers_auto_reply() {
        let f = fixture(Ok("Interested"), true).await;
        let lead = contacted_lead(&f, "carol@x.com").await;

        f.detector.poll_once().await;
        f.poller
            .messages
            .lock()
            .unwrap()
            .push(raw_message("0001", "carol@x.com", "Re: Hello", "Sounds great"));
        f.detector.poll_once().await;

        let sent = f.relay.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "carol@x.com");
        assert_eq!(sent[0].1, "Re: Hello");
        drop(sent);

        let lead = f.store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Responded);
    }

    #[tokio::test]
    async fn auto_reply_disabled_leaves_lead_replied() {
        let f = fixture(Ok("Interested"), false).await;
        let lead = contacted_lead(&f, "dave@x.com").await;

        f.detector.poll_once().await;
        f.poller
            .messages
            .lock()
            .unwrap()
            .push(raw_message("0001", "dave@x.com", "Re: Hello", "Sounds great"));
        f.detector.poll_once().await;

        assert!(f.relay.sent.lock().unwrap().is_empty());
        let lead = f.store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Replied);
    }

    #[tokio::test]
    async fn classifier_outage_still_detects_reply() {
        let f = fixture(Err(()), true).await;
        let lead = contacted_lead(&f, "erin@x.com").await;

        f.detector.poll_once().await;
        f.poller
            .messages
            .lock()
            .unwrap()
            .push(raw_message("0001", "erin@x.com", "Re: Hello", "Interested!"));
        f.detector.poll_once().await;

        let lead = f.store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Replied);
        let stored = f
            .store
            .latest_inbound_by_sender(f.account.id, DEFAULT_FOLDER, "erin@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.category, None);
        // No auto-reply without a category.
        assert!(f.relay.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unmatched_sender_still_advances_watermark() {
        let f = fixture(Ok("Other"), false).await;
        contacted_lead(&f, "alice@x.com").await;

        f.detector.poll_once().await;
        f.poller
            .messages
            .lock()
            .unwrap()
            .push(raw_message("0001", "stranger@x.com", "Hi", "Who are you?"));
        f.detector.poll_once().await;

        let mark = f
            .store
            .get_watermark(f.account.id, DEFAULT_FOLDER)
            .await
            .unwrap();
        assert_eq!(mark.as_deref(), Some("0001"));
        let thread = f
            .store
            .list_inbound_by_sender(f.account.id, "stranger@x.com")
            .await
            .unwrap();
        assert!(thread.is_empty());
    }

    #[tokio::test]
    async fn paused_campaign_keeps_message_but_not_the_reply() {
        let f = fixture(Ok("Interested"), true).await;

        // Second campaign on the same account, paused, owning the lead.
        let mut paused = Campaign::new(
            "owner",
            "paused drip",
            f.account.id,
            f.campaign.steps.clone(),
            f.campaign.schedule.clone(),
        );
        paused.status = CampaignStatus::Paused;
        f.store.insert_campaign(&paused).await.unwrap();
        let mut lead = Lead::new(paused.id, "frank@x.com");
        lead.status = LeadStatus::Contacted;
        lead.current_step = 0;
        f.store.insert_lead(&lead).await.unwrap();

        f.detector.poll_once().await;
        f.poller
            .messages
            .lock()
            .unwrap()
            .push(raw_message("0001", "frank@x.com", "Re: Hello", "Sounds great"));
        f.detector.poll_once().await;

        let thread = f
            .store
            .list_inbound_by_sender(f.account.id, "frank@x.com")
            .await
            .unwrap();
        assert_eq!(thread.len(), 1);

        let lead = f.store.get_lead(lead.id).await.unwrap().unwrap();
        assert_eq!(lead.status, LeadStatus::Contacted);
        let paused = f.store.get_campaign(paused.id).await.unwrap().unwrap();
        assert_eq!(paused.stats.replied, 0);
        assert!(f.relay.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn own_address_is_ignored() {
        let f = fixture(Ok("Interested"), true).await;
        contacted_lead(&f, "alice@x.com").await;

        f.detector.poll_once().await;
        f.poller
            .messages
            .lock()
            .unwrap()
            .push(raw_message("0001", "me@example.com", "Re: Hello", "my own copy"));
        f.detector.poll_once().await;

        let thread = f
            .store
            .list_inbound_by_sender(f.account.id, "me@example.com")
            .await
            .unwrap();
        assert!(thread.is_empty());
        let mark = f
            .store
            .get_watermark(f.account.id, DEFAULT_FOLDER)
            .await
            .unwrap();
        assert_eq!(mark.as_deref(), Some("0001"));
    }
}
