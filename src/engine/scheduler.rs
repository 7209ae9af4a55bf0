//! Campaign scheduler.
//!
//! Each tick scans active campaigns, decides per campaign whether the
//! current instant falls inside its send window, and enqueues a
//! [`DispatchTask`] for every lead whose next step is due. Execution is
//! the worker pool's job; the scheduler only decides.
//!
//! A campaign that errors mid-scan is logged and skipped, the rest of
//! the tick proceeds.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Datelike, Timelike, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::model::{Campaign, Lead, LeadStatus, Schedule};
use crate::queue::{DispatchQueue, DispatchTask};
use crate::store::Store;

pub struct Scheduler {
    store: Arc<dyn Store>,
    queue: Arc<DispatchQueue>,
    config: EngineConfig,
}

impl Scheduler {
    pub fn new(store: Arc<dyn Store>, queue: Arc<DispatchQueue>, config: EngineConfig) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    /// One full scan over all active campaigns.
    pub async fn tick(&self) {
        let now = Utc::now();
        let campaigns = match self.store.list_active_campaigns().await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "Scheduler could not list active campaigns");
                return;
            }
        };

        for campaign in campaigns {
            let campaign_id = campaign.id;
            match self.scan_campaign(&campaign, now).await {
                Ok(0) => {}
                Ok(n) => info!(campaign_id = %campaign_id, enqueued = n, "Scheduler enqueued sends"),
                Err(e) => {
                    error!(campaign_id = %campaign_id, error = %e, "Campaign scan failed, skipping")
                }
            }
        }
    }

    /// Enqueue due sends for one campaign. Returns how many were enqueued.
    async fn scan_campaign(
        &self,
        campaign: &Campaign,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        if !in_send_window(&campaign.schedule, now, self.config.window_tolerance_min) {
            debug!(campaign_id = %campaign.id, "Outside send window");
            return Ok(0);
        }

        let sendable = [LeadStatus::Pending, LeadStatus::Contacted];
        let mut enqueued = 0;
        let mut offset = 0;

        loop {
            let page = self
                .store
                .list_leads_page(campaign.id, &sendable, self.config.lead_page_size, offset)
                .await?;
            let page_len = page.len();

            for lead in page {
                if let Some(step_index) = due_step(campaign, &lead, now) {
                    self.queue
                        .push(DispatchTask::new(campaign.id, lead.id, step_index))
                        .await;
                    enqueued += 1;
                }
            }

            if page_len < self.config.lead_page_size {
                break;
            }
            offset += page_len;
        }

        Ok(enqueued)
    }
}

/// Whether `now` falls inside the campaign's send window: an allowed
/// weekday in the campaign timezone, within `tolerance_min` minutes of
/// the configured send time.
pub fn in_send_window(schedule: &Schedule, now: DateTime<Utc>, tolerance_min: i64) -> bool {
    let local = now.with_timezone(&schedule.tz());
    if !schedule.send_days.contains(&local.weekday()) {
        return false;
    }

    let minute_of_day = (local.hour() * 60 + local.minute()) as i64;
    let target = (schedule.send_hour * 60 + schedule.send_minute) as i64;
    let diff = (minute_of_day - target).abs();
    diff.min(1440 - diff) <= tolerance_min
}

/// Whether two instants fall on the same calendar day in the campaign
/// timezone. Guards against sending two steps on the same local day
/// even when the configured delay is zero.
pub fn same_local_day(schedule: &Schedule, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    let tz = schedule.tz();
    a.with_timezone(&tz).date_naive() == b.with_timezone(&tz).date_naive()
}

/// The step index due for this lead right now, if any.
///
/// Follow-up delays count elapsed calendar days in the campaign
/// timezone, not exact durations, so a delivery that lands seconds
/// after the window tick cannot push the next step past its due day.
/// A lead that has finished the sequence yields `None` and simply stays
/// `Contacted`.
pub fn due_step(campaign: &Campaign, lead: &Lead, now: DateTime<Utc>) -> Option<i32> {
    if !lead.status.is_sendable() {
        return None;
    }

    let next = lead.current_step + 1;
    let step = campaign.step_by_order(next)?;

    match lead.last_contacted_at {
        // Never contacted: the opening step is due as soon as the window allows.
        None => Some(next),
        Some(last) => {
            if same_local_day(&campaign.schedule, last, now) {
                return None;
            }
            let tz = campaign.schedule.tz();
            let elapsed_days =
                (now.with_timezone(&tz).date_naive() - last.with_timezone(&tz).date_naive())
                    .num_days();
            (elapsed_days >= step.delay_days).then_some(next)
        }
    }
}

/// Spawn the scheduler loop. Returns the task handle and a shutdown flag.
pub fn spawn_scheduler(scheduler: Arc<Scheduler>) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);
    let interval = scheduler.config.scheduler_interval;

    let handle = tokio::spawn(async move {
        info!("Scheduler started (interval: {}s)", interval.as_secs());

        let mut tick = tokio::time::interval(interval);

        // First tick fires immediately
        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Scheduler shutting down");
                return;
            }

            scheduler.tick().await;
        }
    });

    (handle, shutdown_flag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Step;
    use crate::queue::RetryPolicy;
    use crate::store::LibSqlBackend;
    use chrono::{TimeZone, Weekday};
    use uuid::Uuid;

    fn schedule(tz: &str, hour: u32, minute: u32, days: Vec<Weekday>) -> Schedule {
        Schedule {
            timezone: tz.into(),
            send_hour: hour,
            send_minute: minute,
            send_days: days,
        }
    }

    fn campaign_with_steps(steps: Vec<Step>, sched: Schedule) -> Campaign {
        let mut c = Campaign::new("owner", "drip", Uuid::new_v4(), steps, sched);
        c.status = crate::model::CampaignStatus::Active;
        c
    }

    fn step(order: i32, delay_days: i64) -> Step {
        Step {
            order,
            delay_days,
            subject: format!("s{order}"),
            body: "hi {{email}}".into(),
        }
    }

    #[test]
    fn window_accepts_within_tolerance() {
        let sched = schedule("America/New_York", 9, 0, vec![Weekday::Mon]);
        // Monday 2024-01-08 09:05 in New York is 14:05 UTC.
        let now = Utc.with_ymd_and_hms(2024, 1, 8, 14, 5, 0).unwrap();
        assert!(in_send_window(&sched, now, 7));

        // 09:12 local is past the 7-minute tolerance.
        let late = Utc.with_ymd_and_hms(2024, 1, 8, 14, 12, 0).unwrap();
        assert!(!in_send_window(&sched, late, 7));
    }

    #[test]
    fn window_rejects_wrong_weekday() {
        let sched = schedule("UTC", 9, 0, vec![Weekday::Mon, Weekday::Thu]);
        // 2024-01-09 is a Tuesday.
        let now = Utc.with_ymd_and_hms(2024, 1, 9, 9, 0, 0).unwrap();
        assert!(!in_send_window(&sched, now, 7));
    }

    #[test]
    fn window_uses_campaign_timezone_not_utc() {
        let sched = schedule("America/New_York", 9, 0, vec![Weekday::Mon]);
        // 09:00 UTC on Monday is 04:00 in New York, not in window.
        let now = Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap();
        assert!(!in_send_window(&sched, now, 7));
    }

    #[test]
    fn same_local_day_respects_timezone() {
        let sched = schedule("America/New_York", 9, 0, vec![Weekday::Mon]);
        // 03:00 UTC and 14:00 UTC the same day are 22:00 (prev day) and
        // 09:00 local, different local days.
        let a = Utc.with_ymd_and_hms(2024, 1, 8, 3, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 8, 14, 0, 0).unwrap();
        assert!(!same_local_day(&sched, a, b));

        let c = Utc.with_ymd_and_hms(2024, 1, 8, 15, 0, 0).unwrap();
        assert!(same_local_day(&sched, b, c));
    }

    #[test]
    fn pending_lead_is_due_for_step_zero() {
        let sched = schedule("UTC", 9, 0, vec![Weekday::Mon]);
        let c = campaign_with_steps(vec![step(0, 0), step(1, 3)], sched);
        let lead = Lead::new(c.id, "a@x.com");

        let now = Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap();
        assert_eq!(due_step(&c, &lead, now), Some(0));
    }

    #[test]
    fn followup_waits_for_delay() {
        let sched = schedule("UTC", 9, 0, vec![Weekday::Mon, Weekday::Thu]);
        let c = campaign_with_steps(vec![step(0, 0), step(1, 3)], sched);

        let mut lead = Lead::new(c.id, "a@x.com");
        lead.status = LeadStatus::Contacted;
        lead.current_step = 0;
        lead.last_contacted_at = Some(Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap());

        // Two days later: not yet.
        let wed = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
        assert_eq!(due_step(&c, &lead, wed), None);

        // Three days later (Thursday): due.
        let thu = Utc.with_ymd_and_hms(2024, 1, 11, 9, 0, 0).unwrap();
        assert_eq!(due_step(&c, &lead, thu), Some(1));
    }

    #[test]
    fn followup_due_despite_send_jitter() {
        let sched = schedule("UTC", 9, 0, vec![Weekday::Mon, Weekday::Thu]);
        let c = campaign_with_steps(vec![step(0, 0), step(1, 3)], sched);

        let mut lead = Lead::new(c.id, "a@x.com");
        lead.status = LeadStatus::Contacted;
        lead.current_step = 0;
        // Delivery lagged Monday's 09:00 tick by a few seconds.
        lead.last_contacted_at = Some(Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 5).unwrap());

        // Wednesday: two elapsed days, still waiting.
        let wed = Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap();
        assert_eq!(due_step(&c, &lead, wed), None);

        // Thursday's tick fires exactly on the hour, before the full
        // 72 hours have passed. Three calendar days have, so it is due.
        let thu = Utc.with_ymd_and_hms(2024, 1, 11, 9, 0, 0).unwrap();
        assert_eq!(due_step(&c, &lead, thu), Some(1));
    }

    #[test]
    fn zero_delay_followup_skips_same_local_day() {
        let sched = schedule("UTC", 9, 0, vec![Weekday::Mon, Weekday::Tue]);
        let c = campaign_with_steps(vec![step(0, 0), step(1, 0)], sched);

        let mut lead = Lead::new(c.id, "a@x.com");
        lead.status = LeadStatus::Contacted;
        lead.current_step = 0;
        lead.last_contacted_at = Some(Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap());

        // Same local day, even hours later: skipped.
        let later = Utc.with_ymd_and_hms(2024, 1, 8, 21, 0, 0).unwrap();
        assert_eq!(due_step(&c, &lead, later), None);

        // Next day it is due.
        let tue = Utc.with_ymd_and_hms(2024, 1, 9, 9, 0, 0).unwrap();
        assert_eq!(due_step(&c, &lead, tue), Some(1));
    }

    #[test]
    fn completed_sequence_yields_nothing() {
        let sched = schedule("UTC", 9, 0, vec![Weekday::Mon]);
        let c = campaign_with_steps(vec![step(0, 0)], sched);

        let mut lead = Lead::new(c.id, "a@x.com");
        lead.status = LeadStatus::Contacted;
        lead.current_step = 0;
        lead.last_contacted_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());

        let now = Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap();
        assert_eq!(due_step(&c, &lead, now), None);
        assert_eq!(lead.status, LeadStatus::Contacted);
    }

    #[test]
    fn replied_lead_is_never_scheduled() {
        let sched = schedule("UTC", 9, 0, vec![Weekday::Mon]);
        let c = campaign_with_steps(vec![step(0, 0), step(1, 1)], sched);

        let mut lead = Lead::new(c.id, "a@x.com");
        lead.status = LeadStatus::Replied;
        lead.current_step = 0;
        lead.last_contacted_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());

        let now = Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap();
        assert_eq!(due_step(&c, &lead, now), None);
    }

    #[tokio::test]
    async fn scan_enqueues_due_leads_only() {
        let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let queue = DispatchQueue::new(RetryPolicy::default());

        // Window that always matches: every weekday, huge tolerance.
        let sched = Schedule {
            timezone: "UTC".into(),
            send_hour: 0,
            send_minute: 0,
            send_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ],
        };
        let mut c = campaign_with_steps(vec![step(0, 0)], sched);
        c.status = crate::model::CampaignStatus::Active;
        store.insert_campaign(&c).await.unwrap();

        let pending = Lead::new(c.id, "due@x.com");
        store.insert_lead(&pending).await.unwrap();

        let mut done = Lead::new(c.id, "done@x.com");
        done.status = LeadStatus::Contacted;
        done.current_step = 0;
        done.last_contacted_at = Some(Utc::now());
        store.insert_lead(&done).await.unwrap();

        let mut config = EngineConfig::default();
        config.window_tolerance_min = 24 * 60;
        let scheduler = Scheduler::new(Arc::clone(&store), Arc::clone(&queue), config);
        scheduler.tick().await;

        assert_eq!(queue.pending_len().await, 1);
        let task = queue.pop().await.unwrap();
        assert_eq!(task.lead_id, pending.id);
        assert_eq!(task.step_index, 0);
    }
}
