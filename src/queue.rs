//! Dispatch queue: at-least-once send-task queue with retry backoff.
//!
//! Scheduling decisions are decoupled from execution: the scheduler
//! pushes [`DispatchTask`]s, the worker pool pops them. Failed tasks
//! are re-enqueued with exponential backoff until the attempt budget is
//! spent. Completed and dead tasks are kept in bounded histories.
//!
//! The queue itself is in-process; durability across restarts comes
//! from the scheduler re-deriving due work from lead state, which the
//! workers' idempotency guards make safe to replay.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bounded history size for completed and dead tasks.
const HISTORY_LIMIT: usize = 100;

/// One queued unit of work: "send step S to lead R for campaign C".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchTask {
    pub campaign_id: Uuid,
    pub lead_id: Uuid,
    pub step_index: i32,
    /// Delivery attempts made so far.
    pub attempt: u32,
}

impl DispatchTask {
    pub fn new(campaign_id: Uuid, lead_id: Uuid, step_index: i32) -> Self {
        Self {
            campaign_id,
            lead_id,
            step_index,
            attempt: 0,
        }
    }
}

/// Retry budget and backoff curve for failed deliveries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based), with jitter so
    /// concurrent failures do not retry in lockstep.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self.base_delay * 2u32.saturating_pow(exp);
        let jitter_ms = rand::thread_rng().gen_range(0..250);
        base + Duration::from_millis(jitter_ms)
    }
}

/// At-least-once work queue consumed by the send worker pool.
pub struct DispatchQueue {
    pending: RwLock<VecDeque<DispatchTask>>,
    completed: RwLock<VecDeque<DispatchTask>>,
    dead: RwLock<VecDeque<DispatchTask>>,
    policy: RetryPolicy,
    notify: Notify,
    closed: AtomicBool,
}

impl DispatchQueue {
    pub fn new(policy: RetryPolicy) -> Arc<Self> {
        Arc::new(Self {
            pending: RwLock::new(VecDeque::new()),
            completed: RwLock::new(VecDeque::new()),
            dead: RwLock::new(VecDeque::new()),
            policy,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Enqueue a task. An identical pending (lead, step) pair is
    /// dropped; the scheduler may observe the same due lead on
    /// consecutive ticks before a worker gets to it.
    pub async fn push(&self, task: DispatchTask) {
        {
            let mut pending = self.pending.write().await;
            let duplicate = pending
                .iter()
                .any(|t| t.lead_id == task.lead_id && t.step_index == task.step_index);
            if duplicate {
                debug!(lead_id = %task.lead_id, step = task.step_index, "Dropping duplicate task");
                return;
            }
            pending.push_back(task);
        }
        self.notify.notify_one();
    }

    /// Pull the next task, waiting until one is available.
    ///
    /// Returns `None` once the queue has been closed and drained.
    pub async fn pop(&self) -> Option<DispatchTask> {
        loop {
            {
                let mut pending = self.pending.write().await;
                if let Some(mut task) = pending.pop_front() {
                    task.attempt += 1;
                    return Some(task);
                }
            }
            if self.closed.load(Ordering::Relaxed) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Record a successful (or no-op) execution.
    pub async fn complete(&self, task: DispatchTask) {
        let mut completed = self.completed.write().await;
        completed.push_back(task);
        while completed.len() > HISTORY_LIMIT {
            completed.pop_front();
        }
    }

    /// Schedule a retry for a failed task.
    ///
    /// Returns the backoff delay, or `None` when the attempt budget is
    /// spent; the caller then treats the failure as final.
    pub async fn schedule_retry(self: &Arc<Self>, task: DispatchTask) -> Option<Duration> {
        if task.attempt >= self.policy.max_attempts {
            warn!(
                lead_id = %task.lead_id,
                step = task.step_index,
                attempts = task.attempt,
                "Task retries exhausted"
            );
            let mut dead = self.dead.write().await;
            dead.push_back(task);
            while dead.len() > HISTORY_LIMIT {
                dead.pop_front();
            }
            return None;
        }

        let delay = self.policy.delay_for(task.attempt);
        info!(
            lead_id = %task.lead_id,
            step = task.step_index,
            attempt = task.attempt,
            delay_ms = delay.as_millis() as u64,
            "Retrying task after backoff"
        );

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut pending = queue.pending.write().await;
                pending.push_back(task);
            }
            queue.notify.notify_one();
        });

        Some(delay)
    }

    /// Stop the queue: pending tasks drain, then `pop` returns `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.notify.notify_waiters();
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.read().await.len()
    }

    pub async fn completed_len(&self) -> usize {
        self.completed.read().await.len()
    }

    pub async fn dead_len(&self) -> usize {
        self.dead.read().await.len()
    }
}
