//! Orchestration engine: the background loops and the auto-reply surface.
//!
//! - [`scheduler`]: scans active campaigns and enqueues due sends
//! - [`worker`]: the send worker pool draining the dispatch queue
//! - [`detector`]: polls mailboxes and advances leads on replies
//! - [`autoreply`]: generated responses, bulk and operator-reviewed

pub mod autoreply;
pub mod detector;
pub mod scheduler;
pub mod worker;

pub use autoreply::{AutoReplyEngine, BulkMarkOutcome, BulkReplyOutcome, DraftReply};
pub use detector::{ReplyDetector, spawn_reply_detector};
pub use scheduler::{Scheduler, spawn_scheduler};
pub use worker::{TaskOutcome, spawn_send_workers};
