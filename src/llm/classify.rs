//! Inbound reply classifier.
//!
//! Maps free-text replies onto the closed [`Category`] label set.
//! Failures and timeouts degrade to "uncategorized" (`None`) so the
//! reply-detection loop never aborts on a classifier problem.

use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::LlmError;
use crate::llm::LlmProvider;
use crate::model::Category;

const SYSTEM_PROMPT: &str = "You label inbound email replies for an outreach tool. \
    Answer with exactly one label from the provided list and nothing else.";

/// Quota backoff window applied when the provider rate-limits us and
/// gives no retry-after hint.
const DEFAULT_QUOTA_BACKOFF: Duration = Duration::from_secs(15 * 60);

/// Rate-limit state owned by the classifier instance.
///
/// An explicit, injectable object (expiry timestamp + accessors) rather
/// than process-wide mutable state, so it can be inspected and tested
/// in isolation.
#[derive(Debug, Default)]
pub struct QuotaState {
    exhausted_until: RwLock<Option<DateTime<Utc>>>,
}

impl QuotaState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether classification should be skipped right now.
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        match *self.exhausted_until.read().expect("quota lock poisoned") {
            Some(until) => now < until,
            None => false,
        }
    }

    /// Mark the quota exhausted until `now + backoff`.
    pub fn exhaust_for(&self, now: DateTime<Utc>, backoff: Duration) {
        let until = now + chrono::Duration::from_std(backoff).unwrap_or(chrono::Duration::zero());
        *self.exhausted_until.write().expect("quota lock poisoned") = Some(until);
    }

    pub fn exhausted_until(&self) -> Option<DateTime<Utc>> {
        *self.exhausted_until.read().expect("quota lock poisoned")
    }

    pub fn clear(&self) {
        *self.exhausted_until.write().expect("quota lock poisoned") = None;
    }
}

/// LLM-backed reply classifier with bounded timeout and quota tracking.
pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
    quota: QuotaState,
    timeout: Duration,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self {
            llm,
            quota: QuotaState::new(),
            timeout,
        }
    }

    pub fn quota(&self) -> &QuotaState {
        &self.quota
    }

    /// Classify a reply body. `None` means uncategorized: quota
    /// exhausted, provider failure, timeout, or unparseable output.
    pub async fn classify(&self, text: &str) -> Option<Category> {
        let now = Utc::now();
        if self.quota.is_exhausted(now) {
            return None;
        }

        let labels: Vec<&str> = Category::all().iter().map(|c| c.as_str()).collect();
        let prompt = format!(
            "Labels: {}\n\nReply:\n{}\n\nLabel:",
            labels.join(", "),
            text.chars().take(2000).collect::<String>()
        );

        let result = tokio::time::timeout(self.timeout, self.llm.complete(SYSTEM_PROMPT, &prompt))
            .await;

        match result {
            Err(_) => {
                warn!(timeout = ?self.timeout, "Classifier timed out");
                None
            }
            Ok(Err(LlmError::RateLimited { retry_after, .. })) => {
                let backoff = retry_after.unwrap_or(DEFAULT_QUOTA_BACKOFF);
                warn!(backoff = ?backoff, "Classifier quota exhausted");
                self.quota.exhaust_for(Utc::now(), backoff);
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Classification failed");
                None
            }
            Ok(Ok(response)) => parse_label(&response),
        }
    }
}

/// Parse the model's output against the closed label set.
fn parse_label(response: &str) -> Option<Category> {
    let first_line = response.lines().find(|l| !l.trim().is_empty())?;
    if let Ok(category) = first_line.parse::<Category>() {
        return Some(category);
    }
    // Fall back to a substring scan for chatty models. Longer labels
    // first so "Not Interested" wins over "Interested".
    let lower = response.to_lowercase();
    let mut labels: Vec<Category> = Category::all().to_vec();
    labels.sort_by_key(|c| std::cmp::Reverse(c.as_str().len()));
    labels
        .into_iter()
        .find(|c| lower.contains(&c.as_str().to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeProvider {
        responses: Mutex<Vec<Result<String, LlmError>>>,
    }

    impl FakeProvider {
        fn new(responses: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for FakeProvider {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok("Other".into()))
        }

        fn model_name(&self) -> &str {
            "fake"
        }
    }

    #[tokio::test]
    async fn classifies_clean_label() {
        let provider = FakeProvider::new(vec![Ok("Interested".into())]);
        let classifier = Classifier::new(provider, Duration::from_secs(5));
        assert_eq!(classifier.classify("yes!").await, Some(Category::Interested));
    }

    #[tokio::test]
    async fn chatty_output_still_parses() {
        let provider =
            FakeProvider::new(vec![Ok("The label is: Not Interested, clearly.".into())]);
        let classifier = Classifier::new(provider, Duration::from_secs(5));
        assert_eq!(
            classifier.classify("no thanks").await,
            Some(Category::NotInterested)
        );
    }

    #[tokio::test]
    async fn provider_error_degrades_to_none() {
        let provider = FakeProvider::new(vec![Err(LlmError::RequestFailed {
            provider: "fake".into(),
            reason: "boom".into(),
        })]);
        let classifier = Classifier::new(provider, Duration::from_secs(5));
        assert_eq!(classifier.classify("hello").await, None);
    }

    #[tokio::test]
    async fn rate_limit_exhausts_quota_and_short_circuits() {
        let provider = FakeProvider::new(vec![
            Ok("Interested".into()),
            Err(LlmError::RateLimited {
                provider: "fake".into(),
                retry_after: Some(Duration::from_secs(60)),
            }),
        ]);
        let classifier = Classifier::new(provider, Duration::from_secs(5));

        assert_eq!(classifier.classify("first").await, None);
        assert!(classifier.quota().is_exhausted(Utc::now()));

        // Second call never reaches the provider while exhausted.
        assert_eq!(classifier.classify("second").await, None);

        classifier.quota().clear();
        assert_eq!(classifier.classify("third").await, Some(Category::Interested));
    }

    #[test]
    fn quota_expires_on_its_own() {
        let quota = QuotaState::new();
        let now = Utc::now();
        quota.exhaust_for(now, Duration::from_secs(60));

        assert!(quota.is_exhausted(now));
        assert!(!quota.is_exhausted(now + chrono::Duration::seconds(61)));
    }

    #[test]
    fn parse_label_prefers_first_line() {
        assert_eq!(parse_label("Spam\nsome rationale"), Some(Category::Spam));
        assert_eq!(parse_label("  \nOut of Office"), Some(Category::OutOfOffice));
        assert_eq!(parse_label("nothing useful"), None);
    }
}
