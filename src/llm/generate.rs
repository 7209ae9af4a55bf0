//! Reply generation.
//!
//! Builds a retrieval-augmented prompt from campaign context snippets
//! and the inbound text. Returns `None` on any provider problem;
//! callers count the lead as failed and move on rather than raising.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::llm::LlmProvider;

const SYSTEM_PROMPT: &str = "You write short, professional replies to inbound email on behalf \
    of an outreach campaign owner. Use the provided campaign context when relevant. \
    Output only the reply body, no subject line and no signature placeholders.";

/// LLM-backed reply generator.
pub struct ReplyGenerator {
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl ReplyGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Generate a reply to `inbound_text`. `None` means "no output",
    /// and the caller skips this lead.
    pub async fn generate(
        &self,
        campaign_name: &str,
        context_snippets: &[String],
        inbound_text: &str,
    ) -> Option<String> {
        let prompt = build_prompt(campaign_name, context_snippets, inbound_text);

        match tokio::time::timeout(self.timeout, self.llm.complete(SYSTEM_PROMPT, &prompt)).await {
            Err(_) => {
                warn!(timeout = ?self.timeout, "Reply generation timed out");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Reply generation failed");
                None
            }
            Ok(Ok(text)) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }
}

fn build_prompt(campaign_name: &str, context_snippets: &[String], inbound_text: &str) -> String {
    let mut prompt = format!("Campaign: {campaign_name}\n");
    if !context_snippets.is_empty() {
        prompt.push_str("\nContext:\n");
        for snippet in context_snippets {
            prompt.push_str("- ");
            prompt.push_str(snippet);
            prompt.push('\n');
        }
    }
    prompt.push_str("\nThey wrote:\n");
    prompt.push_str(inbound_text);
    prompt.push_str("\n\nWrite the reply:");
    prompt
}

/// Reply subject for an inbound subject: "Re: " prefixed, but never
/// doubled up.
pub fn reply_subject(original: &str) -> String {
    let trimmed = original.trim();
    if trimmed.to_lowercase().starts_with("re:") {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}
