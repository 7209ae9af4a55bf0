//! Campaign context retrieval for reply generation.
//!
//! [`ContextIndex`] is the seam for a real vector store; the default
//! implementation ranks persisted snippets by token overlap, which is
//! deterministic and good enough for the top-K ≈ 3 snippets the
//! generator consumes.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::Store;

/// Retrieval interface for campaign-scoped context snippets.
#[async_trait]
pub trait ContextIndex: Send + Sync {
    async fn upsert(&self, campaign_id: Uuid, text: &str) -> Result<(), StoreError>;

    /// Top-K snippets ranked by relevance to `text`.
    async fn query(
        &self,
        campaign_id: Uuid,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<String>, StoreError>;
}

/// Store-backed index with lexical (token-overlap) ranking.
pub struct LexicalContextIndex {
    store: Arc<dyn Store>,
}

impl LexicalContextIndex {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_string())
        .collect()
}

fn overlap_score(query: &HashSet<String>, snippet: &str) -> usize {
    tokenize(snippet).intersection(query).count()
}

#[async_trait]
impl ContextIndex for LexicalContextIndex {
    async fn upsert(&self, campaign_id: Uuid, text: &str) -> Result<(), StoreError> {
        self.store.insert_context_snippet(campaign_id, text).await
    }

    async fn query(
        &self,
        campaign_id: Uuid,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<String>, StoreError> {
        let snippets = self.store.list_context_snippets(campaign_id).await?;
        let query = tokenize(text);

        // Stable sort keeps insertion order for equal scores.
        let mut scored: Vec<(usize, String)> = snippets
            .into_iter()
            .map(|s| (overlap_score(&query, &s), s))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored.into_iter().take(top_k).map(|(_, s)| s).collect())
    }
}
