// src/ingest/types.rs
use anyhow::Result;

/// One feed item as delivered by the source, before normalization.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    /// Raw published string (RFC 2822 for RSS, RFC 3339 for Atom).
    pub published: String,
    /// HTML-stripped summary.
    pub summary: String,
}

/// Per-query news retrieval. Calls are awaited one at a time by the pipeline.
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, query: &str) -> Result<Vec<FeedEntry>>;
    fn name(&self) -> &'static str;
}
