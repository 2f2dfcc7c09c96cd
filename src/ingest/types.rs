// src/ingest/types.rs
//! Canonical item model and the source adapter contract.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum title length kept on an item.
pub const TITLE_MAX_CHARS: usize = 120;

/// One normalized unit of content from any source.
///
/// Core fields are fixed at construction; `metadata`, `score` and the
/// dedup annotations are written by downstream stages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: String,
    pub source: String,
    /// Classification bucket, e.g. "ai", "crypto", "community".
    pub channel: String,
    pub title: String,
    pub text: String,
    pub url: String,
    pub author: String,
    pub published_at: DateTime<Utc>,

    /// Open key-value bag for adapter- and stage-specific facts
    /// (engagement counts, feed name, fine-rank sub-scores).
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub filtered: bool,
    /// Display names of merged duplicate sources, set by the deduplicator.
    #[serde(default)]
    pub related_sources: Vec<String>,
    /// Number of sources reporting the same event (1 = unique).
    #[serde(default)]
    pub coverage_count: u32,
}

impl Item {
    /// Build an item with a deterministic id derived from
    /// (source, url, publish instant). The id never changes afterwards
    /// and is the sole cross-run dedup key.
    pub fn new(
        source: impl Into<String>,
        channel: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
        url: impl Into<String>,
        author: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        let source = source.into();
        let url = url.into();
        let mut title: String = title.into();
        if title.chars().count() > TITLE_MAX_CHARS {
            title = title.chars().take(TITLE_MAX_CHARS).collect();
        }
        let id = Self::generate_id(&source, &url, published_at);
        Self {
            id,
            source,
            channel: channel.into(),
            title,
            text: text.into(),
            url,
            author: author.into(),
            published_at,
            metadata: Map::new(),
            score: 0.0,
            filtered: false,
            related_sources: Vec::new(),
            coverage_count: 0,
        }
    }

    /// `{source}:{hex12}` where hex12 is the truncated SHA-256 of
    /// source, url and RFC 3339 publish timestamp.
    pub fn generate_id(source: &str, url: &str, published_at: DateTime<Utc>) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update(b":");
        hasher.update(url.as_bytes());
        hasher.update(b":");
        hasher.update(published_at.to_rfc3339().as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(12);
        for b in digest.iter().take(6) {
            use std::fmt::Write as _;
            let _ = write!(&mut hex, "{:02x}", b);
        }
        format!("{source}:{hex}")
    }

    /// Display name used in reports and authority lookup: the feed name
    /// recorded by the adapter when present, otherwise the adapter id.
    pub fn display_source(&self) -> &str {
        self.metadata
            .get("feed_name")
            .or_else(|| self.metadata.get("feed_title"))
            .and_then(|v| v.as_str())
            .unwrap_or(&self.source)
    }

    /// Numeric metadata accessor tolerating both int and float encodings.
    pub fn metadata_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(|v| v.as_f64())
    }
}

/// Capability contract for one content source. The pipeline never depends
/// on a specific adapter's transport.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Fetch items, optionally bounded to the last `hours_ago` hours.
    async fn fetch(&self, hours_ago: Option<u32>) -> Result<Vec<Item>>;

    /// Stable adapter identity, used for logging and as `Item::source`.
    fn source_name(&self) -> &str;

    fn enabled(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn id_is_deterministic() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap();
        let a = Item::new("hn", "community", "T", "body", "https://x.io/a", "me", ts);
        let b = Item::new("hn", "community", "T", "body", "https://x.io/a", "me", ts);
        assert_eq!(a.id, b.id);
        assert!(a.id.starts_with("hn:"));
    }

    #[test]
    fn id_changes_with_any_key_component() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap();
        let base = Item::new("hn", "community", "T", "b", "https://x.io/a", "me", ts);
        let other_url = Item::new("hn", "community", "T", "b", "https://x.io/b", "me", ts);
        let other_src = Item::new("rss", "community", "T", "b", "https://x.io/a", "me", ts);
        let other_ts = Item::new(
            "hn",
            "community",
            "T",
            "b",
            "https://x.io/a",
            "me",
            ts + chrono::Duration::seconds(1),
        );
        assert_ne!(base.id, other_url.id);
        assert_ne!(base.id, other_src.id);
        assert_ne!(base.id, other_ts.id);
    }

    #[test]
    fn title_is_capped() {
        let ts = Utc::now();
        let long = "x".repeat(500);
        let item = Item::new("rss", "ai", long, "", "https://x.io", "", ts);
        assert_eq!(item.title.chars().count(), TITLE_MAX_CHARS);
    }

    #[test]
    fn display_source_prefers_feed_name() {
        let ts = Utc::now();
        let mut item = Item::new("rss_ai", "ai", "T", "", "https://x.io", "", ts);
        assert_eq!(item.display_source(), "rss_ai");
        item.metadata
            .insert("feed_name".into(), "MIT Tech Review".into());
        assert_eq!(item.display_source(), "MIT Tech Review");
    }
}
