// src/ingest/adapters/hackernews.rs
//! Hacker News adapter over the Firebase API. Keeps top stories above a
//! score floor; upvote/comment counts land in metadata for the engagement
//! factor downstream.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::ingest::clean_text;
use crate::ingest::types::{Item, SourceAdapter};

const API_BASE: &str = "https://hacker-news.firebaseio.com/v0";

#[derive(Debug, Deserialize)]
struct Story {
    id: u64,
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    url: Option<String>,
    by: Option<String>,
    score: Option<i64>,
    descendants: Option<i64>,
    time: Option<i64>,
    text: Option<String>,
}

pub struct HackerNewsAdapter {
    channel: String,
    min_score: i64,
    count: usize,
    enabled: bool,
    mode: Mode,
}

enum Mode {
    Http {
        client: reqwest::Client,
        base_url: String,
    },
    /// Pre-baked story payloads for tests and offline runs.
    Fixture(Vec<serde_json::Value>),
}

impl HackerNewsAdapter {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            min_score: 100,
            count: 20,
            enabled: true,
            mode: Mode::Http {
                client: reqwest::Client::new(),
                base_url: API_BASE.to_string(),
            },
        }
    }

    pub fn from_fixtures(channel: impl Into<String>, stories: Vec<serde_json::Value>) -> Self {
        Self {
            channel: channel.into(),
            min_score: 100,
            count: 20,
            enabled: true,
            mode: Mode::Fixture(stories),
        }
    }

    pub fn with_min_score(mut self, min_score: i64) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn build_item(&self, story: Story, cutoff: Option<DateTime<Utc>>) -> Option<Item> {
        if story.kind.as_deref() != Some("story") {
            return None;
        }
        let score = story.score.unwrap_or(0);
        if score < self.min_score {
            return None;
        }

        let published_at = story
            .time
            .and_then(|t| Utc.timestamp_opt(t, 0).single())
            .unwrap_or_else(Utc::now);
        if let Some(cutoff) = cutoff {
            if published_at < cutoff {
                return None;
            }
        }

        let hn_url = format!("https://news.ycombinator.com/item?id={}", story.id);
        let url = story.url.unwrap_or_else(|| hn_url.clone());
        let comments = story.descendants.unwrap_or(0);
        let body = story.text.as_deref().map(clean_text).unwrap_or_default();

        let mut item = Item::new(
            "hackernews",
            &self.channel,
            story.title.unwrap_or_else(|| "No title".into()),
            body,
            url,
            story.by.unwrap_or_else(|| "unknown".into()),
            published_at,
        );
        item.metadata.insert("upvotes".into(), score.into());
        item.metadata.insert("comments".into(), comments.into());
        item.metadata.insert("hn_id".into(), story.id.into());
        item.metadata.insert("hn_url".into(), hn_url.into());
        Some(item)
    }

    async fn fetch_http(
        &self,
        client: &reqwest::Client,
        base_url: &str,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<Item>> {
        let ids: Vec<u64> = client
            .get(format!("{base_url}/topstories.json"))
            .send()
            .await
            .context("hn topstories request")?
            .json()
            .await
            .context("hn topstories body")?;

        let mut items = Vec::new();
        // Over-fetch a little; the score floor drops some stories.
        for id in ids.into_iter().take(self.count * 2) {
            let story: Story = match client
                .get(format!("{base_url}/item/{id}.json"))
                .send()
                .await
                .and_then(|r| r.error_for_status())
            {
                Ok(resp) => match resp.json().await {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(id, error = ?e, "hn story decode failed");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(id, error = ?e, "hn story request failed");
                    continue;
                }
            };
            if let Some(item) = self.build_item(story, cutoff) {
                items.push(item);
                if items.len() >= self.count {
                    break;
                }
            }
        }
        Ok(items)
    }
}

#[async_trait::async_trait]
impl SourceAdapter for HackerNewsAdapter {
    async fn fetch(&self, hours_ago: Option<u32>) -> Result<Vec<Item>> {
        let cutoff = hours_ago.map(|h| Utc::now() - chrono::Duration::hours(i64::from(h)));
        match &self.mode {
            Mode::Http { client, base_url } => self.fetch_http(client, base_url, cutoff).await,
            Mode::Fixture(stories) => {
                let mut items = Vec::new();
                for raw in stories {
                    let story: Story = serde_json::from_value(raw.clone())
                        .context("decoding fixture story")?;
                    if let Some(item) = self.build_item(story, cutoff) {
                        items.push(item);
                        if items.len() >= self.count {
                            break;
                        }
                    }
                }
                Ok(items)
            }
        }
    }

    fn source_name(&self) -> &str {
        "hackernews"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }
}
