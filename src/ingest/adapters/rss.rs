// src/ingest/adapters/rss.rs
//! Generic RSS adapter: one adapter instance covers a named list of feeds
//! for a single channel. Individual feed failures are logged and skipped so
//! one dead feed does not sink the whole adapter.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};
use tracing::warn;

use crate::ingest::clean_text;
use crate::ingest::types::{Item, SourceAdapter};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    items: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    author: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    let unix = OffsetDateTime::parse(ts, &Rfc2822)
        .ok()?
        .to_offset(UtcOffset::UTC)
        .unix_timestamp();
    Utc.timestamp_opt(unix, 0).single()
}

/// One feed within an [`RssAdapter`].
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
}

pub struct RssAdapter {
    source: String,
    channel: String,
    feeds: Vec<FeedSpec>,
    max_per_feed: usize,
    enabled: bool,
    mode: Mode,
}

enum Mode {
    Http(reqwest::Client),
    /// Feed name -> raw XML, for tests and offline runs.
    Fixture(HashMap<String, String>),
}

impl RssAdapter {
    pub fn new(channel: impl Into<String>, feeds: Vec<FeedSpec>) -> Self {
        let channel = channel.into();
        Self {
            source: format!("rss_{channel}"),
            channel,
            feeds,
            max_per_feed: 30,
            enabled: true,
            mode: Mode::Http(reqwest::Client::new()),
        }
    }

    pub fn from_fixtures(
        channel: impl Into<String>,
        fixtures: Vec<(FeedSpec, String)>,
    ) -> Self {
        let channel = channel.into();
        let mut feeds = Vec::with_capacity(fixtures.len());
        let mut bodies = HashMap::new();
        for (spec, xml) in fixtures {
            bodies.insert(spec.name.clone(), xml);
            feeds.push(spec);
        }
        Self {
            source: format!("rss_{channel}"),
            channel,
            feeds,
            max_per_feed: 30,
            enabled: true,
            mode: Mode::Fixture(bodies),
        }
    }

    pub fn with_max_per_feed(mut self, n: usize) -> Self {
        self.max_per_feed = n;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn parse_feed(
        &self,
        feed: &FeedSpec,
        xml: &str,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<Vec<Item>> {
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss =
            from_str(&xml_clean).with_context(|| format!("parsing rss xml for {}", feed.name))?;
        let feed_title = rss.channel.title.unwrap_or_else(|| feed.name.clone());

        let mut out = Vec::new();
        for entry in rss.channel.items.into_iter().take(self.max_per_feed) {
            let published_at = entry
                .pub_date
                .as_deref()
                .and_then(parse_rfc2822)
                .unwrap_or_else(Utc::now);
            if let Some(cutoff) = cutoff {
                if published_at < cutoff {
                    continue;
                }
            }

            let url = match entry.link {
                Some(u) if !u.is_empty() => u,
                _ => continue,
            };
            let title = clean_text(entry.title.as_deref().unwrap_or("No title"));
            let text = clean_text(entry.description.as_deref().unwrap_or_default());
            let author = entry.author.unwrap_or_else(|| feed.name.clone());

            let mut item = Item::new(
                &self.source,
                &self.channel,
                title,
                text,
                url,
                author,
                published_at,
            );
            item.metadata.insert("feed_name".into(), feed.name.clone().into());
            item.metadata.insert("feed_title".into(), feed_title.clone().into());
            if !entry.categories.is_empty() {
                item.metadata.insert("tags".into(), entry.categories.clone().into());
            }
            out.push(item);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl SourceAdapter for RssAdapter {
    async fn fetch(&self, hours_ago: Option<u32>) -> Result<Vec<Item>> {
        let cutoff = hours_ago.map(|h| Utc::now() - chrono::Duration::hours(i64::from(h)));

        let mut all = Vec::new();
        for feed in &self.feeds {
            let body = match &self.mode {
                Mode::Fixture(bodies) => match bodies.get(&feed.name) {
                    Some(xml) => xml.clone(),
                    None => continue,
                },
                Mode::Http(client) => {
                    match client.get(&feed.url).send().await {
                        Ok(resp) => match resp.text().await {
                            Ok(body) => body,
                            Err(e) => {
                                warn!(feed = %feed.name, error = ?e, "reading feed body failed");
                                continue;
                            }
                        },
                        Err(e) => {
                            warn!(feed = %feed.name, error = ?e, "feed request failed");
                            continue;
                        }
                    }
                }
            };
            match self.parse_feed(feed, &body, cutoff) {
                Ok(mut items) => all.append(&mut items),
                Err(e) => warn!(feed = %feed.name, error = ?e, "feed parse failed"),
            }
        }
        Ok(all)
    }

    fn source_name(&self) -> &str {
        &self.source
    }

    fn enabled(&self) -> bool {
        self.enabled
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
