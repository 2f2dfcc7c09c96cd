// src/oracle/rerank.rs
//! Fine rank: the oracle scores the coarse-ranked top of each channel on
//! relevance/impact/urgency. Batched under a token budget, decoded with the
//! resilient decoder, and degrading to coarse order when the oracle gives
//! nothing usable. Prompt text is supplied by the caller.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::ingest::types::Item;
use crate::oracle::client::batch_by_token_budget;
use crate::oracle::decode::decode_records;
use crate::oracle::{Oracle, OracleClient, OracleRequest};

/// Builds the oracle prompt for one batch of items in one channel.
pub type PromptFn = dyn Fn(&[Item], &str) -> String + Send + Sync;

#[derive(Debug, Clone)]
pub struct FineRankConfig {
    /// Token budget per oracle request.
    pub batch_budget: usize,
    pub timeout: Duration,
    pub max_tokens: u32,
    /// Kept per channel after reranking.
    pub top_per_channel: usize,
    /// Channels processed concurrently.
    pub channel_workers: usize,
}

impl Default for FineRankConfig {
    fn default() -> Self {
        Self {
            batch_budget: 60_000,
            timeout: Duration::from_secs(120),
            max_tokens: 4096,
            top_per_channel: 10,
            channel_workers: 4,
        }
    }
}

/// One decoded fine-rank record. Ids are batch-local; the ranker adds the
/// batch offset back.
#[derive(Debug, Deserialize)]
struct RankRecord {
    #[serde(default)]
    id: usize,
    #[serde(default)]
    relevance: f64,
    #[serde(default)]
    impact: f64,
    #[serde(default)]
    urgency: f64,
    #[serde(default)]
    total: f64,
}

pub struct FineRanker<O: Oracle> {
    client: Arc<OracleClient<O>>,
    config: FineRankConfig,
}

impl<O: Oracle + 'static> FineRanker<O> {
    pub fn new(client: OracleClient<O>, config: FineRankConfig) -> Self {
        Self {
            client: Arc::new(client),
            config,
        }
    }

    /// Rerank the whole pool: split by channel, process channels with a
    /// small worker cap, concatenate in channel order.
    pub async fn rerank(&self, items: Vec<Item>, prompt: Arc<PromptFn>) -> Vec<Item> {
        let mut by_channel: BTreeMap<String, Vec<Item>> = BTreeMap::new();
        for item in items {
            by_channel.entry(item.channel.clone()).or_default().push(item);
        }

        let sem = Arc::new(Semaphore::new(self.config.channel_workers.max(1)));
        let mut set: JoinSet<(String, Vec<Item>)> = JoinSet::new();
        for (channel, channel_items) in by_channel {
            let client = Arc::clone(&self.client);
            let config = self.config.clone();
            let prompt = Arc::clone(&prompt);
            let sem = Arc::clone(&sem);
            set.spawn(async move {
                let Ok(_permit) = sem.acquire().await else {
                    return (channel, channel_items);
                };
                let ranked =
                    rerank_channel(&client, &config, channel_items, &channel, prompt.as_ref())
                        .await;
                (channel, ranked)
            });
        }

        let mut per_channel: BTreeMap<String, Vec<Item>> = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((channel, ranked)) => {
                    per_channel.insert(channel, ranked);
                }
                Err(e) => warn!(error = ?e, "fine-rank channel task panicked"),
            }
        }
        per_channel.into_values().flatten().collect()
    }

    /// Rerank a single channel's items.
    pub async fn rerank_channel(
        &self,
        items: Vec<Item>,
        channel: &str,
        prompt: &PromptFn,
    ) -> Vec<Item> {
        rerank_channel(&self.client, &self.config, items, channel, prompt).await
    }
}

async fn rerank_channel<O: Oracle>(
    client: &OracleClient<O>,
    config: &FineRankConfig,
    items: Vec<Item>,
    channel: &str,
    prompt: &PromptFn,
) -> Vec<Item> {
    if items.is_empty() {
        return items;
    }

    let batches = batch_by_token_budget(&items, config.batch_budget);
    let mut scored: Vec<(usize, RankRecord)> = Vec::new();
    let mut offset = 0usize;
    for (batch_idx, batch) in batches.iter().enumerate() {
        let text = prompt(batch, channel);
        let request = OracleRequest::new(text, config.max_tokens);
        match client.call_request(&request, config.timeout).await {
            Ok(raw) => {
                for value in decode_records(&raw) {
                    match serde_json::from_value::<RankRecord>(value) {
                        Ok(record) if record.id < batch.len() => {
                            scored.push((record.id + offset, record));
                        }
                        Ok(record) => {
                            warn!(channel, batch_idx, id = record.id, "fine-rank id out of range")
                        }
                        Err(e) => warn!(channel, batch_idx, error = %e, "bad fine-rank record"),
                    }
                }
            }
            Err(e) => {
                warn!(channel, batch_idx, error = %e, "fine-rank batch failed");
            }
        }
        offset += batch.len();
    }

    if scored.is_empty() {
        // Degrade to coarse order rather than dropping the channel.
        warn!(channel, "fine rank yielded nothing, keeping coarse order");
        let mut fallback = items;
        fallback.truncate(config.top_per_channel);
        return fallback;
    }

    scored.sort_by(|a, b| {
        b.1.total
            .partial_cmp(&a.1.total)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut pool: Vec<Option<Item>> = items.into_iter().map(Some).collect();
    let mut out = Vec::new();
    for (idx, record) in scored {
        let Some(slot) = pool.get_mut(idx) else { continue };
        let Some(mut item) = slot.take() else { continue };
        item.metadata.insert(
            "fine_rank".into(),
            json!({
                "relevance": record.relevance,
                "impact": record.impact,
                "urgency": record.urgency,
                "total": record.total,
            }),
        );
        out.push(item);
        if out.len() >= config.top_per_channel {
            break;
        }
    }
    info!(channel, kept = out.len(), "fine rank complete");
    out
}
