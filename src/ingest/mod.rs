// src/ingest/mod.rs
pub mod adapters;
pub mod state;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::ingest::state::DedupState;
use crate::ingest::types::{Item, SourceAdapter};

/// One-time metrics registration (so series show up for any exporter).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fetch_items_total", "Items returned by adapters before dedup.");
        describe_counter!("fetch_new_total", "Items kept after seen-set filtering.");
        describe_counter!(
            "fetch_seen_skipped_total",
            "Items dropped because their id was already in the seen-set."
        );
        describe_counter!("fetch_adapter_errors_total", "Adapter fetch errors and timeouts.");
        describe_gauge!("fetch_last_run_ts", "Unix ts when the fetch layer last ran.");
    });
}

/// Normalize body text: decode HTML entities, strip tags, collapse
/// whitespace. Bodies are capped at 1500 chars.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }
    out
}

/// Concurrent fetch layer: one task per adapter, per-task timeout, failures
/// isolated. Seen-set filtering and marking happen strictly in the calling
/// task as adapter results complete, so `DedupState` needs no locking.
pub struct ParallelFetcher {
    timeout: Duration,
    concurrency: usize,
}

impl Default for ParallelFetcher {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            concurrency: 8,
        }
    }
}

impl ParallelFetcher {
    pub fn new(timeout: Duration, concurrency: usize) -> Self {
        Self {
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch from all enabled adapters and return only items not already in
    /// the seen-set. New ids are marked seen immediately, so two adapters
    /// observing the same item in one run cannot both emit it. The state is
    /// *not* persisted here; the run orchestrator saves once per successful
    /// run.
    pub async fn fetch_all(
        &self,
        adapters: &[Arc<dyn SourceAdapter>],
        hours_ago: Option<u32>,
        state: &mut DedupState,
    ) -> Vec<Item> {
        ensure_metrics_described();

        let enabled: Vec<Arc<dyn SourceAdapter>> = adapters
            .iter()
            .filter(|a| a.enabled())
            .cloned()
            .collect();
        info!(adapters = enabled.len(), ?hours_ago, "fetching sources");

        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut set: JoinSet<(String, Option<Vec<Item>>)> = JoinSet::new();
        for adapter in enabled {
            let sem = Arc::clone(&sem);
            let timeout = self.timeout;
            set.spawn(async move {
                let name = adapter.source_name().to_string();
                // Closed only when the JoinSet is dropped, which aborts us anyway.
                let Ok(_permit) = sem.acquire().await else {
                    return (name, None);
                };
                match tokio::time::timeout(timeout, adapter.fetch(hours_ago)).await {
                    Ok(Ok(items)) => (name, Some(items)),
                    Ok(Err(e)) => {
                        warn!(source = %name, error = ?e, "adapter fetch failed");
                        counter!("fetch_adapter_errors_total").increment(1);
                        (name, None)
                    }
                    Err(_) => {
                        warn!(source = %name, timeout_secs = timeout.as_secs(), "adapter timed out");
                        counter!("fetch_adapter_errors_total").increment(1);
                        (name, None)
                    }
                }
            });
        }

        let mut fresh = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (name, items) = match joined {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = ?e, "adapter task panicked");
                    counter!("fetch_adapter_errors_total").increment(1);
                    continue;
                }
            };
            let Some(items) = items else { continue };

            let fetched = items.len();
            counter!("fetch_items_total").increment(fetched as u64);

            let mut kept = 0usize;
            for item in items {
                if state.is_seen(&item.id) {
                    counter!("fetch_seen_skipped_total").increment(1);
                    continue;
                }
                state.mark_seen_now(&item.id);
                kept += 1;
                fresh.push(item);
            }
            counter!("fetch_new_total").increment(kept as u64);
            info!(source = %name, new = kept, fetched, "adapter done");
        }

        gauge!("fetch_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        info!(total_new = fresh.len(), "fetch complete");
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_strips_tags_and_entities() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b></p>  ";
        assert_eq!(clean_text(s), "Hello, world");
    }

    #[test]
    fn clean_text_caps_length() {
        let s = "a".repeat(5000);
        assert_eq!(clean_text(&s).chars().count(), 1500);
    }
}
