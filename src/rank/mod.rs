// src/rank/mod.rs
pub mod coarse;
pub mod dedup;
pub mod profile;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tracing::info;

use crate::ingest::types::Item;
use crate::rank::coarse::CoarseScorer;
use crate::rank::dedup::Deduplicator;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("rank_candidates_total", "Items entering the ranking pipeline.");
        describe_counter!("rank_kept_total", "Items surviving the top-N cut and dedup.");
        describe_counter!("rank_dedup_removed_total", "Items merged away by the deduplicator.");
    });
}

/// Ranking orchestration: coarse score, top-N cut, then dedup.
///
/// Truncating before deduplication bounds the O(n²) clustering cost at the
/// price of occasionally losing a low-score duplicate of a high-score item;
/// the representative is chosen by score anyway.
pub struct RankingPipeline {
    scorer: CoarseScorer,
    deduplicator: Deduplicator,
}

impl RankingPipeline {
    pub fn new(scorer: CoarseScorer, deduplicator: Deduplicator) -> Self {
        Self {
            scorer,
            deduplicator,
        }
    }

    pub fn with_seed_config() -> Self {
        Self::new(CoarseScorer::with_seed_config(), Deduplicator::default())
    }

    /// Score, rank and deduplicate the candidate pool, returning the ordered
    /// set handed to the fine-rank stage.
    pub fn process(&self, mut items: Vec<Item>, top_n: usize) -> Vec<Item> {
        ensure_metrics_described();
        let candidates = items.len();
        counter!("rank_candidates_total").increment(candidates as u64);

        for item in &mut items {
            item.score = self.scorer.score(item);
        }
        items.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        items.truncate(top_n);

        if let (Some(hi), Some(lo)) = (items.first(), items.last()) {
            info!(
                candidates,
                top_n,
                hi = hi.score,
                lo = lo.score,
                "coarse rank complete"
            );
        }

        let before_dedup = items.len();
        let mut kept = self.deduplicator.deduplicate(items);
        for item in &mut kept {
            item.filtered = true;
        }
        let removed = before_dedup - kept.len();
        counter!("rank_dedup_removed_total").increment(removed as u64);
        counter!("rank_kept_total").increment(kept.len() as u64);
        info!(kept = kept.len(), removed, "dedup complete");
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Item;
    use chrono::{Duration, Utc};

    fn item(title: &str, url: &str, hours_old: i64) -> Item {
        Item::new(
            "rss_ai",
            "ai",
            title,
            "",
            url,
            "",
            Utc::now() - Duration::hours(hours_old),
        )
    }

    #[test]
    fn orders_by_score_and_truncates() {
        let p = RankingPipeline::with_seed_config();
        let out = p.process(
            vec![
                item("Nothing interesting here", "https://x.io/1", 50),
                item("Claude agent reasoning breakthrough", "https://x.io/2", 3),
                item("Also not much going on", "https://x.io/3", 60),
            ],
            2,
        );
        assert_eq!(out.len(), 2);
        assert!(out[0].score >= out[1].score);
        assert_eq!(out[0].url, "https://x.io/2");
        assert!(out.iter().all(|i| i.filtered));
    }

    #[test]
    fn duplicate_urls_collapse_after_cut() {
        let p = RankingPipeline::with_seed_config();
        let out = p.process(
            vec![
                item("Claude agent news", "https://x.io/a", 3),
                item("Claude agent news", "https://x.io/a/", 3),
            ],
            10,
        );
        assert_eq!(out.len(), 1);
    }
}
