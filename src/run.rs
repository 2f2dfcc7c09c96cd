// src/run.rs
//! One pipeline run: fetch, coarse rank and dedup, optional fine rank,
//! trend detection, state save. The seen-set is persisted only after a
//! fully successful run, so a mid-run failure never marks items "seen"
//! that were never delivered downstream.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use tokio::time::Instant;
use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::ingest::state::DedupState;
use crate::ingest::types::{Item, SourceAdapter};
use crate::ingest::ParallelFetcher;
use crate::rank::RankingPipeline;
use crate::trend::{extract_keywords, TrendDetector, TrendRecord};

/// Optional refinement stage (fine rank via the oracle), injected so the
/// runner stays independent of the oracle transport.
pub type RefineStage =
    Box<dyn Fn(Vec<Item>) -> Pin<Box<dyn Future<Output = Vec<Item>> + Send>> + Send + Sync>;

/// What one run produced. `completed == false` means the global deadline
/// expired: earlier stage outputs are preserved, later stages were skipped
/// and the seen-set was not saved.
#[derive(Debug, Default)]
pub struct RunReport {
    pub fetched: usize,
    pub ranked: usize,
    pub items: Vec<Item>,
    pub trends: Vec<TrendRecord>,
    pub evicted: usize,
    pub completed: bool,
}

pub struct PipelineRunner {
    fetcher: ParallelFetcher,
    pipeline: RankingPipeline,
    trend: TrendDetector,
    refine: Option<RefineStage>,
    config: PipelineConfig,
}

impl PipelineRunner {
    pub fn new(pipeline: RankingPipeline, trend: TrendDetector, config: PipelineConfig) -> Self {
        let fetcher = ParallelFetcher::new(
            Duration::from_secs(config.fetch_timeout_secs),
            config.fetch_concurrency,
        );
        Self {
            fetcher,
            pipeline,
            trend,
            refine: None,
            config,
        }
    }

    pub fn with_refine_stage(mut self, refine: RefineStage) -> Self {
        self.refine = Some(refine);
        self
    }

    /// Execute one run. Only configuration errors are fatal; adapter and
    /// oracle failures degrade, a deadline expiry yields an incomplete
    /// report.
    pub async fn run_once(
        &self,
        adapters: &[Arc<dyn SourceAdapter>],
        state: &mut DedupState,
    ) -> Result<RunReport> {
        if !adapters.iter().any(|a| a.enabled()) {
            bail!("no enabled source adapters configured");
        }

        let deadline = self
            .config
            .run_deadline_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let expired = |stage: &str| -> bool {
            let hit = deadline.is_some_and(|d| Instant::now() >= d);
            if hit {
                error!(stage, "pipeline deadline expired, skipping remaining stages");
            }
            hit
        };

        let mut report = RunReport::default();

        // Stage 1: concurrent fetch + seen-set filtering.
        let fresh = self
            .fetcher
            .fetch_all(adapters, self.config.lookback_hours, state)
            .await;
        report.fetched = fresh.len();
        if expired("fetch") {
            return Ok(report);
        }

        // Stage 2: coarse rank + dedup.
        let ranked = self.pipeline.process(fresh, self.config.top_n);
        report.ranked = ranked.len();
        report.items = ranked;
        if expired("rank") {
            return Ok(report);
        }

        // Stage 3: fine rank, when an oracle stage is wired in.
        if let Some(refine) = &self.refine {
            report.items = refine(std::mem::take(&mut report.items)).await;
            if expired("fine_rank") {
                return Ok(report);
            }
        }

        // Stage 4: trend detection + unconditional snapshot.
        let today = Utc::now().date_naive();
        let counts = extract_keywords(&report.items);
        let history = self.trend.load_history(today);
        report.trends = self.trend.detect(&counts, &history, &report.items);
        if let Err(e) = self.trend.save_snapshot(today, &counts) {
            error!(error = ?e, "failed to write trend snapshot");
        }
        if expired("trend") {
            return Ok(report);
        }

        // Stage 5: persist the seen-set, with window eviction.
        report.evicted = state.save()?;
        report.completed = true;
        info!(
            fetched = report.fetched,
            kept = report.items.len(),
            trends = report.trends.len(),
            evicted = report.evicted,
            "pipeline run complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::Item;
    use anyhow::Result;
    use chrono::Duration as ChronoDuration;

    struct StaticAdapter {
        name: &'static str,
        items: Vec<Item>,
        enabled: bool,
    }

    #[async_trait::async_trait]
    impl SourceAdapter for StaticAdapter {
        async fn fetch(&self, _hours_ago: Option<u32>) -> Result<Vec<Item>> {
            Ok(self.items.clone())
        }
        fn source_name(&self) -> &str {
            self.name
        }
        fn enabled(&self) -> bool {
            self.enabled
        }
    }

    fn runner(dir: &std::path::Path) -> PipelineRunner {
        let config = PipelineConfig {
            trend_history_dir: dir.join("trend"),
            ..PipelineConfig::default()
        };
        PipelineRunner::new(
            RankingPipeline::with_seed_config(),
            TrendDetector::new(dir.join("trend"), 7, 20),
            config,
        )
    }

    #[tokio::test]
    async fn run_fails_fast_without_enabled_adapters() {
        let dir = tempfile::tempdir().unwrap();
        let r = runner(dir.path());
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(StaticAdapter {
            name: "off",
            items: vec![],
            enabled: false,
        })];
        let mut state = DedupState::in_memory(7);
        assert!(r.run_once(&adapters, &mut state).await.is_err());
    }

    #[tokio::test]
    async fn completed_run_saves_state_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let r = runner(dir.path());
        let item = Item::new(
            "rss_ai",
            "ai",
            "Claude agent news roundup",
            "",
            "https://x.io/1",
            "",
            Utc::now() - ChronoDuration::hours(1),
        );
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(StaticAdapter {
            name: "rss_ai",
            items: vec![item],
            enabled: true,
        })];
        let mut state = DedupState::in_memory(7);
        let report = r.run_once(&adapters, &mut state).await.unwrap();
        assert!(report.completed);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.items.len(), 1);
        assert!(state.len() == 1);
        // Snapshot written for today.
        let snap_dir = dir.path().join("trend");
        assert_eq!(std::fs::read_dir(snap_dir).unwrap().count(), 1);
        // Everything is new on the first day.
        assert!(report.trends.iter().all(|t| t.trend == crate::trend::Trend::New));
    }

    #[tokio::test]
    async fn second_run_sees_nothing_new() {
        let dir = tempfile::tempdir().unwrap();
        let r = runner(dir.path());
        let item = Item::new(
            "rss_ai",
            "ai",
            "Claude agent news roundup",
            "",
            "https://x.io/1",
            "",
            Utc::now() - ChronoDuration::hours(1),
        );
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(StaticAdapter {
            name: "rss_ai",
            items: vec![item],
            enabled: true,
        })];
        let mut state = DedupState::in_memory(7);
        r.run_once(&adapters, &mut state).await.unwrap();
        let second = r.run_once(&adapters, &mut state).await.unwrap();
        assert_eq!(second.fetched, 0);
        assert!(second.items.is_empty());
    }
}
