// src/config.rs
//! Pipeline configuration: TOML file with defaults for every knob, so an
//! absent file still yields a runnable pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::ingest::adapters::rss::FeedSpec;

/// One channel's feed list for the RSS adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelFeeds {
    pub channel: String,
    pub feeds: Vec<FeedSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Per-adapter fetch timeout.
    pub fetch_timeout_secs: u64,
    /// Cap on concurrently running adapter tasks.
    pub fetch_concurrency: usize,
    /// Only fetch items from the last N hours (None = adapter default).
    pub lookback_hours: Option<u32>,
    /// Seen-set retention window.
    pub dedup_window_days: u32,
    /// Coarse-rank cut before deduplication.
    pub top_n: usize,
    /// Jaccard threshold for title clustering.
    pub dedup_threshold: f64,
    pub trend_lookback_days: u32,
    pub trend_top_k: usize,
    pub oracle_max_retries: u32,
    pub oracle_batch_budget: usize,
    /// Whole-run deadline; on expiry remaining stages are skipped.
    pub run_deadline_secs: Option<u64>,
    pub state_file: PathBuf,
    pub trend_history_dir: PathBuf,
    /// RSS feeds, grouped by channel.
    pub rss: Vec<ChannelFeeds>,
    pub hackernews_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            fetch_concurrency: 8,
            lookback_hours: Some(24),
            dedup_window_days: 7,
            top_n: 200,
            dedup_threshold: 0.55,
            trend_lookback_days: 7,
            trend_top_k: 20,
            oracle_max_retries: 3,
            oracle_batch_budget: 60_000,
            run_deadline_secs: None,
            state_file: PathBuf::from("data/state.json"),
            trend_history_dir: PathBuf::from("data/trend_history"),
            rss: Vec::new(),
            hackernews_enabled: true,
        }
    }
}

impl PipelineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Load, falling back to defaults when the file is absent or broken.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = ?e, "bad config, using defaults");
                Self::default()
            }
        }
    }
}
