// tests/pipeline_e2e.rs
//! Full pipeline run over fixture adapters: fetch, rank, cross-source
//! merge, trend snapshot and state persistence.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use daybrief::ingest::adapters::hackernews::HackerNewsAdapter;
use daybrief::ingest::adapters::rss::{FeedSpec, RssAdapter};
use daybrief::{
    DedupState, PipelineConfig, PipelineRunner, RankingPipeline, SourceAdapter, TrendDetector,
};

fn feed_xml(pub_date: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>AI Wire</title>
    <item>
      <title>Anthropic launches Claude agent toolkit</title>
      <link>https://example.com/claude-toolkit?utm_source=rss</link>
      <pubDate>{pub_date}</pubDate>
      <description>Agent building blocks for production use.</description>
    </item>
    <item>
      <title>Bitcoin drifts sideways over the weekend</title>
      <link>https://example.com/btc-weekend</link>
      <pubDate>{pub_date}</pubDate>
      <description>Quiet markets.</description>
    </item>
  </channel>
</rss>"#
    )
}

fn fixture_adapters(now: chrono::DateTime<Utc>) -> Vec<Arc<dyn SourceAdapter>> {
    let pub_date = (now - Duration::hours(3)).to_rfc2822();
    let rss = RssAdapter::from_fixtures(
        "ai",
        vec![(
            FeedSpec {
                name: "AI Wire".into(),
                url: "https://example.com/feed.xml".into(),
            },
            feed_xml(&pub_date),
        )],
    );
    // Same story as the feed, different URL, so only title clustering can
    // merge them.
    let hn = HackerNewsAdapter::from_fixtures(
        "ai",
        vec![json!({
            "id": 99,
            "type": "story",
            "title": "Anthropic launches Claude agent toolkit",
            "url": "https://news.example.com/mirror/claude-toolkit",
            "by": "carol",
            "score": 420,
            "descendants": 95,
            "time": (now - Duration::hours(2)).timestamp()
        })],
    );
    vec![Arc::new(rss), Arc::new(hn)]
}

fn runner(dir: &std::path::Path) -> (PipelineRunner, PipelineConfig) {
    let config = PipelineConfig {
        lookback_hours: None,
        trend_history_dir: dir.join("trend"),
        state_file: dir.join("state.json"),
        ..PipelineConfig::default()
    };
    let runner = PipelineRunner::new(
        RankingPipeline::with_seed_config(),
        TrendDetector::new(dir.join("trend"), 7, 20),
        config.clone(),
    );
    (runner, config)
}

#[tokio::test]
async fn cross_source_story_merges_with_coverage() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, _) = runner(dir.path());
    let adapters = fixture_adapters(Utc::now());
    let mut state = DedupState::in_memory(7);

    let report = runner.run_once(&adapters, &mut state).await.unwrap();
    assert!(report.completed);
    assert_eq!(report.fetched, 3);
    // Two feed stories plus the mirror collapse to two.
    assert_eq!(report.items.len(), 2);

    let merged = report
        .items
        .iter()
        .find(|i| i.title.contains("Claude agent toolkit"))
        .expect("merged story survives");
    assert_eq!(merged.coverage_count, 2);
    assert_eq!(merged.related_sources.len(), 1);
    assert!(merged.filtered);

    // The Claude story matches the highest-weight category and carries
    // engagement; it must outrank the bitcoin filler.
    assert_eq!(report.items[0].title, "Anthropic launches Claude agent toolkit");
    assert!(report.items[0].score > report.items[1].score);
}

#[tokio::test]
async fn state_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, config) = runner(dir.path());
    let adapters = fixture_adapters(Utc::now());

    let mut state = DedupState::load(config.state_file.clone(), config.dedup_window_days);
    let first = runner.run_once(&adapters, &mut state).await.unwrap();
    assert_eq!(first.fetched, 3);

    // Fresh load from disk, as a new process would do.
    let mut reloaded = DedupState::load(config.state_file.clone(), config.dedup_window_days);
    assert_eq!(reloaded.len(), 3);
    let second = runner.run_once(&adapters, &mut reloaded).await.unwrap();
    assert_eq!(second.fetched, 0);
    assert!(second.items.is_empty());
}

#[tokio::test]
async fn trend_snapshot_lands_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, _) = runner(dir.path());
    let adapters = fixture_adapters(Utc::now());
    let mut state = DedupState::in_memory(7);

    let report = runner.run_once(&adapters, &mut state).await.unwrap();
    assert!(!report.trends.is_empty());

    let expected = dir
        .path()
        .join("trend")
        .join(format!("{}.json", Utc::now().date_naive().format("%Y-%m-%d")));
    assert!(expected.exists());
}
