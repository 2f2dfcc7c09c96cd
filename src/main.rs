//! Daily brief pipeline, binary entrypoint.
//!
//! One invocation runs the full pipeline once: fetch every configured
//! source, rank and deduplicate, optionally fine-rank through the oracle,
//! detect trends, then persist the seen-set. Intended to be driven by cron.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use daybrief::ingest::adapters::hackernews::HackerNewsAdapter;
use daybrief::ingest::adapters::rss::RssAdapter;
use daybrief::oracle::rerank::PromptFn;
use daybrief::rank::coarse::CoarseScorer;
use daybrief::rank::dedup::Deduplicator;
use daybrief::{
    AnthropicOracle, DedupState, FineRankConfig, FineRanker, Item, OracleClient, PipelineConfig,
    PipelineRunner, RankingPipeline, RefineStage, SourceAdapter, TrendDetector,
};

const CONFIG_PATH: &str = "config/daybrief.toml";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("daybrief=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

fn build_adapters(config: &PipelineConfig) -> Vec<Arc<dyn SourceAdapter>> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    for group in &config.rss {
        adapters.push(Arc::new(RssAdapter::new(
            group.channel.clone(),
            group.feeds.clone(),
        )));
    }
    if config.hackernews_enabled {
        adapters.push(Arc::new(HackerNewsAdapter::new("tech")));
    }
    adapters
}

fn rank_prompt(batch: &[Item], channel: &str) -> String {
    let mut lines = vec![format!(
        "Score each {channel} headline 0-10 on relevance, impact and urgency. \
         Reply with a JSON array only: \
         [{{\"id\":0,\"relevance\":0,\"impact\":0,\"urgency\":0,\"total\":0}}]"
    )];
    for (i, item) in batch.iter().enumerate() {
        lines.push(format!("{i}. [{}] {}", item.display_source(), item.title));
    }
    lines.join("\n")
}

/// Fine rank is wired in only when an API key is present; without it the
/// pipeline runs coarse-only.
fn refine_stage(config: &PipelineConfig) -> Option<RefineStage> {
    let key = std::env::var("ANTHROPIC_API_KEY").ok()?;
    let oracle = AnthropicOracle::with_key(key, None);
    let client = OracleClient::new(oracle, config.oracle_max_retries);
    let ranker = Arc::new(FineRanker::new(
        client,
        FineRankConfig {
            batch_budget: config.oracle_batch_budget,
            ..FineRankConfig::default()
        },
    ));
    let prompt: Arc<PromptFn> = Arc::new(rank_prompt);
    Some(Box::new(move |items| {
        let ranker = Arc::clone(&ranker);
        let prompt = Arc::clone(&prompt);
        Box::pin(async move { ranker.rerank(items, prompt).await })
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = PipelineConfig::load_or_default(CONFIG_PATH);
    let adapters = build_adapters(&config);
    let mut state = DedupState::load(config.state_file.clone(), config.dedup_window_days);

    let pipeline = RankingPipeline::new(
        CoarseScorer::with_seed_config(),
        Deduplicator::new(config.dedup_threshold),
    );
    let trend = TrendDetector::new(
        config.trend_history_dir.clone(),
        config.trend_lookback_days,
        config.trend_top_k,
    );

    let mut runner = PipelineRunner::new(pipeline, trend, config.clone());
    if let Some(refine) = refine_stage(&config) {
        runner = runner.with_refine_stage(refine);
    } else {
        tracing::info!("no ANTHROPIC_API_KEY, running coarse rank only");
    }

    let report = runner.run_once(&adapters, &mut state).await?;

    for item in report.items.iter().take(20) {
        println!("{:>7.2}  [{}] {}", item.score, item.display_source(), item.title);
    }
    for record in &report.trends {
        println!(
            "trend {:?} {} ({} today, {:+.1}%)",
            record.trend, record.keyword, record.today_count, record.change_pct
        );
    }
    if !report.completed {
        tracing::warn!("run hit its deadline; output above is partial");
    }
    Ok(())
}
