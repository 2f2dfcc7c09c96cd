// src/rank/profile.rs
//! # Interest profile & source authority
//!
//! Configurable inputs for the coarse scorer:
//!
//! - [`InterestProfile`]: named keyword categories with weights, matched
//!   against title+body.
//! - [`SourceAuthority`]: 0–10 authority scores per display source name,
//!   with a mid default for unknown sources.
//!
//! Both load from JSON and fall back to a built-in seed, so a missing or
//! broken config file never takes the pipeline down.

use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path};

/// One keyword category with its weight.
#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    pub name: String,
    pub weight: f64,
    pub keywords: Vec<String>,
}

/// The reader's interest profile: weighted keyword categories.
#[derive(Debug, Clone, Deserialize)]
pub struct InterestProfile {
    pub categories: Vec<Category>,
}

impl InterestProfile {
    /// Load from a JSON file, falling back to [`InterestProfile::default_seed`].
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| Self::default_seed()),
            Err(_) => Self::default_seed(),
        }
    }

    /// Built-in seed profile: AI core and engineering, crypto/quant,
    /// developer tooling and business news.
    pub fn default_seed() -> Self {
        fn cat(name: &str, weight: f64, kws: &[&str]) -> Category {
            Category {
                name: name.to_string(),
                weight,
                keywords: kws.iter().map(|s| s.to_string()).collect(),
            }
        }
        Self {
            categories: vec![
                cat(
                    "ai_core",
                    2.0,
                    &[
                        "llm", "large language model", "transformer", "gpt", "claude", "gemini",
                        "reasoning", "agent", "rag", "fine-tuning", "rlhf", "multimodal",
                        "diffusion", "openai", "anthropic", "deepseek", "mistral", "scaling law",
                        "inference", "quantization", "moe", "大模型", "推理", "智能体", "微调",
                    ],
                ),
                cat(
                    "ai_engineering",
                    1.8,
                    &[
                        "deployment", "serving", "mlops", "vector database", "embedding",
                        "prompt engineering", "function calling", "tool use", "ai agent",
                        "coding assistant", "copilot", "cursor", "vscode", "ide", "api", "sdk",
                        "framework", "benchmark", "evaluation",
                    ],
                ),
                cat(
                    "crypto_quant",
                    1.8,
                    &[
                        "bitcoin", "ethereum", "btc", "eth", "solana", "defi", "trading",
                        "quantitative", "algorithmic", "arbitrage", "market making", "liquidity",
                        "on-chain", "whale", "polymarket", "prediction market", "perpetual",
                        "futures", "stablecoin", "usdc", "usdt", "layer 2", "rollup", "比特币",
                        "以太坊", "量化", "套利", "链上",
                    ],
                ),
                cat(
                    "tools",
                    1.3,
                    &[
                        "open source", "github", "rust", "python", "typescript", "cli",
                        "terminal", "developer tool", "productivity", "automation",
                        "self-hosted", "homelab",
                    ],
                ),
                cat(
                    "business",
                    1.0,
                    &[
                        "startup", "funding", "acquisition", "ipo", "revenue", "valuation",
                        "series a", "series b", "unicorn",
                    ],
                ),
            ],
        }
    }
}

/// Authority scores per display source name, 0 (unknown blog) to 10
/// (primary/official outlet).
#[derive(Debug, Clone, Deserialize)]
pub struct SourceAuthority {
    #[serde(default = "default_authority")]
    pub default_score: f64,
    #[serde(default)]
    pub scores: HashMap<String, f64>,
}

fn default_authority() -> f64 {
    5.0
}

impl SourceAuthority {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str::<Self>(&s)
                .map(Self::normalized)
                .unwrap_or_else(|_| Self::default_seed()),
            Err(_) => Self::default_seed(),
        }
    }

    /// Lowercase map keys so file entries match the case-insensitive lookup.
    fn normalized(mut self) -> Self {
        self.scores = self
            .scores
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v))
            .collect();
        self
    }

    /// Authority for a display source name; case-insensitive exact match,
    /// default for unknown sources. Clamped to [0, 10].
    pub fn score_for(&self, source: &str) -> f64 {
        let key = source.trim().to_lowercase();
        let score = self.scores.get(&key).copied().unwrap_or(self.default_score);
        score.clamp(0.0, 10.0)
    }

    pub fn default_seed() -> Self {
        let mut scores = HashMap::new();
        for (k, v) in [
            // Official / first-party
            ("openai blog", 10.0),
            ("google ai blog", 10.0),
            ("google deepmind", 10.0),
            ("anthropic", 10.0),
            ("anthropic news", 10.0),
            ("meta engineering", 9.0),
            ("microsoft research", 9.0),
            ("huggingface blog", 9.0),
            ("nvidia ai", 9.0),
            // Research & expert outlets
            ("mit tech review", 9.0),
            ("arxiv", 9.0),
            ("the gradient", 8.0),
            ("simon willison", 8.0),
            // Mainstream tech media
            ("techcrunch", 7.0),
            ("the verge", 7.0),
            ("ars technica", 7.0),
            ("wired", 7.0),
            ("venturebeat ai", 7.0),
            ("infoq", 7.0),
            // Finance / crypto desks
            ("coindesk", 7.0),
            ("cointelegraph", 6.0),
            ("decrypt", 6.0),
            ("wsj markets", 8.0),
            ("financial times", 8.0),
            ("cnbc", 7.0),
            // Community aggregators
            ("hacker news", 7.0),
            ("hackernews", 7.0),
            ("github trending", 7.0),
            // Exchange listing announcements (high-value positional signal)
            ("exchange_listing", 10.0),
            ("binance", 10.0),
            ("upbit", 10.0),
            ("bithumb", 10.0),
            ("coinbase", 9.0),
            ("okx", 9.0),
            ("bybit", 8.0),
        ] {
            scores.insert(k.to_string(), v);
        }
        Self {
            default_score: 5.0,
            scores,
        }
    }
}
