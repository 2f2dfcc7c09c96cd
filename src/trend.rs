// src/trend.rs
//! Cross-day trend detection: today's keyword frequencies against a rolling
//! historical baseline. Snapshots are one JSON file per calendar day,
//! written once and never mutated.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ingest::types::Item;

/// keyword -> occurrence count for one day.
pub type KeywordCounts = HashMap<String, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    // Ordering doubles as report priority.
    Rising,
    New,
    Steady,
    Declining,
}

impl Trend {
    pub fn label(self) -> &'static str {
        match self {
            Trend::Rising => "rising",
            Trend::New => "new",
            Trend::Steady => "steady",
            Trend::Declining => "declining",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendRecord {
    pub keyword: String,
    pub trend: Trend,
    pub today_count: u32,
    pub avg_count: f64,
    pub change_pct: f64,
    /// Up to three example headlines mentioning the keyword.
    pub headlines: Vec<String>,
}

const TREND_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "have", "has", "had", "do",
    "does", "did", "will", "would", "could", "should", "may", "might", "can", "shall", "must",
    "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into", "through",
    "during", "before", "after", "above", "below", "between", "out", "off", "over", "under",
    "again", "further", "then", "once", "here", "there", "when", "where", "why", "how", "all",
    "each", "every", "both", "few", "more", "most", "other", "some", "such", "no", "nor",
    "not", "only", "own", "same", "so", "than", "too", "very", "just", "because", "but",
    "and", "or", "if", "while", "about", "up", "down", "new", "what", "that", "this", "its",
    "it", "your", "their", "our", "my", "his", "her", "who", "which",
];

/// Keywords from one headline: ASCII words of 3+ chars minus stop-words,
/// plus 2-4 character CJK runs.
pub fn headline_keywords(text: &str) -> Vec<String> {
    static RE_WORD: OnceCell<Regex> = OnceCell::new();
    static RE_CJK: OnceCell<Regex> = OnceCell::new();
    let re_word = RE_WORD.get_or_init(|| Regex::new(r"[a-zA-Z]{3,}").unwrap());
    let re_cjk = RE_CJK.get_or_init(|| Regex::new(r"\p{Han}{2,4}").unwrap());

    let lower = text.to_lowercase();
    let mut out: Vec<String> = re_word
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .filter(|w| !TREND_STOP_WORDS.contains(&w.as_str()))
        .collect();
    out.extend(re_cjk.find_iter(text).map(|m| m.as_str().to_string()));
    out
}

/// Keyword frequencies over a set of processed items: headline tokens plus
/// explicit metadata tags.
pub fn extract_keywords(items: &[Item]) -> KeywordCounts {
    let mut counts = KeywordCounts::new();
    for item in items {
        for kw in headline_keywords(&item.title) {
            *counts.entry(kw).or_default() += 1;
        }
        if let Some(tags) = item.metadata.get("tags").and_then(|v| v.as_array()) {
            for tag in tags.iter().filter_map(|t| t.as_str()) {
                let tag = tag.trim().to_lowercase();
                if tag.chars().count() > 1 {
                    *counts.entry(tag).or_default() += 1;
                }
            }
        }
    }
    counts
}

pub struct TrendDetector {
    history_dir: PathBuf,
    lookback_days: u32,
    top_k: usize,
}

impl TrendDetector {
    pub fn new(history_dir: impl Into<PathBuf>, lookback_days: u32, top_k: usize) -> Self {
        Self {
            history_dir: history_dir.into(),
            lookback_days,
            top_k,
        }
    }

    /// Classify each keyword present today against the historical baseline.
    /// Output is sorted by trend priority, then descending |change|, and
    /// truncated to top-K.
    pub fn detect(
        &self,
        today: &KeywordCounts,
        history: &[KeywordCounts],
        items: &[Item],
    ) -> Vec<TrendRecord> {
        let mut records: Vec<TrendRecord> = if history.is_empty() {
            // Nothing to compare against: everything present today is new.
            today
                .iter()
                .map(|(kw, &count)| TrendRecord {
                    keyword: kw.clone(),
                    trend: Trend::New,
                    today_count: count,
                    avg_count: 0.0,
                    change_pct: 100.0,
                    headlines: find_headlines(kw, items),
                })
                .collect()
        } else {
            let mut sums: HashMap<&str, u64> = HashMap::new();
            for day in history {
                for (kw, &count) in day {
                    *sums.entry(kw.as_str()).or_default() += u64::from(count);
                }
            }
            let days = history.len() as f64;

            today
                .iter()
                .map(|(kw, &count)| {
                    let today_count = f64::from(count);
                    let avg = sums.get(kw.as_str()).copied().unwrap_or(0) as f64 / days;
                    let (trend, change_pct) = if avg == 0.0 {
                        (Trend::New, 100.0)
                    } else {
                        let change = (today_count - avg) / avg * 100.0;
                        let trend = if today_count >= 2.0 * avg {
                            Trend::Rising
                        } else if today_count >= 0.8 * avg {
                            Trend::Steady
                        } else {
                            Trend::Declining
                        };
                        (trend, change)
                    };
                    TrendRecord {
                        keyword: kw.clone(),
                        trend,
                        today_count: count,
                        avg_count: (avg * 10.0).round() / 10.0,
                        change_pct: (change_pct * 10.0).round() / 10.0,
                        headlines: find_headlines(kw, items),
                    }
                })
                .collect()
        };

        records.sort_by(|a, b| {
            a.trend.cmp(&b.trend).then(
                b.change_pct
                    .abs()
                    .partial_cmp(&a.change_pct.abs())
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        records.truncate(self.top_k);
        records
    }

    /// Persist today's keyword counts. Always written, independent of
    /// detection, so future runs have a baseline.
    pub fn save_snapshot(&self, date: NaiveDate, counts: &KeywordCounts) -> Result<()> {
        fs::create_dir_all(&self.history_dir).with_context(|| {
            format!("creating trend history dir {}", self.history_dir.display())
        })?;
        let path = self.snapshot_path(date);
        let json = serde_json::to_string_pretty(counts)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Load the previous `lookback_days` snapshots, newest first. Absent
    /// days are skipped; unreadable files are skipped with a warning.
    pub fn load_history(&self, today: NaiveDate) -> Vec<KeywordCounts> {
        let mut out = Vec::new();
        for back in 1..=i64::from(self.lookback_days) {
            let Some(date) = today.checked_sub_days(chrono::Days::new(back as u64)) else {
                break;
            };
            let path = self.snapshot_path(date);
            let Ok(raw) = fs::read_to_string(&path) else {
                continue;
            };
            match serde_json::from_str::<KeywordCounts>(&raw) {
                Ok(counts) => out.push(counts),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping bad trend snapshot"),
            }
        }
        out
    }

    fn snapshot_path(&self, date: NaiveDate) -> PathBuf {
        self.history_dir.join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    pub fn history_dir(&self) -> &Path {
        &self.history_dir
    }
}

fn find_headlines(keyword: &str, items: &[Item]) -> Vec<String> {
    let kw = keyword.to_lowercase();
    items
        .iter()
        .filter(|i| i.title.to_lowercase().contains(&kw) || has_tag(i, &kw))
        .map(|i| i.title.clone())
        .take(3)
        .collect()
}

/// True when `metadata.tags` contains `kw` (already lowercased).
fn has_tag(item: &Item, kw: &str) -> bool {
    item.metadata
        .get("tags")
        .and_then(|v| v.as_array())
        .is_some_and(|tags| {
            tags.iter()
                .filter_map(|t| t.as_str())
                .any(|t| t.trim().to_lowercase() == kw)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn counts(pairs: &[(&str, u32)]) -> KeywordCounts {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn detector() -> TrendDetector {
        TrendDetector::new("unused", 7, 20)
    }

    #[test]
    fn five_times_average_is_rising() {
        let today = counts(&[("claude", 10)]);
        let history: Vec<KeywordCounts> = (0..7).map(|_| counts(&[("claude", 2)])).collect();
        let out = detector().detect(&today, &history, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].trend, Trend::Rising);
        assert_eq!(out[0].change_pct, 400.0);
        assert_eq!(out[0].avg_count, 2.0);
    }

    #[test]
    fn unseen_keyword_is_new() {
        let today = counts(&[("novelword", 3)]);
        let history = vec![counts(&[("claude", 2)])];
        let out = detector().detect(&today, &history, &[]);
        assert_eq!(out[0].trend, Trend::New);
        assert_eq!(out[0].change_pct, 100.0);
    }

    #[test]
    fn no_history_marks_everything_new() {
        let today = counts(&[("a", 1), ("b", 2)]);
        let out = detector().detect(&today, &[], &[]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.trend == Trend::New));
    }

    #[test]
    fn steady_and_declining_bounds() {
        // avg = 10: today 8 is exactly the 0.8 bound (steady), 7 declines.
        let history: Vec<KeywordCounts> =
            (0..5).map(|_| counts(&[("steadyish", 10), ("fading", 10)])).collect();
        let today = counts(&[("steadyish", 8), ("fading", 7)]);
        let out = detector().detect(&today, &history, &[]);
        let by_kw: HashMap<&str, Trend> =
            out.iter().map(|r| (r.keyword.as_str(), r.trend)).collect();
        assert_eq!(by_kw["steadyish"], Trend::Steady);
        assert_eq!(by_kw["fading"], Trend::Declining);
    }

    #[test]
    fn sorted_by_priority_then_magnitude() {
        let history: Vec<KeywordCounts> =
            vec![counts(&[("upalot", 1), ("upsome", 1), ("gone", 10)])];
        let today = counts(&[("upalot", 10), ("upsome", 3), ("fresh", 1), ("gone", 1)]);
        let out = detector().detect(&today, &history, &[]);
        let order: Vec<&str> = out.iter().map(|r| r.keyword.as_str()).collect();
        // rising (900%) > rising (200%) > new > declining.
        assert_eq!(order, vec!["upalot", "upsome", "fresh", "gone"]);
    }

    #[test]
    fn keywords_come_from_headlines_and_tags() {
        let mut item = Item::new(
            "rss_ai",
            "ai",
            "Claude agents automate the boring parts",
            "",
            "https://x.io/1",
            "",
            Utc::now(),
        );
        item.metadata
            .insert("tags".into(), serde_json::json!(["LLM", "Agents"]));
        let counts = extract_keywords(&[item]);
        assert_eq!(counts["claude"], 1);
        assert_eq!(counts["llm"], 1);
        // Headline word and tag both count.
        assert_eq!(counts["agents"], 2);
        assert!(!counts.contains_key("the"));
    }

    #[test]
    fn headlines_match_via_tags_too() {
        let mut item = Item::new(
            "rss_ai",
            "ai",
            "Shipping faster with coding assistants",
            "",
            "https://x.io/1",
            "",
            Utc::now(),
        );
        item.metadata
            .insert("tags".into(), serde_json::json!(["LLM"]));
        let today = counts(&[("llm", 1)]);
        let out = detector().detect(&today, &[], &[item]);
        assert_eq!(out.len(), 1);
        // The keyword only appears as a tag, not in the title.
        assert_eq!(
            out[0].headlines,
            vec!["Shipping faster with coding assistants".to_string()]
        );
    }

    #[test]
    fn snapshot_round_trip_and_lookback_window() {
        let dir = tempfile::tempdir().unwrap();
        let det = TrendDetector::new(dir.path(), 7, 20);
        let today = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();

        det.save_snapshot(today.pred_opt().unwrap(), &counts(&[("claude", 4)]))
            .unwrap();
        // Outside the 7-day lookback: must be ignored.
        det.save_snapshot(
            today.checked_sub_days(chrono::Days::new(9)).unwrap(),
            &counts(&[("claude", 100)]),
        )
        .unwrap();

        let history = det.load_history(today);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["claude"], 4);
    }

    #[test]
    fn corrupt_snapshot_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let det = TrendDetector::new(dir.path(), 7, 20);
        let today = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();
        let bad = det.snapshot_path(today.pred_opt().unwrap());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(&bad, "{broken").unwrap();
        assert!(det.load_history(today).is_empty());
    }
}
