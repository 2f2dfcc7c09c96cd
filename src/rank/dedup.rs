// src/rank/dedup.rs
//! Similarity deduplicator: exact canonical-URL collapse, then greedy
//! title-token Jaccard clustering. The highest-scoring member of a cluster
//! survives and records the merged sources.
//!
//! Clustering is O(n²) over the retained set; acceptable because the URL
//! phase and the upstream top-N cut keep n in the hundreds.

use std::collections::{BTreeSet, HashMap, HashSet};

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::ingest::types::Item;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "in", "on", "at", "to", "for", "of", "and",
    "or", "with", "from", "by", "that", "this", "it", "its", "how", "what", "why", "when",
];

const TRACKING_PARAMS: &[&str] = &["utm_source", "utm_medium", "utm_campaign", "ref"];

/// Canonical URL for exact-match dedup: trimmed, known tracking query
/// parameters removed, then the trailing slash stripped. Param removal runs
/// first so `/a/?utm_source=x` and `/a` land on the same key.
pub fn canonicalize_url(url: &str) -> String {
    static RES: OnceCell<Vec<Regex>> = OnceCell::new();
    let res = RES.get_or_init(|| {
        TRACKING_PARAMS
            .iter()
            .map(|p| Regex::new(&format!(r"[?&]{p}=[^&]*")).unwrap())
            .collect()
    });
    let mut out = url.trim().to_string();
    let had_query = out.contains('?');
    for re in res {
        out = re.replace_all(&out, "").to_string();
    }
    // Removing a leading `?param` can orphan the next separator.
    if had_query && !out.contains('?') {
        if let Some(i) = out.find('&') {
            out.replace_range(i..=i, "?");
        }
    }
    out.trim_end_matches('/').to_string()
}

/// Title token set: lower-cased alphanumeric words (>1 char, stop-words
/// removed) plus individual CJK characters.
pub fn title_tokens(title: &str) -> HashSet<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"[a-z0-9]+|[\p{Han}]").unwrap());
    let lower = title.to_lowercase();
    re.find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .filter(|w| w.chars().count() > 1 || w.chars().any(|c| !c.is_ascii()))
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

pub struct Deduplicator {
    threshold: f64,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self { threshold: 0.55 }
    }
}

impl Deduplicator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Collapse duplicates, keeping the highest-scoring representative per
    /// URL and per title cluster. Representatives of multi-member clusters
    /// get `related_sources` and `coverage_count`.
    pub fn deduplicate(&self, items: Vec<Item>) -> Vec<Item> {
        if items.is_empty() {
            return items;
        }

        // Phase 1: exact canonical-URL collapse, higher score wins.
        let mut by_url: HashMap<String, Item> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for item in items {
            let key = canonicalize_url(&item.url);
            match by_url.get(&key) {
                Some(existing) if existing.score >= item.score => {}
                Some(_) => {
                    by_url.insert(key, item);
                }
                None => {
                    order.push(key.clone());
                    by_url.insert(key, item);
                }
            }
        }
        let survivors: Vec<Item> = order
            .iter()
            .filter_map(|k| by_url.remove(k))
            .collect();

        // Phase 2: greedy Jaccard clustering over title tokens.
        let tokens: Vec<HashSet<String>> =
            survivors.iter().map(|i| title_tokens(&i.title)).collect();
        let mut used = vec![false; survivors.len()];
        let mut clusters: Vec<Vec<usize>> = Vec::new();
        for i in 0..survivors.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            let mut cluster = vec![i];
            for j in (i + 1)..survivors.len() {
                if used[j] {
                    continue;
                }
                if jaccard(&tokens[i], &tokens[j]) >= self.threshold {
                    used[j] = true;
                    cluster.push(j);
                }
            }
            clusters.push(cluster);
        }

        // Collapse each cluster into its highest-scoring representative.
        let mut survivors: Vec<Option<Item>> = survivors.into_iter().map(Some).collect();
        let mut out = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            let best = cluster
                .iter()
                .copied()
                .max_by(|&a, &b| {
                    let sa = survivors[a].as_ref().map(|i| i.score).unwrap_or(0.0);
                    let sb = survivors[b].as_ref().map(|i| i.score).unwrap_or(0.0);
                    sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(cluster[0]);

            let mut related: BTreeSet<String> = BTreeSet::new();
            for &idx in &cluster {
                if idx != best {
                    if let Some(other) = &survivors[idx] {
                        related.insert(other.display_source().to_string());
                    }
                }
            }

            if let Some(mut rep) = survivors[best].take() {
                if cluster.len() > 1 {
                    rep.related_sources = related.into_iter().collect();
                    rep.coverage_count = cluster.len() as u32;
                }
                out.push(rep);
            }
        }
        out
    }
}
