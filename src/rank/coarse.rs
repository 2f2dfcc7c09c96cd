// src/rank/coarse.rs
//! Coarse relevance scorer: cheap rule-based pass over the full candidate
//! pool. `score = base × authority × freshness × engagement`, where base
//! comes from interest-profile keyword matches (with pluggable per-signal
//! floor overrides) and the remaining factors are bounded multipliers.

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::ingest::types::Item;
use crate::rank::profile::{InterestProfile, SourceAuthority};

/// Per-category cap on counted keyword matches.
const MAX_MATCHES_PER_CATEGORY: f64 = 3.0;
/// Keyword-less items still get this base so good content is never zeroed.
const BASE_FLOOR: f64 = 1.0;

/// Pluggable scoring override for adapter-flagged signal types whose value
/// is positional rather than textual (e.g. a confirmed listing
/// announcement). Applied to the keyword base before the multiplicative
/// factors.
pub trait ScoreOverride: Send + Sync {
    /// Forced minimum for the base score, when the rule applies.
    fn base_floor(&self, item: &Item) -> Option<f64>;

    /// Extra multiplier on the base (after flooring). 1.0 = no effect.
    fn base_multiplier(&self, _item: &Item) -> f64 {
        1.0
    }

    fn name(&self) -> &str;
}

/// Exchange listing announcements are alpha signals regardless of keyword
/// match; Korean venues carry a premium.
pub struct ListingAnnouncementRule {
    pub floor: f64,
    pub venue_premium: f64,
}

impl Default for ListingAnnouncementRule {
    fn default() -> Self {
        Self {
            floor: 20.0,
            venue_premium: 1.5,
        }
    }
}

const LISTING_MARKERS: &[&str] = &["listing", "new pair", "new trading", "上线", "新增"];
const PREMIUM_VENUES: &[&str] = &["upbit", "bithumb"];

impl ScoreOverride for ListingAnnouncementRule {
    fn base_floor(&self, item: &Item) -> Option<f64> {
        if item.source != "exchange_listing" {
            return None;
        }
        let title = item.title.to_lowercase();
        LISTING_MARKERS
            .iter()
            .any(|m| title.contains(m))
            .then_some(self.floor)
    }

    fn base_multiplier(&self, item: &Item) -> f64 {
        if item.source != "exchange_listing" {
            return 1.0;
        }
        let title = item.title.to_lowercase();
        if item.title.contains("🇰🇷") || PREMIUM_VENUES.iter().any(|v| title.contains(v)) {
            self.venue_premium
        } else {
            1.0
        }
    }

    fn name(&self) -> &str {
        "listing_announcement"
    }
}

/// First-party vendor announcements get a fixed floor.
pub struct OfficialAnnouncementRule {
    pub sources: Vec<String>,
    pub floor: f64,
}

impl Default for OfficialAnnouncementRule {
    fn default() -> Self {
        Self {
            sources: vec!["anthropic_news".into(), "anthropic".into()],
            floor: 12.0,
        }
    }
}

impl ScoreOverride for OfficialAnnouncementRule {
    fn base_floor(&self, item: &Item) -> Option<f64> {
        self.sources
            .iter()
            .any(|s| s == &item.source)
            .then_some(self.floor)
    }

    fn name(&self) -> &str {
        "official_announcement"
    }
}

enum Matcher {
    /// Word-boundary regex for ASCII keywords.
    Word(Regex),
    /// Plain substring for CJK and other non-ASCII keywords.
    Substring(String),
}

impl Matcher {
    fn compile(keyword: &str) -> Self {
        if keyword.is_ascii() {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(keyword));
            if let Ok(re) = Regex::new(&pattern) {
                return Matcher::Word(re);
            }
        }
        Matcher::Substring(keyword.to_lowercase())
    }

    fn is_match(&self, haystack_lower: &str) -> bool {
        match self {
            Matcher::Word(re) => re.is_match(haystack_lower),
            Matcher::Substring(kw) => haystack_lower.contains(kw.as_str()),
        }
    }
}

struct CompiledCategory {
    weight: f64,
    matchers: Vec<Matcher>,
}

pub struct CoarseScorer {
    categories: Vec<CompiledCategory>,
    authority: SourceAuthority,
    overrides: Vec<Box<dyn ScoreOverride>>,
}

impl CoarseScorer {
    pub fn new(profile: InterestProfile, authority: SourceAuthority) -> Self {
        let categories = profile
            .categories
            .into_iter()
            .map(|c| CompiledCategory {
                weight: c.weight,
                matchers: c.keywords.iter().map(|k| Matcher::compile(k)).collect(),
            })
            .collect();
        Self {
            categories,
            authority,
            overrides: vec![
                Box::new(ListingAnnouncementRule::default()),
                Box::new(OfficialAnnouncementRule::default()),
            ],
        }
    }

    pub fn with_seed_config() -> Self {
        Self::new(InterestProfile::default_seed(), SourceAuthority::default_seed())
    }

    /// Replace the default override rules.
    pub fn with_overrides(mut self, overrides: Vec<Box<dyn ScoreOverride>>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn register_override(&mut self, rule: Box<dyn ScoreOverride>) {
        self.overrides.push(rule);
    }

    pub fn score(&self, item: &Item) -> f64 {
        self.score_at(item, Utc::now())
    }

    /// Score with an explicit "now", so freshness behavior is testable.
    pub fn score_at(&self, item: &Item, now: DateTime<Utc>) -> f64 {
        let title = item.title.to_lowercase();
        let body = item.text.to_lowercase();

        // 1) Keyword base: per category min(weighted matches, 3) × weight.
        // A hit in the title counts double.
        let mut base: f64 = 0.0;
        for cat in &self.categories {
            let mut matches: f64 = 0.0;
            for m in &cat.matchers {
                if m.is_match(&title) {
                    matches += 2.0;
                } else if m.is_match(&body) {
                    matches += 1.0;
                }
            }
            if matches > 0.0 {
                base += matches.min(MAX_MATCHES_PER_CATEGORY) * cat.weight;
            }
        }
        base = base.max(BASE_FLOOR);

        // 2) Signal overrides, before the multiplicative factors.
        for rule in &self.overrides {
            if let Some(floor) = rule.base_floor(item) {
                base = base.max(floor);
            }
        }
        for rule in &self.overrides {
            base *= rule.base_multiplier(item);
        }

        // 3) Source authority: maps 0..10 onto a 0.5..1.0 factor.
        let authority = self.authority.score_for(item.display_source());
        let authority_factor = 0.5 + authority / 20.0;

        // 4) Freshness decay over 72h, floored at 0.3, with a breaking-news
        // boost under two hours.
        let age_hours = (now - item.published_at).num_seconds().max(0) as f64 / 3600.0;
        let mut freshness = (1.0 - age_hours / 72.0).max(0.3);
        if age_hours < 2.0 {
            freshness = (freshness * 1.3).min(1.5);
        }

        // 5) Engagement: bounded per-metric contributions so no single
        // metric dominates.
        let mut engagement = 1.0;
        if let Some(upvotes) = item.metadata_f64("upvotes") {
            engagement += (upvotes / 500.0).min(1.0);
        }
        if let Some(stars) = item.metadata_f64("stars") {
            engagement += (stars / 10_000.0).min(0.8);
        }
        if let Some(daily) = item.metadata_f64("daily_stars") {
            engagement += (daily / 500.0).min(0.5);
        }
        if let Some(comments) = item.metadata_f64("comments") {
            engagement += (comments / 200.0).min(0.3);
        }

        let score = base * authority_factor * freshness * engagement;
        (score * 1000.0).round() / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item_aged(hours: i64, minutes: i64, now: DateTime<Utc>) -> Item {
        Item::new(
            "rss_ai",
            "ai",
            "Plain headline about nothing",
            "no keywords here",
            "https://example.com/x",
            "a",
            now - Duration::hours(hours) - Duration::minutes(minutes),
        )
    }

    #[test]
    fn freshness_is_monotonic_outside_breaking_band() {
        let s = CoarseScorer::with_seed_config();
        let now = Utc::now();
        let newer = s.score_at(&item_aged(3, 0, now), now);
        let older = s.score_at(&item_aged(10, 0, now), now);
        let oldest = s.score_at(&item_aged(100, 0, now), now);
        assert!(newer > older);
        assert!(older > oldest);
    }

    #[test]
    fn breaking_boost_wins_across_two_hour_boundary() {
        let s = CoarseScorer::with_seed_config();
        let now = Utc::now();
        // 1h54m old, boosted, beats a barely-non-breaking 2h06m item.
        let breaking = s.score_at(&item_aged(1, 54, now), now);
        let not_breaking = s.score_at(&item_aged(2, 6, now), now);
        assert!(breaking > not_breaking);
    }

    #[test]
    fn freshness_floor_holds_for_very_old_items() {
        let s = CoarseScorer::with_seed_config();
        let now = Utc::now();
        let week_old = s.score_at(&item_aged(24 * 7, 0, now), now);
        let month_old = s.score_at(&item_aged(24 * 30, 0, now), now);
        assert!((week_old - month_old).abs() < 1e-9);
    }

    #[test]
    fn title_keywords_outscore_body_keywords() {
        let s = CoarseScorer::with_seed_config();
        let now = Utc::now();
        // One keyword only, so the per-category cap cannot mask the 2x.
        let mut in_title = item_aged(3, 0, now);
        in_title.title = "Claude ships today".into();
        let mut in_body = item_aged(3, 0, now);
        in_body.text = "Claude ships today".into();
        assert!(s.score_at(&in_title, now) > s.score_at(&in_body, now));
    }

    #[test]
    fn keywordless_item_scores_above_zero() {
        let s = CoarseScorer::with_seed_config();
        let now = Utc::now();
        assert!(s.score_at(&item_aged(3, 0, now), now) > 0.0);
    }

    #[test]
    fn engagement_contributions_are_capped() {
        let s = CoarseScorer::with_seed_config();
        let now = Utc::now();
        let mut huge = item_aged(3, 0, now);
        huge.metadata.insert("upvotes".into(), 1_000_000.into());
        let mut large = item_aged(3, 0, now);
        large.metadata.insert("upvotes".into(), 500.into());
        assert!((s.score_at(&huge, now) - s.score_at(&large, now)).abs() < 1e-9);
    }

    #[test]
    fn listing_announcement_floor_applies_before_factors() {
        let s = CoarseScorer::with_seed_config();
        let now = Utc::now();
        let mut listing = item_aged(3, 0, now);
        listing.source = "exchange_listing".into();
        listing.title = "New trading pair: ABC/USDT listing".into();
        let plain = item_aged(3, 0, now);
        // 20.0 floor vs 1.0 base; factors are equal up to authority.
        assert!(s.score_at(&listing, now) > 10.0 * s.score_at(&plain, now));
    }

    #[test]
    fn korean_venue_premium_multiplies_floor() {
        let s = CoarseScorer::with_seed_config();
        let now = Utc::now();
        let mut upbit = item_aged(3, 0, now);
        upbit.source = "exchange_listing".into();
        upbit.title = "Upbit listing: ABC/KRW new pair".into();
        let mut generic = item_aged(3, 0, now);
        generic.source = "exchange_listing".into();
        generic.title = "Listing: ABC/USDT new pair".into();
        let u = s.score_at(&upbit, now);
        let g = s.score_at(&generic, now);
        assert!(u > g * 1.4 && u < g * 1.6);
    }

    #[test]
    fn custom_override_can_be_registered() {
        struct Pin;
        impl ScoreOverride for Pin {
            fn base_floor(&self, item: &Item) -> Option<f64> {
                (item.source == "pinned").then_some(50.0)
            }
            fn name(&self) -> &str {
                "pin"
            }
        }
        let mut s = CoarseScorer::with_seed_config();
        s.register_override(Box::new(Pin));
        let now = Utc::now();
        let mut pinned = item_aged(3, 0, now);
        pinned.source = "pinned".into();
        assert!(s.score_at(&pinned, now) > 20.0);
    }
}
