// tests/trend_history.rs
//! Trend detection against on-disk history snapshots.

use chrono::{Days, NaiveDate, Utc};

use daybrief::trend::KeywordCounts;
use daybrief::{Trend, TrendDetector};

fn counts(pairs: &[(&str, u32)]) -> KeywordCounts {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn day(offset_back: u64) -> NaiveDate {
    Utc::now()
        .date_naive()
        .checked_sub_days(Days::new(offset_back))
        .unwrap()
}

#[test]
fn rising_keyword_detected_from_saved_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let detector = TrendDetector::new(dir.path(), 7, 20);

    for back in 1..=3 {
        detector
            .save_snapshot(day(back), &counts(&[("claude", 2), ("rust", 5)]))
            .unwrap();
    }

    let today = counts(&[("claude", 10), ("rust", 5), ("quantum", 3)]);
    let history = detector.load_history(day(0));
    assert_eq!(history.len(), 3);

    let records = detector.detect(&today, &history, &[]);
    let by_kw = |kw: &str| records.iter().find(|r| r.keyword == kw).unwrap();

    let claude = by_kw("claude");
    assert_eq!(claude.trend, Trend::Rising);
    assert_eq!(claude.today_count, 10);
    assert_eq!(claude.avg_count, 2.0);
    assert_eq!(claude.change_pct, 400.0);

    assert_eq!(by_kw("rust").trend, Trend::Steady);
    assert_eq!(by_kw("quantum").trend, Trend::New);

    // Rising sorts ahead of new, new ahead of steady.
    assert_eq!(records[0].keyword, "claude");
    assert_eq!(records[1].keyword, "quantum");
}

#[test]
fn snapshots_accumulate_across_days() {
    let dir = tempfile::tempdir().unwrap();
    let detector = TrendDetector::new(dir.path(), 7, 20);

    for back in 1..=9 {
        detector
            .save_snapshot(day(back), &counts(&[("claude", back as u32)]))
            .unwrap();
    }
    // Only the lookback window is loaded, even with older files on disk.
    let history = detector.load_history(day(0));
    assert_eq!(history.len(), 7);
}
