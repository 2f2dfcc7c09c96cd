// src/ingest/state.rs
//! Cross-run dedup state: persisted set of seen item ids with first-seen
//! timestamps and window-based eviction at save time.
//!
//! Single-writer by design: one pipeline run owns the instance. Corrupt or
//! absent state files are treated as empty state, never as a fatal error.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    seen: HashMap<String, DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    last_cleanup: Option<DateTime<Utc>>,
}

/// Seen-id store with a rolling retention window.
#[derive(Debug)]
pub struct DedupState {
    path: Option<PathBuf>,
    seen: HashMap<String, DateTime<Utc>>,
    window_days: i64,
    last_cleanup: Option<DateTime<Utc>>,
}

impl DedupState {
    /// Load state from `path`. A missing or unreadable file starts fresh.
    pub fn load(path: impl Into<PathBuf>, window_days: u32) -> Self {
        let path = path.into();
        let (seen, last_cleanup) = match fs::read_to_string(&path) {
            Ok(s) => match serde_json::from_str::<PersistedState>(&s) {
                Ok(p) => (p.seen, p.last_cleanup),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt dedup state, starting fresh");
                    (HashMap::new(), None)
                }
            },
            Err(_) => (HashMap::new(), None),
        };
        Self {
            path: Some(path),
            seen,
            window_days: i64::from(window_days),
            last_cleanup,
        }
    }

    /// Isolated in-memory instance; `save()` is a no-op apart from eviction.
    pub fn in_memory(window_days: u32) -> Self {
        Self {
            path: None,
            seen: HashMap::new(),
            window_days: i64::from(window_days),
            last_cleanup: None,
        }
    }

    pub fn is_seen(&self, id: &str) -> bool {
        self.seen.contains_key(id)
    }

    /// Record first sight of an id. An already-present id keeps its
    /// original timestamp so the retention window is not extended.
    pub fn mark_seen(&mut self, id: &str, ts: DateTime<Utc>) {
        self.seen.entry(id.to_string()).or_insert(ts);
    }

    pub fn mark_seen_now(&mut self, id: &str) {
        self.mark_seen(id, Utc::now());
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Evict entries older than the window and persist. Returns the number
    /// of evicted records.
    pub fn save(&mut self) -> Result<usize> {
        let evicted = self.evict_expired(Utc::now());
        if let Some(path) = self.path.clone() {
            self.write_to(&path)?;
        }
        Ok(evicted)
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(self.window_days);
        let before = self.seen.len();
        self.seen.retain(|_, ts| *ts >= cutoff);
        let evicted = before - self.seen.len();
        if evicted > 0 {
            self.last_cleanup = Some(now);
            info!(evicted, window_days = self.window_days, "evicted expired seen-set records");
        }
        evicted
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating state dir {}", parent.display()))?;
        }
        let persisted = PersistedState {
            seen: self.seen.clone(),
            updated_at: Some(Utc::now()),
            last_cleanup: self.last_cleanup,
        };
        let json = serde_json::to_string_pretty(&persisted)?;
        // Atomic replace: write sidecar, then rename over the target.
        let tmp = path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(json.as_bytes())?;
        fs::rename(&tmp, path)
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}
