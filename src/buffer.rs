use std::collections::HashMap;
use std::mem;

use serde::{Deserialize, Serialize};

/// Tracked time for one URL, either still buffered in memory or already
/// merged into a daily record. Serialized camelCase (`lastVisit`) to stay
/// compatible with previously persisted records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlStat {
    pub seconds: u64,
    pub title: Option<String>,
    /// Epoch milliseconds. In the buffer this is the first-tick time; after
    /// a flush it records the flush time.
    pub last_visit: i64,
}

/// In-memory per-URL second counts that have not reached durable storage
/// yet. Exactly one buffer is live at any instant: a flush detaches the
/// whole map and installs a fresh empty one before doing any I/O, so ticks
/// racing the flush only ever touch the new map.
#[derive(Debug, Clone, Default)]
pub struct AccumulationBuffer {
    entries: HashMap<String, UrlStat>,
}

impl AccumulationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, url: &str) -> Option<&UrlStat> {
        self.entries.get(url)
    }

    /// Attributes one second to `url`, creating the entry on first sight.
    /// The title is refreshed whenever one is known.
    pub fn record_tick(&mut self, url: &str, title: Option<&str>, now_ms: i64) {
        let stat = self
            .entries
            .entry(url.to_string())
            .or_insert_with(|| UrlStat {
                seconds: 0,
                title: title.map(str::to_string),
                last_visit: now_ms,
            });
        stat.seconds += 1;
        if let Some(title) = title {
            stat.title = Some(title.to_string());
        }
    }

    /// Takes the entire contents, leaving the buffer empty. The caller owns
    /// the detached entries; nothing mutated afterwards can touch them.
    pub fn detach(&mut self) -> HashMap<String, UrlStat> {
        mem::take(&mut self.entries)
    }

    /// Restores entries from a failed flush. Seconds accumulated since the
    /// detach are kept: existing entries are incremented, never overwritten.
    pub fn merge_back(&mut self, detached: HashMap<String, UrlStat>) {
        for (url, stat) in detached {
            match self.entries.get_mut(&url) {
                Some(live) => live.seconds += stat.seconds,
                None => {
                    self.entries.insert(url, stat);
                }
            }
        }
    }

    pub fn snapshot(&self) -> HashMap<String, UrlStat> {
        self.entries.clone()
    }
}
