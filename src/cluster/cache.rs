//! Memoization of the last cluster computation.
//!
//! Clustering the full embedding set is the most expensive recurring
//! operation, so the last report is kept as long as (a) the document count it
//! was computed for is unchanged and (b) it is younger than a TTL. Every
//! mutation invalidates unconditionally; the TTL bounds staleness if an
//! invalidation is ever missed. Reads never invalidate.

use super::ClusterReport;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry {
    report: ClusterReport,
    document_count: usize,
    computed_at: Instant,
}

pub struct ClusterCache {
    entry: Mutex<Option<CacheEntry>>,
    ttl: Duration,
}

impl ClusterCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entry: Mutex::new(None),
            ttl,
        }
    }

    /// The cached report, if one exists for exactly `current_count` documents
    /// and it has not outlived the TTL. Any mismatch returns `None` and the
    /// caller recomputes.
    pub fn get(&self, current_count: usize) -> Option<ClusterReport> {
        let guard = self.entry.lock().ok()?;
        let entry = guard.as_ref()?;

        if entry.document_count != current_count {
            return None;
        }
        if entry.computed_at.elapsed() >= self.ttl {
            return None;
        }

        Some(entry.report.clone())
    }

    /// Remember `report` as computed over `document_count` documents, now.
    pub fn store(&self, report: ClusterReport, document_count: usize) {
        if let Ok(mut guard) = self.entry.lock() {
            *guard = Some(CacheEntry {
                report,
                document_count,
                computed_at: Instant::now(),
            });
        }
    }

    /// Drop the cached report. Called after every document insert, update,
    /// delete and clear.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.entry.lock() {
            *guard = None;
        }
    }
}
