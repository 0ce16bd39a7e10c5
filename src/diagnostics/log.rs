//! Run statistics for the operator.
//!
//! Counts what happened to every input line without keeping any of the
//! data itself. Counters are atomic so a snapshot can be taken from another
//! thread (e.g. a Ctrl+C handler) while a run is in progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for a single aggregation or selection run.
#[derive(Debug)]
pub struct RunStats {
    /// Input lines read, including comments and blanks
    lines_read: AtomicU64,
    /// Lines successfully parsed into records
    records_parsed: AtomicU64,
    /// Lines that failed to parse
    parse_failures: AtomicU64,
    /// Data rows written to the sink
    rows_emitted: AtomicU64,
    /// Data rows dropped because a value was undefined
    incomplete_rows: AtomicU64,
    /// Comment and blank lines forwarded unchanged
    lines_forwarded: AtomicU64,
    /// Time windows left with fewer than two records
    sparse_windows: AtomicU64,
    /// Windows with a zero mean, stdev or median
    zero_statistics: AtomicU64,
    /// Run start time
    started: DateTime<Utc>,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            lines_read: AtomicU64::new(0),
            records_parsed: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            rows_emitted: AtomicU64::new(0),
            incomplete_rows: AtomicU64::new(0),
            lines_forwarded: AtomicU64::new(0),
            sparse_windows: AtomicU64::new(0),
            zero_statistics: AtomicU64::new(0),
            started: Utc::now(),
        }
    }

    pub fn record_line_read(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parsed(&self) {
        self.records_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_row_emitted(&self) {
        self.rows_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_incomplete_row(&self) {
        self.incomplete_rows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_line_forwarded(&self) {
        self.lines_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sparse_window(&self) {
        self.sparse_windows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_zero_statistic(&self) {
        self.zero_statistics.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> RunSummary {
        RunSummary {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            records_parsed: self.records_parsed.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            rows_emitted: self.rows_emitted.load(Ordering::Relaxed),
            incomplete_rows: self.incomplete_rows.load(Ordering::Relaxed),
            lines_forwarded: self.lines_forwarded.load(Ordering::Relaxed),
            sparse_windows: self.sparse_windows.load(Ordering::Relaxed),
            zero_statistics: self.zero_statistics.load(Ordering::Relaxed),
            started: self.started,
            duration_ms: (Utc::now() - self.started).num_milliseconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Run Statistics:\n\
             - Lines read: {}\n\
             - Records parsed: {}\n\
             - Malformed lines skipped: {}\n\
             - Rows emitted: {}\n\
             - Incomplete rows suppressed: {}\n\
             - Comment/blank lines forwarded: {}\n\
             - Sparse time windows: {}\n\
             - Zero-valued statistics: {}\n\
             - Duration: {} ms",
            stats.lines_read,
            stats.records_parsed,
            stats.parse_failures,
            stats.rows_emitted,
            stats.incomplete_rows,
            stats.lines_forwarded,
            stats.sparse_windows,
            stats.zero_statistics,
            stats.duration_ms
        )
    }

    /// Save a snapshot as JSON.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self.stats()).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of run statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub lines_read: u64,
    pub records_parsed: u64,
    pub parse_failures: u64,
    pub rows_emitted: u64,
    pub incomplete_rows: u64,
    pub lines_forwarded: u64,
    pub sparse_windows: u64,
    pub zero_statistics: u64,
    pub started: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Thread-safe shared run statistics.
pub type SharedRunStats = Arc<RunStats>;

/// Create new shared run statistics.
pub fn create_shared_stats() -> SharedRunStats {
    Arc::new(RunStats::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = RunStats::new();

        stats.record_line_read();
        stats.record_line_read();
        stats.record_parsed();
        stats.record_parse_failure();

        let snapshot = stats.stats();
        assert_eq!(snapshot.lines_read, 2);
        assert_eq!(snapshot.records_parsed, 1);
        assert_eq!(snapshot.parse_failures, 1);
        assert_eq!(snapshot.rows_emitted, 0);
    }

    #[test]
    fn test_summary_format() {
        let stats = RunStats::new();
        let summary = stats.summary();

        assert!(summary.contains("Lines read"));
        assert!(summary.contains("Malformed lines skipped"));
        assert!(summary.contains("Sparse time windows"));
    }

    #[test]
    fn test_save_writes_json() {
        let path = std::env::temp_dir()
            .join("rssi-features-stats-test")
            .join("stats.json");
        let stats = RunStats::new();
        stats.record_row_emitted();
        stats.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let loaded: RunSummary = serde_json::from_str(&content).unwrap();
        assert_eq!(loaded.rows_emitted, 1);
    }
}
