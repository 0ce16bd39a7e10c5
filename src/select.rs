//! Sender/receiver selection over a raw record log.
//!
//! A capture log mixes every pair of devices in range. This stage keeps the
//! records of one link so the aggregator sees a single signal path.

use crate::diagnostics::{RunStats, SharedRunStats};
use crate::record::{log_lines, Record, RecordError};
use std::io::{BufRead, Write};
use std::sync::Arc;

/// Forwards records whose ids match; `None` matches any id.
pub struct SenderReceiverFilter {
    sender: Option<u32>,
    receiver: Option<u32>,
    comment_marker: String,
    dry_run: bool,
    stats: SharedRunStats,
}

impl SenderReceiverFilter {
    pub fn new(sender: Option<u32>, receiver: Option<u32>) -> Self {
        Self {
            sender,
            receiver,
            comment_marker: "#".to_string(),
            dry_run: false,
            stats: Arc::new(RunStats::new()),
        }
    }

    pub fn with_comment_marker(mut self, marker: impl Into<String>) -> Self {
        self.comment_marker = marker.into();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_stats(mut self, stats: SharedRunStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &SharedRunStats {
        &self.stats
    }

    /// Whether a record belongs to the selected link.
    pub fn matches(&self, record: &Record) -> bool {
        self.sender.map_or(true, |id| id == record.sender_id)
            && self.receiver.map_or(true, |id| id == record.receiver_id)
    }

    /// The output line for an input line, if any.
    ///
    /// Comments pass through, matching records are re-serialised, blank,
    /// malformed and non-matching lines are dropped.
    pub fn select_line(&self, line: &str) -> Option<String> {
        self.stats.record_line_read();

        if line.starts_with(self.comment_marker.as_str()) {
            self.stats.record_line_forwarded();
            return Some(line.to_string());
        }
        if line.trim().is_empty() {
            return None;
        }

        match Record::parse(line) {
            Ok(record) => {
                self.stats.record_parsed();
                self.matches(&record).then(|| record.format())
            }
            Err(e) => {
                tracing::warn!("Failed to construct record: {e}; line: '{line}'");
                self.stats.record_parse_failure();
                None
            }
        }
    }

    /// Account for a line that could not be read as text; it is dropped.
    pub fn reject_line(&self, error: &RecordError) {
        self.stats.record_line_read();
        tracing::warn!("Failed to construct record: {error}");
        self.stats.record_parse_failure();
    }

    /// Filter a whole stream.
    pub fn run<R: BufRead, W: Write>(&self, input: R, mut output: W) -> std::io::Result<()> {
        for line in log_lines(input) {
            let selected = match line? {
                Ok(line) => self.select_line(&line),
                Err(e) => {
                    self.reject_line(&e);
                    None
                }
            };
            if let Some(selected) = selected {
                tracing::debug!("output: '{selected}'");
                if !self.dry_run {
                    writeln!(output, "{selected}")?;
                    self.stats.record_row_emitted();
                }
            }
        }
        output.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FROM_6_TO_7: &str = "2022-07-02T12:16:15.685190,7,6,0,-52,0,132,0,roomA";
    const FROM_8_TO_7: &str = "2022-07-02T12:16:16,7,8,-60,0,0,133,0,roomA";

    #[test]
    fn test_wildcards_match_everything() {
        let filter = SenderReceiverFilter::new(None, None);
        assert_eq!(filter.select_line(FROM_6_TO_7).as_deref(), Some(FROM_6_TO_7));
        assert_eq!(filter.select_line(FROM_8_TO_7).as_deref(), Some(FROM_8_TO_7));
    }

    #[test]
    fn test_sender_selection() {
        let filter = SenderReceiverFilter::new(Some(6), Some(7));
        assert!(filter.select_line(FROM_6_TO_7).is_some());
        assert!(filter.select_line(FROM_8_TO_7).is_none());

        let filter = SenderReceiverFilter::new(None, Some(8));
        assert!(filter.select_line(FROM_6_TO_7).is_none());
    }

    #[test]
    fn test_comments_pass_and_garbage_drops() {
        let filter = SenderReceiverFilter::new(Some(1), None);
        assert_eq!(
            filter.select_line("# start experiment").as_deref(),
            Some("# start experiment")
        );
        assert!(filter.select_line("garbage").is_none());
        assert!(filter.select_line("").is_none());
        assert_eq!(filter.stats().stats().parse_failures, 1);
    }

    #[test]
    fn test_run_stream() {
        let filter = SenderReceiverFilter::new(Some(8), None);
        let input = format!("# header\n{FROM_6_TO_7}\n{FROM_8_TO_7}\n");
        let mut output = Vec::new();
        filter.run(input.as_bytes(), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert_eq!(text, format!("# header\n{FROM_8_TO_7}\n"));
    }

    #[test]
    fn test_run_survives_invalid_utf8() {
        let filter = SenderReceiverFilter::new(None, None);
        let mut input = format!("{FROM_6_TO_7}\n").into_bytes();
        input.extend_from_slice(b"\xff\xfe garbage\n");
        input.extend_from_slice(format!("{FROM_8_TO_7}\n").as_bytes());
        let mut output = Vec::new();
        filter.run(input.as_slice(), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert_eq!(text, format!("{FROM_6_TO_7}\n{FROM_8_TO_7}\n"));
        assert_eq!(filter.stats().stats().parse_failures, 1);
    }
}
