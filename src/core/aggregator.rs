//! Rolling feature aggregation over a record stream.
//!
//! Every parsed record is appended to a bounded history. The history is then
//! cut by every (channel filter, window filter) pair, channel filter first,
//! and each cut is summarised into features. One input record produces one
//! CSV row with the features of all pairs side by side.

use crate::config::{Config, ConfigError};
use crate::core::channel::{ChannelError, ChannelFilter};
use crate::core::features::FeatureValue;
use crate::core::windowing::{RecordBuffer, WindowFilter};
use crate::diagnostics::{RunStats, SharedRunStats};
use crate::record::{log_lines, Record, RecordError};
use std::io::{BufRead, Write};
use std::sync::Arc;
use thiserror::Error;

/// Output column separator.
pub const COLUMN_SEPARATOR: u8 = b',';

/// Fatal aggregation failures. Malformed input lines are not among them.
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// What a single input line turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Blank or comment line, forwarded verbatim
    Forwarded(String),
    /// Feature values of every filter pair, in column order
    Row(Vec<FeatureValue>),
    /// Unparsable line, dropped
    Malformed(RecordError),
}

/// Drives every channel filter × window filter combination over a stream.
pub struct Aggregator {
    buffer: RecordBuffer,
    channel_filters: Vec<ChannelFilter>,
    window_filters: Vec<WindowFilter>,
    comment_marker: String,
    allow_incomplete: bool,
    dry_run: bool,
    verbose: bool,
    header_written: bool,
    lines_seen: u64,
    stats: SharedRunStats,
}

impl Aggregator {
    /// Create an aggregator with its own run statistics.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Self::with_stats(config, Arc::new(RunStats::new()))
    }

    /// Create an aggregator reporting into shared run statistics.
    pub fn with_stats(config: &Config, stats: SharedRunStats) -> Result<Self, ConfigError> {
        config.validate()?;
        let channel_filters = config
            .channels
            .iter()
            .copied()
            .map(ChannelFilter::new)
            .collect::<Result<Vec<_>, ChannelError>>()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(Self {
            buffer: RecordBuffer::new(config.capacity),
            channel_filters,
            window_filters: config.windows.iter().copied().map(WindowFilter::new).collect(),
            comment_marker: config.comment_marker.clone(),
            allow_incomplete: config.allow_incomplete,
            dry_run: config.dry_run,
            verbose: config.verbose,
            header_written: false,
            lines_seen: 0,
            stats,
        })
    }

    /// The record history, oldest first.
    pub fn buffer(&self) -> &RecordBuffer {
        &self.buffer
    }

    pub fn stats(&self) -> &SharedRunStats {
        &self.stats
    }

    /// Column names, `{channel}_{window}_{statistic}`, in row order.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for channel_filter in &self.channel_filters {
            for window_filter in &self.window_filters {
                for statistic in window_filter.features().column_names() {
                    names.push(format!(
                        "{}_{}_{}",
                        channel_filter.name(),
                        window_filter.name(),
                        statistic
                    ));
                }
            }
        }
        names
    }

    /// The header row, without terminator.
    pub fn header(&self) -> Result<String, AggregatorError> {
        render_record(self.column_names())
    }

    /// Append a record to the history, evicting the oldest on overflow.
    pub fn update(&mut self, record: Record) {
        self.buffer.push(record);
    }

    /// Feature values of every filter pair over the current history.
    pub fn compute_row(&self) -> Vec<FeatureValue> {
        let mut values = Vec::new();
        for channel_filter in &self.channel_filters {
            let channel_view = channel_filter.apply(self.buffer.iter());

            for window_filter in &self.window_filters {
                let window = window_filter.apply(&channel_view, &self.stats);
                let row =
                    window_filter
                        .features()
                        .compute(&window, channel_filter.channel(), &self.stats);

                if self.verbose {
                    let rendered: Vec<String> =
                        row.iter().map(|(name, value)| format!("{name}={value}")).collect();
                    tracing::debug!(
                        "stats {}_{}: {}",
                        channel_filter.name(),
                        window_filter.name(),
                        rendered.join(" ")
                    );
                }

                values.extend(row.into_values());
            }
        }
        values
    }

    /// Classify one input line, updating the history when it is a record.
    pub fn process_line(&mut self, line: &str) -> LineOutcome {
        self.lines_seen += 1;
        self.stats.record_line_read();

        if self.verbose {
            tracing::debug!(
                line_number = self.lines_seen,
                cached = self.buffer.len(),
                "parsing line: {}",
                line.trim()
            );
        }

        if line.trim().is_empty() || line.starts_with(self.comment_marker.as_str()) {
            return LineOutcome::Forwarded(line.to_string());
        }

        match Record::parse(line) {
            Ok(record) => {
                self.stats.record_parsed();
                self.update(record);
                LineOutcome::Row(self.compute_row())
            }
            Err(e) => {
                tracing::warn!(
                    line_number = self.lines_seen,
                    "Failed to construct record: {e}; line: '{line}'"
                );
                self.stats.record_parse_failure();
                LineOutcome::Malformed(e)
            }
        }
    }

    /// Account for a line that could not even be read as text.
    pub fn reject_line(&mut self, error: RecordError) -> LineOutcome {
        self.lines_seen += 1;
        self.stats.record_line_read();
        tracing::warn!(
            line_number = self.lines_seen,
            "Failed to construct record: {error}"
        );
        self.stats.record_parse_failure();
        LineOutcome::Malformed(error)
    }

    /// Process a whole stream.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, output: W) -> Result<(), AggregatorError> {
        self.run_while(input, output, || true)
    }

    /// Process a stream until it ends or `keep_running` returns false.
    ///
    /// The check happens between lines, so the history and the sink are
    /// always left after a fully processed line.
    ///
    /// Header and data rows are written as CSV records; comment and blank
    /// lines are forwarded byte for byte.
    pub fn run_while<R, W, F>(
        &mut self,
        input: R,
        output: W,
        keep_running: F,
    ) -> Result<(), AggregatorError>
    where
        R: BufRead,
        W: Write,
        F: Fn() -> bool,
    {
        let mut writer = csv_writer(output);

        for line in log_lines(input) {
            if !keep_running() {
                tracing::info!("Stopping at line boundary");
                break;
            }
            let line = line?;

            if !self.header_written {
                let header = self.column_names();
                self.write_record(&mut writer, &header)?;
                self.header_written = true;
            }

            let outcome = match line {
                Ok(line) => self.process_line(&line),
                Err(e) => self.reject_line(e),
            };
            match outcome {
                LineOutcome::Forwarded(text) => {
                    self.stats.record_line_forwarded();
                    self.write_raw(&mut writer, &text)?;
                }
                LineOutcome::Row(values) => self.emit_row(&mut writer, &values)?,
                LineOutcome::Malformed(_) => {}
            }
        }

        writer.flush()?;
        Ok(())
    }

    fn emit_row<W: Write>(
        &self,
        writer: &mut csv::Writer<W>,
        values: &[FeatureValue],
    ) -> Result<(), AggregatorError> {
        if !self.allow_incomplete && !values.iter().all(FeatureValue::is_defined) {
            tracing::debug!("Skipping incomplete record");
            self.stats.record_incomplete_row();
            return Ok(());
        }

        let fields: Vec<String> = values.iter().map(ToString::to_string).collect();
        self.write_record(writer, &fields)?;
        self.stats.record_row_emitted();
        Ok(())
    }

    fn write_record<W: Write>(
        &self,
        writer: &mut csv::Writer<W>,
        fields: &[String],
    ) -> Result<(), AggregatorError> {
        if self.verbose {
            tracing::debug!("output: {fields:?}");
        }
        if self.dry_run {
            return Ok(());
        }
        writer.write_record(fields)?;
        Ok(())
    }

    fn write_raw<W: Write>(
        &self,
        writer: &mut csv::Writer<W>,
        line: &str,
    ) -> Result<(), AggregatorError> {
        if self.verbose {
            tracing::debug!("output: '{line}'");
        }
        if self.dry_run {
            return Ok(());
        }
        // pending CSV records must land before the raw line
        writer.flush()?;
        writeln!(writer.get_mut(), "{line}")?;
        Ok(())
    }
}

fn csv_writer<W: Write>(output: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(COLUMN_SEPARATOR)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(output)
}

/// Render fields as one CSV record without terminator, quoting as needed.
pub fn render_record<I, T>(fields: I) -> Result<String, AggregatorError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv_writer(Vec::new());
    writer.write_record(fields)?;
    let mut bytes = writer.into_inner().map_err(|e| e.into_error())?;
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }
    String::from_utf8(bytes).map_err(|e| AggregatorError::Io(std::io::Error::other(e)))
}

/// One CSV row of feature values; undefined values are empty fields.
pub fn render_row(values: &[FeatureValue]) -> Result<String, AggregatorError> {
    render_record(values.iter().map(ToString::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::channel::Channel;
    use crate::core::windowing::WindowSpec;
    use crate::record::Label;

    fn single_pair_config() -> Config {
        Config {
            channels: vec![Channel::Index(0)],
            windows: vec![WindowSpec::Count { count: 2 }],
            ..Config::default()
        }
    }

    #[test]
    fn test_default_column_count() {
        let aggregator = Aggregator::new(&Config::default()).unwrap();
        // 4 channels × (1 basic window × 2 + 6 extended windows × 6)
        assert_eq!(aggregator.column_names().len(), 4 * (2 + 6 * 6));
        assert_eq!(
            aggregator.column_names()[0],
            "channel-0_last-1-record_label"
        );
        assert_eq!(
            aggregator.column_names().last().unwrap(),
            "all-channels_last-5-minutes_min_max_gap"
        );
    }

    #[test]
    fn test_process_line_outcomes() {
        let mut aggregator = Aggregator::new(&single_pair_config()).unwrap();

        assert_eq!(
            aggregator.process_line("# start experiment"),
            LineOutcome::Forwarded("# start experiment".to_string())
        );
        assert_eq!(
            aggregator.process_line("   "),
            LineOutcome::Forwarded("   ".to_string())
        );
        assert!(matches!(
            aggregator.process_line("not,a,record"),
            LineOutcome::Malformed(RecordError::FieldCount { actual: 3 })
        ));
        assert!(aggregator.buffer().is_empty());

        let outcome = aggregator.process_line("2022-01-01T00:00:00,1,2,-40,0,0,1,0,roomA");
        let LineOutcome::Row(values) = outcome else {
            panic!("expected a row");
        };
        assert_eq!(values.len(), 6);
        assert_eq!(values[0], FeatureValue::Label(Label::Code(0)));
        assert_eq!(values[1], FeatureValue::Number(-40.0));
        assert_eq!(aggregator.buffer().len(), 1);
    }

    #[test]
    fn test_channel_filter_applies_before_window() {
        let mut aggregator = Aggregator::new(&single_pair_config()).unwrap();
        aggregator.process_line("2022-01-01T00:00:00,1,2,-40,0,0,1,0,roomA");
        aggregator.process_line("2022-01-01T00:00:01,1,2,-44,0,0,2,0,roomA");
        let outcome = aggregator.process_line("2022-01-01T00:00:02,1,2,0,-50,0,3,0,roomA");

        // last 2 records with a channel-0 reading, not the channel-0 subset of the last 2
        let LineOutcome::Row(values) = outcome else {
            panic!("expected a row");
        };
        assert_eq!(values[1], FeatureValue::Number(-42.0));
        assert_eq!(values[5], FeatureValue::Number(4.0));
    }

    #[test]
    fn test_render_row() {
        let values = vec![
            FeatureValue::Label(Label::Key("a".into())),
            FeatureValue::Number(-41.5),
            FeatureValue::Undefined,
        ];
        assert_eq!(render_row(&values).unwrap(), "a,-41.5,");
    }

    #[test]
    fn test_fields_are_csv_quoted() {
        let values = vec![
            FeatureValue::Label(Label::Key("a\"b".into())),
            FeatureValue::Label(Label::Key("x,y".into())),
            FeatureValue::Number(-40.0),
        ];
        assert_eq!(render_row(&values).unwrap(), r#""a""b","x,y",-40"#);
    }

    #[test]
    fn test_quoted_label_in_stream() {
        let config = Config {
            allow_incomplete: true,
            ..single_pair_config()
        };
        let mut aggregator = Aggregator::new(&config).unwrap();
        let input = "# note, with comma\n2022-01-01T00:00:00,1,2,-40,0,0,1,a\"b,roomA\n";
        let mut output = Vec::new();
        aggregator.run(input.as_bytes(), &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "# note, with comma");
        assert_eq!(lines[2], r#""a""b",-40,,,-40,"#);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let config = Config {
            allow_incomplete: true,
            ..single_pair_config()
        };
        let mut aggregator = Aggregator::new(&config).unwrap();
        let input: &[u8] = b"2022-01-01T00:00:00,1,2,-40,0,0,1,0,roomA\n\
                             \xff\xfe garbage\n\
                             2022-01-01T00:00:01,1,2,-42,0,0,2,0,roomA\n";
        let mut output = Vec::new();
        aggregator.run(input, &mut output).unwrap();

        let stats = aggregator.stats().stats();
        assert_eq!(stats.lines_read, 3);
        assert_eq!(stats.parse_failures, 1);
        assert_eq!(stats.rows_emitted, 2);
        assert_eq!(String::from_utf8(output).unwrap().lines().count(), 3);
    }

    #[test]
    fn test_unchecked_channel_rejected_at_construction() {
        let config = Config {
            channels: vec![Channel::Index(3)],
            ..single_pair_config()
        };
        assert!(matches!(
            Aggregator::new(&config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let config = Config {
            dry_run: true,
            allow_incomplete: true,
            ..single_pair_config()
        };
        let mut aggregator = Aggregator::new(&config).unwrap();
        let input = "2022-01-01T00:00:00,1,2,-40,0,0,1,0,roomA\n# note\n";
        let mut output = Vec::new();
        aggregator.run(input.as_bytes(), &mut output).unwrap();

        assert!(output.is_empty());
        assert_eq!(aggregator.stats().stats().rows_emitted, 1);
    }

    #[test]
    fn test_run_while_stops_at_line_boundary() {
        let mut aggregator = Aggregator::new(&single_pair_config()).unwrap();
        let input = "2022-01-01T00:00:00,1,2,-40,0,0,1,0,roomA\n\
                     2022-01-01T00:00:01,1,2,-42,0,0,2,0,roomA\n";
        let mut output = Vec::new();
        aggregator
            .run_while(input.as_bytes(), &mut output, || false)
            .unwrap();

        assert!(output.is_empty());
        assert!(aggregator.buffer().is_empty());
    }
}
