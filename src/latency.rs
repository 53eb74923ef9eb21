//! Latency extraction: fold a captured log slice into a metric map.
//!
//! Each call acquires a fresh capture, tests every line against every
//! configured pattern and keeps the last value seen per metric. Bad lines
//! are logged and skipped; only failing to acquire the capture is an error.

use crate::pattern::{MetricPattern, RecordMatch};
use crate::stream::{StreamError, StreamSource};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use thiserror::Error;

/// Metric name to latency in milliseconds. Only metrics that matched at
/// least one record are present.
pub type MetricResult = BTreeMap<String, i64>;

/// logcat `-t` time format (`MM-DD hh:mm:ss.mmm`).
pub const LOGCAT_TIME_FORMAT: &str = "%m-%d %H:%M:%S%.3f";

#[derive(Debug, Error)]
pub enum LatencyError {
    #[error("failed to acquire capture: {0}")]
    Stream(#[from] StreamError),
}

/// Generic latency collector, parameterized by its patterns, capture filter
/// and stream source.
pub struct LatencyHelper {
    patterns: Vec<MetricPattern>,
    filter: String,
    source: Box<dyn StreamSource>,
    started_at: DateTime<Local>,
}

impl std::fmt::Debug for LatencyHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyHelper")
            .field("patterns", &self.patterns)
            .field("filter", &self.filter)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl LatencyHelper {
    /// The capture window starts now; call `start_collecting` to move it.
    pub fn new(
        patterns: Vec<MetricPattern>,
        filter: impl Into<String>,
        source: Box<dyn StreamSource>,
    ) -> Self {
        Self {
            patterns,
            filter: filter.into(),
            source,
            started_at: Local::now(),
        }
    }

    pub fn patterns(&self) -> &[MetricPattern] {
        &self.patterns
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Mark the start of the capture window. Records logged before this
    /// instant are outside the window handed to the stream source.
    pub fn start_collecting(&mut self) -> bool {
        self.started_at = Local::now();
        tracing::debug!(since = %self.since(), "latency collection started");
        true
    }

    /// Place the capture window start explicitly.
    pub fn set_window_start(&mut self, at: DateTime<Local>) {
        self.started_at = at;
    }

    /// Nothing is held between calls, so there is nothing to release.
    pub fn stop_collecting(&mut self) -> bool {
        true
    }

    fn since(&self) -> String {
        self.started_at.format(LOGCAT_TIME_FORMAT).to_string()
    }

    /// Acquire a capture and extract every configured metric from it.
    ///
    /// The stream is consumed and dropped before returning. An empty or
    /// fully non-matching capture yields an empty map.
    pub fn get_metrics(&self) -> Result<MetricResult, LatencyError> {
        let since = self.since();
        let stream = self.source.get_stream(&self.filter, &since)?;
        let metrics = process_output(BufReader::new(stream), &self.patterns);
        tracing::info!(
            filter = %self.filter,
            count = metrics.len(),
            "collected latency metrics"
        );
        Ok(metrics)
    }
}

/// Fold every line of `reader` into a metric map.
///
/// Lines are decoded lossily so one undecodable line cannot hide the rest. A
/// read error ends the capture early; metrics gathered so far are kept.
pub fn process_output<R: BufRead>(mut reader: R, patterns: &[MetricPattern]) -> MetricResult {
    let mut metrics = MetricResult::new();
    let mut buf = Vec::new();
    let mut line_no: u64 = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    line = line_no,
                    "capture read failed, keeping metrics collected so far"
                );
                break;
            }
        }
        line_no += 1;

        let line = String::from_utf8_lossy(&buf);
        let record = line.trim_end_matches(['\n', '\r']);
        fold_record(record, line_no, patterns, &mut metrics);
    }

    metrics
}

fn fold_record(record: &str, line_no: u64, patterns: &[MetricPattern], metrics: &mut MetricResult) {
    for pattern in patterns {
        for outcome in pattern.match_record(record) {
            fold_outcome(pattern, outcome, line_no, metrics);
        }
    }
}

fn fold_outcome(
    pattern: &MetricPattern,
    outcome: RecordMatch,
    line_no: u64,
    metrics: &mut MetricResult,
) {
    match outcome {
        RecordMatch::Value(value) => {
            if let Some(previous) = metrics.insert(pattern.name().to_string(), value) {
                tracing::debug!(
                    metric = pattern.name(),
                    previous,
                    value,
                    line = line_no,
                    "metric reported again, keeping latest"
                );
            }
        }
        RecordMatch::Malformed(raw) => {
            tracing::warn!(
                metric = pattern.name(),
                value = %raw,
                line = line_no,
                "skipping record with malformed latency"
            );
        }
    }
}
