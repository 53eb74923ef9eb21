//! Metric patterns: a metric name paired with a single-capture matching rule.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid pattern for {name}: {source}")]
    Regex { name: String, source: regex::Error },
    #[error("pattern for {name} must have exactly one capture group, found {found}")]
    CaptureGroups { name: String, found: usize },
}

/// Outcome of testing one record against one pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordMatch {
    /// The record carried this metric with a valid latency.
    Value(i64),
    /// The record carried this metric but the captured field is not a
    /// non-negative integer.
    Malformed(String),
}

/// A named metric and the rule that recognizes its records.
#[derive(Debug, Clone)]
pub struct MetricPattern {
    name: String,
    regex: Regex,
}

impl MetricPattern {
    /// Compile a pattern from a raw regex, which must have exactly one
    /// capture group holding the latency.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, PatternError> {
        let name = name.into();
        let regex = match Regex::new(pattern) {
            Ok(r) => r,
            Err(e) => return Err(PatternError::Regex { name, source: e }),
        };
        // captures_len counts the implicit whole-match group
        let found = regex.captures_len() - 1;
        if found != 1 {
            return Err(PatternError::CaptureGroups { name, found });
        }
        Ok(Self { name, regex })
    }

    /// Build the pattern for records of the form `<marker>: (<name>: <int>)`.
    ///
    /// Both marker and name are matched literally, so two metrics sharing a
    /// marker never match each other's records. Anything before the marker
    /// (timestamp, pid, level) is ignored.
    pub fn tagged(marker: &str, name: &str) -> Result<Self, PatternError> {
        let pattern = format!(
            r"{}:\s*\({}:\s*([^)\s]*)\)",
            regex::escape(marker),
            regex::escape(name)
        );
        Self::new(name, &pattern)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Test a single record, reporting every occurrence of this metric in
    /// line order. Empty means the record is not about this metric.
    ///
    /// Latencies are non-negative; a negative or non-integer field is
    /// reported as malformed.
    pub fn match_record(&self, record: &str) -> Vec<RecordMatch> {
        self.regex
            .captures_iter(record)
            .filter_map(|caps| caps.get(1))
            .map(|m| {
                let raw = m.as_str();
                match raw.parse::<i64>() {
                    Ok(v) if v >= 0 => RecordMatch::Value(v),
                    _ => RecordMatch::Malformed(raw.to_string()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOT: &str = "TOPICS_HOT_START_LATENCY_METRIC";
    const COLD: &str = "TOPICS_COLD_START_LATENCY_METRIC";

    fn hot() -> MetricPattern {
        MetricPattern::tagged("GetTopicsApiCall", HOT).unwrap()
    }

    #[test]
    fn test_tagged_matches_payload_line() {
        assert_eq!(
            hot().match_record(" GetTopicsApiCall: (TOPICS_HOT_START_LATENCY_METRIC: 14)"),
            vec![RecordMatch::Value(14)]
        );
    }

    #[test]
    fn test_tagged_matches_single_line_record_with_header() {
        let record = "06-13 18:09:24.058 20765 20781 D GetTopicsApiCall: (TOPICS_HOT_START_LATENCY_METRIC: 14)";
        assert_eq!(hot().match_record(record), vec![RecordMatch::Value(14)]);
    }

    #[test]
    fn test_tagged_ignores_header_only_line() {
        assert!(hot().match_record("06-13 18:09:24.058 20765 20781 D").is_empty());
    }

    #[test]
    fn test_tagged_does_not_match_other_metric() {
        let record = " GetTopicsApiCall: (TOPICS_COLD_START_LATENCY_METRIC: 200)";
        assert!(hot().match_record(record).is_empty());
        let cold = MetricPattern::tagged("GetTopicsApiCall", COLD).unwrap();
        assert_eq!(cold.match_record(record), vec![RecordMatch::Value(200)]);
    }

    #[test]
    fn test_tagged_requires_marker() {
        let record = " SomeOtherCall: (TOPICS_HOT_START_LATENCY_METRIC: 14)";
        assert!(hot().match_record(record).is_empty());
    }

    #[test]
    fn test_tagged_name_is_not_a_suffix_match() {
        let record = " GetTopicsApiCall: (X_TOPICS_HOT_START_LATENCY_METRIC: 14)";
        assert!(hot().match_record(record).is_empty());
    }

    #[test]
    fn test_tagged_reports_malformed_value() {
        let record = " GetTopicsApiCall: (TOPICS_HOT_START_LATENCY_METRIC: fast)";
        assert_eq!(
            hot().match_record(record),
            vec![RecordMatch::Malformed("fast".to_string())]
        );
    }

    #[test]
    fn test_tagged_reports_overflowing_value_as_malformed() {
        let record = " GetTopicsApiCall: (TOPICS_HOT_START_LATENCY_METRIC: 99999999999999999999)";
        assert!(matches!(
            hot().match_record(record).as_slice(),
            [RecordMatch::Malformed(_)]
        ));
    }

    #[test]
    fn test_tagged_escapes_regex_metacharacters() {
        let p = MetricPattern::tagged("Api.Call", "M+1").unwrap();
        assert_eq!(p.match_record("Api.Call: (M+1: 3)"), vec![RecordMatch::Value(3)]);
        assert!(p.match_record("ApiXCall: (M+1: 3)").is_empty());
    }

    #[test]
    fn test_negative_value_is_malformed() {
        let record = " GetTopicsApiCall: (TOPICS_HOT_START_LATENCY_METRIC: -5)";
        assert_eq!(
            hot().match_record(record),
            vec![RecordMatch::Malformed("-5".to_string())]
        );
    }

    #[test]
    fn test_zero_latency_is_valid() {
        let record = " GetTopicsApiCall: (TOPICS_HOT_START_LATENCY_METRIC: 0)";
        assert_eq!(hot().match_record(record), vec![RecordMatch::Value(0)]);
    }

    #[test]
    fn test_every_occurrence_on_a_line_is_reported_in_order() {
        let record = " GetTopicsApiCall: (TOPICS_HOT_START_LATENCY_METRIC: x) \
                      GetTopicsApiCall: (TOPICS_HOT_START_LATENCY_METRIC: 7)";
        assert_eq!(
            hot().match_record(record),
            vec![
                RecordMatch::Malformed("x".to_string()),
                RecordMatch::Value(7)
            ]
        );
    }

    #[test]
    fn test_new_rejects_missing_capture_group() {
        let err = MetricPattern::new("M", r"latency: \d+").unwrap_err();
        assert!(matches!(err, PatternError::CaptureGroups { found: 0, .. }));
    }

    #[test]
    fn test_new_rejects_extra_capture_group() {
        let err = MetricPattern::new("M", r"(\w+): (\d+)").unwrap_err();
        assert!(matches!(err, PatternError::CaptureGroups { found: 2, .. }));
    }

    #[test]
    fn test_new_rejects_invalid_regex() {
        let err = MetricPattern::new("M", r"(\d+").unwrap_err();
        assert!(matches!(err, PatternError::Regex { .. }));
    }

    #[test]
    fn test_new_accepts_custom_rule() {
        let p = MetricPattern::new("startup", r"startup took (\d+)ms").unwrap();
        assert_eq!(p.name(), "startup");
        assert_eq!(p.as_str(), r"startup took (\d+)ms");
        assert_eq!(
            p.match_record("I Boot: startup took 321ms"),
            vec![RecordMatch::Value(321)]
        );
    }
}
