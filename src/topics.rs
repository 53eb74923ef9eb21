//! Topics API latency collection.
//!
//! The Topics service logs one record per `getTopics` call under the
//! `GetTopicsApiCall` tag, reporting either hot-start or cold-start latency:
//!
//! ```text
//! 06-13 18:09:24.058 20765 20781 D
//!  GetTopicsApiCall: (TOPICS_HOT_START_LATENCY_METRIC: 14)
//! ```

use crate::latency::LatencyHelper;
use crate::pattern::MetricPattern;
use crate::stream::{CommandStreamSource, StreamSource};
use std::sync::LazyLock;

pub const TOPICS_HOT_START_LATENCY_METRIC: &str = "TOPICS_HOT_START_LATENCY_METRIC";
pub const TOPICS_COLD_START_LATENCY_METRIC: &str = "TOPICS_COLD_START_LATENCY_METRIC";

/// Event tag the Topics service logs latency records under.
pub const TOPICS_MARKER: &str = "GetTopicsApiCall";

/// logcat filter expression selecting only Topics latency records.
pub const TOPICS_LOGCAT_FILTER: &str = "GetTopicsApiCall:*";

pub const TOPICS_METRICS: &[&str] = &[
    TOPICS_HOT_START_LATENCY_METRIC,
    TOPICS_COLD_START_LATENCY_METRIC,
];

static TOPICS_PATTERNS: LazyLock<Vec<MetricPattern>> = LazyLock::new(|| {
    TOPICS_METRICS
        .iter()
        .map(|name| MetricPattern::tagged(TOPICS_MARKER, name).unwrap())
        .collect()
});

/// Binds the Topics metric vocabulary to the generic `LatencyHelper`.
#[derive(Debug)]
pub struct TopicsLatencyHelper;

impl TopicsLatencyHelper {
    pub fn patterns() -> Vec<MetricPattern> {
        TOPICS_PATTERNS.clone()
    }

    /// Collector that captures from the device with `adb logcat`.
    pub fn get_logcat_collector() -> LatencyHelper {
        Self::get_collector(Box::new(CommandStreamSource::default()))
    }

    /// Collector reading from an injected source.
    pub fn get_collector(source: Box<dyn StreamSource>) -> LatencyHelper {
        LatencyHelper::new(Self::patterns(), TOPICS_LOGCAT_FILTER, source)
    }
}
