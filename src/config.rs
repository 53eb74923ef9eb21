use crate::pattern::{MetricPattern, PatternError};
use crate::topics::{TopicsLatencyHelper, TOPICS_LOGCAT_FILTER, TOPICS_MARKER, TOPICS_METRICS};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Top-level configuration loaded from collector.toml.
///
/// Every section is optional; the defaults collect Topics latency over
/// `adb logcat`.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct CollectorConfig {
    pub capture: CaptureConfig,
    pub metrics: Vec<MetricConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub command: String,
    /// Argument template; `{filter}` and `{since}` are substituted per capture.
    pub args: Vec<String>,
    /// logcat filter expression. Unset means one `<marker>:*` per configured
    /// marker; see `CollectorConfig::filter`.
    pub filter: Option<String>,
    pub timeout_secs: u64,
}

/// One metric to extract: records look like `<marker>: (<name>: <int>)`,
/// unless `pattern` supplies a custom regex with a single capture group.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricConfig {
    pub name: String,
    #[serde(default)]
    pub marker: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Filter that lets every tag through `logcat -s`.
const ALL_TAGS_FILTER: &str = "*:V";

impl MetricConfig {
    /// Log tag this metric is emitted under. Tagged metrics fall back to the
    /// Topics marker; custom patterns have none unless one is given.
    pub fn effective_marker(&self) -> Option<&str> {
        match (&self.marker, &self.pattern) {
            (Some(marker), _) => Some(marker.as_str()),
            (None, None) => Some(TOPICS_MARKER),
            (None, Some(_)) => None,
        }
    }
}

impl CollectorConfig {
    /// Load from `path`. A missing file means all defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Compile the configured metrics. No `[[metrics]]` entries means the
    /// Topics metrics.
    pub fn patterns(&self) -> Result<Vec<MetricPattern>, ConfigError> {
        if self.metrics.is_empty() {
            return Ok(TopicsLatencyHelper::patterns());
        }
        self.metrics
            .iter()
            .map(|m| -> Result<MetricPattern, ConfigError> {
                let pattern = match &m.pattern {
                    Some(raw) => MetricPattern::new(&m.name, raw)?,
                    None => MetricPattern::tagged(
                        m.marker.as_deref().unwrap_or(TOPICS_MARKER),
                        &m.name,
                    )?,
                };
                Ok(pattern)
            })
            .collect()
    }

    /// Capture filter handed to the stream source.
    ///
    /// An explicit `[capture] filter` wins, with a warning for any configured
    /// marker it does not mention. Otherwise the filter selects exactly the
    /// configured markers, or every tag when a custom pattern has no marker.
    pub fn filter(&self) -> String {
        if let Some(filter) = &self.capture.filter {
            for marker in self.markers() {
                if !filter.contains(marker) {
                    tracing::warn!(
                        marker,
                        filter = %filter,
                        "capture filter does not select a configured marker, its metrics will be missing"
                    );
                }
            }
            return filter.clone();
        }
        if self.metrics.is_empty() {
            return TOPICS_LOGCAT_FILTER.to_string();
        }
        if self.metrics.iter().any(|m| m.effective_marker().is_none()) {
            return ALL_TAGS_FILTER.to_string();
        }
        self.markers()
            .iter()
            .map(|marker| format!("{marker}:*"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Distinct markers of the configured metrics, in configuration order.
    fn markers(&self) -> Vec<&str> {
        if self.metrics.is_empty() {
            return vec![TOPICS_MARKER];
        }
        let mut markers = Vec::new();
        for marker in self.metrics.iter().filter_map(|m| m.effective_marker()) {
            if !markers.contains(&marker) {
                markers.push(marker);
            }
        }
        markers
    }

    /// Names of the metrics that will be extracted, in configuration order.
    pub fn metric_names(&self) -> Vec<String> {
        if self.metrics.is_empty() {
            return TOPICS_METRICS.iter().map(|n| n.to_string()).collect();
        }
        self.metrics.iter().map(|m| m.name.clone()).collect()
    }
}

// --- Default implementations ---

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: "adb".to_string(),
            args: vec![
                "logcat".to_string(),
                "-d".to_string(),
                "-s".to_string(),
                "{filter}".to_string(),
                "-t".to_string(),
                "{since}".to_string(),
            ],
            filter: None,
            timeout_secs: 30,
        }
    }
}
