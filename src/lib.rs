//! Latency metric collection from device logs.
//!
//! An instrumented subsystem logs timing records such as
//! `GetTopicsApiCall: (TOPICS_HOT_START_LATENCY_METRIC: 14)`. A
//! [`LatencyHelper`] captures a log slice through a [`StreamSource`], matches
//! each line against its [`MetricPattern`]s and returns a map from metric name
//! to latency in milliseconds.

pub mod config;
pub mod latency;
pub mod pattern;
pub mod stream;
pub mod topics;

pub use latency::{LatencyError, LatencyHelper, MetricResult};
pub use pattern::{MetricPattern, RecordMatch};
pub use stream::{CommandStreamSource, FileStreamSource, StreamError, StreamSource, TextStreamSource};
pub use topics::TopicsLatencyHelper;
