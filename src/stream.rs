//! Capture acquisition: how the raw text of a log slice is obtained.
//!
//! The extractor only ever sees a `Read`. Production captures run an external
//! command (by default `adb logcat`), saved captures are replayed from disk,
//! and tests hand in canned text.

use crate::config::CaptureConfig;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Errors raised when a capture stream cannot be constructed at all.
///
/// A capture that runs but produces nothing is not an error; it yields an
/// empty stream instead.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to spawn capture command `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("failed to open capture file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to start capture runtime: {source}")]
    Runtime { source: std::io::Error },
    #[error("capture thread panicked")]
    CaptureThread,
}

/// Produces the raw text of one capture.
pub trait StreamSource: Send + Sync {
    /// Return a readable stream for the log slice selected by `filter`,
    /// starting at the window start `since`.
    ///
    /// Both selectors are opaque to the caller; each source decides how to
    /// use them.
    fn get_stream(&self, filter: &str, since: &str) -> Result<Box<dyn Read + Send>, StreamError>;
}

/// Runs an external command and captures its stdout.
///
/// Arguments may contain `{filter}` and `{since}` placeholders. A non-zero
/// exit keeps whatever stdout was produced; a timeout kills the child and
/// yields an empty stream.
#[derive(Debug, Clone)]
pub struct CommandStreamSource {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandStreamSource {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(capture: &CaptureConfig) -> Self {
        Self::new(
            capture.command.clone(),
            capture.args.clone(),
            Duration::from_secs(capture.timeout_secs),
        )
    }

    async fn capture(&self, args: &[String]) -> Result<Vec<u8>, StreamError> {
        let child = Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StreamError::Spawn {
                command: self.command.clone(),
                source: e,
            })?;

        let pid = child.id().unwrap_or(0);
        tracing::debug!(pid, "capture command started");

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    tracing::warn!(
                        exit_code = ?output.status.code(),
                        stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                        "capture command exited unsuccessfully"
                    );
                }
                tracing::debug!(bytes = output.stdout.len(), "capture command completed");
                Ok(output.stdout)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to collect capture output");
                Ok(Vec::new())
            }
            Err(_elapsed) => {
                // Dropping the wait future drops the child, which kills it.
                tracing::warn!(
                    timeout_secs = self.timeout.as_secs_f64(),
                    "capture command timed out"
                );
                Ok(Vec::new())
            }
        }
    }
}

impl CommandStreamSource {
    /// Drive one capture to completion on a private current-thread runtime.
    fn run_capture(&self, args: &[String]) -> Result<Vec<u8>, StreamError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StreamError::Runtime { source: e })?;
        runtime.block_on(self.capture(args))
    }
}

impl Default for CommandStreamSource {
    fn default() -> Self {
        Self::from_config(&CaptureConfig::default())
    }
}

/// Substitute `{filter}` and `{since}` placeholders in the argument template.
fn build_args(template: &[String], filter: &str, since: &str) -> Vec<String> {
    template
        .iter()
        .map(|arg| arg.replace("{filter}", filter).replace("{since}", since))
        .collect()
}

impl StreamSource for CommandStreamSource {
    fn get_stream(&self, filter: &str, since: &str) -> Result<Box<dyn Read + Send>, StreamError> {
        let args = build_args(&self.args, filter, since);
        tracing::info!(command = %self.command, args = ?args, "capturing log slice");

        let stdout = if tokio::runtime::Handle::try_current().is_ok() {
            // block_on panics inside a runtime; give the capture a thread of its own.
            std::thread::scope(|scope| scope.spawn(|| self.run_capture(&args)).join())
                .map_err(|_panic| StreamError::CaptureThread)??
        } else {
            self.run_capture(&args)?
        };

        Ok(Box::new(Cursor::new(stdout)))
    }
}

/// Replays a capture previously saved to disk. Selectors are ignored.
#[derive(Debug, Clone)]
pub struct FileStreamSource {
    path: PathBuf,
}

impl FileStreamSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StreamSource for FileStreamSource {
    fn get_stream(&self, _filter: &str, _since: &str) -> Result<Box<dyn Read + Send>, StreamError> {
        let file = std::fs::File::open(&self.path).map_err(|e| StreamError::Open {
            path: self.path.clone(),
            source: e,
        })?;
        tracing::info!(path = %self.path.display(), "replaying saved capture");
        Ok(Box::new(file))
    }
}

/// Serves the same in-memory text on every call.
#[derive(Debug, Clone, Default)]
pub struct TextStreamSource {
    text: String,
}

impl TextStreamSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl StreamSource for TextStreamSource {
    fn get_stream(&self, _filter: &str, _since: &str) -> Result<Box<dyn Read + Send>, StreamError> {
        Ok(Box::new(Cursor::new(self.text.clone().into_bytes())))
    }
}
