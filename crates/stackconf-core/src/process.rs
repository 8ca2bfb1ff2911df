//! Subprocess types and the command runner trait.
//!
//! Runners execute one local command at a time (puppet, facter, rm) and
//! report its output line by line.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Result;

/// Specification for a command to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Executable path or name.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Maximum wall-clock time before the child is killed.
    pub timeout: Option<Duration>,
}

impl ProcessSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Command line for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A line of log output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    pub content: String,
}

impl LogLine {
    pub fn new(stream: LogStream, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessStatus {
    /// Exited on its own; `None` when killed by a signal.
    Exited(Option<i32>),
    /// Killed after exceeding its timeout.
    TimedOut,
}

/// Result of a completed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub status: ProcessStatus,
    pub lines: Vec<LogLine>,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            ProcessStatus::Exited(code) => code,
            ProcessStatus::TimedOut => None,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code() == Some(0)
    }

    pub fn stderr_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(|l| l.stream == LogStream::Stderr)
            .map(|l| l.content.as_str())
    }

    pub fn stdout(&self) -> String {
        self.lines
            .iter()
            .filter(|l| l.stream == LogStream::Stdout)
            .map(|l| l.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Trait for local command execution.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion (or timeout) and collect its output.
    async fn run(&self, spec: ProcessSpec) -> Result<ProcessOutput>;
}
