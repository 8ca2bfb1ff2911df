//! Puppet agent outcome classification.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::process::{ProcessOutput, ProcessStatus};

/// Stderr phrase printed when the agent's certificate no longer matches its key.
pub const SSL_MISMATCH_SIGNATURE: &str = "does not match the agent's private key";

/// Stderr phrases printed when the CA is overloaded.
pub const CA_ERROR_SIGNATURES: [&str; 3] = [
    "Could not request certificate",
    "Service Unavailable",
    "execution expired",
];

/// First Puppet major version using the AIO layout and structured facts.
pub const MODERN_VERSION: u32 = 4;

/// Failure signatures that can appear in one stderr line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    SslMismatch,
    CaError,
}

/// Classify a single stderr line.
pub fn classify_line(line: &str) -> Option<Signature> {
    if line.contains(SSL_MISMATCH_SIGNATURE) {
        Some(Signature::SslMismatch)
    } else if CA_ERROR_SIGNATURES.iter().any(|s| line.contains(s)) {
        Some(Signature::CaError)
    } else {
        None
    }
}

/// Meaning of a `puppet agent -t` exit code (detailed exit codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PuppetExit {
    #[display("no changes")]
    NoChanges,
    #[display("no changes applied due to error")]
    Error,
    #[display("changes applied successfully")]
    Changed,
    #[display("some resources failed")]
    ResourceFailures,
    #[display("changes and failures")]
    ChangedWithFailures,
    #[display("unknown exit code {_0}")]
    Unknown(i32),
}

impl PuppetExit {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => PuppetExit::NoChanges,
            1 => PuppetExit::Error,
            2 => PuppetExit::Changed,
            4 => PuppetExit::ResourceFailures,
            6 => PuppetExit::ChangedWithFailures,
            other => PuppetExit::Unknown(other),
        }
    }
}

/// Observations from one supervised agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PuppetRunOutcome {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub ssl_mismatch_detected: bool,
    pub ca_error_detected: bool,
    pub elapsed: Duration,
}

impl PuppetRunOutcome {
    pub fn from_output(output: &ProcessOutput) -> Self {
        let mut outcome = Self {
            exit_code: output.exit_code(),
            timed_out: output.status == ProcessStatus::TimedOut,
            ssl_mismatch_detected: false,
            ca_error_detected: false,
            elapsed: output.elapsed,
        };
        for line in output.stderr_lines() {
            match classify_line(line) {
                Some(Signature::SslMismatch) => outcome.ssl_mismatch_detected = true,
                Some(Signature::CaError) => outcome.ca_error_detected = true,
                None => {}
            }
        }
        outcome
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Filesystem layout of the installed agent, by major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PuppetLayout {
    pub version: u32,
}

impl PuppetLayout {
    pub fn new(version: u32) -> Self {
        Self { version }
    }

    pub fn is_modern(&self) -> bool {
        self.version >= MODERN_VERSION
    }

    pub fn executable(&self) -> &'static str {
        if self.is_modern() {
            "/opt/puppetlabs/bin/puppet"
        } else {
            "/usr/bin/puppet"
        }
    }

    pub fn ssl_dir(&self) -> &'static str {
        if self.is_modern() {
            "/etc/puppetlabs/puppet/ssl"
        } else {
            "/var/lib/puppet/ssl"
        }
    }

    pub fn lock_file(&self) -> &'static str {
        if self.is_modern() {
            "/opt/puppetlabs/puppet/cache/state/agent_catalog_run.lock"
        } else {
            "/var/lib/puppet/state/agent_catalog_run.lock"
        }
    }
}
