//! Local command runner built on `tokio::process`.

use async_trait::async_trait;
use stackconf_core::Error;
use stackconf_core::process::{
    CommandRunner, LogLine, LogStream, ProcessOutput, ProcessSpec, ProcessStatus,
};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Runs commands on the local host, echoing their output as it arrives.
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner {
    /// Suppress echoing output to the terminal.
    quiet: bool,
}

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quiet() -> Self {
        Self { quiet: true }
    }

    fn echo(&self, stream: LogStream, line: &str) {
        if self.quiet {
            return;
        }
        match stream {
            LogStream::Stdout => println!("{}", line),
            LogStream::Stderr => eprintln!("{}", line),
        }
    }

    /// Drain both streams until EOF, then reap the child.
    async fn drain_and_wait<O, E>(
        &self,
        child: &mut Child,
        stdout: O,
        stderr: E,
        lines: &mut Vec<LogLine>,
    ) -> std::io::Result<ExitStatus>
    where
        O: AsyncRead + Unpin,
        E: AsyncRead + Unpin,
    {
        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();
        let mut stdout_done = false;
        let mut stderr_done = false;

        while !(stdout_done && stderr_done) {
            tokio::select! {
                line = stdout_reader.next_line(), if !stdout_done => {
                    match line {
                        Ok(Some(line)) => {
                            debug!(stream = "stdout", line = %line, "Process output");
                            self.echo(LogStream::Stdout, &line);
                            lines.push(LogLine::new(LogStream::Stdout, line));
                        }
                        Ok(None) => stdout_done = true,
                        Err(e) => {
                            warn!(error = %e, "Error reading stdout");
                            stdout_done = true;
                        }
                    }
                }
                line = stderr_reader.next_line(), if !stderr_done => {
                    match line {
                        Ok(Some(line)) => {
                            debug!(stream = "stderr", line = %line, "Process output");
                            self.echo(LogStream::Stderr, &line);
                            lines.push(LogLine::new(LogStream::Stderr, line));
                        }
                        Ok(None) => stderr_done = true,
                        Err(e) => {
                            warn!(error = %e, "Error reading stderr");
                            stderr_done = true;
                        }
                    }
                }
            }
        }

        child.wait().await
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: ProcessSpec) -> stackconf_core::Result<ProcessOutput> {
        info!(command = %spec.display(), "Running command");
        let started = Instant::now();

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::ExecutionFailed(format!("failed to spawn {}: {}", spec.program, e))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("child stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("child stderr was not captured".to_string()))?;

        let mut lines = Vec::new();
        let waited = match spec.timeout {
            Some(limit) => tokio::time::timeout(
                limit,
                self.drain_and_wait(&mut child, stdout, stderr, &mut lines),
            )
            .await
            .ok(),
            None => Some(self.drain_and_wait(&mut child, stdout, stderr, &mut lines).await),
        };

        let status = match waited {
            Some(Ok(exit)) => ProcessStatus::Exited(exit.code()),
            Some(Err(e)) => {
                return Err(Error::ExecutionFailed(format!(
                    "failed waiting for {}: {}",
                    spec.program, e
                )));
            }
            None => {
                warn!(command = %spec.display(), "Command timed out, killing it");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed out command");
                }
                ProcessStatus::TimedOut
            }
        };

        let elapsed = started.elapsed();
        debug!(
            command = %spec.program,
            status = ?status,
            elapsed_secs = elapsed.as_secs(),
            "Command finished"
        );

        Ok(ProcessOutput {
            status,
            lines,
            elapsed,
        })
    }
}
