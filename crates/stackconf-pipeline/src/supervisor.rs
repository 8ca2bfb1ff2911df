//! Puppet agent run supervisor.
//!
//! Runs the agent up to `puppet.config.runs` times, stopping at the first
//! clean run. Known failure signatures trigger recovery before the next
//! attempt:
//! - timeout: remove the agent lock file and cool down
//! - certificate mismatch: recreate the host record and wipe the SSL dir
//! - CA overload: random backoff and one extra attempt, up to `ca_retries`

use rand::Rng;
use stackconf_config::settings::PuppetConfig;
use stackconf_core::process::ProcessSpec;
use stackconf_core::puppet::{PuppetExit, PuppetLayout, PuppetRunOutcome};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::context::StackContext;
use crate::error::{PipelineError, PipelineResult};
use crate::provision::HostRegistration;

/// Backoff range after a CA overload, in seconds.
const CA_BACKOFF_SECS: std::ops::RangeInclusive<u64> = 60..=180;

/// What happened across all supervised runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisionReport {
    /// Wall-clock duration of every attempt, in order.
    pub runs: Vec<Duration>,
    pub succeeded: bool,
    /// Inventory id of the host, updated when the record was recreated.
    pub host_id: String,
}

/// Agent arguments for server mode or SRV mode.
pub fn agent_args(layout: PuppetLayout, config: &PuppetConfig) -> PipelineResult<Vec<String>> {
    let mut args: Vec<String> = vec!["agent".into(), "-tv".into()];

    if let Some(server) = &config.server {
        let ca = config.ca.as_deref().unwrap_or(server);
        args.extend([
            "--no-use_srv_records".to_string(),
            "--ca_server".to_string(),
            ca.to_string(),
            "--server".to_string(),
            server.clone(),
        ]);
    } else if let Some(srv) = &config.srv {
        args.extend([
            "--use_srv_records".to_string(),
            "--srv_domain".to_string(),
            srv.clone(),
        ]);
        if !layout.is_modern() {
            args.extend(
                [
                    "--pluginsync",
                    "--pluginsource",
                    "puppet:///plugins",
                    "--configtimeout",
                    "1200",
                ]
                .map(String::from),
            );
        }
    } else {
        return Err(PipelineError::missing("puppet.config.server"));
    }

    Ok(args)
}

fn ca_backoff() -> Duration {
    Duration::from_secs(rand::rng().random_range(CA_BACKOFF_SECS))
}

pub struct PuppetSupervisor<'a> {
    ctx: &'a StackContext,
    layout: PuppetLayout,
}

impl<'a> PuppetSupervisor<'a> {
    pub fn new(ctx: &'a StackContext) -> Self {
        Self {
            ctx,
            layout: PuppetLayout::new(ctx.puppet_version()),
        }
    }

    fn config(&self) -> &PuppetConfig {
        &self.ctx.settings.puppet.config
    }

    /// Enable the agent, then run it until success or the budget is spent.
    pub async fn supervise(
        &self,
        registration: &HostRegistration,
        host_id: String,
    ) -> PipelineResult<SupervisionReport> {
        let args = agent_args(self.layout, self.config())?;
        let executable = self.layout.executable();

        debug!("Enabling puppet agent");
        let enabled = self
            .ctx
            .runner
            .run(ProcessSpec::new(executable, ["agent", "--enable"]))
            .await?;
        if !enabled.success() {
            warn!(exit_code = ?enabled.exit_code(), "Enabling puppet agent failed");
        }

        let mut report = SupervisionReport {
            runs: Vec::new(),
            succeeded: false,
            host_id,
        };
        let mut budget = self.config().runs;
        let mut ca_retries_left = self.config().ca_retries;
        let mut attempt = 0;

        while attempt < budget {
            attempt += 1;
            info!(attempt, budget, "Running puppet agent");

            let spec = ProcessSpec::new(executable, args.clone())
                .with_timeout(self.config().run_timeout());
            let output = self.ctx.runner.run(spec).await?;
            let outcome = PuppetRunOutcome::from_output(&output);
            report.runs.push(outcome.elapsed);

            if outcome.succeeded() {
                info!(attempt, elapsed_secs = outcome.elapsed.as_secs(), "Puppet run succeeded");
                report.succeeded = true;
                break;
            }

            if outcome.timed_out {
                warn!(attempt, timeout_secs = self.config().timeout, "Puppet run timed out");
                self.recover_timeout().await;
                continue;
            }

            let exit = outcome
                .exit_code
                .map(|code| PuppetExit::from_code(code).to_string())
                .unwrap_or_else(|| "killed by signal".to_string());
            warn!(
                attempt,
                exit_code = ?outcome.exit_code,
                outcome = %exit,
                "Puppet run failed"
            );

            if outcome.ssl_mismatch_detected {
                report.host_id = self.recover_certificate(registration).await?;
            } else if outcome.ca_error_detected {
                if ca_retries_left > 0 {
                    ca_retries_left -= 1;
                    budget += 1;
                    let delay = ca_backoff();
                    warn!(
                        delay_secs = delay.as_secs(),
                        retries_left = ca_retries_left,
                        "Puppet CA unavailable, backing off"
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    warn!("Puppet CA retry budget exhausted");
                }
            }
        }

        if !report.succeeded {
            warn!(attempts = report.runs.len(), "Puppet did not complete a clean run");
        }
        Ok(report)
    }

    async fn recover_timeout(&self) {
        let lock = self.layout.lock_file();
        debug!(lock_file = %lock, "Removing agent lock file");
        if let Err(e) = self.ctx.runner.run(ProcessSpec::new("rm", ["-f", lock])).await {
            warn!(lock_file = %lock, error = %e, "Failed to remove agent lock file");
        }
        let cooldown = self.config().cooldown();
        info!(cooldown_secs = cooldown.as_secs(), "Cooling down after timeout");
        tokio::time::sleep(cooldown).await;
    }

    /// Replace the host record and wipe local certificates. Returns the new host id.
    async fn recover_certificate(&self, registration: &HostRegistration) -> PipelineResult<String> {
        warn!("Agent certificate does not match its key, recreating host");
        let host_id = registration.replace(self.ctx).await?;

        let ssl_dir = self.layout.ssl_dir();
        info!(ssl_dir = %ssl_dir, "Wiping agent SSL directory");
        let output = self
            .ctx
            .runner
            .run(ProcessSpec::new("rm", ["-rf", ssl_dir]))
            .await?;
        if !output.success() {
            warn!(
                ssl_dir = %ssl_dir,
                exit_code = ?output.exit_code(),
                "Failed to wipe SSL directory"
            );
        }
        Ok(host_id)
    }
}
