//! `create`: register this host and run the Puppet agent.

use anyhow::Result;
use stackconf_pipeline::{HostProvisioner, StackContext};
use tracing::{info, warn};

pub async fn run(ctx: &StackContext) -> Result<()> {
    let report = HostProvisioner::new(ctx).create().await?;

    let runs: Vec<u64> = report.puppet_runs.iter().map(|d| d.as_secs()).collect();
    if report.puppet_succeeded || ctx.noop {
        info!(
            host = %report.host.fqdn,
            host_id = %report.host_id,
            puppet_runs = ?runs,
            "Host provisioned"
        );
    } else {
        warn!(
            host = %report.host.fqdn,
            host_id = %report.host_id,
            puppet_runs = ?runs,
            "Host registered but Puppet did not complete a clean run"
        );
    }
    Ok(())
}
