//! `deleteenv`: bulk removal of environments.

use anyhow::Result;
use stackconf_pipeline::{EnvironmentReconciler, StackContext, Whitelist};

pub async fn run(
    ctx: &StackContext,
    envs: &[String],
    whitelist: &str,
    delete_domains: bool,
) -> Result<()> {
    let report = EnvironmentReconciler::new(ctx, Whitelist::parse(whitelist), delete_domains)
        .reconcile(envs)
        .await;

    if report.failed > 0 {
        anyhow::bail!("{} deletions failed", report.failed);
    }
    Ok(())
}
