//! CLI command implementations.

pub mod create;
pub mod delete;
pub mod deleteenv;

use anyhow::{Context, Result};
use stackconf_clients::{ForemanClient, PowerDnsClient, TokioCommandRunner};
use stackconf_config::Settings;
use stackconf_config::settings::required;
use stackconf_config::sources::load_metadata;
use stackconf_pipeline::StackContext;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Load metadata and settings, then connect the clients for one invocation.
pub async fn load_context(config: Option<&Path>, noop: bool) -> Result<StackContext> {
    let metadata = load_metadata(config)
        .await
        .context("Failed to load host metadata")?;
    let settings = Settings::from_metadata(&metadata).context("Invalid configuration")?;

    let foreman = &settings.foreman.config;
    let inventory = ForemanClient::new(
        required(&foreman.host, "foreman.config.host")?,
        required(&foreman.username, "foreman.config.username")?,
        required(&foreman.password, "foreman.config.password")?,
    )
    .context("Failed to create Foreman client")?;

    let dns = &settings.dns.config;
    let dns_client = match (&dns.host, &dns.key) {
        (Some(host), Some(key)) => {
            debug!(host = %host, "DNS management enabled");
            Some(
                PowerDnsClient::new(host, key, dns.nameservers.clone())
                    .context("Failed to create DNS client")?,
            )
        }
        _ => {
            debug!("DNS host or key not configured, DNS management disabled");
            None
        }
    };

    if noop {
        info!(noop = true, "Dry run enabled: no changes will be made");
    }

    let mut ctx = StackContext::new(
        Arc::new(inventory),
        Arc::new(TokioCommandRunner::new()),
        settings,
        metadata,
    )
    .with_noop(noop);
    if let Some(dns_client) = dns_client {
        ctx = ctx.with_dns(Arc::new(dns_client));
    }
    Ok(ctx)
}

/// Process exit status for a command result.
///
/// Failures exit 0 unless strict mode is on.
pub fn exit_code_for(result: &Result<()>, strict: bool) -> u8 {
    match result {
        Ok(()) => 0,
        Err(_) if strict => 1,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_exit_zero_by_default() {
        let failed: Result<()> = Err(anyhow::anyhow!("hostgroup not found"));
        assert_eq!(exit_code_for(&failed, false), 0);
        assert_eq!(exit_code_for(&Ok(()), false), 0);
    }

    #[test]
    fn test_strict_mode_exits_one_on_failure() {
        let failed: Result<()> = Err(anyhow::anyhow!("hostgroup not found"));
        assert_eq!(exit_code_for(&failed, true), 1);
        assert_eq!(exit_code_for(&Ok(()), true), 0);
    }
}
