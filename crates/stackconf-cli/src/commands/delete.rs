//! `delete`: remove this host from the inventory and DNS.

use anyhow::Result;
use stackconf_pipeline::{HostProvisioner, StackContext};

pub async fn run(ctx: &StackContext) -> Result<()> {
    HostProvisioner::new(ctx).delete().await?;
    Ok(())
}
