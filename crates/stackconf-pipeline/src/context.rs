//! Per-invocation context threaded through every pipeline step.

use stackconf_config::{HostMetadata, Settings};
use stackconf_core::dns::DnsService;
use stackconf_core::inventory::Inventory;
use stackconf_core::process::CommandRunner;
use std::sync::Arc;

use crate::retry::{MutationClient, RetryPolicy};

/// Clients, settings and metadata owned by one command invocation.
#[derive(Clone)]
pub struct StackContext {
    pub inventory: Arc<dyn Inventory>,
    /// Present only when DNS management is configured.
    pub dns: Option<Arc<dyn DnsService>>,
    pub runner: Arc<dyn CommandRunner>,
    pub settings: Settings,
    pub metadata: HostMetadata,
    /// Dry run: log intended mutations without issuing them.
    pub noop: bool,
    pub retry: RetryPolicy,
}

impl StackContext {
    pub fn new(
        inventory: Arc<dyn Inventory>,
        runner: Arc<dyn CommandRunner>,
        settings: Settings,
        metadata: HostMetadata,
    ) -> Self {
        Self {
            inventory,
            dns: None,
            runner,
            settings,
            metadata,
            noop: false,
            retry: RetryPolicy::standard(),
        }
    }

    pub fn with_dns(mut self, dns: Arc<dyn DnsService>) -> Self {
        self.dns = Some(dns);
        self
    }

    pub fn with_noop(mut self, noop: bool) -> Self {
        self.noop = noop;
        self
    }

    /// Mutation client sharing this context's inventory handle.
    pub fn mutations(&self) -> MutationClient {
        MutationClient::new(self.inventory.clone(), self.retry.clone(), self.noop)
    }

    pub fn puppet_version(&self) -> u32 {
        self.settings.puppet.version
    }
}
