//! Bulk environment reconciler: removes every host and DNS entry of an
//! environment except whitelisted ones.

use serde_json::Value;
use stackconf_core::ResourceKind;
use stackconf_core::dns::DnsService;
use stackconf_core::resource::record_id;
use tracing::{debug, error, info, warn};

use crate::context::StackContext;
use crate::retry::MutationOp;
use crate::whitelist::{Whitelist, matches_environment};

/// Record types removed from an environment zone; everything else is kept.
const RECONCILED_RECORD_TYPES: [&str; 2] = ["A", "CNAME"];

/// Counts of what a reconciliation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub deleted: usize,
    pub protected: usize,
    pub failed: usize,
}

pub struct EnvironmentReconciler<'a> {
    ctx: &'a StackContext,
    whitelist: Whitelist,
    delete_domains: bool,
}

impl<'a> EnvironmentReconciler<'a> {
    pub fn new(ctx: &'a StackContext, whitelist: Whitelist, delete_domains: bool) -> Self {
        Self {
            ctx,
            whitelist,
            delete_domains,
        }
    }

    /// Reconcile every environment token in turn. Never aborts mid-batch.
    pub async fn reconcile(&self, tokens: &[String]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if self.ctx.noop {
            info!(noop = true, "Dry run: no inventory or DNS changes will be made");
        }
        if !self.whitelist.is_empty() {
            info!(whitelist = ?self.whitelist, "Whitelist active");
        }

        for token in tokens {
            info!(environment = %token, "Reconciling environment");
            self.reconcile_hosts(token, &mut report).await;

            match &self.ctx.dns {
                Some(dns) if self.delete_domains => {
                    self.reconcile_zones(dns.as_ref(), token, &mut report).await
                }
                Some(dns) => self.reconcile_records(dns.as_ref(), token, &mut report).await,
                None => debug!("DNS not configured, skipping"),
            }
        }

        info!(
            deleted = report.deleted,
            protected = report.protected,
            failed = report.failed,
            "Environment reconciliation finished"
        );
        report
    }

    fn is_protected(&self, kind: &str, name: &str, report: &mut ReconcileReport) -> bool {
        if self.whitelist.protects(name) {
            info!(kind = %kind, name = %name, "Whitelisted, not deleting");
            report.protected += 1;
            return true;
        }
        false
    }

    async fn reconcile_hosts(&self, token: &str, report: &mut ReconcileReport) {
        let collection = ResourceKind::Host.collection();
        let hosts = match self.ctx.inventory.search_any(collection, token).await {
            Ok(hosts) => hosts,
            Err(e) => {
                error!(environment = %token, error = %e, "Host search failed, skipping hosts");
                return;
            }
        };

        let mutations = self.ctx.mutations();
        for host in hosts {
            let Some(name) = host.get("name").and_then(Value::as_str) else {
                continue;
            };
            if !matches_environment(name, token) || self.is_protected("host", name, report) {
                continue;
            }

            let id = match record_id(&host) {
                Ok(id) => id,
                Err(e) => {
                    warn!(host = %name, error = %e, "Host has no id, skipping");
                    report.failed += 1;
                    continue;
                }
            };

            info!(host = %name, noop = self.ctx.noop, "Deleting host");
            match mutations
                .mutate(MutationOp::Delete, &format!("{}/{}", collection, id), &Value::Null)
                .await
            {
                Ok(_) => report.deleted += 1,
                Err(e) => {
                    error!(host = %name, error = %e, "Failed to delete host");
                    report.failed += 1;
                }
            }
        }
    }

    async fn reconcile_records(
        &self,
        dns: &dyn DnsService,
        token: &str,
        report: &mut ReconcileReport,
    ) {
        let zone = match dns.get_zone(token).await {
            Ok(zone) => zone,
            Err(e) => {
                warn!(zone = %token, error = %e, "Zone lookup failed, skipping records");
                return;
            }
        };

        for rrset in &zone.rrsets {
            if !RECONCILED_RECORD_TYPES.contains(&rrset.record_type.as_str()) {
                continue;
            }
            let name = rrset.name.trim_end_matches('.');
            if self.is_protected(&rrset.record_type, name, report) {
                continue;
            }

            info!(
                zone = %token,
                record_type = %rrset.record_type,
                name = %rrset.name,
                noop = self.ctx.noop,
                "Deleting DNS record"
            );
            if self.ctx.noop {
                report.deleted += 1;
                continue;
            }
            match dns.delete_record(token, &rrset.record_type, &rrset.name).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    error!(name = %rrset.name, error = %e, "Failed to delete DNS record");
                    report.failed += 1;
                }
            }
        }
    }

    async fn reconcile_zones(
        &self,
        dns: &dyn DnsService,
        token: &str,
        report: &mut ReconcileReport,
    ) {
        let zones = match dns.list_zones().await {
            Ok(zones) => zones,
            Err(e) => {
                error!(environment = %token, error = %e, "Zone listing failed, skipping zones");
                return;
            }
        };

        for zone in zones {
            let name = zone.id.trim_end_matches('.');
            if !matches_environment(name, token) || self.is_protected("zone", name, report) {
                continue;
            }

            info!(zone = %zone.id, noop = self.ctx.noop, "Deleting DNS zone");
            if self.ctx.noop {
                report.deleted += 1;
                continue;
            }
            match dns.delete_zone(&zone.id).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    error!(zone = %zone.id, error = %e, "Failed to delete DNS zone");
                    report.failed += 1;
                }
            }
        }
    }
}
