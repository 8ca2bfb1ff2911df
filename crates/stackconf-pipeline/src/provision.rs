//! Host provisioning pipeline.
//!
//! Resolves every inventory reference the host needs, writes DNS, replaces
//! the host record, runs the extras, then hands off to the Puppet
//! supervisor. Any failed step before the handoff aborts the pipeline;
//! nothing is rolled back.

use serde_json::Value;
use stackconf_config::settings::required;
use stackconf_config::{FactView, HostMetadata, TemplateContext};
use stackconf_core::dns::{qualify, split_fqdn};
use stackconf_core::host::{
    HostDraft, HostResources, Parameter, domain_payload, parameter_update_payload,
};
use stackconf_core::resource::record_id;
use stackconf_core::{ResourceKind, ResourceRef};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::context::StackContext;
use crate::dns_records::HostDnsRecords;
use crate::error::{PipelineError, PipelineResult};
use crate::extras::Extras;
use crate::retry::MutationOp;
use crate::supervisor::PuppetSupervisor;

/// Host parameter overridden by `puppet.config.server`.
const PUPPET_SERVER_PARAM: &str = "puppetserver";
/// Host parameter overridden by the top-level `tier` setting.
const TIER_PARAM: &str = "tier";

/// Names and addresses of the local host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub fqdn: String,
    pub hostname: String,
    pub domain: String,
    pub ip: String,
    pub mac: String,
}

impl HostIdentity {
    pub fn from_fqdn(fqdn: &str, ip: &str, mac: &str) -> Self {
        let (hostname, domain) = split_fqdn(fqdn);
        Self {
            fqdn: fqdn.to_string(),
            hostname: hostname.to_string(),
            domain: domain.to_string(),
            ip: ip.to_string(),
            mac: mac.to_string(),
        }
    }

    /// Template context with `fqdn`, `hostname`, `domain` and `ip` locals.
    pub fn template_context<'m>(&self, metadata: &'m HostMetadata) -> TemplateContext<'m> {
        TemplateContext::new(metadata)
            .with_local("fqdn", &self.fqdn)
            .with_local("hostname", &self.hostname)
            .with_local("domain", &self.domain)
            .with_local("ip", &self.ip)
    }
}

/// A host draft together with the FQDN it is registered under.
#[derive(Debug, Clone)]
pub struct HostRegistration {
    draft: HostDraft,
    fqdn: String,
}

impl HostRegistration {
    pub fn new(draft: HostDraft, fqdn: impl Into<String>) -> Self {
        Self {
            draft,
            fqdn: fqdn.into(),
        }
    }

    /// Delete any host registered under this FQDN, then create it afresh.
    ///
    /// Returns the new host id. Exhausted retries on either call are fatal.
    pub async fn replace(&self, ctx: &StackContext) -> PipelineResult<String> {
        let collection = ResourceKind::Host.collection();
        let mutations = ctx.mutations();

        if let Some(existing) = ctx.inventory.search(collection, &self.fqdn).await? {
            let id = record_id(&existing)?;
            info!(host = %self.fqdn, id = %id, "Host exists, deleting");
            mutations
                .mutate(MutationOp::Delete, &format!("{}/{}", collection, id), &Value::Null)
                .await?;
        }

        let created = mutations
            .mutate(MutationOp::Create, collection, &self.draft.to_payload())
            .await?;
        let id = record_id(&created)?;
        info!(host = %self.fqdn, id = %id, noop = ctx.noop, "Host created");
        Ok(id)
    }
}

/// Summary of a `create` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub host: HostIdentity,
    pub host_id: String,
    pub puppet_runs: Vec<Duration>,
    pub puppet_succeeded: bool,
}

pub struct HostProvisioner<'a> {
    ctx: &'a StackContext,
}

impl<'a> HostProvisioner<'a> {
    pub fn new(ctx: &'a StackContext) -> Self {
        Self { ctx }
    }

    fn facts(&self) -> FactView<'a> {
        FactView::new(&self.ctx.metadata, self.ctx.puppet_version())
    }

    /// Run the whole `create` pipeline.
    pub async fn create(&self) -> PipelineResult<ProvisionReport> {
        let started = Instant::now();
        if self.ctx.noop {
            info!(noop = true, "Dry run: no inventory, DNS or agent changes will be made");
        }

        let (host, registration) = self.prepare().await?;

        match &self.ctx.dns {
            Some(dns) => {
                info!(domain = %host.domain, "Managing DNS records");
                let written = HostDnsRecords::new(self.ctx, dns.as_ref(), &host).apply().await;
                debug!(records = written, "DNS records written");
            }
            None => debug!("DNS not configured, skipping"),
        }

        let host_id = registration.replace(self.ctx).await?;

        Extras::new(self.ctx, &host).apply().await;

        if self.ctx.noop {
            info!(noop = true, "would run puppet agent");
            return Ok(ProvisionReport {
                host,
                host_id,
                puppet_runs: Vec::new(),
                puppet_succeeded: false,
            });
        }

        let supervision = PuppetSupervisor::new(self.ctx)
            .supervise(&registration, host_id)
            .await?;

        self.report_timings(&supervision.host_id, &supervision.runs, started.elapsed())
            .await;

        Ok(ProvisionReport {
            host,
            host_id: supervision.host_id,
            puppet_runs: supervision.runs,
            puppet_succeeded: supervision.succeeded,
        })
    }

    /// Resolve identity and every reference, building the host draft.
    ///
    /// Issues no mutation except creating a missing domain.
    pub async fn prepare(&self) -> PipelineResult<(HostIdentity, HostRegistration)> {
        let settings = &self.ctx.settings;
        let facts = self.facts();

        let fqdn = facts.fqdn()?;
        let (_, domain_name) = split_fqdn(&fqdn);
        info!(fqdn = %fqdn, "Provisioning host");

        let hostgroup_name = required(&settings.foreman.host.hostgroup, "foreman.host.hostgroup")?;
        let hostgroup = self.resolve(ResourceKind::Hostgroup, hostgroup_name).await?;

        let organization_name = hostgroup_name.split('/').next().unwrap_or(hostgroup_name);
        let organization = self.resolve(ResourceKind::Organization, organization_name).await?;

        let location_name = match &settings.foreman.host.location {
            Some(location) => location.clone(),
            None => fqdn.rsplit('.').next().unwrap_or(&fqdn).to_string(),
        };
        let location = self.resolve(ResourceKind::Location, &location_name).await?;

        let ca_name = required(&settings.puppet.config.ca, "puppet.config.ca")?;
        let puppet_ca = self.resolve(ResourceKind::SmartProxy, ca_name).await?;

        let environment_name = required(
            &settings.puppet.config.environment,
            "puppet.config.environment",
        )?;
        let environment = self.resolve(ResourceKind::Environment, environment_name).await?;

        let architecture = self
            .resolve(ResourceKind::Architecture, &facts.architecture()?)
            .await?;
        let operatingsystem = self
            .resolve(ResourceKind::OperatingSystem, &facts.operating_system()?)
            .await?;

        let domain = self.resolve_or_create_domain(domain_name).await?;

        let interface = settings.foreman.host.interface.as_deref();
        let ip = facts.ip_address(interface)?;
        let mac = facts.mac_address(interface)?;
        debug!(ip = %ip, mac = %mac, interface = ?interface, "Host addresses");

        let resources = HostResources {
            hostgroup,
            puppet_ca,
            location,
            organization,
            environment,
            domain,
            operatingsystem,
            architecture,
        };
        let identity = HostIdentity::from_fqdn(&fqdn, &ip, &mac);
        let draft = HostDraft::new(&resources, &identity.hostname, mac, ip, self.parameters())?;

        Ok((identity, HostRegistration::new(draft, fqdn)))
    }

    /// Look up a required reference by name.
    async fn resolve(&self, kind: ResourceKind, name: &str) -> PipelineResult<ResourceRef> {
        match self.ctx.inventory.search(kind.collection(), name).await? {
            Some(record) => {
                let reference = ResourceRef::new(kind, name).resolved(&record)?;
                debug!(kind = %kind, name = %name, id = ?reference.id, "Resolved");
                Ok(reference)
            }
            None => {
                error!(kind = %kind, name = %name, "Not found in inventory");
                Err(PipelineError::NotFound {
                    kind,
                    name: name.to_string(),
                })
            }
        }
    }

    async fn resolve_or_create_domain(&self, name: &str) -> PipelineResult<ResourceRef> {
        let collection = ResourceKind::Domain.collection();
        if let Some(record) = self.ctx.inventory.search(collection, name).await? {
            debug!(domain = %name, "Domain found");
            return Ok(ResourceRef::new(ResourceKind::Domain, name).resolved(&record)?);
        }

        info!(domain = %name, "Domain not found, creating");
        let dns_proxy = match &self.ctx.settings.foreman.host.dnsproxy {
            Some(proxy) => match self.resolve(ResourceKind::SmartProxy, proxy).await {
                Ok(reference) => Some(reference),
                Err(e) => {
                    warn!(
                        proxy = %proxy,
                        error = %e,
                        "DNS proxy not resolved, creating domain without it"
                    );
                    None
                }
            },
            None => None,
        };

        let created = self
            .ctx
            .mutations()
            .mutate(
                MutationOp::Create,
                collection,
                &domain_payload(name, dns_proxy.as_ref()),
            )
            .await?;
        Ok(ResourceRef::new(ResourceKind::Domain, name).resolved(&created)?)
    }

    /// Host parameters in key order.
    ///
    /// `puppetserver` takes `puppet.config.server` when set. `tier` appears at
    /// most once, with the top-level override winning.
    pub fn parameters(&self) -> Vec<Parameter> {
        let settings = &self.ctx.settings;
        let mut parameters = Vec::new();
        let mut tier_written = false;

        for (name, value) in settings.host_parameters() {
            let value = match name.as_str() {
                PUPPET_SERVER_PARAM => settings.puppet.config.server.clone().unwrap_or(value),
                TIER_PARAM => {
                    tier_written = true;
                    settings.tier.clone().unwrap_or(value)
                }
                _ => value,
            };
            parameters.push(Parameter::new(name, value));
        }

        if let (Some(tier), false) = (&settings.tier, tier_written) {
            parameters.push(Parameter::new(TIER_PARAM, tier));
        }
        parameters
    }

    /// Record per-run and total timings on the host. Failure is only logged.
    async fn report_timings(&self, host_id: &str, runs: &[Duration], total: Duration) {
        let runs_value = runs
            .iter()
            .map(|d| d.as_secs().to_string())
            .collect::<Vec<_>>()
            .join(",");
        let payload = parameter_update_payload(&[
            Parameter::new("puppet_runs", runs_value.clone()),
            Parameter::new("stackconf_time", total.as_secs().to_string()),
        ]);

        info!(puppet_runs = %runs_value, total_secs = total.as_secs(), "Reporting timings");
        if let Err(e) = self
            .ctx
            .mutations()
            .mutate(
                MutationOp::Update,
                &format!("{}/{}", ResourceKind::Host.collection(), host_id),
                &payload,
            )
            .await
        {
            warn!(host_id = %host_id, error = %e, "Failed to report timings");
        }
    }

    /// `delete`: remove the local host from the inventory and its A record from DNS.
    pub async fn delete(&self) -> PipelineResult<()> {
        let fqdn = self.facts().fqdn()?;
        let (hostname, domain) = split_fqdn(&fqdn);
        let collection = ResourceKind::Host.collection();

        match self.ctx.inventory.search(collection, &fqdn).await? {
            Some(existing) => {
                let id = record_id(&existing)?;
                info!(host = %fqdn, id = %id, noop = self.ctx.noop, "Deleting host");
                self.ctx
                    .mutations()
                    .mutate(MutationOp::Delete, &format!("{}/{}", collection, id), &Value::Null)
                    .await?;
            }
            None => info!(host = %fqdn, "Host not registered, nothing to delete"),
        }

        if let Some(dns) = &self.ctx.dns {
            let owner = qualify(domain, hostname);
            if self.ctx.noop {
                info!(noop = true, owner = %owner, "would delete A record");
            } else if let Err(e) = dns.delete_record(domain, "A", &owner).await {
                warn!(owner = %owner, error = %e, "Failed to delete A record");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDns, MockInventory, ScriptedRunner, exited};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use stackconf_config::Settings;
    use std::sync::Arc;

    fn metadata(extra: Value) -> HostMetadata {
        let mut metadata = HostMetadata::from_value(json!({
            "foreman": { "host": {
                "hostgroup": "acme/web",
                "parameter": { "role": "web", "puppetserver": "old.example.com" }
            } },
            "puppet": { "version": 4, "config": {
                "ca": "ca.example.com",
                "server": "puppet.example.com",
                "environment": "production",
                "runs": 2
            } },
            "puppetfacter": {
                "networking": {
                    "fqdn": "web1.env1.example.com",
                    "ip": "10.0.0.5",
                    "mac": "fa:16:3e:00:00:01"
                },
                "os": {
                    "hardware": "x86_64",
                    "name": "Ubuntu",
                    "distro": { "description": "Ubuntu 22.04.3 LTS" }
                }
            }
        }));
        metadata.merge(extra);
        metadata
    }

    fn inventory() -> MockInventory {
        MockInventory::new()
            .with("hostgroups", json!({ "id": 1, "name": "web", "title": "acme/web" }))
            .with("organizations", json!({ "id": 2, "name": "acme" }))
            .with("locations", json!({ "id": 3, "name": "com" }))
            .with("smart_proxies", json!({ "id": 4, "name": "ca.example.com" }))
            .with("environments", json!({ "id": 5, "name": "production" }))
            .with("architectures", json!({ "id": 6, "name": "x86_64" }))
            .with("operatingsystems", json!({ "id": 7, "name": "Ubuntu 22.04.3 LTS" }))
            .with("domains", json!({ "id": 8, "name": "env1.example.com" }))
    }

    fn context(
        inventory: Arc<MockInventory>,
        runner: Arc<ScriptedRunner>,
        metadata: HostMetadata,
    ) -> StackContext {
        let settings = Settings::from_metadata(&metadata).unwrap();
        StackContext::new(inventory, runner, settings, metadata)
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_replaces_existing_host() {
        let inventory = Arc::new(
            inventory().with("hosts", json!({ "id": 42, "name": "web1.env1.example.com" })),
        );
        let runner = Arc::new(ScriptedRunner::new("-tv", vec![exited(0, &[])]));
        let ctx = context(inventory.clone(), runner, metadata(json!({})));

        let report = HostProvisioner::new(&ctx).create().await.unwrap();

        assert!(report.puppet_succeeded);
        assert_eq!(inventory.calls_of("delete")[0].path, "hosts/42");
        let hosts = inventory.records("hosts");
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0]["name"], "web1");
        assert_eq!(hosts[0]["domain_id"], "8");
        assert_eq!(hosts[0]["operatingsystem_id"], "7");
        assert_eq!(report.host_id, hosts[0]["id"].to_string());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timings_reported_after_runs() {
        let inventory = Arc::new(inventory());
        let runner = Arc::new(ScriptedRunner::new("-tv", vec![exited(1, &[]), exited(0, &[])]));
        let ctx = context(inventory.clone(), runner, metadata(json!({})));

        let report = HostProvisioner::new(&ctx).create().await.unwrap();

        let puts = inventory.calls_of("put");
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].path, format!("hosts/{}", report.host_id));
        let params = &puts[0].body["host"]["host_parameters_attributes"];
        assert_eq!(params[0], json!({ "name": "puppet_runs", "value": "12,12" }));
        assert_eq!(params[1]["name"], "stackconf_time");
    }

    #[tokio::test]
    async fn test_missing_resource_aborts_before_mutation() {
        let inventory = Arc::new(MockInventory::new().with(
            "hostgroups",
            json!({ "id": 1, "name": "web", "title": "acme/web" }),
        ));
        let runner = Arc::new(ScriptedRunner::new("-tv", vec![]));
        let ctx = context(inventory.clone(), runner.clone(), metadata(json!({})));

        let result = HostProvisioner::new(&ctx).create().await;

        assert!(matches!(
            result,
            Err(PipelineError::NotFound { kind: ResourceKind::Organization, .. })
        ));
        assert!(inventory.mutations().is_empty());
        assert!(runner.specs().is_empty());
    }

    #[tokio::test]
    async fn test_missing_domain_is_created_with_dns_proxy() {
        let inventory = Arc::new(
            MockInventory::new()
                .with("hostgroups", json!({ "id": 1, "name": "web", "title": "acme/web" }))
                .with("organizations", json!({ "id": 2, "name": "acme" }))
                .with("locations", json!({ "id": 3, "name": "com" }))
                .with("smart_proxies", json!({ "id": 4, "name": "ca.example.com" }))
                .with("smart_proxies", json!({ "id": 9, "name": "dns.example.com" }))
                .with("environments", json!({ "id": 5, "name": "production" }))
                .with("architectures", json!({ "id": 6, "name": "x86_64" }))
                .with("operatingsystems", json!({ "id": 7, "name": "Ubuntu 22.04.3 LTS" })),
        );
        let runner = Arc::new(ScriptedRunner::new("-tv", vec![]));
        let ctx = context(
            inventory.clone(),
            runner,
            metadata(json!({ "foreman": { "host": { "dnsproxy": "dns.example.com" } } })),
        );

        let (identity, _) = HostProvisioner::new(&ctx).prepare().await.unwrap();

        assert_eq!(identity.domain, "env1.example.com");
        let posts = inventory.calls_of("post");
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].path, "domains");
        assert_eq!(
            posts[0].body,
            json!({ "domain": { "name": "env1.example.com", "dns_id": "9" } })
        );
    }

    #[tokio::test]
    async fn test_noop_create_issues_no_mutations() {
        let inventory = Arc::new(
            inventory().with("hosts", json!({ "id": 42, "name": "web1.env1.example.com" })),
        );
        let runner = Arc::new(ScriptedRunner::new("-tv", vec![]));
        let dns = Arc::new(MockDns::new());
        let ctx = context(inventory.clone(), runner.clone(), metadata(json!({})))
            .with_dns(dns.clone())
            .with_noop(true);

        let report = HostProvisioner::new(&ctx).create().await.unwrap();

        assert_eq!(report.host_id, "0");
        assert!(inventory.mutations().is_empty());
        assert_eq!(dns.mutation_count(), 0);
        assert!(runner.specs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dns_written_before_host_creation() {
        let inventory = Arc::new(inventory());
        let runner = Arc::new(ScriptedRunner::new("-tv", vec![exited(0, &[])]));
        let dns = Arc::new(MockDns::new());
        let ctx = context(inventory.clone(), runner, metadata(json!({}))).with_dns(dns.clone());

        HostProvisioner::new(&ctx).create().await.unwrap();

        let upserts = dns.upserts();
        assert_eq!(upserts[0].owner(), "web1.env1.example.com.");
        assert_eq!(upserts[0].content, "10.0.0.5");
        assert_eq!(upserts[1].owner(), "5.0.0.10.in-addr.arpa.");
    }

    #[test]
    fn test_parameters_override_puppetserver_and_dedupe_tier() {
        let inventory = Arc::new(MockInventory::new());
        let runner = Arc::new(ScriptedRunner::new("-tv", vec![]));
        let ctx = context(
            inventory,
            runner,
            metadata(json!({
                "tier": "gold",
                "foreman": { "host": { "parameter": { "tier": "bronze" } } }
            })),
        );

        let params = HostProvisioner::new(&ctx).parameters();

        assert_eq!(
            params,
            vec![
                Parameter::new("puppetserver", "puppet.example.com"),
                Parameter::new("role", "web"),
                Parameter::new("tier", "gold"),
            ]
        );
    }

    #[test]
    fn test_tier_override_added_when_not_namespaced() {
        let ctx = context(
            Arc::new(MockInventory::new()),
            Arc::new(ScriptedRunner::new("-tv", vec![])),
            metadata(json!({ "tier": "silver" })),
        );

        let params = HostProvisioner::new(&ctx).parameters();

        assert_eq!(params.iter().filter(|p| p.name == "tier").count(), 1);
        assert_eq!(params.last(), Some(&Parameter::new("tier", "silver")));
    }

    #[tokio::test]
    async fn test_delete_removes_host_and_a_record() {
        let inventory = Arc::new(
            MockInventory::new()
                .with("hosts", json!({ "id": 42, "name": "web1.env1.example.com" })),
        );
        let dns = Arc::new(MockDns::new());
        let ctx = context(
            inventory.clone(),
            Arc::new(ScriptedRunner::new("-tv", vec![])),
            metadata(json!({})),
        )
        .with_dns(dns.clone());

        HostProvisioner::new(&ctx).delete().await.unwrap();

        assert!(inventory.records("hosts").is_empty());
        assert_eq!(
            dns.deleted_records(),
            vec![(
                "env1.example.com".to_string(),
                "A".to_string(),
                "web1.env1.example.com.".to_string()
            )]
        );
    }
}
