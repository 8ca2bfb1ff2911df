//! DNS records written for a provisioned host.

use serde_json::Value;
use stackconf_config::TemplateContext;
use stackconf_config::metadata::scalar_to_string;
use stackconf_core::dns::{DnsRecordIntent, DnsService, RecordType, absolute, qualify, split_fqdn};
use tracing::{debug, info, warn};

use crate::context::StackContext;
use crate::provision::HostIdentity;

/// Record templates read from `dns.record.*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTemplate {
    /// `{fqdn: ip}`: A record in the zone of the fqdn.
    A,
    /// `{name: ip}`: A record in the host's domain.
    MyA,
    /// `{fqdn: target}`: CNAME in the zone of the fqdn.
    Cname,
    /// `name`: CNAME in the host's domain pointing at the host.
    MyCname,
    /// `fqdn`: CNAME in the zone of the fqdn pointing at the host.
    MyPubCname,
    /// `{zone: ip}`: A record at the zone apex.
    RootA,
}

impl RecordTemplate {
    pub const ALL: [RecordTemplate; 6] = [
        RecordTemplate::A,
        RecordTemplate::MyA,
        RecordTemplate::Cname,
        RecordTemplate::MyCname,
        RecordTemplate::MyPubCname,
        RecordTemplate::RootA,
    ];

    pub fn config_key(&self) -> &'static str {
        match self {
            RecordTemplate::A => "dns.record.a",
            RecordTemplate::MyA => "dns.record.mya",
            RecordTemplate::Cname => "dns.record.cname",
            RecordTemplate::MyCname => "dns.record.mycname",
            RecordTemplate::MyPubCname => "dns.record.mypubcname",
            RecordTemplate::RootA => "dns.record.roota",
        }
    }

    /// Entries are maps of key to value; otherwise plain strings.
    fn is_map(&self) -> bool {
        !matches!(self, RecordTemplate::MyCname | RecordTemplate::MyPubCname)
    }

    /// Build the record for one expanded entry. `value` is unused by list templates.
    pub fn intent(&self, host: &HostIdentity, key: &str, value: &str) -> DnsRecordIntent {
        match self {
            RecordTemplate::A => {
                let (name, zone) = split_fqdn(key);
                DnsRecordIntent::new(zone, RecordType::A, name, value)
            }
            RecordTemplate::MyA => DnsRecordIntent::new(&host.domain, RecordType::A, key, value),
            RecordTemplate::Cname => {
                let (name, zone) = split_fqdn(key);
                DnsRecordIntent::new(zone, RecordType::Cname, name, absolute(value))
            }
            RecordTemplate::MyCname => DnsRecordIntent::new(
                &host.domain,
                RecordType::Cname,
                key,
                absolute(&host.fqdn),
            ),
            RecordTemplate::MyPubCname => {
                let (name, zone) = split_fqdn(key);
                DnsRecordIntent::new(zone, RecordType::Cname, name, absolute(&host.fqdn))
            }
            RecordTemplate::RootA => DnsRecordIntent::new(key, RecordType::A, "", value),
        }
    }
}

/// Writes the host's own records and the configured templates.
pub struct HostDnsRecords<'a> {
    ctx: &'a StackContext,
    dns: &'a dyn DnsService,
    host: &'a HostIdentity,
}

impl<'a> HostDnsRecords<'a> {
    pub fn new(ctx: &'a StackContext, dns: &'a dyn DnsService, host: &'a HostIdentity) -> Self {
        Self { ctx, dns, host }
    }

    /// Replace the host A record, add its PTR, then apply every template.
    ///
    /// Returns the number of records written. Single failures are logged.
    pub async fn apply(&self) -> usize {
        let owner = qualify(&self.host.domain, &self.host.hostname);
        if self.ctx.noop {
            info!(noop = true, owner = %owner, "would delete A record");
        } else if let Err(e) = self.dns.delete_record(&self.host.domain, "A", &owner).await {
            debug!(owner = %owner, error = %e, "No previous A record removed");
        }

        let mut written = 0;
        let host_a = DnsRecordIntent::new(
            &self.host.domain,
            RecordType::A,
            &self.host.hostname,
            &self.host.ip,
        );
        written += usize::from(self.upsert(&host_a).await);

        match DnsRecordIntent::reverse_ptr(&self.host.ip, &self.host.fqdn) {
            Ok(ptr) => written += usize::from(self.upsert(&ptr).await),
            Err(e) => warn!(ip = %self.host.ip, error = %e, "Skipping reverse record"),
        }

        let templates = self.host.template_context(&self.ctx.metadata);
        for template in RecordTemplate::ALL {
            written += self.apply_template(template, &templates).await;
        }
        written
    }

    async fn apply_template(&self, template: RecordTemplate, ctx: &TemplateContext<'_>) -> usize {
        let key = template.config_key();
        let mut written = 0;

        for entry in self.ctx.metadata.indexed_list(key) {
            if template.is_map() {
                let Value::Object(map) = entry else {
                    debug!(key = %key, "Entry is not a map, skipping");
                    continue;
                };
                for (raw_key, raw_value) in &map {
                    let Some(raw_value) = scalar_to_string(raw_value) else {
                        debug!(key = %key, entry = %raw_key, "Value is not a scalar, skipping");
                        continue;
                    };
                    let rendered = ctx
                        .render(raw_key)
                        .and_then(|k| ctx.render(&raw_value).map(|v| (k, v)));
                    match rendered {
                        Ok((name, value)) => {
                            let intent = template.intent(self.host, &name, &value);
                            written += usize::from(self.upsert(&intent).await);
                        }
                        Err(e) => {
                            // Rest of this map is skipped
                            warn!(
                                key = %key,
                                entry = %raw_key,
                                error = %e,
                                "Template expansion failed"
                            );
                            break;
                        }
                    }
                }
            } else {
                let Some(raw) = scalar_to_string(&entry) else {
                    debug!(key = %key, "Entry is not a string, skipping");
                    continue;
                };
                match ctx.render(&raw) {
                    Ok(name) => {
                        let intent = template.intent(self.host, &name, "");
                        written += usize::from(self.upsert(&intent).await);
                    }
                    Err(e) => {
                        warn!(key = %key, entry = %raw, error = %e, "Template expansion failed")
                    }
                }
            }
        }
        written
    }

    async fn upsert(&self, record: &DnsRecordIntent) -> bool {
        if self.ctx.noop {
            info!(
                noop = true,
                record_type = %record.record_type,
                owner = %record.owner(),
                content = %record.content,
                "would upsert DNS record"
            );
            return false;
        }
        match self.dns.upsert_record(record).await {
            Ok(()) => {
                info!(
                    record_type = %record.record_type,
                    owner = %record.owner(),
                    content = %record.content,
                    "DNS record updated"
                );
                true
            }
            Err(e) => {
                warn!(
                    record_type = %record.record_type,
                    owner = %record.owner(),
                    error = %e,
                    "Failed to update DNS record"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDns, MockInventory, ScriptedRunner};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use stackconf_config::{HostMetadata, Settings};
    use std::sync::Arc;

    fn host() -> HostIdentity {
        HostIdentity::from_fqdn("web1.env1.example.com", "10.0.0.5", "fa:16:3e:00:00:01")
    }

    fn context(metadata: serde_json::Value) -> StackContext {
        StackContext::new(
            Arc::new(MockInventory::new()),
            Arc::new(ScriptedRunner::new("", vec![])),
            Settings::default(),
            HostMetadata::from_value(metadata),
        )
    }

    #[test]
    fn test_template_intents() {
        let host = host();
        let a = RecordTemplate::A.intent(&host, "lb.example.org", "10.0.0.9");
        assert_eq!((a.zone.as_str(), a.name.as_str()), ("example.org", "lb"));

        let mya = RecordTemplate::MyA.intent(&host, "vip", "10.0.0.10");
        assert_eq!(mya.owner(), "vip.env1.example.com.");

        let cname = RecordTemplate::Cname.intent(&host, "www.example.org", "lb.example.org");
        assert_eq!(cname.content, "lb.example.org.");

        let mycname = RecordTemplate::MyCname.intent(&host, "api", "");
        assert_eq!(mycname.owner(), "api.env1.example.com.");
        assert_eq!(mycname.content, "web1.env1.example.com.");

        let pubcname = RecordTemplate::MyPubCname.intent(&host, "shop.example.net", "");
        assert_eq!(pubcname.zone, "example.net");
        assert_eq!(pubcname.content, "web1.env1.example.com.");

        let root = RecordTemplate::RootA.intent(&host, "example.org", "10.0.0.11");
        assert_eq!(root.owner(), "example.org.");
    }

    #[tokio::test]
    async fn test_apply_writes_host_and_template_records() {
        let ctx = context(json!({
            "dns": { "record": {
                "mycname": ["{{ hostname }}-alias"],
                "mya": [{ "db": "{{ ip }}" }]
            } }
        }));
        let dns = MockDns::new();
        let host = host();

        let written = HostDnsRecords::new(&ctx, &dns, &host).apply().await;

        assert_eq!(written, 4);
        assert_eq!(
            dns.deleted_records(),
            vec![(
                "env1.example.com".to_string(),
                "A".to_string(),
                "web1.env1.example.com.".to_string()
            )]
        );
        let upserts = dns.upserts();
        assert_eq!(upserts[0].owner(), "web1.env1.example.com.");
        assert_eq!(upserts[1].zone, "0.0.10.in-addr.arpa");
        assert_eq!(upserts[2].owner(), "db.env1.example.com.");
        assert_eq!(upserts[2].content, "10.0.0.5");
        assert_eq!(upserts[3].owner(), "web1-alias.env1.example.com.");
    }

    #[tokio::test]
    async fn test_template_error_skips_rest_of_map() {
        let ctx = context(json!({
            "dns": { "record": {
                "mya": [
                    { "a1": "{{ missing.key }}", "a2": "10.0.0.2" },
                    { "b1": "10.0.0.3" }
                ]
            } }
        }));
        let dns = MockDns::new();
        let host = host();

        HostDnsRecords::new(&ctx, &dns, &host).apply().await;

        let names: Vec<String> = dns.upserts().iter().skip(2).map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["b1".to_string()]);
    }

    #[tokio::test]
    async fn test_noop_writes_nothing() {
        let ctx = context(json!({ "dns": { "record": { "mycname": ["www"] } } })).with_noop(true);
        let dns = MockDns::new();
        let host = host();

        let written = HostDnsRecords::new(&ctx, &dns, &host).apply().await;

        assert_eq!(written, 0);
        assert_eq!(dns.mutation_count(), 0);
    }
}
