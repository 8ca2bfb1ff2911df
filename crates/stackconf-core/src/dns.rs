//! DNS record intents and the DNS service trait.

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// TTL used for every record stackconf writes.
pub const DEFAULT_TTL: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum RecordType {
    #[display("A")]
    A,
    #[display("CNAME")]
    Cname,
    #[display("PTR")]
    Ptr,
}

/// A record to upsert. `name` is relative to `zone`; empty means the apex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordIntent {
    pub zone: String,
    pub record_type: RecordType,
    pub name: String,
    pub content: String,
    pub ttl: u32,
}

impl DnsRecordIntent {
    pub fn new(
        zone: impl Into<String>,
        record_type: RecordType,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            zone: zone.into(),
            record_type,
            name: name.into(),
            content: content.into(),
            ttl: DEFAULT_TTL,
        }
    }

    /// Fully qualified owner name with a trailing dot.
    pub fn owner(&self) -> String {
        qualify(&self.zone, &self.name)
    }

    /// Reverse pointer record for an IPv4 address.
    ///
    /// `10.1.2.3` becomes name `3` in zone `2.1.10.in-addr.arpa`.
    pub fn reverse_ptr(ip: &str, fqdn: &str) -> Result<Self> {
        let octets: Vec<&str> = ip.split('.').collect();
        if octets.len() != 4 || octets.iter().any(|o| o.parse::<u8>().is_err()) {
            return Err(Error::InvalidInput(format!("not an IPv4 address: {}", ip)));
        }
        let zone = format!("{}.{}.{}.in-addr.arpa", octets[2], octets[1], octets[0]);
        Ok(Self::new(
            zone,
            RecordType::Ptr,
            octets[3],
            absolute(fqdn),
        ))
    }
}

/// Join a relative name and a zone into an absolute owner name.
pub fn qualify(zone: &str, name: &str) -> String {
    let zone = zone.trim_end_matches('.');
    if name.is_empty() || name == "@" {
        format!("{}.", zone)
    } else {
        format!("{}.{}.", name, zone)
    }
}

/// Append the trailing root dot if missing.
pub fn absolute(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

/// Split a FQDN into its first label and the remaining domain.
///
/// A name with no dot yields an empty domain.
pub fn split_fqdn(fqdn: &str) -> (&str, &str) {
    match fqdn.split_once('.') {
        Some((host, domain)) => (host, domain),
        None => (fqdn, ""),
    }
}

/// A zone as returned by the DNS service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rrsets: Vec<RecordSet>,
}

/// A resource record set inside a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
}

#[async_trait]
pub trait DnsService: Send + Sync {
    /// Fetch a zone with its record sets.
    async fn get_zone(&self, zone: &str) -> Result<Zone>;

    /// List all zones (record sets are not populated).
    async fn list_zones(&self) -> Result<Vec<Zone>>;

    /// Create or replace a record.
    async fn upsert_record(&self, record: &DnsRecordIntent) -> Result<()>;

    /// Delete a record set; `owner` is fully qualified.
    async fn delete_record(&self, zone: &str, record_type: &str, owner: &str) -> Result<()>;

    /// Delete a whole zone by id.
    async fn delete_zone(&self, zone_id: &str) -> Result<()>;
}
