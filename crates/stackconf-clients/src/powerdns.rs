//! PowerDNS authoritative server API client.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{Value, json};
use stackconf_core::dns::{DnsRecordIntent, DnsService, Zone, absolute};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::ClientError;

/// PowerDNS client bound to the `localhost` server.
pub struct PowerDnsClient {
    client: Client,
    base_url: String,
    api_key: String,
    /// Nameservers for zones created on demand.
    nameservers: Vec<String>,
}

impl PowerDnsClient {
    pub fn new(host: &str, api_key: &str, nameservers: Vec<String>) -> Result<Self, ClientError> {
        let base = Url::parse(host)
            .map_err(|e| ClientError::InvalidInput(format!("bad DNS host '{}': {}", host, e)))?;

        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            base_url: format!(
                "{}/api/v1/servers/localhost",
                base.as_str().trim_end_matches('/')
            ),
            api_key: api_key.to_string(),
            nameservers,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn zone_url(&self, zone: &str) -> String {
        self.url(&format!("zones/{}", absolute(zone)))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, ClientError> {
        let response = request.header("X-API-Key", &self.api_key).send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn patch_rrsets(&self, zone: &str, rrset: Value) -> Result<Value, ClientError> {
        self.send(
            self.client
                .patch(self.zone_url(zone))
                .json(&json!({ "rrsets": [rrset] })),
        )
        .await
    }

    async fn create_zone(&self, zone: &str) -> Result<(), ClientError> {
        info!(zone = %zone, "Creating DNS zone");
        let nameservers: Vec<String> = self.nameservers.iter().map(|n| absolute(n)).collect();
        self.send(self.client.post(self.url("zones")).json(&json!({
            "name": absolute(zone),
            "kind": "Native",
            "nameservers": nameservers,
        })))
        .await?;
        Ok(())
    }
}

/// Body of a REPLACE rrset change.
pub(crate) fn replace_rrset(record: &DnsRecordIntent) -> Value {
    json!({
        "name": record.owner(),
        "type": record.record_type.to_string(),
        "ttl": record.ttl,
        "changetype": "REPLACE",
        "records": [{ "content": record.content, "disabled": false }],
    })
}

/// Body of a DELETE rrset change.
pub(crate) fn delete_rrset(record_type: &str, owner: &str) -> Value {
    json!({
        "name": absolute(owner),
        "type": record_type,
        "changetype": "DELETE",
    })
}

fn zone_missing(e: &ClientError) -> bool {
    match e {
        ClientError::Api { status, body } => {
            *status == StatusCode::NOT_FOUND.as_u16()
                || (*status == StatusCode::UNPROCESSABLE_ENTITY.as_u16()
                    && body.contains("Could not find domain"))
        }
        _ => false,
    }
}

#[async_trait]
impl DnsService for PowerDnsClient {
    async fn get_zone(&self, zone: &str) -> stackconf_core::Result<Zone> {
        let body = self.send(self.client.get(self.zone_url(zone))).await?;
        serde_json::from_value(body)
            .map_err(|e| ClientError::Parse(e.to_string()).into())
    }

    async fn list_zones(&self) -> stackconf_core::Result<Vec<Zone>> {
        let body = self.send(self.client.get(self.url("zones"))).await?;
        serde_json::from_value(body)
            .map_err(|e| ClientError::Parse(e.to_string()).into())
    }

    async fn upsert_record(&self, record: &DnsRecordIntent) -> stackconf_core::Result<()> {
        debug!(
            zone = %record.zone,
            record_type = %record.record_type,
            name = %record.name,
            content = %record.content,
            "Upserting DNS record"
        );
        match self.patch_rrsets(&record.zone, replace_rrset(record)).await {
            Ok(_) => Ok(()),
            Err(e) if zone_missing(&e) => {
                self.create_zone(&record.zone).await?;
                self.patch_rrsets(&record.zone, replace_rrset(record)).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_record(
        &self,
        zone: &str,
        record_type: &str,
        owner: &str,
    ) -> stackconf_core::Result<()> {
        debug!(zone = %zone, record_type = %record_type, owner = %owner, "Deleting DNS record");
        self.patch_rrsets(zone, delete_rrset(record_type, owner))
            .await?;
        Ok(())
    }

    async fn delete_zone(&self, zone_id: &str) -> stackconf_core::Result<()> {
        debug!(zone = %zone_id, "Deleting DNS zone");
        self.send(self.client.delete(self.url(&format!("zones/{}", zone_id))))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use stackconf_core::dns::RecordType;

    #[test]
    fn test_zone_url_is_absolute() {
        let client = PowerDnsClient::new("http://pdns:8081", "key", vec![]).unwrap();
        assert_eq!(
            client.zone_url("example.com"),
            "http://pdns:8081/api/v1/servers/localhost/zones/example.com."
        );
    }

    #[test]
    fn test_replace_rrset_body() {
        let record =
            DnsRecordIntent::new("example.com", RecordType::Cname, "www", "web1.example.com.");
        assert_eq!(
            replace_rrset(&record),
            json!({
                "name": "www.example.com.",
                "type": "CNAME",
                "ttl": 60,
                "changetype": "REPLACE",
                "records": [{ "content": "web1.example.com.", "disabled": false }],
            })
        );
    }

    #[test]
    fn test_delete_rrset_body() {
        assert_eq!(
            delete_rrset("A", "foo.env1.example.com"),
            json!({ "name": "foo.env1.example.com.", "type": "A", "changetype": "DELETE" })
        );
    }

    #[test]
    fn test_zone_missing_detection() {
        assert!(zone_missing(&ClientError::Api { status: 404, body: String::new() }));
        assert!(zone_missing(&ClientError::Api {
            status: 422,
            body: "Could not find domain 'x.'".to_string()
        }));
        assert!(!zone_missing(&ClientError::Api { status: 422, body: "bad".to_string() }));
    }
}
