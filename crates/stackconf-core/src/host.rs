//! Host records submitted to the inventory service.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{ResourceKind, ResourceRef, Result};

/// A host parameter (`host_parameters_attributes` entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// References a host record must point at before it can be created.
#[derive(Debug, Clone)]
pub struct HostResources {
    pub hostgroup: ResourceRef,
    pub puppet_ca: ResourceRef,
    pub location: ResourceRef,
    pub organization: ResourceRef,
    pub environment: ResourceRef,
    pub domain: ResourceRef,
    pub operatingsystem: ResourceRef,
    pub architecture: ResourceRef,
}

/// A fully resolved host, ready to POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDraft {
    pub hostgroup_id: String,
    pub puppet_ca_proxy_id: String,
    pub location_id: String,
    pub organization_id: String,
    pub environment_id: String,
    pub domain_id: String,
    pub operatingsystem_id: String,
    pub architecture_id: String,
    pub name: String,
    pub mac: String,
    pub ip: String,
    pub build: bool,
    #[serde(rename = "host_parameters_attributes")]
    pub parameters: Vec<Parameter>,
}

impl HostDraft {
    /// Build a draft; fails if any of the eight references is unresolved.
    pub fn new(
        resources: &HostResources,
        name: impl Into<String>,
        mac: impl Into<String>,
        ip: impl Into<String>,
        parameters: Vec<Parameter>,
    ) -> Result<Self> {
        Ok(Self {
            hostgroup_id: resources.hostgroup.require_id()?.to_string(),
            puppet_ca_proxy_id: resources.puppet_ca.require_id()?.to_string(),
            location_id: resources.location.require_id()?.to_string(),
            organization_id: resources.organization.require_id()?.to_string(),
            environment_id: resources.environment.require_id()?.to_string(),
            domain_id: resources.domain.require_id()?.to_string(),
            operatingsystem_id: resources.operatingsystem.require_id()?.to_string(),
            architecture_id: resources.architecture.require_id()?.to_string(),
            name: name.into(),
            mac: mac.into(),
            ip: ip.into(),
            build: false,
            parameters,
        })
    }

    /// Request body for `POST hosts`.
    pub fn to_payload(&self) -> Value {
        json!({ "host": self })
    }
}

/// Request body for `PUT hosts/{id}` updating only parameters.
pub fn parameter_update_payload(parameters: &[Parameter]) -> Value {
    json!({ "host": { "host_parameters_attributes": parameters } })
}

/// Request body for `POST domains`.
pub fn domain_payload(name: &str, dns_proxy: Option<&ResourceRef>) -> Value {
    let dns_id = dns_proxy
        .filter(|p| p.kind == ResourceKind::SmartProxy)
        .and_then(|p| p.id.clone());
    match dns_id {
        Some(id) => json!({ "domain": { "name": name, "dns_id": id } }),
        None => json!({ "domain": { "name": name } }),
    }
}
