//! Inventory resource references.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Kinds of records held by the inventory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[display("host")]
    Host,
    #[display("domain")]
    Domain,
    #[display("hostgroup")]
    Hostgroup,
    #[display("organization")]
    Organization,
    #[display("location")]
    Location,
    #[display("smart proxy")]
    SmartProxy,
    #[display("environment")]
    Environment,
    #[display("architecture")]
    Architecture,
    #[display("operating system")]
    OperatingSystem,
}

impl ResourceKind {
    /// REST collection that holds records of this kind.
    pub fn collection(&self) -> &'static str {
        match self {
            ResourceKind::Host => "hosts",
            ResourceKind::Domain => "domains",
            ResourceKind::Hostgroup => "hostgroups",
            ResourceKind::Organization => "organizations",
            ResourceKind::Location => "locations",
            ResourceKind::SmartProxy => "smart_proxies",
            ResourceKind::Environment => "environments",
            ResourceKind::Architecture => "architectures",
            ResourceKind::OperatingSystem => "operatingsystems",
        }
    }
}

/// A named inventory record, resolved to an id by lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
    pub id: Option<String>,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            id: None,
        }
    }

    /// Attach the id found in a lookup response record.
    pub fn resolved(mut self, record: &Value) -> Result<Self> {
        self.id = Some(record_id(record)?);
        Ok(self)
    }

    pub fn is_resolved(&self) -> bool {
        self.id.is_some()
    }

    /// The resolved id, or an error naming the unresolved reference.
    pub fn require_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| {
                Error::NotFound(format!("{} '{}' is not resolved", self.kind, self.name))
            })
    }
}

/// Extract the `id` field of a response record as an integer string.
///
/// The inventory service returns numeric ids; a string id is passed through.
pub fn record_id(record: &Value) -> Result<String> {
    match record.get("id") {
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_u64() {
                Ok(i.to_string())
            } else if let Some(i) = n.as_i64() {
                Ok(i.to_string())
            } else {
                n.as_f64()
                    .map(|f| format!("{:.0}", f))
                    .ok_or_else(|| Error::InvalidResponse(format!("bad id {}", n)))
            }
        }
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(Error::InvalidResponse(format!(
            "record has no id: {}",
            record
        ))),
    }
}
