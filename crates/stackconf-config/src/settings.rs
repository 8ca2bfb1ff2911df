//! Typed settings resolved once from the merged metadata tree.
//!
//! Values coming from instance metadata are always strings, so numeric and
//! boolean fields also accept their string spellings.

use crate::metadata::scalar_to_string;
use crate::{ConfigError, ConfigResult, HostMetadata};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.254/openstack/latest/meta_data.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub foreman: ForemanSettings,
    pub puppet: PuppetSettings,
    pub dns: DnsSettings,
    pub stackconf: StackconfSettings,
    /// Top-level tier override for the `tier` host parameter.
    #[serde(deserialize_with = "opt_string")]
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ForemanSettings {
    pub config: ForemanConnection,
    pub host: ForemanHostSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ForemanConnection {
    #[serde(deserialize_with = "opt_string")]
    pub host: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub username: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ForemanHostSettings {
    #[serde(deserialize_with = "opt_string")]
    pub hostgroup: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub location: Option<String>,
    /// Smart proxy used as DNS proxy when a domain has to be created.
    #[serde(deserialize_with = "opt_string")]
    pub dnsproxy: Option<String>,
    /// Network interface whose address is registered instead of the primary one.
    #[serde(deserialize_with = "opt_string")]
    pub interface: Option<String>,
    pub parameter: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PuppetSettings {
    #[serde(deserialize_with = "lenient_u32")]
    pub version: u32,
    pub config: PuppetConfig,
}

impl Default for PuppetSettings {
    fn default() -> Self {
        Self {
            version: 4,
            config: PuppetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PuppetConfig {
    #[serde(deserialize_with = "opt_string")]
    pub ca: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub environment: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub server: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub srv: Option<String>,
    #[serde(deserialize_with = "lenient_u32")]
    pub runs: u32,
    /// Per-run timeout in seconds.
    #[serde(deserialize_with = "lenient_u64")]
    pub timeout: u64,
    /// Pause after a timed-out run, in seconds.
    #[serde(deserialize_with = "lenient_u64")]
    pub cooldown: u64,
    /// How many CA-overload retries may extend the run budget.
    #[serde(deserialize_with = "lenient_u32")]
    pub ca_retries: u32,
}

impl Default for PuppetConfig {
    fn default() -> Self {
        Self {
            ca: None,
            environment: None,
            server: None,
            srv: None,
            runs: 1,
            timeout: 1800,
            cooldown: 60,
            ca_retries: 10,
        }
    }
}

impl PuppetConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DnsSettings {
    pub config: DnsConnection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DnsConnection {
    #[serde(deserialize_with = "opt_string")]
    pub host: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub key: Option<String>,
    #[serde(deserialize_with = "string_list")]
    pub nameservers: Vec<String>,
}

impl DnsConnection {
    /// DNS management is enabled only when both host and key are set.
    pub fn is_configured(&self) -> bool {
        self.host.is_some() && self.key.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StackconfSettings {
    #[serde(deserialize_with = "string_list")]
    pub sources: Vec<String>,
    pub metadata_url: String,
    #[serde(deserialize_with = "lenient_bool")]
    pub strict_exit: bool,
}

impl Default for StackconfSettings {
    fn default() -> Self {
        Self {
            sources: vec!["openstackmeta".to_string(), "puppetfacter".to_string()],
            metadata_url: DEFAULT_METADATA_URL.to_string(),
            strict_exit: false,
        }
    }
}

impl StackconfSettings {
    pub fn source_enabled(&self, name: &str) -> bool {
        self.sources.iter().any(|s| s == name)
    }
}

impl Settings {
    /// Resolve settings from the merged tree.
    pub fn from_metadata(metadata: &HostMetadata) -> ConfigResult<Self> {
        Self::from_value(metadata.as_value())
    }

    pub fn from_value(tree: &Value) -> ConfigResult<Self> {
        Ok(Self::deserialize(tree)?)
    }

    /// Host parameters as name/value string pairs, in key order.
    pub fn host_parameters(&self) -> Vec<(String, String)> {
        self.foreman
            .host
            .parameter
            .iter()
            .filter_map(|(k, v)| scalar_to_string(v).map(|v| (k.clone(), v)))
            .collect()
    }
}

/// Return the value of a required setting or a `MissingField` error naming its key.
pub fn required<'a>(value: &'a Option<String>, key: &str) -> ConfigResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| ConfigError::MissingField(key.to_string()))
}

fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(&value).filter(|s| !s.is_empty()))
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Number(n) => n.as_u64().ok_or_else(|| {
            serde::de::Error::custom(format!("expected unsigned integer, got {}", n))
        }),
        Value::String(s) => s.trim().parse().map_err(|_| {
            serde::de::Error::custom(format!("expected unsigned integer, got '{}'", s))
        }),
        other => Err(serde::de::Error::custom(format!(
            "expected unsigned integer, got {}",
            other
        ))),
    }
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let n = lenient_u64(deserializer)?;
    u32::try_from(n).map_err(|_| serde::de::Error::custom(format!("{} is out of range", n)))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" | "" => Ok(false),
            _ => Err(serde::de::Error::custom(format!("expected boolean, got '{}'", s))),
        },
        Value::Null => Ok(false),
        other => Err(serde::de::Error::custom(format!("expected boolean, got {}", other))),
    }
}

fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    })
}
