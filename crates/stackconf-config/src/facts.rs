//! Fact lookups whose keys depend on the Puppet major version.
//!
//! Facter 3+ (shipped with Puppet 4+) nests facts (`os.hardware`,
//! `networking.ip`); older releases use flat keys (`hardwaremodel`,
//! `ipaddress`).

use crate::metadata::FACTS_KEY;
use crate::{ConfigError, ConfigResult, HostMetadata};
use stackconf_core::puppet::PuppetLayout;

/// Distribution id whose OS name is taken from the description fact.
const UBUNTU: &str = "Ubuntu";

pub struct FactView<'a> {
    metadata: &'a HostMetadata,
    layout: PuppetLayout,
}

impl<'a> FactView<'a> {
    pub fn new(metadata: &'a HostMetadata, puppet_version: u32) -> Self {
        Self {
            metadata,
            layout: PuppetLayout::new(puppet_version),
        }
    }

    fn fact(&self, key: &str) -> Option<String> {
        self.metadata.get_str(&format!("{}.{}", FACTS_KEY, key))
    }

    fn require(&self, key: &str) -> ConfigResult<String> {
        self.fact(key)
            .ok_or_else(|| ConfigError::MissingField(format!("{}.{}", FACTS_KEY, key)))
    }

    fn modern(&self) -> bool {
        self.layout.is_modern()
    }

    pub fn fqdn(&self) -> ConfigResult<String> {
        if self.modern() {
            self.require("networking.fqdn")
        } else {
            self.require("fqdn")
        }
    }

    pub fn architecture(&self) -> ConfigResult<String> {
        if self.modern() {
            self.require("os.hardware")
        } else {
            self.require("hardwaremodel")
        }
    }

    /// Operating system name as registered in the inventory.
    ///
    /// Ubuntu is registered by its distro description ("Ubuntu 22.04.3 LTS");
    /// everything else as "<distro id> <full release>".
    pub fn operating_system(&self) -> ConfigResult<String> {
        let distro_id = if self.modern() {
            self.fact("os.name")
        } else {
            self.fact("lsbdistid")
        };

        if distro_id.as_deref() == Some(UBUNTU) {
            return if self.modern() {
                self.require("os.distro.description")
            } else {
                self.require("lsbdistdescription")
            };
        }

        let id = self.fact("os.distro.id").unwrap_or_default();
        let release = self.fact("os.distro.release.full").unwrap_or_default();
        let name = format!("{} {}", id, release).trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::MissingField(format!(
                "{}.os.distro.id",
                FACTS_KEY
            )));
        }
        Ok(name)
    }

    pub fn ip_address(&self, interface: Option<&str>) -> ConfigResult<String> {
        self.network_fact("ip", "ipaddress", interface)
    }

    pub fn mac_address(&self, interface: Option<&str>) -> ConfigResult<String> {
        self.network_fact("mac", "macaddress", interface)
    }

    fn network_fact(
        &self,
        modern_key: &str,
        legacy_key: &str,
        interface: Option<&str>,
    ) -> ConfigResult<String> {
        match (self.modern(), interface) {
            (true, Some(iface)) => {
                self.require(&format!("networking.interfaces.{}.{}", iface, modern_key))
            }
            (true, None) => self.require(&format!("networking.{}", modern_key)),
            (false, Some(iface)) => self.require(&format!("{}_{}", legacy_key, iface)),
            (false, None) => self.require(legacy_key),
        }
    }
}
