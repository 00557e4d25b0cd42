//! Built-in library presets and the per-network address book

use crate::{
    config::{Network, PipelineConfig},
    error::{Error, Result},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const BUILTIN_PRESETS: &str = include_str!("../presets.toml");

/// Presets for one network
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkPreset {
    /// Lookup-registry address on this network
    pub registry: String,
    /// Known libraries; an empty address means "not deployed yet"
    #[serde(default)]
    pub libraries: BTreeMap<String, String>,
}

/// `Network -> library -> address`, plus the registry address per network
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Presets {
    pub schema_version: u32,
    #[serde(default)]
    pub allowed_bytecodes: Vec<String>,
    pub registry_reference: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkPreset>,
}

impl Presets {
    /// Presets shipped with the core contracts
    pub fn builtin() -> Result<Self> {
        Self::from_toml(BUILTIN_PRESETS)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn network(&self, network: Network) -> Result<&NetworkPreset> {
        self.networks
            .get(network.as_str())
            .ok_or_else(|| Error::UnknownNetwork(network.to_string()))
    }

    /// Effective address table for `config.network`: explicit config entries
    /// win over the network preset
    pub fn address_table(&self, config: &PipelineConfig) -> Result<LibraryAddressTable> {
        let mut table = LibraryAddressTable::from(self.network(config.network)?.libraries.clone());
        table.merge(config.library_addresses.clone());
        Ok(table)
    }

    /// Preset dependency edges with the config's edges merged over them
    pub fn dependencies(&self, config: &PipelineConfig) -> BTreeMap<String, Vec<String>> {
        let mut deps = self.dependencies.clone();
        deps.extend(config.library_dependencies.clone());
        deps
    }

    /// Preset allow-list followed by the config's entries
    pub fn allowed_bytecodes(&self, config: &PipelineConfig) -> Vec<String> {
        let mut allowed = self.allowed_bytecodes.clone();
        for name in &config.allowed_bytecodes {
            if !allowed.contains(name) {
                allowed.push(name.clone());
            }
        }
        allowed
    }

    /// Registry rewrite for `network`, `None` when the network uses the
    /// reference registry itself
    pub fn registry_rewrite(&self, network: Network) -> Result<Option<RegistryRewrite>> {
        let target = &self.network(network)?.registry;
        if target.is_empty() || target.eq_ignore_ascii_case(&self.registry_reference) {
            return Ok(None);
        }
        Ok(Some(RegistryRewrite {
            reference: self.registry_reference.clone(),
            target: target.clone(),
        }))
    }
}

/// Replace the reference registry address with a network's registry address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRewrite {
    pub reference: String,
    pub target: String,
}

/// Library name to address. `""` marks a known but undeployed library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryAddressTable(BTreeMap<String, String>);

impl LibraryAddressTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, library: &str) -> Option<&str> {
        self.0.get(library).map(String::as_str)
    }

    pub fn insert(&mut self, library: impl Into<String>, address: impl Into<String>) {
        self.0.insert(library.into(), address.into());
    }

    /// Merge `updates` into the table, later values win
    pub fn merge(&mut self, updates: impl IntoIterator<Item = (String, String)>) {
        self.0.extend(updates);
    }

    /// Libraries with a non-empty address
    pub fn resolved(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter(|(_, address)| !address.is_empty())
            .map(|(library, address)| (library.as_str(), address.as_str()))
    }

    /// Libraries tracked without an address
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, address)| address.is_empty())
            .map(|(library, _)| library.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for LibraryAddressTable {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LibraryAddressTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
