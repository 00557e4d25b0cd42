//! Compiled contract records and the table a compile pass produces

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Interface and bytecode of one compiled contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledContract {
    /// JSON-serialized ABI
    pub interface: String,

    /// Hex bytecode, may still contain library placeholders
    pub bytecode: String,

    /// Address the library is deployed at, set by the linker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<String>,
}

impl CompiledContract {
    pub fn new(interface: impl Into<String>, bytecode: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            bytecode: bytecode.into(),
            deployed_at: None,
        }
    }

    /// Whether the bytecode still references libraries that are not linked
    pub fn has_unlinked_placeholders(&self) -> bool {
        // '_' and '$' never appear in hex
        self.bytecode.contains("__")
    }
}

/// Returns the bare contract name of `"<file>:<Contract>"`
pub fn short_name(key: &str) -> &str {
    key.rsplit_once(':').map_or(key, |(_, name)| name)
}

/// Contract identity to compiled contract, keyed `"<file>:<Contract>"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractTable(BTreeMap<String, CompiledContract>);

impl ContractTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, contract: CompiledContract) {
        self.0.insert(key.into(), contract);
    }

    /// Looks a contract up by key. A bare contract name matches the first
    /// qualified key with that name; a qualified name only matches itself.
    pub fn get(&self, name: &str) -> Option<&CompiledContract> {
        let key = self.resolve(name)?;
        self.0.get(&key)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut CompiledContract> {
        let key = self.resolve(name)?;
        self.0.get_mut(&key)
    }

    fn resolve(&self, name: &str) -> Option<String> {
        if self.0.contains_key(name) {
            return Some(name.to_string());
        }
        if name.contains(':') {
            return None;
        }
        self.0.keys().find(|key| short_name(key) == name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CompiledContract)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut CompiledContract)> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Re-keys the table by bare contract name. On clashes the entry whose
    /// qualified name sorts last wins.
    pub fn into_short_names(self) -> BTreeMap<String, CompiledContract> {
        self.0
            .into_iter()
            .map(|(key, contract)| (short_name(&key).to_string(), contract))
            .collect()
    }
}

impl FromIterator<(String, CompiledContract)> for ContractTable {
    fn from_iter<I: IntoIterator<Item = (String, CompiledContract)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
