//! Frontend artifact: a redacted, re-linkable contract table

use crate::{
    contract::{short_name, ContractTable},
    linker,
};
use eyre::Result;
use serde::Serialize;
use std::collections::BTreeMap;

const TEMPLATE: &str = include_str!("frontend.js");

/// Contract as shipped to the frontend. `deployedAt` never ships, bytecode
/// only for allow-listed contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrontendContract {
    pub interface: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytecode: Option<String>,
}

/// Network data embedded next to the contracts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrontendContext {
    /// Contracts allowed to keep their bytecode, bare or qualified names
    pub allowed_bytecodes: Vec<String>,
    /// `network -> library -> address`
    pub libraries: BTreeMap<String, BTreeMap<String, String>>,
    /// `network -> registry address`
    pub registries: BTreeMap<String, String>,
    /// Registry address compiled into the sources
    pub registry_reference: String,
}

impl FrontendContext {
    /// Placeholder tokens of every library known on any network
    fn placeholders(&self) -> BTreeMap<&str, Vec<String>> {
        self.libraries
            .values()
            .flat_map(|libraries| libraries.keys())
            .map(|library| (library.as_str(), linker::placeholders(library)))
            .collect()
    }

    fn allows_bytecode(&self, key: &str) -> bool {
        let name = short_name(key);
        self.allowed_bytecodes
            .iter()
            .any(|allowed| allowed == key || allowed == name)
    }
}

/// Strips `deployedAt` everywhere and bytecode outside the allow-list, keyed
/// by bare contract name
pub fn redact(
    contracts: &ContractTable,
    context: &FrontendContext,
) -> BTreeMap<String, FrontendContract> {
    let mut redacted = BTreeMap::new();
    let mut origin: BTreeMap<&str, &str> = BTreeMap::new();

    for (key, contract) in contracts.iter() {
        let name = short_name(key);
        if let Some(previous) = origin.insert(name, key.as_str()) {
            tracing::warn!(
                "{} is a duplicate contract name, {} shadows {} in the frontend artifact",
                name,
                key,
                previous
            );
        }

        let bytecode = context
            .allows_bytecode(key)
            .then(|| contract.bytecode.clone());
        redacted.insert(
            name.to_string(),
            FrontendContract {
                interface: contract.interface.clone(),
                bytecode,
            },
        );
    }

    redacted
}

/// Renders the frontend module source. `contracts` should be the unlinked
/// compiler output, the module links it for the network it detects at
/// runtime.
pub fn render_frontend(contracts: &ContractTable, context: &FrontendContext) -> Result<String> {
    let redacted = redact(contracts, context);

    // contracts last so their content is never scanned for markers
    Ok(TEMPLATE
        .replace(
            "%REGISTRY_REFERENCE%",
            &serde_json::to_string(&context.registry_reference)?,
        )
        .replace("%REGISTRIES%", &serde_json::to_string(&context.registries)?)
        .replace("%PLACEHOLDERS%", &serde_json::to_string(&context.placeholders())?)
        .replace("%LIBRARIES%", &serde_json::to_string(&context.libraries)?)
        .replace("%CONTRACTS%", &serde_json::to_string(&redacted)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        contract::CompiledContract,
        linker::{hashed_placeholder, legacy_placeholder, Linker},
        presets::RegistryRewrite,
    };
    use serde_json::Value;

    const REFERENCE: &str = "0x00000000000000000000000000000000000000ee";

    fn contracts() -> ContractTable {
        let mut table = ContractTable::new();
        let mut lib = CompiledContract::new("[]", "6060");
        lib.deployed_at = Some("0x498A9beDAf23401d888b4f52fD379bBA144D2370".into());
        table.insert("verifications/KeyHolderLibrary.sol:KeyHolderLibrary", lib);
        table.insert("Owned.sol:Owned", CompiledContract::new("[]", "6061"));
        table.insert("Proof.sol:ProofHolder", CompiledContract::new("[]", "6062"));
        table
    }

    fn context() -> FrontendContext {
        FrontendContext {
            allowed_bytecodes: vec!["KeyHolderLibrary".into(), "Proof.sol:ProofHolder".into()],
            libraries: BTreeMap::from([(
                "testcore".to_string(),
                BTreeMap::from([("Lib.sol:Lib".to_string(), "0x01".to_string())]),
            )]),
            registries: BTreeMap::from([("testcore".to_string(), "0x02".to_string())]),
            registry_reference: "0x02".into(),
        }
    }

    #[test]
    fn test_redact_strips_bytecode_outside_allow_list() {
        let redacted = redact(&contracts(), &context());

        assert_eq!(redacted.len(), 3);
        assert_eq!(redacted["KeyHolderLibrary"].bytecode.as_deref(), Some("6060"));
        assert_eq!(redacted["ProofHolder"].bytecode.as_deref(), Some("6062"));
        assert_eq!(redacted["Owned"].bytecode, None);
    }

    #[test]
    fn test_rendered_module_has_no_deployed_at() {
        let source = render_frontend(&contracts(), &context()).unwrap();

        assert!(!source.contains("deployedAt"));
        assert!(!source.contains("6061"));
        assert!(source.contains(r#""KeyHolderLibrary":{"interface":"[]","bytecode":"6060"}"#));
        assert!(source.contains(r#"const libraries = {"testcore":{"Lib.sol:Lib":"0x01"}};"#));
        assert!(source.contains(r#"const registryReference = "0x02";"#));
        assert!(source.contains("module.exports = linkLibraries(getEnvironment());"));
        assert!(!source.contains('%'));
    }

    /// Reads a `const <name> = <json>;` line of the rendered module
    fn embedded(source: &str, name: &str) -> Value {
        let prefix = format!("const {name} = ");
        let line = source.lines().find(|l| l.starts_with(&prefix)).unwrap();
        serde_json::from_str(line[prefix.len()..].trim_end_matches(';')).unwrap()
    }

    /// What the module's `linkLibraries(network)` computes from its tables
    fn link_with_embedded_tables(source: &str, network: &str, contract: &str) -> String {
        let contracts = embedded(source, "contracts");
        let libraries = embedded(source, "libraries");
        let registries = embedded(source, "registries");
        let placeholders = embedded(source, "placeholders");

        let mut bytecode = contracts[contract]["bytecode"].as_str().unwrap().to_string();
        for (library, address) in libraries[network].as_object().unwrap() {
            let address = address.as_str().unwrap();
            if address.is_empty() {
                continue;
            }
            let digits = format!("{:0>40}", address.trim_start_matches("0x").to_lowercase());
            for token in placeholders[library].as_array().unwrap() {
                bytecode = bytecode.replace(token.as_str().unwrap(), &digits);
            }
        }

        let target = registries[network].as_str().unwrap();
        bytecode.replace(
            REFERENCE.trim_start_matches("0x"),
            &format!("{:0>40}", target.trim_start_matches("0x").to_lowercase()),
        )
    }

    #[test]
    fn test_shipped_bytecode_relinks_for_each_network() {
        let lib = "Lib.sol:Lib";
        let unlinked = format!(
            "6002{}60{}73{}",
            legacy_placeholder(lib),
            hashed_placeholder(lib),
            REFERENCE.trim_start_matches("0x")
        );
        let mut table = ContractTable::new();
        table.insert("User.sol:User", CompiledContract::new("[]", unlinked.clone()));

        let networks = [
            ("core", "0x00000000000000000000000000000000000000c0", "0x00000000000000000000000000000000000000ff"),
            ("testcore", "0x00000000000000000000000000000000000000d0", REFERENCE),
        ];
        let context = FrontendContext {
            allowed_bytecodes: vec!["User".into()],
            libraries: networks
                .iter()
                .map(|(n, address, _)| {
                    (n.to_string(), BTreeMap::from([(lib.to_string(), address.to_string())]))
                })
                .collect(),
            registries: networks
                .iter()
                .map(|(n, _, registry)| (n.to_string(), registry.to_string()))
                .collect(),
            registry_reference: REFERENCE.into(),
        };

        let source = render_frontend(&table, &context).unwrap();
        assert_eq!(
            embedded(&source, "contracts")["User"]["bytecode"],
            Value::String(unlinked)
        );

        for (network, address, registry) in networks {
            let rewrite = (registry != REFERENCE).then(|| RegistryRewrite {
                reference: REFERENCE.into(),
                target: registry.into(),
            });
            let mut expected = table.clone();
            Linker::new([(lib, address)].into_iter().collect(), rewrite)
                .link(&mut expected, std::iter::empty())
                .unwrap();

            let linked = link_with_embedded_tables(&source, network, "User");
            assert!(!linked.contains("__"));
            assert_eq!(linked, expected.get("User.sol:User").unwrap().bytecode);
        }
    }

    #[test]
    fn test_duplicate_bare_names_keep_last() {
        let mut table = ContractTable::new();
        table.insert("a/Token.sol:Token", CompiledContract::new("[]", "6001"));
        table.insert("b/Token.sol:Token", CompiledContract::new("[]", "6002"));
        let context = FrontendContext {
            allowed_bytecodes: vec!["Token".into()],
            ..FrontendContext::default()
        };

        let redacted = redact(&table, &context);
        assert_eq!(redacted.len(), 1);
        assert_eq!(redacted["Token"].bytecode.as_deref(), Some("6002"));
    }
}
