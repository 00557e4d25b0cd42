//! Configuration types for the compile, link and deploy pipeline

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, path::PathBuf, str::FromStr};

/// Environment variable selecting the target network
pub const CHAIN_ENV: &str = "CONTRACTS_CHAIN";

/// Fallback environment variable for the target network
pub const NODE_ENV: &str = "NODE_ENV";

/// Environment variable forcing a full recompile
pub const ALWAYS_RECOMPILE_ENV: &str = "CONTRACTS_ALWAYS_RECOMPILE";

/// Default gas price, 200 GWei
pub const DEFAULT_GAS_PRICE: u128 = 0x2e90edd000;

/// Default gas limit for library deployments
pub const DEFAULT_GAS_LIMIT: u64 = 0x7a1200;

/// Default RPC endpoint
pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// Chain a pipeline run targets. Selects the preset address table and the
/// lookup-registry address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Core,
    #[default]
    Testcore,
    Local,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Core, Network::Testcore, Network::Local];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Core => "core",
            Network::Testcore => "testcore",
            Network::Local => "local",
        }
    }

    /// Resolve the network from the process environment.
    ///
    /// `CONTRACTS_CHAIN` wins over `NODE_ENV`. Unrelated `NODE_ENV` values
    /// (`production`, `test`, ...) are ignored, an unknown `CONTRACTS_CHAIN`
    /// is an error. Defaults to `testcore`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(chain) = lookup(CHAIN_ENV).filter(|v| !v.is_empty()) {
            return chain.parse();
        }

        Ok(lookup(NODE_ENV)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default())
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "core" => Ok(Network::Core),
            "testcore" => Ok(Network::Testcore),
            "local" => Ok(Network::Local),
            other => Err(Error::UnknownNetwork(other.to_string())),
        }
    }
}

/// Main configuration for a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Directory with the core contract sources, always compiled first
    pub core_root: PathBuf,

    /// Additional source roots (directories or single files). Later roots
    /// shadow earlier ones by file name.
    pub additional_paths: Vec<PathBuf>,

    /// Candidate output directories. The first one that already holds a
    /// backend artifact is used.
    pub destination_candidates: Vec<PathBuf>,

    /// Output directory used when no candidate holds an artifact
    pub default_destination: PathBuf,

    /// Recompile even if the artifacts are up to date
    pub always_recompile: bool,

    /// Target network
    pub network: Network,

    /// Contracts whose bytecode ships in the frontend artifact, appended to
    /// the preset list
    pub allowed_bytecodes: Vec<String>,

    /// Library dependency edges, merged over the preset graph
    pub library_dependencies: BTreeMap<String, Vec<String>>,

    /// Library addresses, taking precedence over the network preset
    pub library_addresses: BTreeMap<String, String>,

    /// Whether to pretty-print the backend artifact
    pub pretty_json: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            core_root: PathBuf::from("contracts"),
            additional_paths: vec![],
            destination_candidates: vec![],
            default_destination: PathBuf::from("build/contracts"),
            always_recompile: false,
            network: Network::default(),
            allowed_bytecodes: vec![],
            library_dependencies: BTreeMap::new(),
            library_addresses: BTreeMap::new(),
            pretty_json: false,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for PipelineConfig
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Picks the output directory: the first candidate already holding a
    /// backend artifact, otherwise the default destination
    pub fn destination(&self) -> PathBuf {
        self.destination_candidates
            .iter()
            .find(|dir| dir.join(crate::artifacts::BACKEND_FILE).is_file())
            .cloned()
            .unwrap_or_else(|| self.default_destination.clone())
    }

    /// Overlay settings from a TOML file onto this configuration
    pub fn apply_file(&mut self, path: &std::path::Path) -> eyre::Result<()> {
        use eyre::Context;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let overlay: ConfigOverlay = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        overlay.apply(self)?;
        Ok(())
    }
}

/// Subset of [`PipelineConfig`] that may be set from a TOML file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct ConfigOverlay {
    core_root: Option<PathBuf>,
    #[serde(default)]
    additional_paths: Vec<PathBuf>,
    #[serde(default)]
    destination: Vec<PathBuf>,
    always_recompile: Option<bool>,
    network: Option<String>,
    #[serde(default)]
    allowed_bytecodes: Vec<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    addresses: BTreeMap<String, String>,
}

impl ConfigOverlay {
    fn apply(self, config: &mut PipelineConfig) -> Result<()> {
        if let Some(root) = self.core_root {
            config.core_root = root;
        }
        if let Some(network) = self.network {
            config.network = network.parse()?;
        }
        if let Some(always) = self.always_recompile {
            config.always_recompile = always;
        }
        config.additional_paths.extend(self.additional_paths);
        config.destination_candidates.extend(self.destination);
        config.allowed_bytecodes.extend(self.allowed_bytecodes);
        config.library_dependencies.extend(self.dependencies);
        config.library_addresses.extend(self.addresses);
        Ok(())
    }
}

/// Builder for creating PipelineConfig with a fluent API
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the core source directory
    pub fn core_root(mut self, path: PathBuf) -> Self {
        self.config.core_root = path;
        self
    }

    /// Add a source root compiled after the core root
    pub fn additional_path(mut self, path: PathBuf) -> Self {
        self.config.additional_paths.push(path);
        self
    }

    /// Set all additional source roots
    pub fn additional_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.config.additional_paths = paths;
        self
    }

    /// Add a candidate output directory
    pub fn destination_candidate(mut self, path: PathBuf) -> Self {
        self.config.destination_candidates.push(path);
        self
    }

    /// Set the fallback output directory
    pub fn default_destination(mut self, path: PathBuf) -> Self {
        self.config.default_destination = path;
        self
    }

    pub fn always_recompile(mut self, always: bool) -> Self {
        self.config.always_recompile = always;
        self
    }

    pub fn network(mut self, network: Network) -> Self {
        self.config.network = network;
        self
    }

    /// Allow a contract's bytecode in the frontend artifact
    pub fn allow_bytecode(mut self, contract: impl Into<String>) -> Self {
        self.config.allowed_bytecodes.push(contract.into());
        self
    }

    /// Declare the libraries `library` depends on
    pub fn library_dependency(mut self, library: impl Into<String>, deps: Vec<String>) -> Self {
        self.config.library_dependencies.insert(library.into(), deps);
        self
    }

    /// Pin a library address, overriding the network preset
    pub fn library_address(mut self, library: impl Into<String>, address: impl Into<String>) -> Self {
        self.config
            .library_addresses
            .insert(library.into(), address.into());
        self
    }

    pub fn pretty_json(mut self, pretty: bool) -> Self {
        self.config.pretty_json = pretty;
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

/// Account and transaction settings for library deployments
#[derive(Clone, PartialEq)]
pub struct DeployConfig {
    /// Deploying account, `0x`-prefixed
    pub account: String,
    /// Hex encoded private key of `account`
    pub private_key: String,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub rpc_url: String,
}

impl fmt::Debug for DeployConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployConfig")
            .field("account", &self.account)
            .field("private_key", &"<redacted>")
            .field("gas_price", &self.gas_price)
            .field("gas_limit", &self.gas_limit)
            .field("rpc_url", &self.rpc_url)
            .finish()
    }
}

impl DeployConfig {
    /// Read deployment settings from `ACCOUNT_ID`, `PRIVATE_KEY`,
    /// `GAS_PRICE`, `GAS_LIMIT` and `RPC_URL`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let account = lookup("ACCOUNT_ID")
            .filter(|v| !v.is_empty())
            .ok_or(Error::MissingCredentials("ACCOUNT_ID"))?;
        let private_key = lookup("PRIVATE_KEY")
            .filter(|v| !v.is_empty())
            .ok_or(Error::MissingCredentials("PRIVATE_KEY"))?;

        let gas_price = match lookup("GAS_PRICE") {
            Some(v) => parse_quantity("GAS_PRICE", &v)?,
            None => DEFAULT_GAS_PRICE,
        };
        let gas_limit = match lookup("GAS_LIMIT") {
            Some(v) => u64::try_from(parse_quantity("GAS_LIMIT", &v)?).map_err(|_| {
                Error::InvalidSetting {
                    name: "GAS_LIMIT".to_string(),
                    value: v.trim().to_string(),
                }
            })?,
            None => DEFAULT_GAS_LIMIT,
        };

        Ok(Self {
            account,
            private_key: private_key.trim_start_matches("0x").to_string(),
            gas_price,
            gas_limit,
            rpc_url: lookup("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
        })
    }
}

/// Parses a decimal or `0x`-prefixed hex quantity
fn parse_quantity(name: &str, value: &str) -> Result<u128> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u128::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|_| Error::InvalidSetting {
        name: name.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_network_from_lookup() {
        assert_eq!(Network::from_lookup(lookup(&[])).unwrap(), Network::Testcore);
        assert_eq!(
            Network::from_lookup(lookup(&[("NODE_ENV", "core")])).unwrap(),
            Network::Core
        );
        assert_eq!(
            Network::from_lookup(lookup(&[("NODE_ENV", "production")])).unwrap(),
            Network::Testcore
        );
        assert_eq!(
            Network::from_lookup(lookup(&[("NODE_ENV", "core"), ("CONTRACTS_CHAIN", "local")]))
                .unwrap(),
            Network::Local
        );
        assert!(Network::from_lookup(lookup(&[("CONTRACTS_CHAIN", "mainnet")])).is_err());
    }

    #[test]
    fn test_builder_basic() {
        let config = PipelineConfig::builder()
            .core_root(PathBuf::from("/core"))
            .additional_path(PathBuf::from("/extra"))
            .network(Network::Local)
            .allow_bytecode("ProofHolder")
            .library_address("A.sol:A", "0x01")
            .always_recompile(true)
            .build();

        assert_eq!(config.core_root, PathBuf::from("/core"));
        assert_eq!(config.additional_paths, vec![PathBuf::from("/extra")]);
        assert_eq!(config.network, Network::Local);
        assert_eq!(config.allowed_bytecodes, vec!["ProofHolder"]);
        assert_eq!(config.library_addresses["A.sol:A"], "0x01");
        assert!(config.always_recompile);
    }

    #[test]
    fn test_destination_prefers_candidate_with_artifact() {
        let temp = tempfile::TempDir::new().unwrap();
        let empty = temp.path().join("empty");
        let built = temp.path().join("built");
        std::fs::create_dir_all(&empty).unwrap();
        std::fs::create_dir_all(&built).unwrap();
        std::fs::write(built.join("compiled.json"), "{}").unwrap();

        let config = PipelineConfig::builder()
            .destination_candidate(empty.clone())
            .destination_candidate(built.clone())
            .default_destination(temp.path().join("default"))
            .build();
        assert_eq!(config.destination(), built);

        let config = PipelineConfig::builder()
            .destination_candidate(empty)
            .default_destination(temp.path().join("default"))
            .build();
        assert_eq!(config.destination(), temp.path().join("default"));
    }

    #[test]
    fn test_apply_file_overlay() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("contracts.toml");
        std::fs::write(
            &path,
            r#"
network = "core"
additional-paths = ["project/contracts"]
allowed-bytecodes = ["ProofHolder"]

[dependencies]
"B.sol:B" = ["A.sol:A"]

[addresses]
"A.sol:A" = ""
"#,
        )
        .unwrap();

        let mut config = PipelineConfig::default();
        config.apply_file(&path).unwrap();

        assert_eq!(config.network, Network::Core);
        assert_eq!(config.additional_paths, vec![PathBuf::from("project/contracts")]);
        assert_eq!(config.allowed_bytecodes, vec!["ProofHolder"]);
        assert_eq!(config.library_dependencies["B.sol:B"], vec!["A.sol:A"]);
        assert_eq!(config.library_addresses["A.sol:A"], "");
    }

    #[test]
    fn test_deploy_config_requires_credentials() {
        let err = DeployConfig::from_lookup(lookup(&[("ACCOUNT_ID", "0xabc")])).unwrap_err();
        assert!(matches!(err, Error::MissingCredentials("PRIVATE_KEY")));

        let err = DeployConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::MissingCredentials("ACCOUNT_ID")));
    }

    #[test]
    fn test_deploy_config_defaults_and_overrides() {
        let config = DeployConfig::from_lookup(lookup(&[
            ("ACCOUNT_ID", "0xabc"),
            ("PRIVATE_KEY", "0x1234"),
        ]))
        .unwrap();
        assert_eq!(config.gas_price, DEFAULT_GAS_PRICE);
        assert_eq!(config.gas_limit, 8_000_000);
        assert_eq!(config.private_key, "1234");
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
        assert!(!format!("{config:?}").contains("1234"));

        let config = DeployConfig::from_lookup(lookup(&[
            ("ACCOUNT_ID", "0xabc"),
            ("PRIVATE_KEY", "1234"),
            ("GAS_PRICE", "1000"),
            ("GAS_LIMIT", "0x10"),
        ]))
        .unwrap();
        assert_eq!(config.gas_price, 1000);
        assert_eq!(config.gas_limit, 16);
    }

    #[test]
    fn test_gas_limit_out_of_range() {
        let err = DeployConfig::from_lookup(lookup(&[
            ("ACCOUNT_ID", "0xabc"),
            ("PRIVATE_KEY", "1234"),
            ("GAS_LIMIT", "0x10000000000000000"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidSetting { name, value } if name == "GAS_LIMIT" && value == "0x10000000000000000"
        ));

        let err = DeployConfig::from_lookup(lookup(&[
            ("ACCOUNT_ID", "0xabc"),
            ("PRIVATE_KEY", "1234"),
            ("GAS_PRICE", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSetting { name, .. } if name == "GAS_PRICE"));
    }
}
