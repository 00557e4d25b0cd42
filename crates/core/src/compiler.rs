//! Compiler invocation and diagnostic triage
//!
//! The compiler is an external collaborator speaking the solc standard JSON
//! interface. [`Solc`] runs a local `solc` binary; tests plug in their own
//! [`SolidityCompiler`].

use crate::{
    contract::{CompiledContract, ContractTable},
    error::{Error, Result},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    collections::BTreeMap,
    path::PathBuf,
    process::Stdio,
    time::Instant,
};
use tokio::io::AsyncWriteExt;

/// Standard JSON compiler input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerInput {
    pub language: String,
    pub sources: BTreeMap<String, SourceContent>,
    pub settings: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContent {
    pub content: String,
}

impl CompilerInput {
    /// Single compilation unit with the optimizer enabled, selecting ABI and
    /// bytecode per contract and the AST per file
    pub fn new(sources: BTreeMap<String, String>) -> Self {
        Self {
            language: "Solidity".to_string(),
            sources: sources
                .into_iter()
                .map(|(file, content)| (file, SourceContent { content }))
                .collect(),
            settings: json!({
                "optimizer": { "enabled": true },
                "outputSelection": {
                    "*": {
                        "*": ["abi", "evm.bytecode.object"],
                        "": ["ast"]
                    }
                }
            }),
        }
    }
}

/// Standard JSON compiler output, reduced to the fields the pipeline reads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilerOutput {
    #[serde(default)]
    pub contracts: BTreeMap<String, BTreeMap<String, ContractOutput>>,
    #[serde(default)]
    pub errors: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractOutput {
    #[serde(default)]
    pub abi: Value,
    #[serde(default)]
    pub evm: Option<EvmOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvmOutput {
    #[serde(default)]
    pub bytecode: Option<BytecodeOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BytecodeOutput {
    #[serde(default)]
    pub object: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    #[serde(other)]
    Unknown,
}

/// One compiler diagnostic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub end: i64,
}

#[async_trait::async_trait]
pub trait SolidityCompiler: Send + Sync {
    async fn compile(&self, input: &CompilerInput) -> Result<CompilerOutput>;
}

/// Runs a local `solc` binary in standard JSON mode
#[derive(Debug, Clone)]
pub struct Solc {
    path: PathBuf,
}

impl Default for Solc {
    fn default() -> Self {
        Self::new("solc")
    }
}

impl Solc {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl SolidityCompiler for Solc {
    async fn compile(&self, input: &CompilerInput) -> Result<CompilerOutput> {
        let mut child = tokio::process::Command::new(&self.path)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Compiler(format!("failed to run {}: {e}", self.path.display())))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Compiler("compiler stdin unavailable".to_string()))?;
        stdin.write_all(&serde_json::to_vec(input)?).await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(Error::Compiler(format!(
                "exit code {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// Compiles `sources` as one unit and returns the contract table.
///
/// Any error-severity diagnostic fails the whole compilation. Everything else
/// is counted per file and logged.
pub async fn compile(
    compiler: &dyn SolidityCompiler,
    sources: BTreeMap<String, String>,
) -> Result<ContractTable> {
    let start = Instant::now();
    tracing::info!("Compiling {} source files", sources.len());

    let output = compiler.compile(&CompilerInput::new(sources)).await?;

    let warnings = triage(&output.errors)?;
    for (file, count) in &warnings {
        tracing::warn!("{} warning(s) in {}", count, file);
    }

    let mut table = ContractTable::new();
    for (file, contracts) in output.contracts {
        for (name, contract) in contracts {
            let bytecode = contract
                .evm
                .and_then(|evm| evm.bytecode)
                .map(|bytecode| bytecode.object)
                .unwrap_or_default();
            let interface = serde_json::to_string(&contract.abi)?;
            table.insert(
                format!("{file}:{name}"),
                CompiledContract::new(interface, bytecode),
            );
        }
    }

    tracing::info!(
        "Compiled {} contracts in {:.2}s",
        table.len(),
        start.elapsed().as_secs_f64()
    );

    Ok(table)
}

/// Splits diagnostics into fatal errors and a per-file warning count
pub fn triage(diagnostics: &[Diagnostic]) -> Result<BTreeMap<String, usize>> {
    let errors: Vec<Diagnostic> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .cloned()
        .collect();
    if !errors.is_empty() {
        return Err(Error::Compilation(errors));
    }

    let mut warnings = BTreeMap::new();
    for diagnostic in diagnostics {
        match &diagnostic.source_location {
            Some(location) => *warnings.entry(location.file.clone()).or_insert(0) += 1,
            None => tracing::debug!("{}", diagnostic.message),
        }
    }
    Ok(warnings)
}
