//! Typed errors surfaced by the pipeline stages

use crate::compiler::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("source root not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("compilation failed with {} error(s):\n{}", .0.len(), render_diagnostics(.0))]
    Compilation(Vec<Diagnostic>),

    #[error("compiler invocation failed: {0}")]
    Compiler(String),

    #[error("invalid address specified for {library}: {address:?}")]
    InvalidAddress { library: String, address: String },

    #[error("unknown network: {0} (expected one of core, testcore, local)")]
    UnknownNetwork(String),

    #[error("contract not found in compiled output: {0}")]
    UnknownContract(String),

    #[error("invalid value for {name}: {value:?}")]
    InvalidSetting { name: String, value: String },

    #[error("{0} unset, set ACCOUNT_ID and PRIVATE_KEY as environment variables")]
    MissingCredentials(&'static str),

    #[error("deployment of {library} failed: {reason}")]
    Deployment { library: String, reason: String },

    #[error("cannot deploy {}: bytecode still references undeployed libraries", .0.join(", "))]
    UnresolvedLinks(Vec<String>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.formatted_message.as_deref().unwrap_or(&d.message))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
