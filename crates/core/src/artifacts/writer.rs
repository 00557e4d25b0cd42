//! Artifact writing utilities for saving compiled contract tables to disk

use super::{render_frontend, FrontendContext, BACKEND_FILE, FRONTEND_FILE};
use crate::contract::ContractTable;
use eyre::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes the backend and frontend artifacts of a contract table
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    /// Directory both files are written to, created if missing
    pub destination: PathBuf,
    /// Data embedded in the frontend module
    pub frontend: FrontendContext,
    /// Whether to pretty-print the backend artifact
    pub pretty_json: bool,
}

/// Paths of the written artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifacts {
    pub backend_path: PathBuf,
    pub frontend_path: PathBuf,
}

impl ArtifactWriter {
    pub fn new(destination: PathBuf, frontend: FrontendContext) -> Self {
        Self {
            destination,
            frontend,
            pretty_json: false,
        }
    }

    /// Serializes both artifacts, then writes them together.
    ///
    /// Each file goes to a temporary sibling first and is renamed into
    /// place. The pair as a whole is not atomic.
    pub async fn write(&self, contracts: &ContractTable) -> Result<SavedArtifacts> {
        let backend = if self.pretty_json {
            serde_json::to_string_pretty(contracts)?
        } else {
            serde_json::to_string(contracts)?
        };
        let frontend = render_frontend(contracts, &self.frontend)
            .context("Failed to render frontend artifact")?;

        tokio::fs::create_dir_all(&self.destination)
            .await
            .with_context(|| {
                format!(
                    "Failed to create output directory: {}",
                    self.destination.display()
                )
            })?;

        let saved = SavedArtifacts {
            backend_path: self.destination.join(BACKEND_FILE),
            frontend_path: self.destination.join(FRONTEND_FILE),
        };

        tokio::try_join!(
            replace_file(&saved.backend_path, backend),
            replace_file(&saved.frontend_path, frontend),
        )?;

        info!(
            "Saved {} contracts to: {}",
            contracts.len(),
            self.destination.display()
        );

        Ok(saved)
    }
}

async fn replace_file(path: &Path, content: String) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, content)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

/// Reads the backend artifact in `destination`
pub async fn load_backend(destination: &Path) -> Result<ContractTable> {
    let path = destination.join(BACKEND_FILE);
    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
