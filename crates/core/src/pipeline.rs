//! The compile pipeline: sources, staleness, compiler, linker, artifacts

use crate::{
    artifacts::{self, ArtifactWriter, FrontendContext, SavedArtifacts},
    compiler::{self, SolidityCompiler},
    config::PipelineConfig,
    contract::{CompiledContract, ContractTable},
    linker::Linker,
    presets::{LibraryAddressTable, Presets},
    redeploy::LibraryDependencyGraph,
    sources,
    staleness::{self, Staleness},
};
use eyre::{Context, Result};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

/// One pipeline run against one destination directory.
///
/// Network, address table and dependency graph are resolved once at
/// construction. Deployments feed new addresses back through
/// [`Pipeline::link`].
pub struct Pipeline {
    config: PipelineConfig,
    presets: Presets,
    destination: PathBuf,
    compiler: Arc<dyn SolidityCompiler>,
    linker: Linker,
    graph: LibraryDependencyGraph,
    allowed_bytecodes: Vec<String>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        presets: Presets,
        compiler: Arc<dyn SolidityCompiler>,
    ) -> Result<Self> {
        let addresses = presets
            .address_table(&config)
            .context("Failed to resolve library addresses")?;
        let registry = presets.registry_rewrite(config.network)?;
        let graph = LibraryDependencyGraph::new(presets.dependencies(&config));
        let allowed_bytecodes = presets.allowed_bytecodes(&config);
        let destination = config.destination();

        tracing::info!(
            "Pipeline for {} writing to {}",
            config.network,
            destination.display()
        );

        Ok(Self {
            linker: Linker::new(addresses, registry),
            config,
            presets,
            destination,
            compiler,
            graph,
            allowed_bytecodes,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn addresses(&self) -> &LibraryAddressTable {
        self.linker.addresses()
    }

    pub fn graph(&self) -> &LibraryDependencyGraph {
        &self.graph
    }

    /// Core root first, then the caller's roots
    pub fn source_roots(&self) -> Vec<PathBuf> {
        std::iter::once(self.config.core_root.clone())
            .chain(self.config.additional_paths.iter().cloned())
            .collect()
    }

    /// Compiles unless the artifacts are up to date. Returns the written
    /// artifacts, or `None` when nothing had to be done.
    pub async fn ensure_compiled(&mut self) -> Result<Option<SavedArtifacts>> {
        let staleness = staleness::check(
            &self.destination,
            &self.config.additional_paths,
            self.config.always_recompile,
        )
        .context("Failed to check artifact freshness")?;

        match staleness {
            Staleness::Fresh => {
                tracing::info!("Contracts up to date in {}", self.destination.display());
                Ok(None)
            }
            Staleness::Recompile(reason) => {
                tracing::debug!("Recompiling: {:?}", reason);
                let (_, saved) = self.compile().await?;
                Ok(Some(saved))
            }
        }
    }

    /// Compiles the full source tree and writes both artifacts. Returns the
    /// table linked for the configured network.
    ///
    /// Artifacts keep the unlinked compiler output so they can be linked for
    /// any network later. Nothing is written if the compiler reports an error
    /// or an address is invalid.
    pub async fn compile(&mut self) -> Result<(ContractTable, SavedArtifacts)> {
        let tree = sources::collect(&self.source_roots()).context("Failed to collect sources")?;
        let set = sources::read(&tree).await.context("Failed to read sources")?;

        let mut unlinked = compiler::compile(self.compiler.as_ref(), set.sources)
            .await
            .context("Compilation failed")?;

        let mut linked = unlinked.clone();
        self.linker
            .link(&mut linked, std::iter::empty())
            .context("Failed to link libraries")?;
        self.linker.stamp_deployed(&mut unlinked);

        let saved = self.writer().write(&unlinked).await?;
        Ok((linked, saved))
    }

    /// Reads the backend artifact and links it against the current address
    /// table. Keys stay qualified.
    pub async fn load_contracts(&mut self) -> Result<ContractTable> {
        let mut contracts = artifacts::load_backend(&self.destination).await?;
        // stamps from another network's build
        for (_, contract) in contracts.iter_mut() {
            contract.deployed_at = None;
        }
        self.linker
            .link(&mut contracts, std::iter::empty())
            .context("Failed to link libraries")?;
        Ok(contracts)
    }

    /// Like [`Pipeline::load_contracts`], keyed by bare contract name
    pub async fn load_contracts_by_name(&mut self) -> Result<BTreeMap<String, CompiledContract>> {
        Ok(self.load_contracts().await?.into_short_names())
    }

    /// Merges `updates` into the address table and links `contracts`
    pub fn link(
        &mut self,
        contracts: &mut ContractTable,
        updates: impl IntoIterator<Item = (String, String)>,
    ) -> Result<()> {
        self.linker
            .link(contracts, updates)
            .context("Failed to link libraries")?;
        Ok(())
    }

    /// Libraries that must be deployed before the contracts are usable
    pub fn redeploy_set(&self) -> Vec<String> {
        self.graph.redeploy_set(self.linker.addresses())
    }

    /// Deletes both artifacts, if present
    pub async fn clean(&self) -> Result<()> {
        for file in [artifacts::BACKEND_FILE, artifacts::FRONTEND_FILE] {
            let path = self.destination.join(file);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove {}", path.display()))
                }
            }
        }
        Ok(())
    }

    fn writer(&self) -> ArtifactWriter {
        let mut libraries: BTreeMap<String, BTreeMap<String, String>> = self
            .presets
            .networks
            .iter()
            .map(|(network, preset)| (network.clone(), preset.libraries.clone()))
            .collect();
        // the active network ships with overrides and fresh deployments
        libraries.insert(
            self.config.network.to_string(),
            self.linker
                .addresses()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );

        let frontend = FrontendContext {
            allowed_bytecodes: self.allowed_bytecodes.clone(),
            libraries,
            registries: self
                .presets
                .networks
                .iter()
                .map(|(network, preset)| (network.clone(), preset.registry.clone()))
                .collect(),
            registry_reference: self.presets.registry_reference.clone(),
        };

        let mut writer = ArtifactWriter::new(self.destination.clone(), frontend);
        writer.pretty_json = self.config.pretty_json;
        writer
    }
}
