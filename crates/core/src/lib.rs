//! Solidity contract pipeline: compile, link library placeholders, plan and
//! run library redeployments
pub mod artifacts;
pub mod blockchain;
pub mod compiler;
pub mod config;
pub mod contract;
pub mod deploy;
mod error;
pub mod linker;
pub mod pipeline;
pub mod presets;
pub mod redeploy;
pub mod sources;
pub mod staleness;

pub use artifacts::{ArtifactWriter, SavedArtifacts};
pub use blockchain::{ChainClient, DeployTransaction, Receipt, TransactionSigner};
pub use compiler::{Solc, SolidityCompiler};
pub use config::{DeployConfig, Network, PipelineConfig, PipelineConfigBuilder};
pub use contract::{CompiledContract, ContractTable};
pub use deploy::{deploy_libraries, DeploymentReport, DeploymentSummary, GasSettings};
pub use error::{Error, Result};
pub use linker::Linker;
pub use pipeline::Pipeline;
pub use presets::{LibraryAddressTable, Presets};
pub use redeploy::LibraryDependencyGraph;
