//! CLI for the contracts pipeline
//!
//! Compiles Solidity contract trees, links library addresses and deploys
//! missing libraries.

use clap::{Args, Parser, Subcommand};
use contracts_core::{
    blockchain::ethers::{EthersClient, WalletSigner},
    config::ALWAYS_RECOMPILE_ENV,
    deploy_libraries, DeployConfig, DeploymentReport, Error, GasSettings, Network, Pipeline,
    PipelineConfig, Presets, Solc,
};
use eyre::{Context, Result};
use serde::Serialize;
use std::{collections::BTreeMap, path::PathBuf, sync::Arc};
use tracing::Level;

/// Solidity contract compiler, linker and library deployer
#[derive(Parser, Debug)]
#[command(name = "contracts")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all logging except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output JSON to stdout
    #[arg(long, global = true)]
    json: bool,
}

/// Settings shared by every pipeline command
#[derive(Args, Debug, Clone)]
struct PipelineSettings {
    /// Directory with the core contract sources
    #[arg(long, default_value = "contracts")]
    core_root: PathBuf,

    /// Additional source directories or files, later ones shadow earlier ones
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Output directory used when no candidate holds artifacts
    #[arg(short, long, default_value = "build/contracts")]
    output_dir: PathBuf,

    /// Candidate output directory, may be repeated
    #[arg(long = "candidate", value_name = "DIR")]
    candidates: Vec<PathBuf>,

    /// Target network [default: from CONTRACTS_CHAIN or NODE_ENV, else testcore]
    #[arg(long)]
    network: Option<Network>,

    /// TOML file with additional dependencies, addresses and allow-list
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the solc binary
    #[arg(long, default_value = "solc")]
    solc: PathBuf,

    /// Recompile even if artifacts are up to date
    #[arg(long)]
    always_recompile: bool,

    /// Pretty-print compiled.json
    #[arg(long)]
    pretty: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Delete the artifacts and recompile everything
    Compile {
        #[command(flatten)]
        pipeline: PipelineSettings,
    },

    /// Compile if needed and deploy every library missing an address
    Deploy {
        #[command(flatten)]
        pipeline: PipelineSettings,
    },

    /// Print the libraries that need (re)deployment
    Plan {
        #[command(flatten)]
        pipeline: PipelineSettings,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
enum Output {
    #[serde(rename = "success")]
    Success {
        #[serde(flatten)]
        data: SuccessData,
    },

    #[serde(rename = "error")]
    Error { error_type: String, message: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "command")]
enum SuccessData {
    #[serde(rename = "compile")]
    Compile {
        network: String,
        contracts: usize,
        backend: String,
        frontend: String,
    },

    #[serde(rename = "deploy")]
    Deploy {
        network: String,
        addresses: BTreeMap<String, String>,
        reports: Vec<DeploymentReport>,
    },

    #[serde(rename = "plan")]
    Plan {
        network: String,
        libraries: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    let result = tokio::runtime::Runtime::new()
        .context("Failed to create async runtime")
        .and_then(|runtime| runtime.block_on(run(cli.command, json)));

    if let Err(e) = result {
        output_error(e, json);
        std::process::exit(1);
    }
}

async fn run(command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Compile { pipeline } => run_compile(pipeline, json).await,
        Commands::Deploy { pipeline } => run_deploy(pipeline, json).await,
        Commands::Plan { pipeline } => run_plan(pipeline, json).await,
    }
}

/// Resolves the pipeline configuration. The network comes from `--network`,
/// then the config file, then the environment.
fn pipeline_config(settings: &PipelineSettings) -> Result<PipelineConfig> {
    let env_recompile = std::env::var(ALWAYS_RECOMPILE_ENV)
        .map(|v| !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false"))
        .unwrap_or(false);

    let mut builder = PipelineConfig::builder()
        .core_root(settings.core_root.clone())
        .additional_paths(settings.paths.clone())
        .default_destination(settings.output_dir.clone())
        .network(Network::from_env()?)
        .always_recompile(settings.always_recompile || env_recompile)
        .pretty_json(settings.pretty);
    for candidate in &settings.candidates {
        builder = builder.destination_candidate(candidate.clone());
    }

    let mut config = builder.build();
    if let Some(path) = &settings.config {
        config.apply_file(path)?;
    }
    if let Some(network) = settings.network {
        config.network = network;
    }
    Ok(config)
}

fn open_pipeline(settings: &PipelineSettings) -> Result<Pipeline> {
    let config = pipeline_config(settings)?;
    let presets = Presets::builtin().context("Failed to load library presets")?;
    Pipeline::new(config, presets, Arc::new(Solc::new(settings.solc.clone())))
}

async fn run_compile(settings: PipelineSettings, json: bool) -> Result<()> {
    let mut pipeline = open_pipeline(&settings)?;
    pipeline.clean().await?;
    let (contracts, saved) = pipeline.compile().await?;
    let network = pipeline.config().network.to_string();

    if json {
        let output = Output::Success {
            data: SuccessData::Compile {
                network,
                contracts: contracts.len(),
                backend: saved.backend_path.display().to_string(),
                frontend: saved.frontend_path.display().to_string(),
            },
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("✅ Compiled {} contracts for {}", contracts.len(), network);
        println!("📄 Created files:");
        println!("   - {}", saved.backend_path.display());
        println!("   - {}", saved.frontend_path.display());

        let pending = pipeline.redeploy_set();
        if !pending.is_empty() {
            println!("⚠️  {} libraries need deployment, run `contracts deploy`", pending.len());
        }
    }

    Ok(())
}

async fn run_deploy(settings: PipelineSettings, json: bool) -> Result<()> {
    let deploy = DeployConfig::from_env()?;
    tracing::debug!("Deploy settings: {:?}", deploy);

    let mut pipeline = open_pipeline(&settings)?;
    let client = EthersClient::new(&deploy.rpc_url)?;
    let signer = WalletSigner::new(&deploy.private_key, &deploy.account)?;

    let summary = deploy_libraries(
        &mut pipeline,
        &client,
        &signer,
        GasSettings::from(&deploy),
    )
    .await?;
    let network = pipeline.config().network.to_string();

    if json {
        let output = Output::Success {
            data: SuccessData::Deploy {
                network,
                addresses: summary.addresses,
                reports: summary.reports,
            },
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if summary.addresses.is_empty() {
        println!("✅ All libraries deployed on {}", network);
    } else {
        println!("✅ Deployed {} libraries on {}", summary.addresses.len(), network);
        println!("📋 Add these addresses to the {} presets:", network);
        for (library, address) in &summary.addresses {
            println!("   \"{}\" = \"{}\"", library, address);
        }
    }

    Ok(())
}

async fn run_plan(settings: PipelineSettings, json: bool) -> Result<()> {
    let pipeline = open_pipeline(&settings)?;
    let libraries = pipeline.redeploy_set();
    let network = pipeline.config().network.to_string();

    if json {
        let output = Output::Success {
            data: SuccessData::Plan { network, libraries },
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if libraries.is_empty() {
        println!("✅ Nothing to deploy on {}", network);
    } else {
        println!("📋 Deployment order on {}:", network);
        for (i, library) in libraries.iter().enumerate() {
            println!("   {}. {}", i + 1, library);
        }
    }

    Ok(())
}

fn error_type(error: &eyre::Report) -> &'static str {
    match error.downcast_ref::<Error>() {
        Some(Error::Compilation(_)) | Some(Error::Compiler(_)) => "compilation_failed",
        Some(Error::SourceNotFound(_)) => "source_not_found",
        Some(Error::InvalidAddress { .. }) => "invalid_address",
        Some(Error::UnknownNetwork(_)) | Some(Error::InvalidSetting { .. }) => "invalid_config",
        Some(Error::MissingCredentials(_)) => "missing_credentials",
        Some(Error::Deployment { .. }) | Some(Error::UnresolvedLinks(_)) => "deployment_failed",
        Some(Error::UnknownContract(_)) => "unknown_contract",
        Some(Error::Json(_)) | Some(Error::Toml(_)) => "parse_error",
        Some(Error::Io(_)) => "io_error",
        None => "unknown_error",
    }
}

fn output_error(error: eyre::Report, json: bool) {
    if !json {
        eprintln!("Error: {:?}", error);
        return;
    }

    let output = Output::Error {
        error_type: error_type(&error).to_string(),
        message: format!("{:#}", error),
    };
    match serde_json::to_string(&output) {
        Ok(line) => eprintln!("{}", line),
        Err(_) => eprintln!("Error: {:?}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["contracts", "compile"]);
        assert!(matches!(cli.command, Commands::Compile { .. }));

        let cli = Cli::parse_from(["contracts", "deploy", "--json"]);
        assert!(matches!(cli.command, Commands::Deploy { .. }));
        assert!(cli.json);

        let cli = Cli::parse_from(["contracts", "plan", "--network", "core"]);
        if let Commands::Plan { pipeline } = cli.command {
            assert_eq!(pipeline.network, Some(Network::Core));
        } else {
            panic!("expected plan");
        }

        assert!(Cli::try_parse_from(["contracts", "plan", "--network", "mainnet"]).is_err());
    }

    #[test]
    fn test_pipeline_settings() {
        let cli = Cli::parse_from([
            "contracts",
            "compile",
            "--core-root",
            "node_modules/core/contracts",
            "--candidate",
            "build/a",
            "--candidate",
            "build/b",
            "-o",
            "out",
            "--always-recompile",
            "src/contracts",
            "src/Extra.sol",
        ]);

        let Commands::Compile { pipeline } = cli.command else {
            panic!("expected compile");
        };
        assert_eq!(pipeline.core_root, PathBuf::from("node_modules/core/contracts"));
        assert_eq!(
            pipeline.paths,
            vec![PathBuf::from("src/contracts"), PathBuf::from("src/Extra.sol")]
        );
        assert_eq!(
            pipeline.candidates,
            vec![PathBuf::from("build/a"), PathBuf::from("build/b")]
        );
        assert_eq!(pipeline.output_dir, PathBuf::from("out"));
        assert!(pipeline.always_recompile);
        assert_eq!(pipeline.solc, PathBuf::from("solc"));
    }

    #[test]
    fn test_network_flag_beats_config_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("contracts.toml");
        std::fs::write(
            &file,
            r#"
network = "local"
allowed-bytecodes = ["ProofHolder"]

[addresses]
"Lib.sol:Lib" = "0x01"
"#,
        )
        .unwrap();
        let path = file.to_str().unwrap();

        let cli = Cli::parse_from(["contracts", "plan", "--config", path]);
        let Commands::Plan { pipeline } = cli.command else {
            panic!("expected plan");
        };
        let config = pipeline_config(&pipeline).unwrap();
        assert_eq!(config.network, Network::Local);
        assert_eq!(config.allowed_bytecodes, vec!["ProofHolder"]);
        assert_eq!(config.library_addresses["Lib.sol:Lib"], "0x01");

        let cli = Cli::parse_from(["contracts", "plan", "--network", "core", "--config", path]);
        let Commands::Plan { pipeline } = cli.command else {
            panic!("expected plan");
        };
        assert_eq!(pipeline_config(&pipeline).unwrap().network, Network::Core);
    }

    #[test]
    fn test_error_output() {
        let error = eyre::Report::new(Error::MissingCredentials("ACCOUNT_ID"));
        assert_eq!(error_type(&error), "missing_credentials");

        let error = eyre::Report::new(Error::UnresolvedLinks(vec!["A.sol:A".into()]))
            .wrap_err("Deployment failed");
        assert_eq!(error_type(&error), "deployment_failed");

        assert_eq!(error_type(&eyre::eyre!("boom")), "unknown_error");
    }
}
