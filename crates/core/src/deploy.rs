//! Sequential library deployment for the redeploy set

use crate::{
    blockchain::{ChainClient, DeployTransaction, Receipt, TransactionSigner},
    contract::ContractTable,
    error::Error,
    pipeline::Pipeline,
};
use eyre::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Gas settings shared by every deployment of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSettings {
    pub gas_price: u128,
    pub gas_limit: u64,
}

impl From<&crate::config::DeployConfig> for GasSettings {
    fn from(config: &crate::config::DeployConfig) -> Self {
        Self {
            gas_price: config.gas_price,
            gas_limit: config.gas_limit,
        }
    }
}

/// Outcome of one library deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReport {
    pub library: String,
    pub address: String,
    pub transaction_hash: String,
    pub gas_used: Option<u128>,
    pub nonce: u64,
}

/// Everything deployed in one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentSummary {
    /// `library -> address` of every library deployed in this run
    pub addresses: BTreeMap<String, String>,
    pub reports: Vec<DeploymentReport>,
}

/// Compiles if needed, then deploys the redeploy set one library at a time.
///
/// Each deployed address is linked into the table and the artifacts are
/// rebuilt before the next library goes out, so dependants embed the fresh
/// address. A failure aborts the batch; earlier deployments stay recorded in
/// the artifacts.
pub async fn deploy_libraries(
    pipeline: &mut Pipeline,
    client: &dyn ChainClient,
    signer: &dyn TransactionSigner,
    gas: GasSettings,
) -> Result<DeploymentSummary> {
    pipeline.ensure_compiled().await?;

    let mut pending = pipeline.redeploy_set();
    let mut summary = DeploymentSummary::default();
    if pending.is_empty() {
        tracing::info!("All libraries deployed on {}", pipeline.config().network);
        return Ok(summary);
    }
    tracing::info!("Deploying {} libraries: {}", pending.len(), pending.join(", "));

    let mut contracts = pipeline.load_contracts().await?;
    let chain_id = client.chain_id().await?;
    let mut nonce = client
        .transaction_count(signer.account())
        .await
        .with_context(|| format!("Failed to fetch nonce of {}", signer.account()))?;

    while !pending.is_empty() {
        let library = next_deployable(pipeline, &contracts, &pending)?;
        let bytecode = &contracts
            .get(&library)
            .ok_or_else(|| Error::UnknownContract(library.clone()))?
            .bytecode;
        let data = hex::decode(bytecode.trim_start_matches("0x"))
            .with_context(|| format!("Bytecode of {library} is not valid hex"))?;

        let tx = DeployTransaction {
            data,
            from: signer.account().to_string(),
            gas_limit: gas.gas_limit,
            gas_price: gas.gas_price,
            nonce,
            value: 0,
            chain_id,
        };
        tracing::debug!("Deploying {} with nonce {}", library, nonce);

        let raw = signer
            .sign(&tx)
            .await
            .with_context(|| format!("Failed to sign deployment of {library}"))?;
        let receipt = client
            .submit(raw)
            .await
            .with_context(|| format!("Failed to deploy {library}"))?;
        let address = deployed_address(&library, &receipt)?;

        tracing::info!(
            "Deployed {} at {} (tx {}, gas used {})",
            library,
            address,
            receipt.transaction_hash,
            receipt
                .gas_used
                .map_or_else(|| "unknown".to_string(), |g| g.to_string())
        );

        summary.reports.push(DeploymentReport {
            library: library.clone(),
            address: address.clone(),
            transaction_hash: receipt.transaction_hash,
            gas_used: receipt.gas_used,
            nonce,
        });
        summary.addresses.insert(library.clone(), address.clone());
        pending.retain(|p| p != &library);
        nonce += 1;

        pipeline.link(&mut contracts, [(library, address)])?;
        pipeline.compile().await?;
        contracts = pipeline.load_contracts().await?;
    }

    Ok(summary)
}

/// First pending library whose dependencies are all out and whose bytecode
/// is fully linked
fn next_deployable(
    pipeline: &Pipeline,
    contracts: &ContractTable,
    pending: &[String],
) -> Result<String> {
    for library in pending {
        let contract = contracts
            .get(library)
            .ok_or_else(|| Error::UnknownContract(library.clone()))?;

        let waiting = pipeline
            .graph()
            .dependencies_of(library)
            .iter()
            .any(|dep| pending.contains(dep));
        if waiting || contract.has_unlinked_placeholders() {
            tracing::debug!("Deferring {}", library);
            continue;
        }
        return Ok(library.clone());
    }

    Err(Error::UnresolvedLinks(pending.to_vec()).into())
}

fn deployed_address(library: &str, receipt: &Receipt) -> Result<String> {
    if !receipt.status {
        return Err(Error::Deployment {
            library: library.to_string(),
            reason: format!("transaction {} reverted", receipt.transaction_hash),
        }
        .into());
    }
    receipt.contract_address.clone().ok_or_else(|| {
        Error::Deployment {
            library: library.to_string(),
            reason: "receipt has no contract address".to_string(),
        }
        .into()
    })
}
