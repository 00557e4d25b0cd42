//! Chain collaborators used by the deployment driver

use eyre::Result;
use serde::{Deserialize, Serialize};

/// Fields of a library deployment transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTransaction {
    /// Contract creation payload (linked bytecode)
    pub data: Vec<u8>,
    pub from: String,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub nonce: u64,
    pub value: u128,
    pub chain_id: u64,
}

/// Receipt of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: String,
    pub contract_address: Option<String>,
    pub gas_used: Option<u128>,
    /// `false` if the transaction reverted
    pub status: bool,
}

/// Signs transactions for the deploying account
#[async_trait::async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Address of the signing account
    fn account(&self) -> &str;

    /// Returns the raw signed transaction
    async fn sign(&self, tx: &DeployTransaction) -> Result<Vec<u8>>;
}

/// Submits transactions to a chain
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    /// Number of transactions sent from `account`, the next nonce
    async fn transaction_count(&self, account: &str) -> Result<u64>;

    /// Submits a raw signed transaction and waits for its receipt
    async fn submit(&self, raw: Vec<u8>) -> Result<Receipt>;
}

#[cfg(feature = "ethers")]
pub mod ethers {
    use super::*;
    use ::ethers::{
        providers::{Http, Middleware, Provider},
        signers::{LocalWallet, Signer},
        types::{transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest, U256},
    };
    use eyre::Context;

    /// JSON-RPC chain client
    #[derive(Debug, Clone)]
    pub struct EthersClient {
        provider: Provider<Http>,
    }

    impl EthersClient {
        pub fn new(rpc_url: &str) -> Result<Self> {
            let provider =
                Provider::<Http>::try_from(rpc_url).context("Failed to create provider")?;
            Ok(Self { provider })
        }
    }

    #[async_trait::async_trait]
    impl ChainClient for EthersClient {
        async fn chain_id(&self) -> Result<u64> {
            let chain_id = self
                .provider
                .get_chainid()
                .await
                .context("Failed to get chain ID")?;
            Ok(chain_id.as_u64())
        }

        async fn transaction_count(&self, account: &str) -> Result<u64> {
            let address: Address = account.parse().context("Invalid account address")?;
            let count = self
                .provider
                .get_transaction_count(address, None)
                .await
                .context("Failed to fetch transaction count")?;
            Ok(count.as_u64())
        }

        async fn submit(&self, raw: Vec<u8>) -> Result<Receipt> {
            let pending = self
                .provider
                .send_raw_transaction(Bytes::from(raw))
                .await
                .context("Failed to submit transaction")?;
            let receipt = pending
                .await
                .context("Failed to wait for receipt")?
                .ok_or_else(|| eyre::eyre!("Transaction dropped from mempool"))?;

            Ok(Receipt {
                transaction_hash: format!("{:?}", receipt.transaction_hash),
                contract_address: receipt.contract_address.map(|a| format!("{a:?}")),
                gas_used: receipt.gas_used.map(|g| g.as_u128()),
                status: receipt.status.map_or(true, |s| s.as_u64() == 1),
            })
        }
    }

    /// Signs with a local private key
    #[derive(Debug, Clone)]
    pub struct WalletSigner {
        wallet: LocalWallet,
        account: String,
    }

    impl WalletSigner {
        /// `account` must be the address belonging to `private_key`
        pub fn new(private_key: &str, account: &str) -> Result<Self> {
            let wallet: LocalWallet = private_key.parse().context("Invalid private key")?;
            let expected: Address = account.parse().context("Invalid account address")?;
            if wallet.address() != expected {
                return Err(eyre::eyre!(
                    "Private key belongs to {:?}, not {}",
                    wallet.address(),
                    account
                ));
            }

            Ok(Self {
                wallet,
                account: account.to_string(),
            })
        }
    }

    #[async_trait::async_trait]
    impl TransactionSigner for WalletSigner {
        fn account(&self) -> &str {
            &self.account
        }

        async fn sign(&self, tx: &DeployTransaction) -> Result<Vec<u8>> {
            let request = TransactionRequest::new()
                .from(self.wallet.address())
                .data(Bytes::from(tx.data.clone()))
                .gas(tx.gas_limit)
                .gas_price(U256::from(tx.gas_price))
                .nonce(tx.nonce)
                .value(U256::from(tx.value))
                .chain_id(tx.chain_id);

            let typed: TypedTransaction = request.into();
            let wallet = self.wallet.clone().with_chain_id(tx.chain_id);
            let signature = wallet
                .sign_transaction(&typed)
                .await
                .context("Failed to sign transaction")?;

            Ok(typed.rlp_signed(&signature).to_vec())
        }
    }
}
