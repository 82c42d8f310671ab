//! The network collaborator: submitting contract creations and awaiting confirmation.

use std::future::Future;
use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes, U64, U128};
use alloy_signer_local::PrivateKeySigner;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::config::NetworkConfig;
use crate::error::{ChainError, Error, Result};
use crate::rpc;
use crate::tx;

/// What the deployment driver needs from a network.
///
/// Calls are made strictly one after the other: the signer's nonce sequence
/// relies on it.
pub trait ChainClient: Send + Sync {
    /// Submit a contract-creation transaction carrying `init_code`, returning its hash.
    ///
    /// Not idempotent: every call creates a new contract.
    fn send_create(&self, init_code: Bytes) -> impl Future<Output = Result<B256, ChainError>> + Send;

    /// Wait until `tx_hash` is confirmed and return the address of the contract it created.
    fn wait_for_contract(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<Address, ChainError>> + Send;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    status: Option<U64>,
    contract_address: Option<Address>,
    block_number: Option<U64>,
}

/// [`ChainClient`] backed by a JSON-RPC endpoint, signing locally.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    http: reqwest::Client,
    url: Url,
    signer: PrivateKeySigner,
    chain_id: u64,
    confirmation_timeout: Duration,
    poll_interval: Duration,
    confirmations: u64,
    gas_buffer_percent: u64,
}

impl RpcChainClient {
    /// Connect to the configured endpoint and fetch its chain id.
    pub async fn connect(config: &NetworkConfig) -> Result<Self> {
        let signer = config.signer.clone().ok_or(Error::NoSignerConfigured)?;
        let http = rpc::create_client(rpc::DEFAULT_REQUEST_TIMEOUT)?;

        let chain_id: U64 = rpc::read_call(&http, &config.rpc_url, "eth_chainId", vec![]).await?;
        let chain_id = chain_id.to::<u64>();

        tracing::info!(
            chain_id,
            signer = %signer.address(),
            "Connected to network"
        );

        Ok(Self {
            http,
            url: config.rpc_url.clone(),
            signer,
            chain_id,
            confirmation_timeout: config.confirmation_timeout,
            poll_interval: config.poll_interval,
            confirmations: config.confirmations,
            gas_buffer_percent: config.gas_buffer_percent,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    async fn read<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T, ChainError> {
        rpc::read_call(&self.http, &self.url, method, params).await
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<TransactionReceipt>, ChainError> {
        self.read("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let number: U64 = self.read("eth_blockNumber", vec![]).await?;
        Ok(number.to::<u64>())
    }
}

/// `estimate` raised by `percent`, saturating instead of overflowing.
fn buffered_gas_limit(estimate: u64, percent: u64) -> u64 {
    let limit = u128::from(estimate) * (100 + u128::from(percent)) / 100;
    u64::try_from(limit).unwrap_or(u64::MAX)
}

impl ChainClient for RpcChainClient {
    async fn send_create(&self, init_code: Bytes) -> Result<B256, ChainError> {
        let from = self.signer.address();

        let nonce: U64 = self
            .read("eth_getTransactionCount", vec![json!(from), json!("pending")])
            .await?;
        let gas_price: U128 = self.read("eth_gasPrice", vec![]).await?;

        // Estimation simulates the creation, so an initializer revert surfaces here.
        let estimate: U64 = rpc::json_rpc_call(
            &self.http,
            &self.url,
            "eth_estimateGas",
            vec![json!({ "from": from, "data": init_code })],
        )
        .await?;
        let gas_limit = buffered_gas_limit(estimate.to::<u64>(), self.gas_buffer_percent);

        let nonce = nonce.to::<u64>();
        let gas_price = gas_price.to::<u128>();
        let tx = tx::creation(self.chain_id, nonce, gas_price, gas_limit, init_code);
        let signed = tx::sign(tx, &self.signer)?;

        tracing::debug!(
            nonce,
            gas_limit,
            gas_price,
            tx_hash = %signed.hash,
            "Submitting contract creation"
        );

        rpc::json_rpc_call(
            &self.http,
            &self.url,
            "eth_sendRawTransaction",
            vec![json!(signed.raw)],
        )
        .await
    }

    async fn wait_for_contract(&self, tx_hash: B256) -> Result<Address, ChainError> {
        let timeout = self.confirmation_timeout;

        let receipt = rpc::poll_until("transaction receipt", timeout, self.poll_interval, || {
            self.receipt(tx_hash)
        })
        .await?
        .ok_or(ChainError::Timeout { tx_hash, timeout })?;

        if receipt.status == Some(U64::ZERO) {
            return Err(ChainError::Reverted(tx_hash));
        }

        let address = receipt
            .contract_address
            .ok_or(ChainError::MissingContractAddress(tx_hash))?;

        if self.confirmations > 1 {
            let included = receipt.block_number.map(|n| n.to::<u64>()).unwrap_or_default();
            let target = included + self.confirmations - 1;

            rpc::poll_until("confirmations", timeout, self.poll_interval, || async move {
                Ok::<_, ChainError>((self.block_number().await? >= target).then_some(()))
            })
            .await?
            .ok_or(ChainError::Timeout { tx_hash, timeout })?;
        }

        tracing::debug!(tx_hash = %tx_hash, address = %address, "Contract creation confirmed");

        Ok(address)
    }
}
