//! Transport abstractions for EVM RPC interactions.

use std::{future::Future, sync::Arc, time::Duration};

use alloy_network::{EthereumWallet, ReceiptResponse};
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::eth::transaction::{TransactionInput, TransactionRequest};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use log::debug;
use tokio::runtime::Runtime;

use crate::error::{BundleError, Result};

/// Simulation request handed to [`ReadProvider::estimate_gas`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GasRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

/// EIP-1559 fee suggestion, in wei.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeData {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Read-only chain access needed to assemble a bundle.
///
/// Simulation reverts map to [`BundleError::Estimation`]; transport failures
/// map to [`BundleError::Network`] so they can be retried.
pub trait ReadProvider: Send + Sync {
    fn chain_id(&self) -> Result<u64>;
    fn estimate_gas(&self, request: &GasRequest) -> Result<u64>;
    fn fee_data(&self) -> Result<FeeData>;
}

/// Encoded EVM call that can be dispatched via a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvmCall {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: Option<u64>,
    pub fees: Option<FeeData>,
}

impl EvmCall {
    pub fn new(to: Address, data: impl Into<Bytes>, value: U256) -> Self {
        Self {
            to,
            data: data.into(),
            value,
            gas_limit: None,
            fees: None,
        }
    }

    pub fn with_gas_limit(mut self, gas: u64) -> Self {
        self.gas_limit = Some(gas);
        self
    }

    pub fn with_fees(mut self, fees: FeeData) -> Self {
        self.fees = Some(fees);
        self
    }
}

/// Abstraction over sending signed EVM transactions.
pub trait EvmTransport: Send + Sync {
    /// Sends `call` and waits for it to be mined. A reverted receipt is an error.
    fn send(&self, call: EvmCall) -> Result<B256>;
    fn sender(&self) -> Option<Address>;
}

/// JSON-RPC transport backed by Alloy's provider stack, optionally holding a
/// local private key for sending.
pub struct AlloyHttpTransport {
    rpc_url: reqwest::Url,
    wallet: Option<PrivateKeySigner>,
    runtime: Arc<Runtime>,
    chain_id: u64,
    timeout: Duration,
}

/// Runs a read call on `runtime`, giving up after `timeout`. A stalled
/// endpoint surfaces as a transient `Network` error.
fn bounded<F: Future>(runtime: &Runtime, timeout: Duration, label: &str, fut: F) -> Result<F::Output> {
    runtime
        .block_on(async { tokio::time::timeout(timeout, fut).await })
        .map_err(|_| {
            BundleError::Network(format!(
                "{label}: no response within {}ms",
                timeout.as_millis()
            ))
        })
}

impl AlloyHttpTransport {
    /// Builds a read-only transport targeting `rpc_url`. Every read call,
    /// including the initial chain id lookup, is bounded by `timeout`.
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self> {
        let runtime = Runtime::new()
            .map_err(|err| BundleError::Network(format!("transport init (runtime): {err}")))?;
        let url = reqwest::Url::parse(rpc_url)
            .map_err(|err| BundleError::Validation(format!("rpc url {rpc_url:?}: {err}")))?;

        let base_provider = ProviderBuilder::new().on_http(url.clone());
        let chain_id = bounded(
            &runtime,
            timeout,
            "transport init (chain_id)",
            base_provider.get_chain_id(),
        )?
        .map_err(|err| BundleError::Network(format!("transport init (chain_id): {err}")))?;
        debug!(target: "harvest::transport", "connected to {url} (chain {chain_id})");

        Ok(Self {
            rpc_url: url,
            wallet: None,
            runtime: Arc::new(runtime),
            chain_id,
            timeout,
        })
    }

    /// Builds a transport that can also send, signing with `private_key_hex`.
    pub fn with_signer(rpc_url: &str, private_key_hex: &str, timeout: Duration) -> Result<Self> {
        let mut transport = Self::new(rpc_url, timeout)?;
        let mut wallet: PrivateKeySigner = private_key_hex
            .trim()
            .parse()
            .map_err(|_| BundleError::Signing("invalid private key".into()))?;
        wallet.set_chain_id(Some(transport.chain_id));
        transport.wallet = Some(wallet);
        Ok(transport)
    }

    fn build_transaction(&self, from: Option<Address>, call: &EvmCall) -> TransactionRequest {
        let mut tx = TransactionRequest::default()
            .input(TransactionInput::from(call.data.clone()))
            .value(call.value);
        tx.to = Some(TxKind::Call(call.to));
        if let Some(from) = from {
            tx = tx.from(from);
        }
        if let Some(gas) = call.gas_limit {
            tx = tx.gas_limit(gas);
        }
        if let Some(fees) = call.fees {
            tx = tx
                .max_fee_per_gas(fees.max_fee_per_gas)
                .max_priority_fee_per_gas(fees.max_priority_fee_per_gas);
        }
        tx
    }
}

impl ReadProvider for AlloyHttpTransport {
    fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    fn estimate_gas(&self, request: &GasRequest) -> Result<u64> {
        let call = EvmCall::new(request.to, request.data.clone(), request.value);
        let tx = self.build_transaction(Some(request.from), &call);
        let rpc_url = self.rpc_url.clone();
        let fut = async move {
            let provider = ProviderBuilder::new().on_http(rpc_url);
            provider.estimate_gas(&tx).await
        };
        bounded(&self.runtime, self.timeout, "estimate_gas", fut)?.map_err(|err| {
            if err.is_error_resp() {
                BundleError::Estimation(err.to_string())
            } else {
                BundleError::Network(format!("estimate_gas: {err}"))
            }
        })
    }

    fn fee_data(&self) -> Result<FeeData> {
        let rpc_url = self.rpc_url.clone();
        let fut = async move {
            let provider = ProviderBuilder::new().on_http(rpc_url);
            provider.estimate_eip1559_fees(None).await
        };
        let estimate = bounded(&self.runtime, self.timeout, "fee estimate", fut)?
            .map_err(|err| BundleError::Network(format!("fee estimate: {err}")))?;
        Ok(FeeData {
            max_fee_per_gas: estimate.max_fee_per_gas,
            max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
        })
    }
}

impl EvmTransport for AlloyHttpTransport {
    fn send(&self, call: EvmCall) -> Result<B256> {
        let wallet = self
            .wallet
            .clone()
            .ok_or_else(|| BundleError::Signing("transport has no signing key".into()))?;
        let tx = self.build_transaction(Some(wallet.address()), &call);
        let rpc_url = self.rpc_url.clone();
        let fut = async move {
            let provider = ProviderBuilder::new()
                .with_recommended_fillers()
                .wallet(EthereumWallet::new(wallet))
                .on_http(rpc_url);
            let pending = provider
                .send_transaction(tx)
                .await
                .map_err(|err| BundleError::Network(format!("send_transaction: {err}")))?;
            pending
                .get_receipt()
                .await
                .map_err(|err| BundleError::Network(format!("receipt: {err}")))
        };
        let receipt = self.runtime.block_on(fut)?;
        let hash = receipt.transaction_hash();
        if !receipt.status() {
            return Err(BundleError::Submission {
                status: 0,
                message: format!("transaction {hash} reverted"),
            });
        }
        Ok(hash)
    }

    fn sender(&self) -> Option<Address> {
        self.wallet.as_ref().map(|wallet| wallet.address())
    }
}
