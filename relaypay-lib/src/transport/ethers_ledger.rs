use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::providers::Middleware;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use ethers::utils::id;

use super::traits::{CloseChannelRequest, SettlementLedger, SettlementReceipt, SettlementStatus};
use crate::{ChannelError, Result};

/// Solidity signature of the contract's close entry point.
pub const CLOSE_CHANNEL_SIGNATURE: &str = "closeChannel(uint256,uint256,uint256,bytes,bytes)";

/// Adapter submitting `closeChannel` through any `ethers` middleware.
///
/// The middleware decides how the transaction is signed and sent (a
/// `SignerMiddleware` wrapping a `Provider`, a nonce manager, ...). Gas,
/// finality and replay protection stay with the ledger.
#[derive(Debug)]
pub struct EthersSettlementLedger<M> {
    client: Arc<M>,
    contract: Address,
    confirmations: usize,
}

impl<M: Middleware> EthersSettlementLedger<M> {
    /// Create a new adapter for the contract at `contract`.
    pub fn new(client: Arc<M>, contract: Address) -> Self {
        Self {
            client,
            contract,
            confirmations: 1,
        }
    }

    /// Set how many confirmations to wait for before returning the receipt.
    pub fn with_confirmations(mut self, confirmations: usize) -> Self {
        self.confirmations = confirmations;
        self
    }

    /// Address of the settlement contract.
    pub fn contract(&self) -> Address {
        self.contract
    }

    /// ABI-encode the call: 4-byte selector followed by the five arguments.
    pub fn encode_call(request: &CloseChannelRequest) -> Bytes {
        let selector = id(CLOSE_CHANNEL_SIGNATURE);
        let args = abi::encode(&[
            Token::Uint(request.client_balance.as_u256()),
            Token::Uint(request.relay_balance.as_u256()),
            Token::Uint(U256::from(request.nonce)),
            Token::Bytes(request.client_signature.to_vec()),
            Token::Bytes(request.relay_signature.to_vec()),
        ]);

        let mut data = Vec::with_capacity(selector.len() + args.len());
        data.extend_from_slice(&selector);
        data.extend_from_slice(&args);
        Bytes::from(data)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<M> SettlementLedger for EthersSettlementLedger<M>
where
    M: Middleware + 'static,
{
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, request), fields(nonce = request.nonce)))]
    async fn close_channel(&self, request: &CloseChannelRequest) -> Result<SettlementReceipt> {
        let tx = TransactionRequest::new()
            .to(self.contract)
            .data(Self::encode_call(request));

        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|err| ChannelError::Settlement(format!("send closeChannel: {err}")))?;

        let receipt = pending
            .confirmations(self.confirmations)
            .await
            .map_err(|err| ChannelError::Settlement(format!("await receipt: {err}")))?
            .ok_or_else(|| {
                ChannelError::Settlement("closeChannel transaction dropped from mempool".into())
            })?;

        let status = match receipt.status {
            Some(status) if status.is_zero() => SettlementStatus::Reverted,
            _ => SettlementStatus::Confirmed,
        };

        Ok(SettlementReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
            status,
        })
    }
}
