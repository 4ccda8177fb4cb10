//! Settlement facade.
//!
//! [`SettlementClient`] forwards the final balances, nonce and both
//! settlement signatures to the ledger's close entry point without touching
//! them. Replay protection and nonce authority live in the contract. There
//! is no retry at this layer.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::Signature;
use relaypay_lib::{
    ChannelError, CloseChannelRequest, Result, SettlementLedger, SettlementReceipt, TokenAmount,
};

use crate::timeout::bounded;

/// Issues the ledger call that closes a channel.
#[derive(Clone)]
pub struct SettlementClient {
    ledger: Arc<dyn SettlementLedger>,
    timeout: Option<Duration>,
}

impl SettlementClient {
    /// Create a client over `ledger`.
    pub fn new(ledger: Arc<dyn SettlementLedger>) -> Self {
        Self {
            ledger,
            timeout: None,
        }
    }

    /// Bound each close call by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Close the channel on the ledger.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Settlement`] if the call fails or the transaction reverts
    /// - [`ChannelError::Timeout`] if a timeout is set and elapses
    pub async fn close_channel(
        &self,
        client_balance: TokenAmount,
        relay_balance: TokenAmount,
        nonce: u64,
        client_signature: Signature,
        relay_signature: Signature,
    ) -> Result<SettlementReceipt> {
        let request = CloseChannelRequest {
            client_balance,
            relay_balance,
            nonce,
            client_signature,
            relay_signature,
        };

        let receipt = bounded("settlement", self.timeout, async {
            self.ledger
                .close_channel(&request)
                .await
                .map_err(|e| match e {
                    ChannelError::Settlement(_) => e,
                    other => ChannelError::Settlement(other.to_string()),
                })
        })
        .await?;

        if !receipt.is_confirmed() {
            return Err(ChannelError::Settlement(format!(
                "closeChannel reverted in transaction {:?}",
                receipt.transaction_hash
            )));
        }
        Ok(receipt)
    }
}

impl std::fmt::Debug for SettlementClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
