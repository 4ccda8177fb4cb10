//! Mock settlement ledger for E2E testing.

use std::sync::RwLock;

use async_trait::async_trait;
use ethers::types::H256;
use ethers::utils::keccak256;

use crate::{
    ChannelError, CloseChannelRequest, Result, SettlementLedger, SettlementReceipt,
    SettlementStatus,
};

#[derive(Default)]
enum NextOutcome {
    #[default]
    Confirm,
    Revert,
    Fail(String),
}

/// A ledger that records close requests instead of submitting them.
///
/// Each call mines a fake block; the transaction hash is derived from the
/// call index so receipts are distinct and deterministic.
#[derive(Default)]
pub struct MockSettlementLedger {
    requests: RwLock<Vec<CloseChannelRequest>>,
    next: RwLock<NextOutcome>,
}

impl MockSettlementLedger {
    /// Create a ledger that confirms every close.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call fail with `reason` (network error, gas, ...).
    pub fn fail_next(&self, reason: impl Into<String>) {
        *self.next.write().unwrap() = NextOutcome::Fail(reason.into());
    }

    /// Make the next call return a reverted receipt.
    pub fn revert_next(&self) {
        *self.next.write().unwrap() = NextOutcome::Revert;
    }

    /// All requests received so far, in call order.
    pub fn requests(&self) -> Vec<CloseChannelRequest> {
        self.requests.read().unwrap().clone()
    }

    /// The most recent request.
    pub fn last_request(&self) -> Option<CloseChannelRequest> {
        self.requests.read().unwrap().last().cloned()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl SettlementLedger for MockSettlementLedger {
    async fn close_channel(&self, request: &CloseChannelRequest) -> Result<SettlementReceipt> {
        let index = {
            let mut requests = self.requests.write().unwrap();
            requests.push(request.clone());
            requests.len() as u64
        };

        let outcome = std::mem::take(&mut *self.next.write().unwrap());
        let status = match outcome {
            NextOutcome::Confirm => SettlementStatus::Confirmed,
            NextOutcome::Revert => SettlementStatus::Reverted,
            NextOutcome::Fail(reason) => return Err(ChannelError::Settlement(reason)),
        };

        Ok(SettlementReceipt {
            transaction_hash: H256::from(keccak256(index.to_be_bytes())),
            block_number: Some(index),
            status,
        })
    }
}
