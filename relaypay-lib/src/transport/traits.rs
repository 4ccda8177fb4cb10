use async_trait::async_trait;
use ethers::types::{Signature, H256};

use crate::{ChannelError, Result, TokenAmount};

/// Acknowledgement returned by a replicated store write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreAck {
    /// The store accepted the write.
    Ok,
    /// The store rejected the write; carries the store's error detail.
    Err(String),
}

impl StoreAck {
    /// Check if the write was acknowledged.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Convert into a `Result`, mapping rejections to [`ChannelError::Store`].
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Ok => Ok(()),
            Self::Err(detail) => Err(ChannelError::Store(detail)),
        }
    }
}

/// Stream of values observed at a store path.
///
/// Delivery is at-least-once and unordered: the writer's own writes and
/// retransmissions show up here too.
pub type StoreFeed = tokio::sync::mpsc::UnboundedReceiver<serde_json::Value>;

/// Eventually-consistent key/value graph shared by both channel parties.
///
/// Writes merge with last-write-wins at the leaf, independent of any nonce
/// carried in the value. Two parties writing the same path concurrently can
/// race, and `put` succeeding says nothing about what other replicas hold.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ReplicatedStore: Send + Sync {
    /// Write `value` at `path`.
    async fn put(&self, path: &str, value: serde_json::Value) -> StoreAck;

    /// One-shot read of the value currently at `path`.
    async fn get(&self, path: &str) -> Result<Option<serde_json::Value>>;

    /// Register for every value observed at `path` from now on.
    ///
    /// The subscription ends when the returned receiver is dropped.
    async fn subscribe(&self, path: &str) -> Result<StoreFeed>;
}

/// Arguments of the contract's close entry point, passed through unmodified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseChannelRequest {
    /// Final client balance.
    pub client_balance: TokenAmount,
    /// Final relay balance.
    pub relay_balance: TokenAmount,
    /// Nonce of the final state.
    pub nonce: u64,
    /// Client's settlement signature.
    pub client_signature: Signature,
    /// Relay's settlement signature.
    pub relay_signature: Signature,
}

/// Outcome recorded in a mined settlement transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettlementStatus {
    /// The contract accepted the close.
    Confirmed,
    /// The transaction was mined but reverted.
    Reverted,
}

/// Receipt of a settlement transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettlementReceipt {
    /// Hash of the close transaction.
    pub transaction_hash: H256,
    /// Block the transaction was mined in, if known.
    pub block_number: Option<u64>,
    /// Execution status.
    pub status: SettlementStatus,
}

impl SettlementReceipt {
    /// Check if the contract accepted the close.
    pub fn is_confirmed(&self) -> bool {
        self.status == SettlementStatus::Confirmed
    }
}

/// The ledger contract that closes a channel with the final balances.
///
/// Replay protection and nonce authority live in the contract: it is the
/// final arbiter between competing off-chain states.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait SettlementLedger: Send + Sync {
    /// Submit the close call and wait for its receipt.
    async fn close_channel(&self, request: &CloseChannelRequest) -> Result<SettlementReceipt>;
}
