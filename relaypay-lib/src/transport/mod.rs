mod ethers_ledger;
mod memory;
mod traits;

pub use ethers_ledger::{EthersSettlementLedger, CLOSE_CHANNEL_SIGNATURE};
pub use memory::MemoryReplicatedStore;
pub use traits::{
    CloseChannelRequest, ReplicatedStore, SettlementLedger, SettlementReceipt, SettlementStatus,
    StoreAck, StoreFeed,
};
