//! Test fixtures and data generators.

use ethers::signers::LocalWallet;
use ethers::types::Address;
use ethers::utils::keccak256;

use crate::{ChannelId, ChannelState, TokenAmount};

/// Collection of commonly used test fixtures.
pub struct TestFixtures;

impl TestFixtures {
    /// Channel identifier used throughout the protocol examples.
    pub const CHANNEL_ID: &'static str = "0xA";

    /// Settlement contract address used in tests.
    pub const CONTRACT_ADDRESS: &'static str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

    /// Deposit the sample channels are opened with.
    pub const DEPOSIT: u64 = 1_000;

    /// The sample channel id.
    pub fn channel_id() -> ChannelId {
        ChannelId::new(Self::CHANNEL_ID)
    }

    /// The sample contract address.
    pub fn contract_address() -> Address {
        Self::CONTRACT_ADDRESS
            .parse()
            .expect("fixture contract address is valid")
    }
}

/// Build a state from plain integers.
pub fn sample_state(nonce: u64, client_balance: u64, relay_balance: u64) -> ChannelState {
    ChannelState::new(
        nonce,
        TokenAmount::from(client_balance),
        TokenAmount::from(relay_balance),
    )
}

/// Create a deterministic ledger wallet from a seed string.
pub fn test_wallet(seed: &str) -> LocalWallet {
    let secret = keccak256(seed.as_bytes());
    LocalWallet::from_bytes(&secret).expect("keccak output is a valid secp256k1 scalar")
}
