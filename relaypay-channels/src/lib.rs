//! # Relaypay Channels
//!
//! Off-chain micropayment channels between a client and a relay.
//!
//! The two parties exchange a monotonically versioned, signed balance state
//! through an eventually-consistent replicated store, and close the channel
//! on the ledger with both parties' settlement signatures.
//!
//! ## Components
//!
//! - [`SignatureService`]: Ed25519 state signatures and secp256k1 settlement signatures
//! - [`ChannelStateStore`]: channel-scoped put/get/subscribe over a [`ReplicatedStore`](relaypay_lib::ReplicatedStore)
//! - [`SettlementClient`]: the ledger's close call
//! - [`ChannelController`]: per-channel state machine; [`ChannelManager`] keeps one per channel id
//! - [`LivenessMonitor`]: reports channels that stopped receiving updates
//!
//! ## Security Model
//!
//! - Incoming states are accepted only if the signature that arrived
//!   verifies against the public key the state names.
//! - Nonce checks are local. The store keeps the last write regardless of
//!   nonce, so the settlement contract is the authority on which state wins.
//! - Balance conservation is off by default; see
//!   [`ChannelConfig::enforce_balance_conservation`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use relaypay_channels::{
//!     ChannelConfig, ChannelContext, ChannelManager, OffChainKeyPair, SignatureService,
//! };
//! use relaypay_lib::{ChannelId, ChannelState, MemoryReplicatedStore, SettlementLedger};
//!
//! # async fn run(ledger: Arc<dyn SettlementLedger>) -> relaypay_lib::Result<()> {
//! let config = ChannelConfig::new("0x5fbdb2315678afecb367f032d93f642f64180aa3".parse().unwrap());
//! let signer = SignatureService::new().with_off_chain_key(OffChainKeyPair::generate());
//! let store = Arc::new(MemoryReplicatedStore::new());
//! let manager = ChannelManager::new(ChannelContext::new(config, signer, store, ledger)?);
//!
//! let channel = ChannelId::new("0xA");
//! manager.open(&channel, ChannelState::from_decimal(0, "1000", "0")?).await?;
//! manager.update(&channel, ChannelState::from_decimal(1, "900", "100")?).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod controller;
pub mod manager;
pub mod metrics;
pub mod monitor;
pub mod settlement;
pub mod signing;
pub mod state_store;
mod timeout;

pub use config::ChannelConfig;
pub use context::ChannelContext;
pub use controller::{ChannelController, ChannelEvent, ChannelPhase, UpdateOrigin};
pub use manager::ChannelManager;
pub use metrics::{ChannelMetrics, MetricsSnapshot};
pub use monitor::{LivenessHandle, LivenessMonitor};
pub use settlement::SettlementClient;
pub use signing::{canonical_state_bytes, parse_settlement_signature, OffChainKeyPair, SignatureService};
pub use state_store::{ChannelStateStore, PackageEvent, SubscriptionHandle, DEFAULT_NAMESPACE};
