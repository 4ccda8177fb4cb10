//! Shared setup for channel integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use relaypay_channels::{
    ChannelConfig, ChannelContext, ChannelEvent, ChannelManager, OffChainKeyPair, SignatureService,
};
use relaypay_lib::test_utils::{test_wallet, MockSettlementLedger, TestFixtures};
use relaypay_lib::{ChannelState, MemoryReplicatedStore, StatePackage};
use tokio::sync::broadcast;

pub const CLIENT_KEY: [u8; 32] = [0xc1; 32];
pub const RELAY_KEY: [u8; 32] = [0x4e; 32];

/// One side of a channel: its manager plus handles on the shared doubles.
pub struct Party {
    pub manager: ChannelManager,
    pub store: Arc<MemoryReplicatedStore>,
    pub ledger: Arc<MockSettlementLedger>,
    pub public_key: String,
}

pub fn signer(secret: [u8; 32], wallet_seed: &str) -> SignatureService {
    SignatureService::new()
        .with_off_chain_key(OffChainKeyPair::from_secret_bytes(&secret))
        .with_on_chain_signer(test_wallet(wallet_seed))
}

pub fn default_config() -> ChannelConfig {
    ChannelConfig::new(TestFixtures::contract_address())
}

pub fn party_on(
    store: Arc<MemoryReplicatedStore>,
    ledger: Arc<MockSettlementLedger>,
    secret: [u8; 32],
    wallet_seed: &str,
    config: ChannelConfig,
) -> Party {
    let public_key = OffChainKeyPair::from_secret_bytes(&secret).public_key_hex();
    let ctx = ChannelContext::new(
        config,
        signer(secret, wallet_seed),
        store.clone(),
        ledger.clone(),
    )
    .expect("valid test config");

    Party {
        manager: ChannelManager::new(ctx),
        store,
        ledger,
        public_key,
    }
}

/// Client and relay sharing one store and one ledger.
pub fn client_and_relay() -> (Party, Party) {
    let store = Arc::new(MemoryReplicatedStore::new());
    let ledger = Arc::new(MockSettlementLedger::new());
    let client = party_on(
        store.clone(),
        ledger.clone(),
        CLIENT_KEY,
        "client",
        default_config(),
    );
    let relay = party_on(store, ledger, RELAY_KEY, "relay", default_config());
    (client, relay)
}

pub fn client() -> Party {
    client_and_relay().0
}

/// A package signed by `secret` that names its own key.
pub fn signed_package(secret: [u8; 32], state: ChannelState) -> StatePackage {
    let service = SignatureService::new().with_off_chain_key(OffChainKeyPair::from_secret_bytes(&secret));
    let state = state.with_participant(
        service
            .off_chain_public_key()
            .expect("key pair configured"),
    );
    service.sign_state(&state).expect("signing succeeds")
}

/// Wait for the next event matching `predicate`, skipping others.
pub async fn wait_for<P>(events: &mut broadcast::Receiver<ChannelEvent>, predicate: P) -> ChannelEvent
where
    P: Fn(&ChannelEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel open");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event within timeout")
}

/// Receive exactly `count` events.
pub async fn take_events(
    events: &mut broadcast::Receiver<ChannelEvent>,
    count: usize,
) -> Vec<ChannelEvent> {
    let mut received = Vec::with_capacity(count);
    for _ in 0..count {
        received.push(wait_for(events, |_| true).await);
    }
    received
}
