//! # Channel Controller
//!
//! The state machine for a single channel:
//!
//! ```text
//! Uninitialized -> Open -> Updated(nonce) -> Finalizing -> Closed
//! ```
//!
//! A controller is the only writer of its channel record. Local calls
//! ([`open`](ChannelController::open), [`update`](ChannelController::update))
//! and the subscription handler both read-then-write the record, so both
//! run under the same per-channel lock. Distinct channels share nothing
//! mutable.
//!
//! ## Incoming updates
//!
//! Every package delivered by the store is checked in this order:
//!
//! 1. it decodes as a [`StatePackage`]
//! 2. `data.pubKey` is present (and trusted, when a trust set is configured)
//! 3. the received `signature` verifies against `data.pubKey`
//! 4. `data.nonce` exceeds the current nonce
//!
//! Only packages passing all four reach the subscriber callback. Rejections
//! are logged, counted in [`ChannelMetrics`](crate::ChannelMetrics) and
//! published as [`ChannelEvent`]s.
//!
//! ## Limits of the nonce check
//!
//! The nonce comparison is local. Two parties writing concurrently race at
//! the store, which keeps the last write regardless of nonce. The
//! settlement contract's nonce check decides which state is authoritative.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use ethers::types::Signature;
use relaypay_lib::{ChannelError, ChannelId, ChannelState, Result, SettlementReceipt, StatePackage};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::Instant;

use crate::signing::canonical_state_bytes;
use crate::state_store::{PackageEvent, SubscriptionHandle};
use crate::{ChannelContext, ChannelMetrics, SignatureService};

/// Lifecycle phase of a channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ChannelPhase {
    #[default]
    Uninitialized,
    Open,
    Updated {
        nonce: u64,
    },
    /// Settlement submitted, or submitted and failed.
    Finalizing,
    Closed,
}

impl ChannelPhase {
    /// Phase after a state with `nonce` is accepted.
    ///
    /// Settlement phases are sticky.
    fn advance(self, nonce: u64) -> Self {
        match self {
            Self::Finalizing | Self::Closed => self,
            Self::Uninitialized if nonce == 0 => Self::Open,
            _ => Self::Updated { nonce },
        }
    }
}

/// Where an accepted state came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOrigin {
    /// Written by this party through `open` or `update`.
    Local,
    /// Received through the subscription and verified.
    Remote,
}

/// Diagnostic record of each channel decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A state became the current state.
    Accepted {
        channel_id: ChannelId,
        nonce: u64,
        origin: UpdateOrigin,
    },
    /// This party's own write came back on its subscription.
    Echo { channel_id: ChannelId, nonce: u64 },
    /// A verified package did not advance the nonce.
    Stale {
        channel_id: ChannelId,
        nonce: u64,
        current: u64,
    },
    /// A package's signature did not verify against its public key.
    InvalidSignature { channel_id: ChannelId, nonce: u64 },
    /// A package carried no public key to verify against.
    MissingPublicKey { channel_id: ChannelId, nonce: u64 },
    /// A package was signed by a key outside the trust set.
    UntrustedSigner {
        channel_id: ChannelId,
        nonce: u64,
        pub_key: String,
    },
    /// A value on the channel path was not a state package.
    Malformed { channel_id: ChannelId, reason: String },
}

impl ChannelEvent {
    /// The channel this event concerns.
    pub fn channel_id(&self) -> &ChannelId {
        match self {
            Self::Accepted { channel_id, .. }
            | Self::Echo { channel_id, .. }
            | Self::Stale { channel_id, .. }
            | Self::InvalidSignature { channel_id, .. }
            | Self::MissingPublicKey { channel_id, .. }
            | Self::UntrustedSigner { channel_id, .. }
            | Self::Malformed { channel_id, .. } => channel_id,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

#[derive(Debug, Default)]
struct ChannelRecord {
    current_state: Option<ChannelState>,
    phase: ChannelPhase,
}

/// Drives one channel: signs and writes local states, verifies remote ones,
/// and submits the final state for settlement.
pub struct ChannelController {
    channel_id: ChannelId,
    ctx: ChannelContext,
    record: Mutex<ChannelRecord>,
    events: broadcast::Sender<ChannelEvent>,
    accepted_at: watch::Sender<Option<Instant>>,
    trusted_signers: RwLock<HashSet<String>>,
}

impl ChannelController {
    /// Create a controller for `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Validation`] if the id cannot be a store path
    /// segment.
    pub fn new(channel_id: ChannelId, ctx: ChannelContext) -> Result<Self> {
        channel_id.validate()?;
        let (events, _) = broadcast::channel(ctx.config.event_buffer);
        let (accepted_at, _) = watch::channel(None);

        Ok(Self {
            channel_id,
            ctx,
            record: Mutex::new(ChannelRecord::default()),
            events,
            accepted_at,
            trusted_signers: RwLock::new(HashSet::new()),
        })
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// The most recently accepted state.
    pub async fn current_state(&self) -> Option<ChannelState> {
        self.record.lock().await.current_state.clone()
    }

    pub async fn phase(&self) -> ChannelPhase {
        self.record.lock().await.phase
    }

    /// Subscribe to this channel's diagnostic events.
    ///
    /// Only events sent after this call are received.
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Watch the time of the most recently accepted state, local or remote.
    ///
    /// Unlike [`events`](Self::events) this never lags: readers always see
    /// the latest value.
    pub fn last_accepted(&self) -> watch::Receiver<Option<Instant>> {
        self.accepted_at.subscribe()
    }

    pub fn metrics(&self) -> &ChannelMetrics {
        &self.ctx.metrics
    }

    /// Accept incoming packages only when signed by `pub_key` (hex).
    ///
    /// With no trusted keys, any key named in the package is checked.
    pub fn trust_signer(&self, pub_key: impl Into<String>) {
        let mut trusted = self
            .trusted_signers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        trusted.insert(pub_key.into().to_lowercase());
    }

    /// Sign and write the initial state, then mark the channel open.
    ///
    /// The controller's public key is written into the state when the
    /// caller left it empty.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Config`] if no off-chain key pair is configured
    /// - [`ChannelError::Validation`] if the nonce is not 0, the state names
    ///   another signer, or the channel is already open
    /// - [`ChannelError::Store`] if the write fails
    ///
    /// On error the current state stays unset.
    #[tracing::instrument(skip(self, initial_state), fields(channel_id = %self.channel_id, nonce = initial_state.nonce))]
    pub async fn open(&self, initial_state: ChannelState) -> Result<()> {
        let state = self.stamp(initial_state)?;
        if state.nonce != 0 {
            return Err(ChannelError::Validation(format!(
                "initial state nonce must be 0, got {}",
                state.nonce
            )));
        }

        let mut record = self.record.lock().await;
        if record.phase != ChannelPhase::Uninitialized || record.current_state.is_some() {
            return Err(ChannelError::Validation(format!(
                "channel {} is already open",
                self.channel_id
            )));
        }

        let package = self.ctx.signer.sign_state(&state)?;
        self.write(&package).await?;

        record.current_state = Some(state);
        record.phase = ChannelPhase::Open;
        self.accepted(0, UpdateOrigin::Local);
        drop(record);

        tracing::info!(channel_id = %self.channel_id, "channel opened");
        Ok(())
    }

    /// Sign and write a newer state.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Config`] if no off-chain key pair is configured
    /// - [`ChannelError::Validation`] if the channel is not open or closed,
    ///   the nonce does not exceed the current one, or (when enabled) the
    ///   balances change the channel total
    /// - [`ChannelError::Store`] if the write fails
    ///
    /// The current state is unchanged on error.
    #[tracing::instrument(skip(self, new_state), fields(channel_id = %self.channel_id, nonce = new_state.nonce))]
    pub async fn update(&self, new_state: ChannelState) -> Result<()> {
        let state = self.stamp(new_state)?;

        let mut record = self.record.lock().await;
        if record.phase == ChannelPhase::Closed {
            return Err(ChannelError::Validation("channel closed".into()));
        }
        let current = record.current_state.as_ref().ok_or_else(|| {
            ChannelError::Validation(format!("channel {} is not open", self.channel_id))
        })?;

        if state.nonce <= current.nonce {
            tracing::debug!(current = current.nonce, "rejecting stale update");
            return Err(ChannelError::stale_nonce(current.nonce, state.nonce));
        }
        if self.ctx.config.enforce_balance_conservation {
            check_conservation(current, &state)?;
        }

        let package = self.ctx.signer.sign_state(&state)?;
        self.write(&package).await?;

        let nonce = state.nonce;
        record.current_state = Some(state);
        record.phase = record.phase.advance(nonce);
        self.accepted(nonce, UpdateOrigin::Local);
        drop(record);

        tracing::debug!("state updated");
        Ok(())
    }

    /// Follow the counterparty's updates.
    ///
    /// `on_verified_update` is called with each incoming state that passes
    /// signature verification and advances the nonce, after the current
    /// state has been updated. Rejected packages never reach it.
    ///
    /// The subscription runs until the handle is unsubscribed or dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store refuses the subscription.
    pub async fn subscribe_to_channel<F>(
        self: &Arc<Self>,
        on_verified_update: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(ChannelState) + Send + Sync + 'static,
    {
        let controller = Arc::clone(self);
        let callback = Arc::new(on_verified_update);

        self.ctx
            .store
            .subscribe(&self.channel_id, move |event| {
                let controller = Arc::clone(&controller);
                let callback = Arc::clone(&callback);
                async move {
                    if let Some(state) = controller.handle_package(event).await {
                        callback(state);
                    }
                }
            })
            .await
    }

    /// Read the latest package from the store and apply it like a
    /// subscription delivery.
    ///
    /// Returns the state if it was accepted.
    ///
    /// # Errors
    ///
    /// Returns a store error if the read fails.
    pub async fn sync_from_store(&self) -> Result<Option<ChannelState>> {
        let event = match self.ctx.store.get(&self.channel_id).await {
            Ok(Some(package)) => PackageEvent::Package(package),
            Ok(None) => return Ok(None),
            Err(ChannelError::Serialization(reason)) => PackageEvent::Malformed { reason },
            Err(e) => return Err(e),
        };
        Ok(self.handle_package(event).await)
    }

    /// Produce this party's settlement signature over `state`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Config`] if no on-chain signer is configured.
    #[tracing::instrument(skip(self, state), fields(channel_id = %self.channel_id, nonce = state.nonce))]
    pub async fn sign_on_chain_state(&self, state: &ChannelState) -> Result<Signature> {
        self.ctx
            .signer
            .sign_on_chain(
                self.ctx.config.contract_address,
                &state.client_balance,
                &state.relay_balance,
                state.nonce,
            )
            .await
    }

    /// Close the channel on the ledger with both settlement signatures.
    ///
    /// The balances and nonce of `state` and both signatures go to the
    /// ledger unchanged. The phase is `Finalizing` while the call runs and
    /// `Closed` once the receipt is confirmed.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Validation`] if the channel is already closed
    /// - [`ChannelError::Settlement`] if the call fails or reverts; the
    ///   phase stays `Finalizing` and nothing is retried
    /// - [`ChannelError::Timeout`] if a settlement timeout is configured and
    ///   elapses
    #[tracing::instrument(skip(self, state, client_signature, relay_signature), fields(channel_id = %self.channel_id, nonce = state.nonce))]
    pub async fn finalize(
        &self,
        state: &ChannelState,
        client_signature: Signature,
        relay_signature: Signature,
    ) -> Result<SettlementReceipt> {
        {
            let mut record = self.record.lock().await;
            if record.phase == ChannelPhase::Closed {
                return Err(ChannelError::Validation(format!(
                    "channel {} is already closed",
                    self.channel_id
                )));
            }
            record.phase = ChannelPhase::Finalizing;
        }

        self.ctx.metrics.record_settlement_attempt();
        let result = self
            .ctx
            .settlement
            .close_channel(
                state.client_balance,
                state.relay_balance,
                state.nonce,
                client_signature,
                relay_signature,
            )
            .await;

        match result {
            Ok(receipt) => {
                self.record.lock().await.phase = ChannelPhase::Closed;
                self.ctx.metrics.record_settlement_success();
                tracing::info!(tx = ?receipt.transaction_hash, "channel closed");
                Ok(receipt)
            }
            Err(e) => {
                self.ctx.metrics.record_settlement_failure();
                tracing::warn!(error = %e, "settlement failed");
                Err(e)
            }
        }
    }

    /// Verify an incoming package and accept it if it advances the nonce.
    async fn handle_package(&self, event: PackageEvent) -> Option<ChannelState> {
        self.ctx.metrics.record_package_received();

        let package = match event {
            PackageEvent::Package(package) => package,
            PackageEvent::Malformed { reason } => {
                tracing::warn!(channel_id = %self.channel_id, %reason, "dropping malformed package");
                self.ctx.metrics.record_malformed_package();
                self.emit(ChannelEvent::Malformed {
                    channel_id: self.channel_id.clone(),
                    reason,
                });
                return None;
            }
        };

        if !self.verify(&package) {
            return None;
        }

        let nonce = package.data.nonce;
        let mut record = self.record.lock().await;
        if let Some(current) = &record.current_state {
            if nonce <= current.nonce {
                let current = current.nonce;
                drop(record);
                if self.is_own(&package.data) {
                    tracing::trace!(channel_id = %self.channel_id, nonce, "own write echoed");
                    self.ctx.metrics.record_echoed_write();
                    self.emit(ChannelEvent::Echo {
                        channel_id: self.channel_id.clone(),
                        nonce,
                    });
                    return None;
                }
                tracing::debug!(channel_id = %self.channel_id, nonce, current, "dropping stale package");
                self.ctx.metrics.record_stale_package();
                self.emit(ChannelEvent::Stale {
                    channel_id: self.channel_id.clone(),
                    nonce,
                    current,
                });
                return None;
            }
        }

        record.current_state = Some(package.data.clone());
        record.phase = record.phase.advance(nonce);
        self.accepted(nonce, UpdateOrigin::Remote);
        drop(record);

        tracing::debug!(channel_id = %self.channel_id, nonce, "accepted remote state");
        self.ctx.metrics.record_package_accepted();
        Some(package.data)
    }

    /// Check the received signature against the key the package names.
    fn verify(&self, package: &StatePackage) -> bool {
        let nonce = package.data.nonce;
        let Some(pub_key) = package.data.participant_pub_key.as_deref() else {
            tracing::warn!(channel_id = %self.channel_id, nonce, "dropping package without public key");
            self.ctx.metrics.record_invalid_signature();
            self.emit(ChannelEvent::MissingPublicKey {
                channel_id: self.channel_id.clone(),
                nonce,
            });
            return false;
        };

        if !self.is_trusted(pub_key) {
            tracing::warn!(channel_id = %self.channel_id, nonce, %pub_key, "dropping package from untrusted signer");
            self.ctx.metrics.record_invalid_signature();
            self.emit(ChannelEvent::UntrustedSigner {
                channel_id: self.channel_id.clone(),
                nonce,
                pub_key: pub_key.to_string(),
            });
            return false;
        }

        let verified = match canonical_state_bytes(&package.data) {
            Ok(bytes) => SignatureService::verify_off_chain(&bytes, &package.signature, pub_key),
            Err(_) => false,
        };
        if !verified {
            tracing::warn!(channel_id = %self.channel_id, nonce, "dropping package with invalid signature");
            self.ctx.metrics.record_invalid_signature();
            self.emit(ChannelEvent::InvalidSignature {
                channel_id: self.channel_id.clone(),
                nonce,
            });
        }
        verified
    }

    fn is_own(&self, state: &ChannelState) -> bool {
        match (
            state.participant_pub_key.as_deref(),
            self.ctx.signer.off_chain_public_key(),
        ) {
            (Some(named), Some(own)) => named.eq_ignore_ascii_case(&own),
            _ => false,
        }
    }

    fn is_trusted(&self, pub_key: &str) -> bool {
        let trusted = self
            .trusted_signers
            .read()
            .unwrap_or_else(|e| e.into_inner());
        trusted.is_empty() || trusted.contains(&pub_key.to_lowercase())
    }

    /// Fill in this party's public key, or reject a state naming another.
    fn stamp(&self, state: ChannelState) -> Result<ChannelState> {
        let own = self
            .ctx
            .signer
            .off_chain_public_key()
            .ok_or_else(|| ChannelError::missing("off-chain key pair"))?;

        match state.participant_pub_key.as_deref() {
            None => Ok(state.with_participant(own)),
            Some(named) if named.eq_ignore_ascii_case(&own) => Ok(state),
            Some(named) => Err(ChannelError::Validation(format!(
                "state names signer {}, but this party signs as {}",
                named, own
            ))),
        }
    }

    async fn write(&self, package: &StatePackage) -> Result<()> {
        match self.ctx.store.put(&self.channel_id, package).await {
            Ok(()) => {
                self.ctx.metrics.record_state_written();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(channel_id = %self.channel_id, error = %e, "state write failed");
                self.ctx.metrics.record_write_failure();
                Err(e)
            }
        }
    }

    /// Publish an acceptance. Called under the record lock so accepted
    /// events follow acceptance order.
    fn accepted(&self, nonce: u64, origin: UpdateOrigin) {
        self.accepted_at.send_replace(Some(Instant::now()));
        self.emit(ChannelEvent::Accepted {
            channel_id: self.channel_id.clone(),
            nonce,
            origin,
        });
    }

    fn emit(&self, event: ChannelEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for ChannelController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelController")
            .field("channel_id", &self.channel_id)
            .finish_non_exhaustive()
    }
}

fn check_conservation(current: &ChannelState, proposed: &ChannelState) -> Result<()> {
    let before = current
        .total()
        .ok_or_else(|| ChannelError::Validation("current channel total overflows".into()))?;
    let after = proposed
        .total()
        .ok_or_else(|| ChannelError::Validation("proposed channel total overflows".into()))?;

    if before != after {
        return Err(ChannelError::Validation(format!(
            "balance not conserved: total {} would become {}",
            before, after
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelConfig, OffChainKeyPair};
    use relaypay_lib::test_utils::{sample_state, test_wallet, MockSettlementLedger, TestFixtures};
    use relaypay_lib::{MemoryReplicatedStore, ReplicatedStore};
    use std::time::Duration;

    struct Party {
        store: Arc<MemoryReplicatedStore>,
        ledger: Arc<MockSettlementLedger>,
        controller: Arc<ChannelController>,
    }

    fn party_with(config: ChannelConfig, signer: SignatureService) -> Party {
        let store = Arc::new(MemoryReplicatedStore::new());
        let ledger = Arc::new(MockSettlementLedger::new());
        let ctx = ChannelContext::new(config, signer, store.clone(), ledger.clone()).unwrap();
        let controller =
            Arc::new(ChannelController::new(TestFixtures::channel_id(), ctx).unwrap());
        Party {
            store,
            ledger,
            controller,
        }
    }

    fn party() -> Party {
        party_with(
            ChannelConfig::new(TestFixtures::contract_address()),
            SignatureService::new()
                .with_off_chain_key(OffChainKeyPair::from_secret_bytes(&[1u8; 32]))
                .with_on_chain_signer(test_wallet("client")),
        )
    }

    async fn next_event(rx: &mut broadcast::Receiver<ChannelEvent>) -> ChannelEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event within timeout")
            .expect("event channel open")
    }

    #[test]
    fn test_phase_advance() {
        assert_eq!(ChannelPhase::Uninitialized.advance(0), ChannelPhase::Open);
        assert_eq!(
            ChannelPhase::Uninitialized.advance(4),
            ChannelPhase::Updated { nonce: 4 }
        );
        assert_eq!(ChannelPhase::Open.advance(1), ChannelPhase::Updated { nonce: 1 });
        assert_eq!(ChannelPhase::Finalizing.advance(9), ChannelPhase::Finalizing);
        assert_eq!(ChannelPhase::Closed.advance(9), ChannelPhase::Closed);
    }

    #[tokio::test]
    async fn test_open_stamps_public_key() {
        let party = party();
        party.controller.open(sample_state(0, 1000, 0)).await.unwrap();

        let state = party.controller.current_state().await.unwrap();
        let own = OffChainKeyPair::from_secret_bytes(&[1u8; 32]).public_key_hex();
        assert_eq!(state.participant_pub_key, Some(own));
        assert_eq!(party.controller.phase().await, ChannelPhase::Open);

        let stored = party.store.get("channels/0xA").await.unwrap().unwrap();
        let package = StatePackage::from_value(stored).unwrap();
        assert!(SignatureService::verify_package(&package));
    }

    #[tokio::test]
    async fn test_open_rejects_foreign_key_and_nonzero_nonce() {
        let party = party();

        let foreign = sample_state(0, 1000, 0)
            .with_participant(OffChainKeyPair::from_secret_bytes(&[2u8; 32]).public_key_hex());
        assert!(matches!(
            party.controller.open(foreign).await,
            Err(ChannelError::Validation(_))
        ));
        assert!(matches!(
            party.controller.open(sample_state(3, 1000, 0)).await,
            Err(ChannelError::Validation(_))
        ));
        assert_eq!(party.controller.current_state().await, None);
        assert_eq!(party.controller.phase().await, ChannelPhase::Uninitialized);
    }

    #[tokio::test]
    async fn test_open_twice_is_rejected() {
        let party = party();
        party.controller.open(sample_state(0, 1000, 0)).await.unwrap();

        let err = party.controller.open(sample_state(0, 1000, 0)).await.unwrap_err();
        assert!(matches!(err, ChannelError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_before_open_is_rejected() {
        let party = party();
        let err = party.controller.update(sample_state(1, 900, 100)).await.unwrap_err();
        assert!(matches!(err, ChannelError::Validation(_)));
        assert_eq!(party.store.get("channels/0xA").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_balance_conservation_when_enabled() {
        let party = party_with(
            ChannelConfig::new(TestFixtures::contract_address()).with_balance_conservation(true),
            SignatureService::new()
                .with_off_chain_key(OffChainKeyPair::from_secret_bytes(&[1u8; 32])),
        );
        party.controller.open(sample_state(0, 1000, 0)).await.unwrap();

        let err = party.controller.update(sample_state(1, 900, 200)).await.unwrap_err();
        assert!(err.to_string().contains("balance not conserved"));
        party.controller.update(sample_state(1, 900, 100)).await.unwrap();
        assert_eq!(party.controller.current_state().await.unwrap().nonce, 1);
    }

    #[tokio::test]
    async fn test_balance_conservation_off_by_default() {
        let party = party();
        party.controller.open(sample_state(0, 1000, 0)).await.unwrap();
        party.controller.update(sample_state(1, 5, 5)).await.unwrap();
        assert_eq!(party.controller.current_state().await.unwrap().nonce, 1);
    }

    #[tokio::test]
    async fn test_local_writes_emit_accepted() {
        let party = party();
        let mut events = party.controller.events();

        party.controller.open(sample_state(0, 1000, 0)).await.unwrap();
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::Accepted {
                channel_id: TestFixtures::channel_id(),
                nonce: 0,
                origin: UpdateOrigin::Local,
            }
        );
    }

    #[tokio::test]
    async fn test_own_write_echo_is_not_stale() {
        let party = party();
        let mut events = party.controller.events();
        let _subscription = party.controller.subscribe_to_channel(|_| {}).await.unwrap();

        party.controller.open(sample_state(0, 1000, 0)).await.unwrap();
        assert!(next_event(&mut events).await.is_accepted());
        assert_eq!(
            next_event(&mut events).await,
            ChannelEvent::Echo {
                channel_id: TestFixtures::channel_id(),
                nonce: 0,
            }
        );

        party.controller.update(sample_state(1, 900, 100)).await.unwrap();
        assert!(next_event(&mut events).await.is_accepted());
        assert!(matches!(next_event(&mut events).await, ChannelEvent::Echo { nonce: 1, .. }));

        let snapshot = party.controller.metrics().snapshot();
        assert_eq!(snapshot.packages_received, 2);
        assert_eq!(snapshot.echoed_writes, 2);
        assert_eq!(snapshot.stale_packages, 0);
        assert_eq!(snapshot.acceptance_rate(), 1.0);
    }

    #[tokio::test]
    async fn test_untrusted_signer_is_dropped() {
        let party = party();
        party.controller.trust_signer("00".repeat(32));
        let mut events = party.controller.events();
        let _subscription = party.controller.subscribe_to_channel(|_| {}).await.unwrap();

        let other = SignatureService::new()
            .with_off_chain_key(OffChainKeyPair::from_secret_bytes(&[5u8; 32]));
        let state = sample_state(1, 900, 100).with_participant(other.off_chain_public_key().unwrap());
        party
            .store
            .inject("channels/0xA", other.sign_state(&state).unwrap().to_value().unwrap());

        assert!(matches!(
            next_event(&mut events).await,
            ChannelEvent::UntrustedSigner { nonce: 1, .. }
        ));
        assert_eq!(party.controller.current_state().await, None);
    }

    #[tokio::test]
    async fn test_sync_from_store_verifies() {
        let party = party();
        assert_eq!(party.controller.sync_from_store().await.unwrap(), None);

        let other = SignatureService::new()
            .with_off_chain_key(OffChainKeyPair::from_secret_bytes(&[5u8; 32]));
        let state = sample_state(4, 600, 400).with_participant(other.off_chain_public_key().unwrap());
        let mut package = other.sign_state(&state).unwrap();

        package.data.relay_balance = 500u64.into();
        party.store.inject("channels/0xA", package.to_value().unwrap());
        assert_eq!(party.controller.sync_from_store().await.unwrap(), None);

        party
            .store
            .inject("channels/0xA", other.sign_state(&state).unwrap().to_value().unwrap());
        assert_eq!(
            party.controller.sync_from_store().await.unwrap(),
            Some(state.clone())
        );
        assert_eq!(
            party.controller.phase().await,
            ChannelPhase::Updated { nonce: 4 }
        );
    }

    #[tokio::test]
    async fn test_finalize_closes_and_blocks_updates() {
        let party = party();
        let state = sample_state(0, 1000, 0);
        party.controller.open(state.clone()).await.unwrap();

        let sig = party.controller.sign_on_chain_state(&state).await.unwrap();
        let receipt = party.controller.finalize(&state, sig, sig).await.unwrap();
        assert!(receipt.is_confirmed());
        assert_eq!(party.controller.phase().await, ChannelPhase::Closed);
        assert_eq!(party.ledger.requests().len(), 1);

        let err = party.controller.update(sample_state(1, 900, 100)).await.unwrap_err();
        assert_eq!(err, ChannelError::Validation("channel closed".into()));
        assert!(party.controller.finalize(&state, sig, sig).await.is_err());
        assert_eq!(party.ledger.requests().len(), 1);

        let snapshot = party.controller.metrics().snapshot();
        assert_eq!(snapshot.settlements_attempted, 1);
        assert_eq!(snapshot.settlements_succeeded, 1);
    }

    #[tokio::test]
    async fn test_failed_finalize_stays_finalizing() {
        let party = party();
        let state = sample_state(0, 1000, 0);
        party.controller.open(state.clone()).await.unwrap();
        let sig = party.controller.sign_on_chain_state(&state).await.unwrap();

        party.ledger.fail_next("nonce too low");
        let err = party.controller.finalize(&state, sig, sig).await.unwrap_err();
        assert!(matches!(err, ChannelError::Settlement(_)));
        assert_eq!(party.controller.phase().await, ChannelPhase::Finalizing);

        // Writes are still allowed while finalizing
        party.controller.update(sample_state(1, 900, 100)).await.unwrap();
        assert_eq!(party.controller.phase().await, ChannelPhase::Finalizing);

        // A caller retry goes through
        party.controller.finalize(&state, sig, sig).await.unwrap();
        assert_eq!(party.controller.phase().await, ChannelPhase::Closed);
        assert_eq!(party.controller.metrics().snapshot().settlements_failed, 1);
    }

    #[tokio::test]
    async fn test_sign_on_chain_without_signer() {
        let party = party_with(
            ChannelConfig::new(TestFixtures::contract_address()),
            SignatureService::new(),
        );
        let err = party
            .controller
            .sign_on_chain_state(&sample_state(0, 1000, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Config(_)));
    }

    #[test]
    fn test_invalid_channel_id() {
        let ctx = ChannelContext::new(
            ChannelConfig::new(TestFixtures::contract_address()),
            SignatureService::new(),
            Arc::new(MemoryReplicatedStore::new()),
            Arc::new(MockSettlementLedger::new()),
        )
        .unwrap();
        assert!(ChannelController::new(ChannelId::new(""), ctx).is_err());
    }
}
