use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ethers::types::Signature;
use relaypay_lib::{ChannelError, ChannelId, ChannelState, Result, SettlementReceipt};

use crate::monitor::{LivenessHandle, LivenessMonitor};
use crate::state_store::SubscriptionHandle;
use crate::{ChannelContext, ChannelController, ChannelMetrics};

/// Table of the channels one party manages, keyed by channel id.
///
/// Each channel gets its own [`ChannelController`]; the table only routes
/// calls. Controllers for different channels can be driven concurrently.
pub struct ChannelManager {
    ctx: ChannelContext,
    channels: RwLock<HashMap<ChannelId, Arc<ChannelController>>>,
}

impl ChannelManager {
    pub fn new(ctx: ChannelContext) -> Self {
        Self {
            ctx,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Get the controller for `channel_id`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Validation`] for an unusable channel id.
    pub fn controller(&self, channel_id: &ChannelId) -> Result<Arc<ChannelController>> {
        if let Some(controller) = self.get(channel_id) {
            return Ok(controller);
        }

        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        if let Some(controller) = channels.get(channel_id) {
            return Ok(Arc::clone(controller));
        }
        let controller = Arc::new(ChannelController::new(
            channel_id.clone(),
            self.ctx.clone(),
        )?);
        channels.insert(channel_id.clone(), Arc::clone(&controller));
        Ok(controller)
    }

    /// The controller for `channel_id`, if the table has one.
    pub fn get(&self, channel_id: &ChannelId) -> Option<Arc<ChannelController>> {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        channels.get(channel_id).cloned()
    }

    fn existing(&self, channel_id: &ChannelId) -> Result<Arc<ChannelController>> {
        self.get(channel_id)
            .ok_or_else(|| ChannelError::Validation(format!("unknown channel {}", channel_id)))
    }

    /// Open a channel. See [`ChannelController::open`].
    pub async fn open(&self, channel_id: &ChannelId, initial_state: ChannelState) -> Result<()> {
        self.controller(channel_id)?.open(initial_state).await
    }

    /// Write a newer state. See [`ChannelController::update`].
    pub async fn update(&self, channel_id: &ChannelId, new_state: ChannelState) -> Result<()> {
        self.existing(channel_id)?.update(new_state).await
    }

    /// Follow a channel's remote updates. See
    /// [`ChannelController::subscribe_to_channel`].
    ///
    /// Creates the controller when the table has none, so a party can
    /// follow a channel the counterparty opened.
    pub async fn subscribe_to_channel<F>(
        &self,
        channel_id: &ChannelId,
        on_verified_update: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(ChannelState) + Send + Sync + 'static,
    {
        self.controller(channel_id)?
            .subscribe_to_channel(on_verified_update)
            .await
    }

    /// Produce this party's settlement signature. See
    /// [`ChannelController::sign_on_chain_state`].
    pub async fn sign_on_chain_state(
        &self,
        channel_id: &ChannelId,
        state: &ChannelState,
    ) -> Result<Signature> {
        self.existing(channel_id)?.sign_on_chain_state(state).await
    }

    /// Settle a channel. See [`ChannelController::finalize`].
    pub async fn finalize(
        &self,
        channel_id: &ChannelId,
        state: &ChannelState,
        client_signature: Signature,
        relay_signature: Signature,
    ) -> Result<SettlementReceipt> {
        self.existing(channel_id)?
            .finalize(state, client_signature, relay_signature)
            .await
    }

    /// Start a liveness monitor on a channel's acceptance times, using the
    /// configured interval.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Validation`] for an unknown channel.
    pub fn monitor_liveness<F>(&self, channel_id: &ChannelId, on_stale: F) -> Result<LivenessHandle>
    where
        F: Fn(&ChannelId, std::time::Duration) + Send + 'static,
    {
        let controller = self.existing(channel_id)?;
        LivenessMonitor::start(
            channel_id.clone(),
            self.ctx.config.liveness_interval(),
            controller.last_accepted(),
            on_stale,
        )
    }

    /// Ids of all channels in the table, sorted.
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<_> = channels.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop a channel from the table.
    ///
    /// Running subscriptions keep their controller alive until their
    /// handles are dropped.
    pub fn remove(&self, channel_id: &ChannelId) -> Option<Arc<ChannelController>> {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels.remove(channel_id)
    }

    pub fn metrics(&self) -> &ChannelMetrics {
        &self.ctx.metrics
    }

    pub fn context(&self) -> &ChannelContext {
        &self.ctx
    }
}

impl std::fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelManager")
            .field("channels", &self.channel_ids())
            .finish_non_exhaustive()
    }
}
