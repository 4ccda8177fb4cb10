use std::sync::Arc;

use relaypay_lib::{ReplicatedStore, Result, SettlementLedger};

use crate::{ChannelConfig, ChannelMetrics, ChannelStateStore, SettlementClient, SignatureService};

/// Collaborators shared by every controller of a party.
///
/// Cloning is cheap; all members are reference counted.
#[derive(Clone, Debug)]
pub struct ChannelContext {
    pub config: Arc<ChannelConfig>,
    pub signer: Arc<SignatureService>,
    pub store: ChannelStateStore,
    pub settlement: SettlementClient,
    pub metrics: Arc<ChannelMetrics>,
}

impl ChannelContext {
    /// Wire the collaborators together, applying the configured namespace
    /// and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Config`](relaypay_lib::ChannelError::Config)
    /// if the configuration is invalid.
    pub fn new(
        config: ChannelConfig,
        signer: SignatureService,
        store: Arc<dyn ReplicatedStore>,
        ledger: Arc<dyn SettlementLedger>,
    ) -> Result<Self> {
        config.validate()?;

        let store = ChannelStateStore::new(store)
            .with_namespace(config.store_namespace.clone())
            .with_timeout(config.store_timeout());
        let settlement = SettlementClient::new(ledger).with_timeout(config.settlement_timeout());

        Ok(Self {
            config: Arc::new(config),
            signer: Arc::new(signer),
            store,
            settlement,
            metrics: Arc::new(ChannelMetrics::new()),
        })
    }
}
