//! Configuration for channel controllers.

use std::time::Duration;

use ethers::types::Address;
use relaypay_lib::{ChannelError, Result};
use serde::{Deserialize, Serialize};

/// Configuration shared by every controller in a [`ChannelManager`](crate::ChannelManager).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Settlement contract address, bound into every settlement signature.
    pub contract_address: Address,

    /// Root path segment for channel state in the replicated store.
    #[serde(default = "default_store_namespace")]
    pub store_namespace: String,

    /// Liveness check interval in milliseconds.
    #[serde(default = "default_liveness_interval_ms")]
    pub liveness_interval_ms: u64,

    /// Timeout for store writes and reads. None waits indefinitely.
    #[serde(default)]
    pub store_timeout_ms: Option<u64>,

    /// Timeout for the settlement call. None waits indefinitely.
    #[serde(default)]
    pub settlement_timeout_ms: Option<u64>,

    /// Reject updates that change `clientBalance + relayBalance`.
    #[serde(default)]
    pub enforce_balance_conservation: bool,

    /// Capacity of each controller's diagnostic event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_store_namespace() -> String {
    "channels".to_string()
}

fn default_liveness_interval_ms() -> u64 {
    30_000
}

fn default_event_buffer() -> usize {
    256
}

impl ChannelConfig {
    /// Create a configuration for the contract at `contract_address`.
    pub fn new(contract_address: Address) -> Self {
        Self {
            contract_address,
            store_namespace: default_store_namespace(),
            liveness_interval_ms: default_liveness_interval_ms(),
            store_timeout_ms: None,
            settlement_timeout_ms: None,
            enforce_balance_conservation: false,
            event_buffer: default_event_buffer(),
        }
    }

    /// Load and validate a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Config`] on malformed JSON or invalid values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ChannelError::Config(format!("invalid channel config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.store_namespace.is_empty() || self.store_namespace.contains('/') {
            return Err(ChannelError::Config(format!(
                "store_namespace {:?} must be a single non-empty path segment",
                self.store_namespace
            )));
        }
        if self.liveness_interval_ms == 0 {
            return Err(ChannelError::Config(
                "liveness_interval_ms must be positive".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(ChannelError::Config("event_buffer must be positive".into()));
        }
        Ok(())
    }

    /// Set the store namespace.
    pub fn with_store_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.store_namespace = namespace.into();
        self
    }

    /// Set the liveness check interval.
    pub fn with_liveness_interval_ms(mut self, interval_ms: u64) -> Self {
        self.liveness_interval_ms = interval_ms;
        self
    }

    /// Set the store timeout.
    pub fn with_store_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.store_timeout_ms = Some(timeout_ms);
        self
    }

    /// Set the settlement timeout.
    pub fn with_settlement_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.settlement_timeout_ms = Some(timeout_ms);
        self
    }

    /// Enable or disable balance conservation checks on `update`.
    pub fn with_balance_conservation(mut self, enforce: bool) -> Self {
        self.enforce_balance_conservation = enforce;
        self
    }

    /// Set the diagnostic event buffer size.
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        self.store_timeout_ms.map(Duration::from_millis)
    }

    pub fn settlement_timeout(&self) -> Option<Duration> {
        self.settlement_timeout_ms.map(Duration::from_millis)
    }
}
