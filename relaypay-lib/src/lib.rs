//! relaypay library.
//!
//! Value types and collaborator interfaces shared by the relaypay channel
//! protocol. This crate stays stateless: the replicated store and the
//! settlement ledger are reached through trait-based dependency injection,
//! and the protocol itself lives in `relaypay-channels`.
//!
//! # Features
//!
//! - **Channel values**: [`ChannelState`], [`StatePackage`] and [`TokenAmount`] with their JSON wire format
//! - **Replicated store interface**: [`ReplicatedStore`] plus the in-memory [`MemoryReplicatedStore`]
//! - **Settlement interface**: [`SettlementLedger`] plus the `ethers`-backed [`EthersSettlementLedger`]
//!
//! # Example
//!
//! ```
//! use relaypay_lib::{ChannelState, StatePackage};
//!
//! let state = ChannelState::from_decimal(0, "1000", "0").unwrap();
//! let package = StatePackage::new(state, "…signature…");
//! let value = package.to_value().unwrap();
//! assert_eq!(value["data"]["clientBalance"], "1000");
//! ```

pub mod amount;
pub mod errors;
pub mod state;
mod transport;

/// Test utilities for channel testing.
///
/// This module is only available with the `test-utils` feature or in test builds.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use amount::TokenAmount;
pub use errors::{ChannelError, ChannelErrorCode};
pub use state::{ChannelState, StatePackage};
pub use transport::{
    CloseChannelRequest, EthersSettlementLedger, MemoryReplicatedStore, ReplicatedStore,
    SettlementLedger, SettlementReceipt, SettlementStatus, StoreAck, StoreFeed,
    CLOSE_CHANNEL_SIGNATURE,
};

/// Common result alias for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Identifier of a channel's namespace in the replicated store.
///
/// Conventionally a participant's ledger address.
///
/// # Example
///
/// ```
/// use relaypay_lib::ChannelId;
///
/// let id: ChannelId = "0xA".into();
/// assert_eq!(id.as_str(), "0xA");
/// assert!(id.validate().is_ok());
/// assert!(ChannelId::new("a/b").validate().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    /// Create a new ChannelId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the channel ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the id can be used as a single store path segment.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Validation`] for an empty id or one
    /// containing `/`.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(ChannelError::Validation("empty channel id".into()));
        }
        if self.0.contains('/') {
            return Err(ChannelError::Validation(format!(
                "channel id {:?} must not contain '/'",
                self.0
            )));
        }
        Ok(())
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
