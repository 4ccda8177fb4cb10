//! Channel state and its wire envelope.
//!
//! Wire format of a [`StatePackage`]:
//!
//! ```json
//! {
//!   "data": { "nonce": 1, "clientBalance": "900", "relayBalance": "100", "pubKey": "…" },
//!   "signature": "…"
//! }
//! ```

use crate::{ChannelError, Result, TokenAmount};
use serde::{Deserialize, Serialize};

/// A versioned balance split between the client and the relay.
///
/// `nonce` must strictly increase over a channel's history. This type does
/// not check that `client_balance + relay_balance` is conserved between
/// versions; see the controller configuration for that.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    /// Version counter.
    pub nonce: u64,
    /// Client's balance in the smallest ledger unit.
    pub client_balance: TokenAmount,
    /// Relay's balance in the smallest ledger unit.
    pub relay_balance: TokenAmount,
    /// Hex-encoded off-chain public key of the party that signed this state.
    #[serde(rename = "pubKey", default, skip_serializing_if = "Option::is_none")]
    pub participant_pub_key: Option<String>,
}

impl ChannelState {
    /// Create a state without a signer key.
    pub fn new(nonce: u64, client_balance: TokenAmount, relay_balance: TokenAmount) -> Self {
        Self {
            nonce,
            client_balance,
            relay_balance,
            participant_pub_key: None,
        }
    }

    /// Create the nonce-0 state a channel is opened with.
    pub fn initial(client_balance: TokenAmount, relay_balance: TokenAmount) -> Self {
        Self::new(0, client_balance, relay_balance)
    }

    /// Parse balances from their decimal wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Validation`] if either balance is not a
    /// base-10 integer string.
    pub fn from_decimal(nonce: u64, client_balance: &str, relay_balance: &str) -> Result<Self> {
        Ok(Self::new(
            nonce,
            client_balance.parse()?,
            relay_balance.parse()?,
        ))
    }

    /// Set the signer's public key.
    pub fn with_participant(mut self, pub_key: impl Into<String>) -> Self {
        self.participant_pub_key = Some(pub_key.into());
        self
    }

    /// The state that follows this one with the given balances.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Validation`] if the nonce would overflow.
    pub fn next(&self, client_balance: TokenAmount, relay_balance: TokenAmount) -> Result<Self> {
        let nonce = self
            .nonce
            .checked_add(1)
            .ok_or_else(|| ChannelError::Validation("nonce overflow".into()))?;
        Ok(Self::new(nonce, client_balance, relay_balance))
    }

    /// Sum of both balances, or None on overflow.
    pub fn total(&self) -> Option<TokenAmount> {
        self.client_balance.checked_add(&self.relay_balance)
    }
}

/// Signed envelope written to the replicated store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePackage {
    /// The signed state.
    pub data: ChannelState,
    /// Hex-encoded off-chain signature over the canonical bytes of `data`.
    pub signature: String,
}

impl StatePackage {
    /// Wrap a state and its signature.
    pub fn new(data: ChannelState, signature: impl Into<String>) -> Self {
        Self {
            data,
            signature: signature.into(),
        }
    }

    /// Encode for the replicated store.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode a value read from the replicated store.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}
