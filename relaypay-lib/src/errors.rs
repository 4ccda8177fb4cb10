//! Error types for channel operations.
//!
//! Every fallible operation in the workspace returns [`ChannelError`]. The
//! variants follow the protocol's failure domains: local configuration,
//! local validation, the replicated store, signature checks and the
//! settlement ledger. Nothing in this workspace retries on its own;
//! [`ChannelError::is_retryable`] only tells the caller whether a retry can
//! make sense.

/// Numeric error codes for FFI and log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ChannelErrorCode {
    /// Missing key pair or signer
    Config = 1000,
    /// Stale or malformed nonce/state
    Validation = 2000,
    /// Replicated store read/write failure
    Store = 3000,
    /// Signature check failed
    Verification = 4000,
    /// Ledger call failed
    Settlement = 5000,
    /// Encoding or decoding failure
    Serialization = 6000,
    /// Caller-supplied timeout elapsed
    Timeout = 7000,
}

/// Comprehensive error type for channel operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// A key pair or signer required by the operation is not configured.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested state transition is not allowed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The replicated store rejected or failed a read/write.
    #[error("store error: {0}")]
    Store(String),

    /// A signature could not be checked or recovered.
    #[error("verification error: {0}")]
    Verification(String),

    /// The settlement ledger call failed or reverted.
    #[error("settlement error: {0}")]
    Settlement(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A caller-configured timeout elapsed.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },
}

impl ChannelError {
    /// Get the error code for FFI/log integration.
    pub fn code(&self) -> ChannelErrorCode {
        match self {
            Self::Config(_) => ChannelErrorCode::Config,
            Self::Validation(_) => ChannelErrorCode::Validation,
            Self::Store(_) => ChannelErrorCode::Store,
            Self::Verification(_) => ChannelErrorCode::Verification,
            Self::Settlement(_) => ChannelErrorCode::Settlement,
            Self::Serialization(_) => ChannelErrorCode::Serialization,
            Self::Timeout { .. } => ChannelErrorCode::Timeout,
        }
    }

    /// Returns true if the caller may reasonably retry the operation.
    ///
    /// Store and settlement failures come from external systems and may be
    /// transient. Validation, configuration and signature failures will fail
    /// the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::Settlement(_) | Self::Timeout { .. }
        )
    }

    /// Create the error returned when a proposed nonce does not advance the channel.
    pub fn stale_nonce(current: u64, proposed: u64) -> Self {
        Self::Validation(format!(
            "stale nonce: {} does not exceed current nonce {}",
            proposed, current
        ))
    }

    /// Create a missing-configuration error.
    pub fn missing(what: impl Into<String>) -> Self {
        Self::Config(format!("no {} configured", what.into()))
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = ChannelError::Store("connection reset".into());
        assert_eq!(err.code(), ChannelErrorCode::Store);
        assert!(err.is_retryable());

        let err = ChannelError::stale_nonce(3, 2);
        assert_eq!(err.code(), ChannelErrorCode::Validation);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = ChannelError::stale_nonce(1, 1);
        assert!(err.to_string().contains("stale nonce"));

        let err = ChannelError::missing("off-chain key pair");
        assert_eq!(
            err.to_string(),
            "configuration error: no off-chain key pair configured"
        );

        let err = ChannelError::Timeout {
            operation: "store put".into(),
            timeout_ms: 250,
        };
        assert_eq!(err.to_string(), "store put timed out after 250ms");
    }

    #[test]
    fn test_from_serde_json() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json");
        let err: ChannelError = parse.unwrap_err().into();
        assert_eq!(err.code(), ChannelErrorCode::Serialization);
    }
}
