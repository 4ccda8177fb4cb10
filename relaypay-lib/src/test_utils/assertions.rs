//! Test assertions and verification helpers.

use crate::{ChannelError, Result, SettlementReceipt};

/// Assert that a settlement result is a confirmed receipt.
///
/// # Panics
/// Panics if the settlement failed or reverted.
pub fn assert_settled(result: &Result<SettlementReceipt>) {
    match result {
        Ok(receipt) => assert!(
            receipt.is_confirmed(),
            "Settlement should be confirmed, got {:?}",
            receipt.status
        ),
        Err(e) => panic!("Settlement failed with error: {}", e),
    }
}

/// Assert that a settlement result is a `SettlementError`.
///
/// # Panics
/// Panics if the settlement succeeded or failed with another error kind.
pub fn assert_settlement_failed(result: &Result<SettlementReceipt>) {
    match result {
        Ok(receipt) => panic!("Settlement should have failed, got {:?}", receipt),
        Err(ChannelError::Settlement(_)) => {}
        Err(other) => panic!("Expected a settlement error, got {:?}", other),
    }
}
