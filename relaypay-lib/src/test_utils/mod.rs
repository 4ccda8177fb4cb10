//! Test utilities for relaypay.
//!
//! This module provides testing infrastructure including:
//! - A mock settlement ledger that records every close request
//! - Deterministic ledger wallets and sample channel states
//! - Assertion helpers for settlement outcomes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use relaypay_lib::test_utils::{MockSettlementLedger, TestFixtures};
//!
//! let ledger = MockSettlementLedger::new();
//! ledger.revert_next();
//! ```

mod assertions;
mod fixtures;
mod mock_ledger;

pub use assertions::{assert_settled, assert_settlement_failed};
pub use fixtures::{sample_state, test_wallet, TestFixtures};
pub use mock_ledger::MockSettlementLedger;
