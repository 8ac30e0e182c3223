//! TrustInvoice Settlement Layer
//!
//! Executes the invoice lifecycle (create, pay, hold in escrow, release,
//! refund, check overdue) against structurally different chains behind a
//! single [`ChainAdapter`] capability, and exposes it through the
//! [`SettlementEngine`].

pub mod error;
pub mod clock;
pub mod signer;
pub mod confirmation;
pub mod traits;
pub mod ledger;
pub mod adapters;
pub mod engine;

pub use error::SettlementError;
pub use clock::{Clock, ManualClock, SystemClock};
pub use signer::{LocalSigner, SignedEnvelope, Signer};
pub use confirmation::{
    Confirmation, ConfirmationPolicy, ConfirmationSource, TransactionConfirmationWaiter, TxInclusion,
};
pub use traits::{ChainAdapter, RefundAuthority};
pub use adapters::{AlgorandAdapter, EvmAdapter};
pub use engine::SettlementEngine;
