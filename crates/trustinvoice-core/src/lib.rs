//! TrustInvoice core
//!
//! Chain-agnostic invoice model shared by every settlement adapter: the
//! invoice record and its read-only projection, the status state machine,
//! platform fee arithmetic, decimal unit conversion, and network presets.

pub mod error;
pub mod types;
pub mod state_machine;
pub mod fee;
pub mod units;
pub mod config;

pub use error::CoreError;
pub use fee::{FeeCalculator, FeeSplit, DEFAULT_FEE_BPS, MAX_FEE_BPS};
pub use state_machine::{InvoiceEvent, InvoiceStateMachine, InvoiceStatus};
pub use types::{
    Blockchain, ChainFamily, CreateInvoiceParams, InvoiceRecord, InvoiceRef, UnifiedInvoice,
};
pub use config::{ConfirmationConfig, EngineConfig, NetworkConfig, NetworksConfig};
