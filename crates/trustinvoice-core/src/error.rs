use crate::state_machine::{InvoiceEvent, InvoiceStatus};

/// Core domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid state transition from {from} on {event}")]
    InvalidStateTransition {
        from: InvoiceStatus,
        event: InvoiceEvent,
    },

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("fee rate {0} bps is outside [0, 10000]")]
    InvalidFeeBps(u32),

    #[error("unknown blockchain: {0}")]
    UnknownBlockchain(String),

    #[error("unknown network preset: {0}")]
    UnknownNetwork(String),
}
