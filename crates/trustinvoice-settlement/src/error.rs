use trustinvoice_core::{Blockchain, CoreError};
use trustinvoice_crypto::CryptoError;

/// Settlement-layer errors.
///
/// Every variant that originates from a ledger rejection carries the raw
/// rejection reason.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettlementError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invoice already paid: {0}")]
    AlreadyPaid(String),

    #[error("invoice not in an escrow-compatible state: {0}")]
    NotEscrowed(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("chain error: {reason}")]
    Chain { reason: String },

    #[error("transaction {tx_id} not confirmed after {attempts} attempts")]
    Timeout { tx_id: String, attempts: u32 },

    #[error("invoice not found: {0}")]
    NotFound(String),

    #[error("no adapter registered for {0}")]
    AdapterNotFound(Blockchain),
}

impl SettlementError {
    pub fn chain(reason: impl Into<String>) -> Self {
        Self::Chain {
            reason: reason.into(),
        }
    }
}

impl From<CoreError> for SettlementError {
    fn from(err: CoreError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<CryptoError> for SettlementError {
    fn from(err: CryptoError) -> Self {
        Self::chain(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_maps_to_validation() {
        let err: SettlementError = CoreError::ValidationError("amount must be greater than zero".into()).into();
        assert!(matches!(err, SettlementError::Validation(msg) if msg.contains("amount")));
    }

    #[test]
    fn test_crypto_error_maps_to_chain() {
        let err: SettlementError = CryptoError::SignatureVerificationFailed.into();
        assert!(matches!(err, SettlementError::Chain { .. }));
    }

    #[test]
    fn test_display_keeps_reason() {
        let err = SettlementError::chain("overspend: balance 5 below 10");
        assert_eq!(err.to_string(), "chain error: overspend: balance 5 below 10");
    }
}
