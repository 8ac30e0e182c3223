//! Bounded polling for transaction finality.

use async_trait::async_trait;
use std::time::Duration;
use trustinvoice_core::ConfirmationConfig;

use crate::error::SettlementError;

/// What a ledger reports about a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxInclusion {
    /// Not yet included in a block/round.
    Pending,
    /// Included at `height`, with `confirmations` blocks/rounds on top (itself included).
    Included { height: u64, confirmations: u64 },
    /// Rejected by the ledger: reverted, dropped from the pool, or failed logic evaluation.
    Rejected { reason: String },
}

/// A ledger that can be polled for transaction inclusion.
#[async_trait]
pub trait ConfirmationSource: Send + Sync {
    async fn inclusion(&self, tx_id: &str) -> Result<TxInclusion, SettlementError>;
}

/// Poll bounds: how many times, how often, and how deep.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationPolicy {
    pub max_attempts: u32,
    pub required_confirmations: u64,
    pub poll_interval: Duration,
    pub backoff_factor: f64,
    pub max_interval: Duration,
}

impl ConfirmationPolicy {
    fn from_config(config: &ConfirmationConfig, max_attempts: u32, required_confirmations: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            required_confirmations: required_confirmations.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            backoff_factor: config.backoff_factor.max(1.0),
            max_interval: Duration::from_millis(config.max_poll_interval_ms),
        }
    }

    /// Algorand: give up after a fixed number of rounds.
    pub fn algorand(config: &ConfirmationConfig) -> Self {
        Self::from_config(config, config.algorand_rounds, 1)
    }

    /// EVM registry calls.
    pub fn evm_call(config: &ConfirmationConfig) -> Self {
        Self::from_config(config, config.evm_max_attempts, config.evm_call_confirmations)
    }

    /// EVM contract deployments wait deeper.
    pub fn evm_deployment(config: &ConfirmationConfig) -> Self {
        Self::from_config(
            config,
            config.evm_max_attempts,
            config.evm_deployment_confirmations,
        )
    }

    /// Saturates at `max_interval`, including for non-finite products.
    fn next_interval(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_factor)
            .map_or(self.max_interval, |next| next.min(self.max_interval))
    }
}

/// A transaction that reached the required depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_id: String,
    pub height: u64,
    pub confirmations: u64,
    pub attempts: u32,
}

/// Polls a [`ConfirmationSource`] until a transaction is final, rejected,
/// or the attempt bound runs out.
///
/// The waiter never resubmits: a timeout means the outcome is unknown, and
/// the transaction may still land later.
#[derive(Debug, Clone)]
pub struct TransactionConfirmationWaiter {
    policy: ConfirmationPolicy,
}

impl TransactionConfirmationWaiter {
    pub fn new(policy: ConfirmationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ConfirmationPolicy {
        &self.policy
    }

    pub async fn wait(
        &self,
        source: &dyn ConfirmationSource,
        tx_id: &str,
    ) -> Result<Confirmation, SettlementError> {
        let mut interval = self.policy.poll_interval;

        for attempt in 1..=self.policy.max_attempts {
            match source.inclusion(tx_id).await? {
                TxInclusion::Included {
                    height,
                    confirmations,
                } if confirmations >= self.policy.required_confirmations => {
                    tracing::debug!(tx_id, height, confirmations, attempt, "transaction confirmed");
                    return Ok(Confirmation {
                        tx_id: tx_id.to_string(),
                        height,
                        confirmations,
                        attempts: attempt,
                    });
                }
                TxInclusion::Included { confirmations, .. } => {
                    tracing::trace!(
                        tx_id,
                        confirmations,
                        required = self.policy.required_confirmations,
                        "waiting for more confirmations"
                    );
                }
                TxInclusion::Pending => {
                    tracing::trace!(tx_id, attempt, "transaction pending");
                }
                TxInclusion::Rejected { reason } => {
                    tracing::warn!(tx_id, %reason, "transaction rejected");
                    return Err(SettlementError::Chain { reason });
                }
            }

            if attempt < self.policy.max_attempts {
                tokio::time::sleep(interval).await;
                interval = self.policy.next_interval(interval);
            }
        }

        tracing::warn!(
            tx_id,
            attempts = self.policy.max_attempts,
            "gave up waiting for confirmation"
        );
        Err(SettlementError::Timeout {
            tx_id: tx_id.to_string(),
            attempts: self.policy.max_attempts,
        })
    }
}
