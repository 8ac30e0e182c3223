use std::fmt;

use crate::error::CoreError;

/// Stored lifecycle status of an invoice.
///
/// "Overdue" is not a status; see [`is_overdue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum InvoiceStatus {
    /// Invoice exists on chain and is awaiting payment.
    Created,
    /// Payment accepted and forwarded to the recipient (minus fee).
    Paid,
    /// Payment accepted and held by the settlement contract.
    EscrowHeld,
    /// Escrowed funds forwarded to the recipient. Final state.
    Released,
    /// Full amount returned to the payer. Final state.
    Refunded,
}

impl InvoiceStatus {
    /// Whether this is a final (terminal) status.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded)
    }

    /// Whether a payment has ever been accepted for the invoice.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Created)
    }

    /// Reconstruct the status from the boolean flags a chain stores.
    ///
    /// Precedence follows the state machine: a refund overrides everything,
    /// a release is only meaningful for escrow invoices.
    pub fn from_flags(paid: bool, refunded: bool, is_escrow: bool, released: bool) -> Self {
        match (paid, refunded, is_escrow, released) {
            (_, true, _, _) => Self::Refunded,
            (true, false, true, true) => Self::Released,
            (true, false, true, false) => Self::EscrowHeld,
            (true, false, false, _) => Self::Paid,
            (false, false, _, _) => Self::Created,
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Paid => write!(f, "Paid"),
            Self::EscrowHeld => write!(f, "EscrowHeld"),
            Self::Released => write!(f, "Released"),
            Self::Refunded => write!(f, "Refunded"),
        }
    }
}

/// Lifecycle actions that move an invoice between statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceEvent {
    /// A non-escrow payment of exactly `amount` was accepted.
    PaymentSettled,
    /// An escrow payment of exactly `amount` was accepted and retained.
    PaymentEscrowed,
    /// The recipient released escrowed funds.
    EscrowReleased,
    /// The full amount was returned to the payer.
    Refunded,
}

impl fmt::Display for InvoiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PaymentSettled => write!(f, "PaymentSettled"),
            Self::PaymentEscrowed => write!(f, "PaymentEscrowed"),
            Self::EscrowReleased => write!(f, "EscrowReleased"),
            Self::Refunded => write!(f, "Refunded"),
        }
    }
}

/// Invoice status transitions shared by every settlement backend.
///
/// Valid transitions:
/// - Created → Paid (PaymentSettled)
/// - Created → EscrowHeld (PaymentEscrowed)
/// - EscrowHeld → Released (EscrowReleased)
/// - Paid → Refunded (Refunded)
/// - EscrowHeld → Refunded (Refunded)
///
/// Transitions are monotonic: no status is ever re-entered.
pub struct InvoiceStateMachine;

impl InvoiceStateMachine {
    /// Attempt a transition. Returns the new status or an error for invalid transitions.
    pub fn transition(
        current: InvoiceStatus,
        event: InvoiceEvent,
    ) -> Result<InvoiceStatus, CoreError> {
        let next = match (current, event) {
            (InvoiceStatus::Created, InvoiceEvent::PaymentSettled) => InvoiceStatus::Paid,
            (InvoiceStatus::Created, InvoiceEvent::PaymentEscrowed) => InvoiceStatus::EscrowHeld,
            (InvoiceStatus::EscrowHeld, InvoiceEvent::EscrowReleased) => InvoiceStatus::Released,
            (InvoiceStatus::Paid, InvoiceEvent::Refunded) => InvoiceStatus::Refunded,
            (InvoiceStatus::EscrowHeld, InvoiceEvent::Refunded) => InvoiceStatus::Refunded,
            _ => {
                return Err(CoreError::InvalidStateTransition {
                    from: current,
                    event,
                })
            }
        };

        tracing::debug!(
            from = %current,
            to = %next,
            event = %event,
            "invoice status transition"
        );

        Ok(next)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: InvoiceStatus, event: InvoiceEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}

/// `now > due_date` and the invoice is still unpaid.
pub fn is_overdue(status: InvoiceStatus, due_date: u64, now: u64) -> bool {
    now > due_date && status == InvoiceStatus::Created
}
