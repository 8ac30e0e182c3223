use async_trait::async_trait;
use trustinvoice_core::{Blockchain, CreateInvoiceParams, InvoiceRecord, InvoiceRef, NetworkConfig};

use crate::error::SettlementError;
use crate::signer::Signer;

/// Who may refund a paid or escrowed invoice on a given chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundAuthority {
    CreatorOrRecipient,
    CreatorOnly,
}

impl RefundAuthority {
    pub fn permits(&self, record: &InvoiceRecord, caller: &str) -> bool {
        let is_creator = record.creator_address.eq_ignore_ascii_case(caller);
        match self {
            Self::CreatorOnly => is_creator,
            Self::CreatorOrRecipient => {
                is_creator || record.recipient_address.eq_ignore_ascii_case(caller)
            }
        }
    }
}

/// Chain adapter interface.
///
/// Each implementation drives the invoice lifecycle on one concrete chain:
/// it builds and signs transactions through a [`Signer`], submits them,
/// waits for confirmation, and reads invoice state back. The chain is the
/// source of truth; the adapter holds no invoice state of its own.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// The chain this adapter settles on.
    fn blockchain(&self) -> Blockchain;

    /// Network the adapter is connected to.
    fn network(&self) -> &NetworkConfig;

    fn refund_authority(&self) -> RefundAuthority;

    /// Register a new invoice on chain. Returns the record with the creation
    /// transaction id.
    async fn create_invoice(
        &self,
        params: &CreateInvoiceParams,
        creator: &dyn Signer,
    ) -> Result<InvoiceRecord, SettlementError>;

    /// Pay exactly `invoice.amount`. Returns the transaction id.
    async fn pay_invoice(
        &self,
        invoice: &InvoiceRecord,
        payer: &dyn Signer,
    ) -> Result<String, SettlementError>;

    /// Forward escrowed funds (minus fee) to the recipient.
    async fn release_escrow(
        &self,
        invoice: &InvoiceRecord,
        releaser: &dyn Signer,
    ) -> Result<String, SettlementError>;

    /// Return the full amount to the payer.
    async fn refund_invoice(
        &self,
        invoice: &InvoiceRecord,
        refunder: &dyn Signer,
    ) -> Result<String, SettlementError>;

    /// Read the invoice from chain state. `tx_ids` is left empty.
    async fn get_invoice_details(
        &self,
        reference: &InvoiceRef,
    ) -> Result<InvoiceRecord, SettlementError>;

    async fn is_overdue(&self, reference: &InvoiceRef) -> Result<bool, SettlementError>;

    /// Explorer link for a transaction.
    fn explorer_url(&self, tx_id: &str) -> String;

    /// Explorer link for the invoice: its latest transaction, or its
    /// contract/application when no transaction is known.
    fn invoice_explorer_url(&self, invoice: &InvoiceRecord) -> String;

    /// Drop any cached connection/session state.
    fn reset_session(&self);
}
