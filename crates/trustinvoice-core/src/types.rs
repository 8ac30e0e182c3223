use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::state_machine::InvoiceStatus;

/// Blockchains an invoice can be settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Blockchain {
    Ethereum,
    Polygon,
    Algorand,
}

impl Blockchain {
    /// All supported blockchains, in display order.
    pub const ALL: [Blockchain; 3] = [Self::Ethereum, Self::Polygon, Self::Algorand];

    /// Transaction model family this chain belongs to.
    pub fn family(&self) -> ChainFamily {
        match self {
            Self::Ethereum | Self::Polygon => ChainFamily::Evm,
            Self::Algorand => ChainFamily::Algorand,
        }
    }

    /// Lowercase identifier used in configuration and URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ethereum => "ethereum",
            Self::Polygon => "polygon",
            Self::Algorand => "algorand",
        }
    }

    /// Symbol of the native currency.
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Self::Ethereum => "ETH",
            Self::Polygon => "MATIC",
            Self::Algorand => "ALGO",
        }
    }

    /// Decimal places of the native currency's minor unit (wei, microAlgos).
    pub fn native_decimals(&self) -> u8 {
        match self {
            Self::Ethereum | Self::Polygon => 18,
            Self::Algorand => 6,
        }
    }

    /// Whether the chain's settlement program supports holding funds in escrow.
    pub fn supports_escrow(&self) -> bool {
        self.family() == ChainFamily::Evm
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Blockchain {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ethereum" | "eth" => Ok(Self::Ethereum),
            "polygon" | "matic" => Ok(Self::Polygon),
            "algorand" | "algo" => Ok(Self::Algorand),
            other => Err(CoreError::UnknownBlockchain(other.to_string())),
        }
    }
}

/// Structural transaction model shared by a group of chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainFamily {
    /// Account-based chains with a shared registry contract.
    Evm,
    /// Per-invoice stateful applications with atomic transaction groups.
    Algorand,
}

/// Location of an invoice on its chain.
///
/// For EVM chains `chain_identifier` is the registry contract address and
/// `invoice_key` the invoice hash; for Algorand it is the application id and
/// the caller-supplied invoice id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceRef {
    pub blockchain: Blockchain,
    pub chain_identifier: String,
    pub invoice_key: String,
}

impl InvoiceRef {
    pub fn new(
        blockchain: Blockchain,
        chain_identifier: impl Into<String>,
        invoice_key: impl Into<String>,
    ) -> Self {
        Self {
            blockchain,
            chain_identifier: chain_identifier.into(),
            invoice_key: invoice_key.into(),
        }
    }
}

impl fmt::Display for InvoiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.blockchain, self.chain_identifier, self.invoice_key
        )
    }
}

/// Input to `createInvoice`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInvoiceParams {
    /// Caller-supplied unique invoice id.
    pub invoice_id: String,
    /// Address that receives the funds.
    pub recipient: String,
    /// Amount in the chain's minor unit (wei, token base units, microAlgos).
    pub amount: u128,
    /// Due date, epoch seconds.
    pub due_date: u64,
    #[serde(default)]
    pub description: String,
    pub blockchain: Blockchain,
    #[serde(default)]
    pub is_escrow: bool,
    /// ERC20 token the invoice is denominated in (EVM only).
    #[serde(default)]
    pub token_address: Option<String>,
    /// Existing Algorand application to register the invoice in.
    #[serde(default)]
    pub app_id: Option<u64>,
}

impl CreateInvoiceParams {
    /// Validate the locally checkable creation preconditions against `now`.
    pub fn validate(&self, now: u64) -> Result<(), CoreError> {
        if self.invoice_id.trim().is_empty() {
            return Err(CoreError::ValidationError("invoice id must not be empty".into()));
        }
        if self.recipient.trim().is_empty() {
            return Err(CoreError::ValidationError("recipient must not be empty".into()));
        }
        if self.amount == 0 {
            return Err(CoreError::ValidationError("amount must be greater than zero".into()));
        }
        if self.due_date <= now {
            return Err(CoreError::ValidationError(format!(
                "due date {} must be in the future (now {})",
                self.due_date, now
            )));
        }
        if self.is_escrow && !self.blockchain.supports_escrow() {
            return Err(CoreError::ValidationError(format!(
                "escrow is not supported on {}",
                self.blockchain
            )));
        }
        if self.token_address.is_some() && self.blockchain.family() != ChainFamily::Evm {
            return Err(CoreError::ValidationError(format!(
                "token invoices are not supported on {}",
                self.blockchain
            )));
        }
        Ok(())
    }
}

/// Canonical invoice state as reconstructed from a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: String,
    pub amount: u128,
    pub recipient_address: String,
    pub creator_address: String,
    /// Epoch seconds.
    pub due_date: u64,
    pub description: String,
    pub blockchain: Blockchain,
    pub is_escrow: bool,
    pub status: InvoiceStatus,
    /// Set exactly once, by the first successful payment.
    pub payer_address: Option<String>,
    pub chain_identifier: String,
    pub invoice_key: String,
    pub token_address: Option<String>,
    /// Transaction ids, one per successful lifecycle action, oldest first.
    pub tx_ids: Vec<String>,
    /// Fee rate captured at payment time.
    pub fee_bps: Option<u16>,
}

impl InvoiceRecord {
    pub fn reference(&self) -> InvoiceRef {
        InvoiceRef::new(
            self.blockchain,
            self.chain_identifier.clone(),
            self.invoice_key.clone(),
        )
    }

    /// Overdue is derived at query time: past due and still unpaid.
    pub fn is_overdue(&self, now: u64) -> bool {
        crate::state_machine::is_overdue(self.status, self.due_date, now)
    }
}

/// Read-only projection handed to PDF, email, and UI consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedInvoice {
    pub id: String,
    pub amount: u128,
    pub recipient: String,
    pub creator: String,
    pub due_date: u64,
    pub blockchain: Blockchain,
    pub is_escrow: bool,
    pub status: InvoiceStatus,
    pub payer: Option<String>,
    pub chain_identifier: String,
    pub invoice_key: String,
    pub token_address: Option<String>,
    pub tx_ids: Vec<String>,
    pub fee_bps: Option<u16>,
    pub explorer_url: String,
}

impl UnifiedInvoice {
    /// Project a record, linking the explorer to `explorer_url`.
    pub fn from_record(record: InvoiceRecord, explorer_url: String) -> Self {
        Self {
            id: record.id,
            amount: record.amount,
            recipient: record.recipient_address,
            creator: record.creator_address,
            due_date: record.due_date,
            blockchain: record.blockchain,
            is_escrow: record.is_escrow,
            status: record.status,
            payer: record.payer_address,
            chain_identifier: record.chain_identifier,
            invoice_key: record.invoice_key,
            token_address: record.token_address,
            tx_ids: record.tx_ids,
            fee_bps: record.fee_bps,
            explorer_url,
        }
    }

    pub fn reference(&self) -> InvoiceRef {
        InvoiceRef::new(
            self.blockchain,
            self.chain_identifier.clone(),
            self.invoice_key.clone(),
        )
    }

    /// Whether a payment has been accepted, regardless of later release or refund.
    pub fn paid(&self) -> bool {
        self.status != InvoiceStatus::Created
    }

    pub fn refunded(&self) -> bool {
        self.status == InvoiceStatus::Refunded
    }

    pub fn is_overdue(&self, now: u64) -> bool {
        crate::state_machine::is_overdue(self.status, self.due_date, now)
    }
}

/// Current wall-clock time in epoch seconds.
pub fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
