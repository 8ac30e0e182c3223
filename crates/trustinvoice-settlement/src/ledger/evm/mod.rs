//! EVM wire types, the JSON-RPC surface, and a devnet implementing it.

pub mod assets;
pub mod registry;
pub mod devnet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SettlementError;

pub use devnet::EvmDevnet;
pub use registry::RegistryInvoice;

/// Gas charged for a plain value transfer; the floor for any transaction.
pub const INTRINSIC_GAS: u64 = 21_000;

/// Unsigned EVM transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmTransaction {
    pub chain_id: u64,
    pub from: String,
    pub nonce: u64,
    /// `None` deploys a contract.
    pub to: Option<String>,
    pub value: u128,
    pub gas_limit: u64,
    pub max_fee_per_gas: u128,
    pub call: EvmCall,
}

impl EvmTransaction {
    pub fn to_payload(&self) -> Result<Vec<u8>, SettlementError> {
        serde_json::to_vec(self).map_err(|e| SettlementError::chain(format!("encode transaction: {}", e)))
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, SettlementError> {
        serde_json::from_slice(payload)
            .map_err(|e| SettlementError::chain(format!("malformed transaction: {}", e)))
    }
}

/// Decoded calldata: invoice registry and ERC20 entry points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvmCall {
    /// Registry constructor.
    DeployRegistry { fee_recipient: String, fee_bps: u16 },
    CreateInvoice {
        invoice_id: String,
        recipient: String,
        amount: u128,
        due_date: u64,
        token_address: Option<String>,
        is_escrow: bool,
        description: String,
        /// Hex-encoded salt mixed into the invoice hash.
        salt: String,
    },
    PayInvoice { invoice_hash: String },
    ReleaseEscrow { invoice_hash: String },
    RefundInvoice { invoice_hash: String },
    UpdatePlatformFee { fee_bps: u16 },
    AuthorizeToken { token: String, authorized: bool },
    Pause,
    Unpause,
    /// ERC20 `approve`.
    Approve { spender: String, amount: u128 },
    /// Plain value transfer, no calldata.
    Transfer,
}

impl EvmCall {
    /// Fixed gas accounting per entry point.
    pub fn gas(&self) -> u64 {
        match self {
            Self::Transfer => INTRINSIC_GAS,
            Self::Approve { .. } => 46_000,
            Self::DeployRegistry { .. } => 1_800_000,
            Self::CreateInvoice { .. } => 180_000,
            Self::PayInvoice { .. } => 95_000,
            Self::ReleaseEscrow { .. } | Self::RefundInvoice { .. } => 70_000,
            Self::UpdatePlatformFee { .. }
            | Self::AuthorizeToken { .. }
            | Self::Pause
            | Self::Unpause => 30_000,
        }
    }
}

/// Events emitted by the invoice registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    InvoiceCreated {
        invoice_hash: String,
        invoice_id: String,
        creator: String,
        recipient: String,
        amount: u128,
        due_date: u64,
        token_address: Option<String>,
        is_escrow: bool,
    },
    InvoicePaid {
        invoice_hash: String,
        payer: String,
        amount: u128,
        /// Zero while the funds are held in escrow.
        fee: u128,
    },
    EscrowReleased {
        invoice_hash: String,
        recipient: String,
        amount: u128,
        fee: u128,
    },
    InvoiceRefunded {
        invoice_hash: String,
        payer: String,
        amount: u128,
    },
    PlatformFeeUpdated { fee_bps: u16 },
    TokenAuthorized { token: String, authorized: bool },
    Paused { account: String },
    Unpaused { account: String },
}

/// Outcome of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub from: String,
    pub to: Option<String>,
    pub success: bool,
    pub revert_reason: Option<String>,
    pub contract_address: Option<String>,
    pub gas_used: u64,
    pub logs: Vec<RegistryEvent>,
}

/// The subset of Ethereum JSON-RPC the settlement layer relies on, plus the
/// registry's view functions.
#[async_trait]
pub trait EvmRpc: Send + Sync {
    async fn chain_id(&self) -> Result<u64, SettlementError>;

    async fn block_number(&self) -> Result<u64, SettlementError>;

    /// Next nonce for `address`, counting transactions already in the pool.
    async fn transaction_count(&self, address: &str) -> Result<u64, SettlementError>;

    async fn balance(&self, address: &str) -> Result<u128, SettlementError>;

    /// Submit a signed transaction. Returns the transaction hash.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, SettlementError>;

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<EvmReceipt>, SettlementError>;

    /// Registry view: `getInvoice(bytes32)`.
    async fn invoice(
        &self,
        registry: &str,
        invoice_hash: &str,
    ) -> Result<Option<RegistryInvoice>, SettlementError>;

    /// Registry view: `isOverdue(bytes32)`, evaluated at chain time.
    async fn is_overdue(&self, registry: &str, invoice_hash: &str) -> Result<bool, SettlementError>;

    /// Registry view: `platformFee()`.
    async fn platform_fee(&self, registry: &str) -> Result<u16, SettlementError>;

    async fn token_balance(&self, token: &str, owner: &str) -> Result<u128, SettlementError>;

    async fn token_allowance(
        &self,
        token: &str,
        owner: &str,
        spender: &str,
    ) -> Result<u128, SettlementError>;
}
