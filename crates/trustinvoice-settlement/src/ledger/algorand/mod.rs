//! Algorand wire types, the algod surface, and a devnet implementing it.

pub mod program;
pub mod devnet;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use trustinvoice_crypto::hashing::{algorand_tx_id, group_id};

use crate::error::SettlementError;

pub use devnet::AlgorandDevnet;

/// Minimum fee per transaction, microAlgos.
pub const MIN_TXN_FEE: u64 = 1_000;
/// Maximum transactions in an atomic group.
pub const MAX_GROUP_SIZE: usize = 16;
/// Maximum length of a global state key, bytes.
pub const MAX_KEY_LEN: usize = 64;
/// Maximum global state entries an application may declare.
pub const MAX_GLOBAL_SCHEMA: u64 = 64;

/// Parameters for building a transaction valid from the current round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedParams {
    pub fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
}

/// Unsigned Algorand transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorandTransaction {
    pub sender: String,
    pub fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    /// Shared id of the atomic group this transaction belongs to.
    pub group: Option<String>,
    pub kind: TxnKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnKind {
    Payment { receiver: String, amount: u64 },
    /// Create an instance of the invoice program with the given global schema.
    ApplicationCreate { global_ints: u64, global_bytes: u64 },
    ApplicationCall { app_id: u64, args: Vec<Vec<u8>> },
}

impl AlgorandTransaction {
    pub fn new(sender: &str, params: &SuggestedParams, kind: TxnKind) -> Self {
        Self {
            sender: sender.to_string(),
            fee: params.fee.max(MIN_TXN_FEE),
            first_valid: params.first_valid,
            last_valid: params.last_valid,
            genesis_id: params.genesis_id.clone(),
            group: None,
            kind,
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, SettlementError> {
        serde_json::to_vec(self).map_err(|e| SettlementError::chain(format!("encode transaction: {}", e)))
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, SettlementError> {
        serde_json::from_slice(payload)
            .map_err(|e| SettlementError::chain(format!("malformed transaction: {}", e)))
    }

    /// Transaction id over the payload as it will be signed.
    pub fn id(&self) -> Result<String, SettlementError> {
        Ok(algorand_tx_id(&self.to_payload()?))
    }

    /// Id of the transaction with its group field cleared; the input to the group id.
    pub fn ungrouped_id(&self) -> Result<String, SettlementError> {
        Self {
            group: None,
            ..self.clone()
        }
        .id()
    }
}

/// Compute the group id for `txns` and stamp it on each of them.
pub fn assign_group_id(txns: &mut [AlgorandTransaction]) -> Result<String, SettlementError> {
    let ids = txns
        .iter()
        .map(AlgorandTransaction::ungrouped_id)
        .collect::<Result<Vec<_>, _>>()?;
    let group = group_id(&ids);
    for txn in txns.iter_mut() {
        txn.group = Some(group.clone());
    }
    Ok(group)
}

/// Payment issued by an application from its own account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerPayment {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
}

/// `GET /v2/transactions/pending/{txid}`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PendingTransactionInfo {
    pub tx_id: String,
    pub confirmed_round: Option<u64>,
    /// Non-empty when the transaction was dropped from the pool.
    pub pool_error: Option<String>,
    pub application_index: Option<u64>,
    pub logs: Vec<Vec<u8>>,
    pub inner_txns: Vec<InnerPayment>,
}

/// Global state value as algod returns it: `type` 1 is bytes, 2 is uint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TealValue {
    #[serde(rename = "type")]
    pub kind: u8,
    /// Base64.
    pub bytes: String,
    pub uint: u64,
}

impl TealValue {
    pub const BYTES: u8 = 1;
    pub const UINT: u8 = 2;

    pub fn uint(value: u64) -> Self {
        Self {
            kind: Self::UINT,
            bytes: String::new(),
            uint: value,
        }
    }

    pub fn bytes(value: &[u8]) -> Self {
        Self {
            kind: Self::BYTES,
            bytes: base64::engine::general_purpose::STANDARD.encode(value),
            uint: 0,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        (self.kind == Self::UINT).then_some(self.uint)
    }

    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        if self.kind != Self::BYTES {
            return None;
        }
        base64::engine::general_purpose::STANDARD.decode(&self.bytes).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TealKeyValue {
    /// Base64-encoded key.
    pub key: String,
    pub value: TealValue,
}

/// `GET /v2/applications/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub id: u64,
    pub creator: String,
    pub address: String,
    pub global_ints: u64,
    pub global_bytes: u64,
    pub global_state: Vec<TealKeyValue>,
}

impl ApplicationInfo {
    /// Look up a global state entry by its raw key.
    pub fn global(&self, key: &str) -> Option<&TealValue> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(key.as_bytes());
        self.global_state
            .iter()
            .find(|kv| kv.key == encoded)
            .map(|kv| &kv.value)
    }
}

/// The subset of the algod REST API the settlement layer relies on.
#[async_trait]
pub trait AlgodClient: Send + Sync {
    /// Last committed round.
    async fn status(&self) -> Result<u64, SettlementError>;

    async fn suggested_params(&self) -> Result<SuggestedParams, SettlementError>;

    /// Submit signed transactions as one atomic group. Returns the id of the
    /// first transaction.
    async fn send_raw_transactions(&self, group: &[Vec<u8>]) -> Result<String, SettlementError>;

    async fn pending_transaction_info(
        &self,
        tx_id: &str,
    ) -> Result<PendingTransactionInfo, SettlementError>;

    async fn application_info(&self, app_id: u64) -> Result<Option<ApplicationInfo>, SettlementError>;

    /// Account balance, microAlgos.
    async fn account_balance(&self, address: &str) -> Result<u64, SettlementError>;
}
