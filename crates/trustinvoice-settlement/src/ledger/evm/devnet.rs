use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use trustinvoice_crypto::address::normalize_evm_address;
use trustinvoice_crypto::hashing::evm_tx_hash;
use trustinvoice_crypto::{contract_address, evm_address, genesis_contract_address};

use super::assets::{Assets, Erc20};
use super::registry::{revert, CallContext, Registry, RegistryInvoice};
use super::{EvmCall, EvmReceipt, EvmRpc, EvmTransaction, RegistryEvent, INTRINSIC_GAS};
use crate::clock::Clock;
use crate::error::SettlementError;
use crate::signer::SignedEnvelope;

struct PendingTx {
    hash: String,
    sender: String,
    tx: EvmTransaction,
}

struct ChainState {
    chain_id: u64,
    head: u64,
    automine: bool,
    interval_mining: bool,
    assets: Assets,
    registries: HashMap<String, Registry>,
    nonces: HashMap<String, u64>,
    receipts: HashMap<String, EvmReceipt>,
    mempool: Vec<PendingTx>,
    next_token: u64,
}

/// Execution result of a successful transaction.
struct Outcome {
    logs: Vec<RegistryEvent>,
    contract_address: Option<String>,
}

/// In-process EVM chain hosting invoice registries and ERC20 tokens.
///
/// Every transaction is mined into its own block. With automine off,
/// accepted transactions wait in the mempool until [`EvmDevnet::mine`].
/// With interval mining on, each `eth_blockNumber` poll produces an empty
/// block, standing in for wall-clock block production. Gas is accounted
/// but not charged.
pub struct EvmDevnet {
    state: Mutex<ChainState>,
    clock: Arc<dyn Clock>,
}

impl EvmDevnet {
    pub fn new(chain_id: u64, clock: Arc<dyn Clock>) -> Self {
        tracing::info!(chain_id, "starting EVM devnet");
        Self {
            state: Mutex::new(ChainState {
                chain_id,
                head: 0,
                automine: true,
                interval_mining: true,
                assets: Assets::default(),
                registries: HashMap::new(),
                nonces: HashMap::new(),
                receipts: HashMap::new(),
                mempool: Vec::new(),
                next_token: 1,
            }),
            clock,
        }
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Credit native currency to an account.
    pub fn fund(&self, address: &str, amount: u128) -> Result<(), SettlementError> {
        let address = normalize(address)?;
        self.state().assets.credit_native(&address, amount);
        Ok(())
    }

    /// Deploy an ERC20 token contract. Returns its address.
    pub fn deploy_token(&self, symbol: &str, decimals: u8) -> String {
        let mut state = self.state();
        let address = genesis_contract_address(state.next_token);
        state.next_token += 1;
        state.assets.add_token(&address, Erc20::new(symbol, decimals));
        tracing::info!(%address, symbol, decimals, "deployed devnet token");
        address
    }

    pub fn mint(&self, token: &str, to: &str, amount: u128) -> Result<(), SettlementError> {
        let token = normalize(token)?;
        let to = normalize(to)?;
        self.state()
            .assets
            .token_mut(&token)
            .map_err(SettlementError::chain)?
            .mint(&to, amount);
        Ok(())
    }

    /// `(symbol, decimals)` of a deployed token.
    pub fn token_metadata(&self, token: &str) -> Option<(String, u8)> {
        let token = normalize(token).ok()?;
        self.state()
            .assets
            .token(&token)
            .map(|t| (t.symbol.clone(), t.decimals))
    }

    pub fn set_automine(&self, enabled: bool) {
        self.state().automine = enabled;
    }

    pub fn set_interval_mining(&self, enabled: bool) {
        self.state().interval_mining = enabled;
    }

    pub fn pending_count(&self) -> usize {
        self.state().mempool.len()
    }

    /// Mine every mempool transaction, one block each. Returns the new head.
    pub fn mine(&self) -> u64 {
        let now = self.clock.now();
        let mut state = self.state();
        let pending = std::mem::take(&mut state.mempool);
        for PendingTx { hash, sender, tx } in pending {
            Self::execute(&mut state, hash, &sender, &tx, now);
        }
        state.head
    }

    /// Validate a signed transaction the way a node's pool would.
    fn admit(state: &ChainState, raw: &[u8]) -> Result<PendingTx, String> {
        let envelope = SignedEnvelope::decode(raw).map_err(|e| e.to_string())?;
        let public_key = envelope.verify().map_err(|_| "invalid signature".to_string())?;
        let sender = evm_address(&public_key);
        let tx = EvmTransaction::from_payload(&envelope.payload).map_err(|e| e.to_string())?;

        if normalize(&tx.from).map_err(|e| e.to_string())? != sender {
            return Err("invalid sender".into());
        }
        if tx.chain_id != state.chain_id {
            return Err(format!(
                "invalid chain id: got {}, expected {}",
                tx.chain_id, state.chain_id
            ));
        }
        let expected_nonce = Self::next_nonce(state, &sender);
        if tx.nonce < expected_nonce {
            return Err("nonce too low".into());
        }
        if tx.nonce > expected_nonce {
            return Err("nonce too high".into());
        }
        if tx.gas_limit < INTRINSIC_GAS.max(tx.call.gas()) {
            return Err("intrinsic gas too low".into());
        }
        if state.assets.native_balance(&sender) < tx.value {
            return Err("insufficient funds for gas * price + value".into());
        }

        let hash = evm_tx_hash(raw);
        if state.receipts.contains_key(&hash) || state.mempool.iter().any(|p| p.hash == hash) {
            return Err("already known".into());
        }
        Ok(PendingTx { hash, sender, tx })
    }

    fn next_nonce(state: &ChainState, address: &str) -> u64 {
        let mined = state.nonces.get(address).copied().unwrap_or(0);
        let queued = state.mempool.iter().filter(|p| p.sender == address).count() as u64;
        mined + queued
    }

    /// Mine one transaction into a new block. Reverts roll back all state
    /// changes except the nonce bump.
    fn execute(state: &mut ChainState, hash: String, sender: &str, tx: &EvmTransaction, now: u64) {
        let snapshot = (state.assets.clone(), state.registries.clone());
        let result = Self::apply(state, sender, tx, now);

        state.head += 1;
        *state.nonces.entry(sender.to_string()).or_insert(0) += 1;

        let mut receipt = EvmReceipt {
            tx_hash: hash.clone(),
            block_number: state.head,
            from: sender.to_string(),
            to: tx.to.clone(),
            success: true,
            revert_reason: None,
            contract_address: None,
            gas_used: tx.call.gas(),
            logs: Vec::new(),
        };
        match result {
            Ok(outcome) => {
                receipt.logs = outcome.logs;
                receipt.contract_address = outcome.contract_address;
                tracing::debug!(tx_hash = %hash, block = state.head, "transaction mined");
            }
            Err(reason) => {
                state.assets = snapshot.0;
                state.registries = snapshot.1;
                tracing::debug!(tx_hash = %hash, block = state.head, %reason, "transaction reverted");
                receipt.success = false;
                receipt.revert_reason = Some(reason);
            }
        }
        state.receipts.insert(hash, receipt);
    }

    fn apply(
        state: &mut ChainState,
        sender: &str,
        tx: &EvmTransaction,
        now: u64,
    ) -> Result<Outcome, String> {
        let Some(to) = &tx.to else {
            let EvmCall::DeployRegistry {
                fee_recipient,
                fee_bps,
            } = &tx.call
            else {
                return Err("unsupported contract creation".into());
            };
            if tx.value != 0 {
                return Err(revert::NOT_PAYABLE.into());
            }
            let fee_recipient = normalize(fee_recipient).map_err(|e| e.to_string())?;
            let address = contract_address(sender, tx.nonce).map_err(|e| e.to_string())?;
            let registry = Registry::deploy(&address, sender, &fee_recipient, *fee_bps)?;
            state.registries.insert(address.clone(), registry);
            return Ok(Outcome {
                logs: Vec::new(),
                contract_address: Some(address),
            });
        };

        let to = normalize(to).map_err(|e| e.to_string())?;
        state.assets.transfer_native(sender, &to, tx.value)?;

        if let Some(registry) = state.registries.get_mut(&to) {
            let call = normalize_call(&tx.call)?;
            let ctx = CallContext {
                sender,
                value: tx.value,
                now,
            };
            let logs = registry.execute(&mut state.assets, &ctx, &call)?;
            return Ok(Outcome {
                logs,
                contract_address: None,
            });
        }

        if state.assets.is_token(&to) {
            return match &tx.call {
                EvmCall::Approve { spender, amount } => {
                    let spender = normalize(spender).map_err(|e| e.to_string())?;
                    state.assets.token_mut(&to)?.approve(sender, &spender, *amount);
                    Ok(Outcome {
                        logs: Vec::new(),
                        contract_address: None,
                    })
                }
                _ => Err("function selector was not recognized".into()),
            };
        }

        match tx.call {
            EvmCall::Transfer => Ok(Outcome {
                logs: Vec::new(),
                contract_address: None,
            }),
            _ => Err("call to non-contract account".into()),
        }
    }

    fn registry<'a>(state: &'a ChainState, address: &str) -> Result<&'a Registry, SettlementError> {
        let address = normalize(address)?;
        state
            .registries
            .get(&address)
            .ok_or_else(|| SettlementError::chain(format!("no registry deployed at {}", address)))
    }
}

fn normalize(address: &str) -> Result<String, SettlementError> {
    Ok(normalize_evm_address(address)?)
}

/// Canonicalize the address arguments of a registry call.
fn normalize_call(call: &EvmCall) -> Result<EvmCall, String> {
    let norm = |a: &str| normalize_evm_address(a).map_err(|_| revert::INVALID_RECIPIENT.to_string());
    Ok(match call {
        EvmCall::CreateInvoice {
            invoice_id,
            recipient,
            amount,
            due_date,
            token_address,
            is_escrow,
            description,
            salt,
        } => EvmCall::CreateInvoice {
            invoice_id: invoice_id.clone(),
            recipient: norm(recipient)?,
            amount: *amount,
            due_date: *due_date,
            token_address: token_address.as_deref().map(norm).transpose()?,
            is_escrow: *is_escrow,
            description: description.clone(),
            salt: salt.clone(),
        },
        EvmCall::AuthorizeToken { token, authorized } => EvmCall::AuthorizeToken {
            token: norm(token)?,
            authorized: *authorized,
        },
        other => other.clone(),
    })
}

#[async_trait]
impl EvmRpc for EvmDevnet {
    async fn chain_id(&self) -> Result<u64, SettlementError> {
        Ok(self.state().chain_id)
    }

    async fn block_number(&self) -> Result<u64, SettlementError> {
        let mut state = self.state();
        if state.interval_mining {
            state.head += 1;
        }
        Ok(state.head)
    }

    async fn transaction_count(&self, address: &str) -> Result<u64, SettlementError> {
        let address = normalize(address)?;
        Ok(Self::next_nonce(&self.state(), &address))
    }

    async fn balance(&self, address: &str) -> Result<u128, SettlementError> {
        let address = normalize(address)?;
        Ok(self.state().assets.native_balance(&address))
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, SettlementError> {
        let now = self.clock.now();
        let mut state = self.state();
        let pending = Self::admit(&state, raw).map_err(SettlementError::chain)?;
        let hash = pending.hash.clone();
        if state.automine {
            Self::execute(&mut state, pending.hash, &pending.sender, &pending.tx, now);
        } else {
            tracing::debug!(tx_hash = %hash, "transaction queued in mempool");
            state.mempool.push(pending);
        }
        Ok(hash)
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<EvmReceipt>, SettlementError> {
        Ok(self.state().receipts.get(tx_hash).cloned())
    }

    async fn invoice(
        &self,
        registry: &str,
        invoice_hash: &str,
    ) -> Result<Option<RegistryInvoice>, SettlementError> {
        // A view call against an address without the registry's code reads nothing.
        let registry = normalize(registry)?;
        let state = self.state();
        Ok(state
            .registries
            .get(&registry)
            .and_then(|r| r.invoice(invoice_hash))
            .cloned())
    }

    async fn is_overdue(&self, registry: &str, invoice_hash: &str) -> Result<bool, SettlementError> {
        let registry = normalize(registry)?;
        let now = self.clock.now();
        let state = self.state();
        match state.registries.get(&registry) {
            Some(r) => r.is_overdue(invoice_hash, now).map_err(SettlementError::chain),
            None => Err(SettlementError::chain(revert::INVOICE_NOT_FOUND)),
        }
    }

    async fn platform_fee(&self, registry: &str) -> Result<u16, SettlementError> {
        let state = self.state();
        Ok(Self::registry(&state, registry)?.fee_bps())
    }

    async fn token_balance(&self, token: &str, owner: &str) -> Result<u128, SettlementError> {
        let token = normalize(token)?;
        let owner = normalize(owner)?;
        Ok(self
            .state()
            .assets
            .token(&token)
            .map_or(0, |t| t.balance_of(&owner)))
    }

    async fn token_allowance(
        &self,
        token: &str,
        owner: &str,
        spender: &str,
    ) -> Result<u128, SettlementError> {
        let token = normalize(token)?;
        let owner = normalize(owner)?;
        let spender = normalize(spender)?;
        Ok(self
            .state()
            .assets
            .token(&token)
            .map_or(0, |t| t.allowance(&owner, &spender)))
    }
}
