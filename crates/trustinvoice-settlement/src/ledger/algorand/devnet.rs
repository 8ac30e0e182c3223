use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use trustinvoice_crypto::algorand_address;
use trustinvoice_crypto::hashing::{algorand_tx_id, group_id};

use super::program::{Application, CallContext};
use super::{
    AlgodClient, AlgorandTransaction, ApplicationInfo, PendingTransactionInfo, SuggestedParams,
    TxnKind, MAX_GROUP_SIZE, MIN_TXN_FEE,
};
use crate::clock::Clock;
use crate::error::SettlementError;
use crate::signer::SignedEnvelope;

/// Rounds a suggested transaction stays valid for.
const VALIDITY_WINDOW: u64 = 1_000;
const FIRST_APP_ID: u64 = 1_001;

/// Balances and applications: the part of the ledger a group mutates.
#[derive(Debug, Clone, Default)]
struct Accounts {
    balances: HashMap<String, u64>,
    apps: HashMap<u64, Application>,
    next_app_id: u64,
}

impl Accounts {
    fn debit(&mut self, address: &str, amount: u64) -> Result<(), String> {
        let balance = self.balances.get(address).copied().unwrap_or(0);
        if balance < amount {
            return Err(format!(
                "overspend (account {}, data {{balance: {}}}, tried to spend {})",
                address, balance, amount
            ));
        }
        self.balances.insert(address.to_string(), balance - amount);
        Ok(())
    }

    fn credit(&mut self, address: &str, amount: u64) {
        let balance = self.balances.entry(address.to_string()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }
}

struct QueuedGroup {
    txns: Vec<(String, AlgorandTransaction)>,
}

struct LedgerState {
    round: u64,
    auto_commit: bool,
    accounts: Accounts,
    txns: HashMap<String, PendingTransactionInfo>,
    pool: Vec<QueuedGroup>,
}

/// In-process Algorand network running the invoice program.
///
/// With auto-commit on, every accepted group is evaluated and committed in
/// its own round; a group whose logic fails is rejected at submission. With
/// auto-commit off, groups wait in the pool until [`AlgorandDevnet::commit_pending`],
/// and failures surface as a `pool_error` on the pending transaction.
pub struct AlgorandDevnet {
    genesis_id: String,
    state: Mutex<LedgerState>,
    clock: Arc<dyn Clock>,
}

impl AlgorandDevnet {
    pub fn new(genesis_id: &str, clock: Arc<dyn Clock>) -> Self {
        tracing::info!(genesis_id, "starting Algorand devnet");
        Self {
            genesis_id: genesis_id.to_string(),
            state: Mutex::new(LedgerState {
                round: 1,
                auto_commit: true,
                accounts: Accounts {
                    next_app_id: FIRST_APP_ID,
                    ..Accounts::default()
                },
                txns: HashMap::new(),
                pool: Vec::new(),
            }),
            clock,
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Credit microAlgos to an account.
    pub fn fund(&self, address: &str, amount: u64) {
        self.state().accounts.credit(address, amount);
    }

    pub fn set_auto_commit(&self, enabled: bool) {
        self.state().auto_commit = enabled;
    }

    pub fn pending_count(&self) -> usize {
        self.state().pool.len()
    }

    /// Commit every pooled group in submission order into one new round.
    /// Returns the round.
    pub fn commit_pending(&self) -> u64 {
        let now = self.clock.now();
        let mut state = self.state();
        state.round += 1;
        let round = state.round;
        let pool = std::mem::take(&mut state.pool);
        for group in pool {
            match Self::evaluate(&state.accounts, &group.txns, now) {
                Ok((accounts, infos)) => {
                    state.accounts = accounts;
                    for mut info in infos {
                        info.confirmed_round = Some(round);
                        state.txns.insert(info.tx_id.clone(), info);
                    }
                }
                Err(reason) => {
                    tracing::debug!(round, %reason, "pooled group rejected");
                    for (tx_id, _) in &group.txns {
                        if let Some(info) = state.txns.get_mut(tx_id) {
                            info.pool_error = Some(reason.clone());
                        }
                    }
                }
            }
        }
        round
    }

    /// Signature, validity window, fee, and group checks.
    fn admit(&self, round: u64, group: &[Vec<u8>]) -> Result<Vec<(String, AlgorandTransaction)>, String> {
        if group.is_empty() {
            return Err("empty transaction group".into());
        }
        if group.len() > MAX_GROUP_SIZE {
            return Err(format!("group of {} exceeds {}", group.len(), MAX_GROUP_SIZE));
        }

        let mut txns = Vec::with_capacity(group.len());
        for raw in group {
            let envelope = SignedEnvelope::decode(raw).map_err(|e| e.to_string())?;
            let public_key = envelope
                .verify()
                .map_err(|_| "signature validation failed".to_string())?;
            let txn = AlgorandTransaction::from_payload(&envelope.payload).map_err(|e| e.to_string())?;
            if txn.sender != algorand_address(&public_key) {
                return Err("signature does not match sender".into());
            }
            if txn.genesis_id != self.genesis_id {
                return Err(format!("wrong genesis id {}", txn.genesis_id));
            }
            if round < txn.first_valid || round > txn.last_valid {
                return Err(format!(
                    "txn dead: round {} outside of {}--{}",
                    round, txn.first_valid, txn.last_valid
                ));
            }
            if txn.fee < MIN_TXN_FEE {
                return Err(format!("fee {} below threshold {}", txn.fee, MIN_TXN_FEE));
            }
            txns.push((algorand_tx_id(&envelope.payload), txn));
        }

        let ungrouped = txns
            .iter()
            .map(|(_, t)| t.ungrouped_id())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;
        let expected = group_id(&ungrouped);
        let grouped = txns.len() > 1 || txns[0].1.group.is_some();
        if grouped && txns.iter().any(|(_, t)| t.group.as_deref() != Some(expected.as_str())) {
            return Err("incomplete group".into());
        }
        Ok(txns)
    }

    /// Evaluate a group against a scratch copy of the accounts. Nothing is
    /// applied unless every transaction succeeds.
    fn evaluate(
        accounts: &Accounts,
        txns: &[(String, AlgorandTransaction)],
        now: u64,
    ) -> Result<(Accounts, Vec<PendingTransactionInfo>), String> {
        let mut scratch = accounts.clone();
        let group: Vec<AlgorandTransaction> = txns.iter().map(|(_, t)| t.clone()).collect();
        let mut infos = Vec::with_capacity(txns.len());

        for (index, (tx_id, txn)) in txns.iter().enumerate() {
            let mut info = PendingTransactionInfo {
                tx_id: tx_id.clone(),
                ..PendingTransactionInfo::default()
            };
            scratch.debit(&txn.sender, txn.fee)?;

            match &txn.kind {
                TxnKind::Payment { receiver, amount } => {
                    scratch.debit(&txn.sender, *amount)?;
                    scratch.credit(receiver, *amount);
                }
                TxnKind::ApplicationCreate {
                    global_ints,
                    global_bytes,
                } => {
                    let app_id = scratch.next_app_id;
                    let app = Application::create(app_id, &txn.sender, *global_ints, *global_bytes)?;
                    scratch.apps.insert(app_id, app);
                    scratch.next_app_id += 1;
                    info.application_index = Some(app_id);
                }
                TxnKind::ApplicationCall { app_id, args } => {
                    let app = scratch
                        .apps
                        .get_mut(app_id)
                        .ok_or_else(|| format!("application {} does not exist", app_id))?;
                    let ctx = CallContext {
                        sender: &txn.sender,
                        fee: txn.fee,
                        group: &group,
                        index,
                        now,
                    };
                    let effects = app.call(&ctx, args).map_err(|e| format!("transaction {}: {}", tx_id, e))?;
                    for inner in &effects.inner_payments {
                        scratch.debit(&inner.sender, inner.amount)?;
                        scratch.credit(&inner.receiver, inner.amount);
                    }
                    info.logs = effects.logs;
                    info.inner_txns = effects.inner_payments;
                }
            }
            infos.push(info);
        }
        Ok((scratch, infos))
    }
}

#[async_trait]
impl AlgodClient for AlgorandDevnet {
    async fn status(&self) -> Result<u64, SettlementError> {
        Ok(self.state().round)
    }

    async fn suggested_params(&self) -> Result<SuggestedParams, SettlementError> {
        let round = self.state().round;
        Ok(SuggestedParams {
            fee: MIN_TXN_FEE,
            first_valid: round,
            last_valid: round + VALIDITY_WINDOW,
            genesis_id: self.genesis_id.clone(),
        })
    }

    async fn send_raw_transactions(&self, group: &[Vec<u8>]) -> Result<String, SettlementError> {
        let now = self.clock.now();
        let mut state = self.state();
        let txns = self.admit(state.round, group).map_err(SettlementError::chain)?;
        if txns.iter().any(|(id, _)| state.txns.contains_key(id)) {
            return Err(SettlementError::chain("transaction already in ledger"));
        }
        let first = txns[0].0.clone();

        if state.auto_commit {
            let (accounts, infos) =
                Self::evaluate(&state.accounts, &txns, now).map_err(SettlementError::chain)?;
            state.round += 1;
            let round = state.round;
            state.accounts = accounts;
            for mut info in infos {
                info.confirmed_round = Some(round);
                state.txns.insert(info.tx_id.clone(), info);
            }
            tracing::debug!(tx_id = %first, round, size = txns.len(), "group committed");
        } else {
            for (tx_id, _) in &txns {
                state.txns.insert(
                    tx_id.clone(),
                    PendingTransactionInfo {
                        tx_id: tx_id.clone(),
                        ..PendingTransactionInfo::default()
                    },
                );
            }
            tracing::debug!(tx_id = %first, size = txns.len(), "group pooled");
            state.pool.push(QueuedGroup { txns });
        }
        Ok(first)
    }

    async fn pending_transaction_info(
        &self,
        tx_id: &str,
    ) -> Result<PendingTransactionInfo, SettlementError> {
        self.state()
            .txns
            .get(tx_id)
            .cloned()
            .ok_or_else(|| SettlementError::chain(format!("transaction {} not found", tx_id)))
    }

    async fn application_info(&self, app_id: u64) -> Result<Option<ApplicationInfo>, SettlementError> {
        Ok(self.state().accounts.apps.get(&app_id).map(Application::info))
    }

    async fn account_balance(&self, address: &str) -> Result<u64, SettlementError> {
        Ok(self
            .state()
            .accounts
            .balances
            .get(address)
            .copied()
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::algorand::assign_group_id;
    use crate::ledger::algorand::program::{METHOD_CREATE, METHOD_PAY};
    use crate::signer::{LocalSigner, Signer};

    fn devnet() -> AlgorandDevnet {
        AlgorandDevnet::new("devnet-v1", Arc::new(ManualClock::new(100)))
    }

    async fn sign_all(signer: &LocalSigner, txns: &[AlgorandTransaction]) -> Vec<Vec<u8>> {
        txns.iter()
            .map(|t| signer.sign(&t.to_payload().unwrap()).unwrap())
            .collect()
    }

    async fn deploy(devnet: &AlgorandDevnet, creator: &LocalSigner) -> u64 {
        let params = devnet.suggested_params().await.unwrap();
        let txn = AlgorandTransaction::new(
            &creator.algorand_address(),
            &params,
            TxnKind::ApplicationCreate {
                global_ints: 9,
                global_bytes: 7,
            },
        );
        let id = devnet.send_raw_transactions(&sign_all(creator, &[txn]).await).await.unwrap();
        devnet
            .pending_transaction_info(&id)
            .await
            .unwrap()
            .application_index
            .unwrap()
    }

    async fn create_invoice(devnet: &AlgorandDevnet, creator: &LocalSigner, app_id: u64, recipient: &str) {
        let params = devnet.suggested_params().await.unwrap();
        let txn = AlgorandTransaction::new(
            &creator.algorand_address(),
            &params,
            TxnKind::ApplicationCall {
                app_id,
                args: vec![
                    METHOD_CREATE.to_vec(),
                    b"INV-1".to_vec(),
                    50u64.to_be_bytes().to_vec(),
                    500u64.to_be_bytes().to_vec(),
                    recipient.as_bytes().to_vec(),
                ],
            },
        );
        devnet.send_raw_transactions(&sign_all(creator, &[txn]).await).await.unwrap();
    }

    async fn pay_group(devnet: &AlgorandDevnet, payer: &LocalSigner, app_id: u64, receiver: &str) -> Vec<AlgorandTransaction> {
        let params = devnet.suggested_params().await.unwrap();
        let mut group = vec![
            AlgorandTransaction::new(
                &payer.algorand_address(),
                &params,
                TxnKind::ApplicationCall {
                    app_id,
                    args: vec![METHOD_PAY.to_vec(), b"INV-1".to_vec()],
                },
            ),
            AlgorandTransaction::new(
                &payer.algorand_address(),
                &params,
                TxnKind::Payment {
                    receiver: receiver.into(),
                    amount: 50,
                },
            ),
        ];
        assign_group_id(&mut group).unwrap();
        group
    }

    #[tokio::test]
    async fn test_grouped_payment_moves_funds_atomically() {
        let devnet = devnet();
        let alice = LocalSigner::from_seed(&[1; 32]);
        let bob = LocalSigner::from_seed(&[2; 32]);
        devnet.fund(&alice.algorand_address(), 1_000_000);
        devnet.fund(&bob.algorand_address(), 1_000_000);
        let app_id = deploy(&devnet, &alice).await;
        create_invoice(&devnet, &alice, app_id, &alice.algorand_address()).await;

        // Wrong receiver: the whole group fails, the payer keeps the funds.
        let group = pay_group(&devnet, &bob, app_id, &bob.algorand_address()).await;
        let err = devnet
            .send_raw_transactions(&sign_all(&bob, &group).await)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("payment receiver does not match"));
        assert_eq!(devnet.account_balance(&bob.algorand_address()).await.unwrap(), 1_000_000);

        let group = pay_group(&devnet, &bob, app_id, &alice.algorand_address()).await;
        let id = devnet.send_raw_transactions(&sign_all(&bob, &group).await).await.unwrap();
        assert!(devnet.pending_transaction_info(&id).await.unwrap().confirmed_round.is_some());
        assert_eq!(
            devnet.account_balance(&bob.algorand_address()).await.unwrap(),
            1_000_000 - 50 - 2 * MIN_TXN_FEE
        );
        let info = devnet.application_info(app_id).await.unwrap().unwrap();
        assert_eq!(info.global("invoice_INV-1_paid").and_then(|v| v.as_uint()), Some(1));
    }

    #[tokio::test]
    async fn test_ungrouped_pair_rejected() {
        let devnet = devnet();
        let alice = LocalSigner::from_seed(&[1; 32]);
        devnet.fund(&alice.algorand_address(), 1_000_000);
        let mut group = pay_group(&devnet, &alice, 1_001, &alice.algorand_address()).await;
        group[1].group = None;
        let err = devnet
            .send_raw_transactions(&sign_all(&alice, &group).await)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("incomplete group"));
    }

    #[tokio::test]
    async fn test_wrong_signer_rejected() {
        let devnet = devnet();
        let alice = LocalSigner::from_seed(&[1; 32]);
        let mallory = LocalSigner::from_seed(&[9; 32]);
        let params = devnet.suggested_params().await.unwrap();
        let txn = AlgorandTransaction::new(
            &alice.algorand_address(),
            &params,
            TxnKind::Payment {
                receiver: mallory.algorand_address(),
                amount: 1,
            },
        );
        let err = devnet
            .send_raw_transactions(&sign_all(&mallory, &[txn]).await)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("signature does not match sender"));
    }

    #[tokio::test]
    async fn test_pool_rejects_second_payment_on_commit() {
        let devnet = devnet();
        let alice = LocalSigner::from_seed(&[1; 32]);
        let bob = LocalSigner::from_seed(&[2; 32]);
        let carol = LocalSigner::from_seed(&[3; 32]);
        for s in [&alice, &bob, &carol] {
            devnet.fund(&s.algorand_address(), 1_000_000);
        }
        let app_id = deploy(&devnet, &alice).await;
        create_invoice(&devnet, &alice, app_id, &alice.algorand_address()).await;

        devnet.set_auto_commit(false);
        let first = pay_group(&devnet, &bob, app_id, &alice.algorand_address()).await;
        let second = pay_group(&devnet, &carol, app_id, &alice.algorand_address()).await;
        let first_id = devnet.send_raw_transactions(&sign_all(&bob, &first).await).await.unwrap();
        let second_id = devnet.send_raw_transactions(&sign_all(&carol, &second).await).await.unwrap();
        assert_eq!(devnet.pending_count(), 2);

        devnet.commit_pending();
        let first = devnet.pending_transaction_info(&first_id).await.unwrap();
        let second = devnet.pending_transaction_info(&second_id).await.unwrap();
        assert!(first.confirmed_round.is_some());
        assert!(second.confirmed_round.is_none());
        assert!(second.pool_error.unwrap().contains("invoice already paid"));
        assert_eq!(devnet.account_balance(&carol.algorand_address()).await.unwrap(), 1_000_000);
    }
}
