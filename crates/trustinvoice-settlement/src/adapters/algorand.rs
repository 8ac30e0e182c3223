use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use trustinvoice_core::{
    state_machine, Blockchain, ChainFamily, ConfirmationConfig, CreateInvoiceParams, InvoiceRecord,
    InvoiceRef, InvoiceStatus, NetworkConfig,
};
use trustinvoice_crypto::address::validate_algorand_address;

use crate::clock::Clock;
use crate::confirmation::{
    ConfirmationPolicy, ConfirmationSource, TransactionConfirmationWaiter, TxInclusion,
};
use crate::error::SettlementError;
use crate::ledger::algorand::program::{
    reject, BYTES_PER_INVOICE, INTS_PER_INVOICE, METHOD_CREATE, METHOD_PAY, METHOD_REFUND,
};
use crate::ledger::algorand::{
    assign_group_id, AlgodClient, AlgorandTransaction, ApplicationInfo, TxnKind, MAX_KEY_LEN,
    MIN_TXN_FEE,
};
use crate::signer::Signer;
use crate::traits::{ChainAdapter, RefundAuthority};

/// Invoices one application's global schema is sized for.
pub const INVOICES_PER_APPLICATION: u64 = 4;

/// Longest invoice id whose state keys fit: `invoice_<id>_recipient`.
const MAX_INVOICE_ID_LEN: usize = MAX_KEY_LEN - "invoice_".len() - "_recipient".len();

/// Pending-transaction lookups as a confirmation source.
struct PendingSource {
    client: Arc<dyn AlgodClient>,
}

#[async_trait]
impl ConfirmationSource for PendingSource {
    async fn inclusion(&self, tx_id: &str) -> Result<TxInclusion, SettlementError> {
        let info = self.client.pending_transaction_info(tx_id).await?;
        if let Some(round) = info.confirmed_round {
            let current = self.client.status().await?;
            return Ok(TxInclusion::Included {
                height: round,
                confirmations: current.saturating_sub(round) + 1,
            });
        }
        match info.pool_error {
            Some(reason) if !reason.is_empty() => Ok(TxInclusion::Rejected { reason }),
            _ => Ok(TxInclusion::Pending),
        }
    }
}

/// Translate program rejections into the settlement taxonomy.
fn classify(err: SettlementError) -> SettlementError {
    let SettlementError::Chain { reason } = err else {
        return err;
    };
    let has = |needle: &str| reason.contains(needle);
    if has(reject::ALREADY_PAID) {
        SettlementError::AlreadyPaid(reason)
    } else if has(reject::NOT_CREATOR) {
        SettlementError::Unauthorized(reason)
    } else if has(reject::NOT_PAID) || has(reject::ALREADY_REFUNDED) {
        SettlementError::NotEscrowed(reason)
    } else if has(reject::NOT_FOUND) {
        SettlementError::NotFound(reason)
    } else if has(reject::ALREADY_EXISTS) || has(reject::ZERO_AMOUNT) || has(reject::DUE_DATE_PASSED) {
        SettlementError::Validation(reason)
    } else {
        SettlementError::Chain { reason }
    }
}

fn parse_app_id(chain_identifier: &str) -> Result<u64, SettlementError> {
    chain_identifier.parse().map_err(|_| {
        SettlementError::Validation(format!("{} is not an application id", chain_identifier))
    })
}

fn state_key(invoice_id: &str, field: &str) -> String {
    format!("invoice_{}_{}", invoice_id, field)
}

fn state_string(app: &ApplicationInfo, key: &str) -> Option<String> {
    app.global(key)
        .and_then(|v| v.as_bytes())
        .and_then(|b| String::from_utf8(b).ok())
}

fn state_uint(app: &ApplicationInfo, key: &str) -> Option<u64> {
    app.global(key).and_then(|v| v.as_uint())
}

/// Adapter for Algorand: one stateful application per invoice (or per
/// batch of invoices), payments as atomic two-transaction groups.
pub struct AlgorandAdapter {
    network: NetworkConfig,
    client: Arc<dyn AlgodClient>,
    clock: Arc<dyn Clock>,
    confirmation: ConfirmationConfig,
    /// Genesis id confirmed against the node for this session.
    session_genesis: Mutex<Option<String>>,
}

impl AlgorandAdapter {
    pub fn new(
        network: NetworkConfig,
        client: Arc<dyn AlgodClient>,
        clock: Arc<dyn Clock>,
        confirmation: ConfirmationConfig,
    ) -> Self {
        Self {
            network,
            client,
            clock,
            confirmation,
            session_genesis: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &Arc<dyn AlgodClient> {
        &self.client
    }

    /// Create a new invoice application owned by `creator`. Returns its id.
    pub async fn deploy_application(&self, creator: &dyn Signer) -> Result<u64, SettlementError> {
        let txn = self
            .transaction(
                creator,
                TxnKind::ApplicationCreate {
                    global_ints: 1 + INTS_PER_INVOICE * INVOICES_PER_APPLICATION,
                    global_bytes: 1 + BYTES_PER_INVOICE * INVOICES_PER_APPLICATION,
                },
            )
            .await?;
        let tx_ids = self.submit_group(creator, vec![txn]).await?;
        let info = self.client.pending_transaction_info(&tx_ids[0]).await?;
        let app_id = info
            .application_index
            .ok_or_else(|| SettlementError::chain("application create confirmed without an id"))?;
        tracing::info!(app_id, tx_id = %tx_ids[0], "invoice application deployed");
        Ok(app_id)
    }

    /// The unsigned, grouped `[pay_invoice call, payment]` pair for an invoice.
    pub async fn pay_group(
        &self,
        invoice: &InvoiceRecord,
        payer: &dyn Signer,
    ) -> Result<Vec<AlgorandTransaction>, SettlementError> {
        let app_id = parse_app_id(&invoice.chain_identifier)?;
        let amount = u64::try_from(invoice.amount)
            .map_err(|_| SettlementError::Validation("amount exceeds u64".into()))?;
        let call = self
            .transaction(
                payer,
                TxnKind::ApplicationCall {
                    app_id,
                    args: vec![METHOD_PAY.to_vec(), invoice.invoice_key.as_bytes().to_vec()],
                },
            )
            .await?;
        let payment = self
            .transaction(
                payer,
                TxnKind::Payment {
                    receiver: invoice.recipient_address.clone(),
                    amount,
                },
            )
            .await?;
        let mut group = vec![call, payment];
        assign_group_id(&mut group)?;
        Ok(group)
    }

    /// Sign, submit, and wait for a group. All transactions must be from
    /// `signer`. Returns the transaction ids in group order.
    pub async fn submit_group(
        &self,
        signer: &dyn Signer,
        txns: Vec<AlgorandTransaction>,
    ) -> Result<Vec<String>, SettlementError> {
        let mut raw = Vec::with_capacity(txns.len());
        let mut tx_ids = Vec::with_capacity(txns.len());
        for txn in &txns {
            let payload = txn.to_payload()?;
            tx_ids.push(txn.id()?);
            raw.push(signer.sign(&payload)?);
        }

        let first = self.client.send_raw_transactions(&raw).await.map_err(classify)?;
        tracing::debug!(tx_id = %first, size = raw.len(), "group submitted");

        let source = PendingSource {
            client: self.client.clone(),
        };
        TransactionConfirmationWaiter::new(ConfirmationPolicy::algorand(&self.confirmation))
            .wait(&source, &first)
            .await
            .map_err(classify)?;
        Ok(tx_ids)
    }

    async fn transaction(
        &self,
        sender: &dyn Signer,
        kind: TxnKind,
    ) -> Result<AlgorandTransaction, SettlementError> {
        let params = self.client.suggested_params().await?;
        let cached = self
            .session_genesis
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if cached.is_none() {
            if params.genesis_id != self.network.network_id {
                return Err(SettlementError::chain(format!(
                    "node reports genesis {}, {} expects {}",
                    params.genesis_id, self.network.name, self.network.network_id
                )));
            }
            *self.session_genesis.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(params.genesis_id.clone());
        }
        Ok(AlgorandTransaction::new(
            &sender.address(ChainFamily::Algorand),
            &params,
            kind,
        ))
    }

    async fn application(&self, app_id: u64, reference: &InvoiceRef) -> Result<ApplicationInfo, SettlementError> {
        self.client
            .application_info(app_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound(reference.to_string()))
    }
}

#[async_trait]
impl ChainAdapter for AlgorandAdapter {
    fn blockchain(&self) -> Blockchain {
        Blockchain::Algorand
    }

    fn network(&self) -> &NetworkConfig {
        &self.network
    }

    fn refund_authority(&self) -> RefundAuthority {
        RefundAuthority::CreatorOnly
    }

    async fn create_invoice(
        &self,
        params: &CreateInvoiceParams,
        creator: &dyn Signer,
    ) -> Result<InvoiceRecord, SettlementError> {
        if params.is_escrow {
            return Err(SettlementError::Validation(
                "escrow is not supported on algorand".into(),
            ));
        }
        if params.token_address.is_some() {
            return Err(SettlementError::Validation(
                "token invoices are not supported on algorand".into(),
            ));
        }
        if params.invoice_id.len() > MAX_INVOICE_ID_LEN {
            return Err(SettlementError::Validation(format!(
                "invoice id longer than {} bytes",
                MAX_INVOICE_ID_LEN
            )));
        }
        let amount = u64::try_from(params.amount)
            .map_err(|_| SettlementError::Validation("amount exceeds u64".into()))?;
        validate_algorand_address(&params.recipient)
            .map_err(|e| SettlementError::Validation(e.to_string()))?;

        let app_id = match params.app_id {
            Some(app_id) => app_id,
            None => self.deploy_application(creator).await?,
        };
        let call = self
            .transaction(
                creator,
                TxnKind::ApplicationCall {
                    app_id,
                    args: vec![
                        METHOD_CREATE.to_vec(),
                        params.invoice_id.as_bytes().to_vec(),
                        amount.to_be_bytes().to_vec(),
                        params.due_date.to_be_bytes().to_vec(),
                        params.recipient.as_bytes().to_vec(),
                    ],
                },
            )
            .await?;
        let tx_ids = self.submit_group(creator, vec![call]).await?;

        tracing::info!(
            blockchain = %Blockchain::Algorand,
            invoice_id = %params.invoice_id,
            app_id,
            tx_id = %tx_ids[0],
            "invoice created"
        );

        Ok(InvoiceRecord {
            id: params.invoice_id.clone(),
            amount: params.amount,
            recipient_address: params.recipient.clone(),
            creator_address: creator.address(ChainFamily::Algorand),
            due_date: params.due_date,
            description: params.description.clone(),
            blockchain: Blockchain::Algorand,
            is_escrow: false,
            status: InvoiceStatus::Created,
            payer_address: None,
            chain_identifier: app_id.to_string(),
            invoice_key: params.invoice_id.clone(),
            token_address: None,
            tx_ids,
            fee_bps: None,
        })
    }

    async fn pay_invoice(
        &self,
        invoice: &InvoiceRecord,
        payer: &dyn Signer,
    ) -> Result<String, SettlementError> {
        let group = self.pay_group(invoice, payer).await?;
        let tx_id = self
            .submit_group(payer, group)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SettlementError::chain("payment group confirmed without transactions"))?;
        tracing::info!(
            blockchain = %Blockchain::Algorand,
            invoice_id = %invoice.id,
            %tx_id,
            "invoice paid"
        );
        Ok(tx_id)
    }

    async fn release_escrow(
        &self,
        invoice: &InvoiceRecord,
        _releaser: &dyn Signer,
    ) -> Result<String, SettlementError> {
        Err(SettlementError::NotEscrowed(format!(
            "escrow is not supported on algorand (invoice {})",
            invoice.id
        )))
    }

    async fn refund_invoice(
        &self,
        invoice: &InvoiceRecord,
        refunder: &dyn Signer,
    ) -> Result<String, SettlementError> {
        let reference = invoice.reference();
        let app_id = parse_app_id(&invoice.chain_identifier)?;
        let amount = u64::try_from(invoice.amount)
            .map_err(|_| SettlementError::Validation("amount exceeds u64".into()))?;
        let app = self.application(app_id, &reference).await?;
        let held = self.client.account_balance(&app.address).await?;

        let mut group = Vec::with_capacity(2);
        if held < amount {
            tracing::debug!(app_id, held, amount, "topping up application account");
            group.push(
                self.transaction(
                    refunder,
                    TxnKind::Payment {
                        receiver: app.address.clone(),
                        amount: amount - held,
                    },
                )
                .await?,
            );
        }
        let mut call = self
            .transaction(
                refunder,
                TxnKind::ApplicationCall {
                    app_id,
                    args: vec![METHOD_REFUND.to_vec(), invoice.invoice_key.as_bytes().to_vec()],
                },
            )
            .await?;
        // Covers the inner payment's fee.
        call.fee = 2 * MIN_TXN_FEE;
        group.push(call);
        if group.len() > 1 {
            assign_group_id(&mut group)?;
        }

        let tx_ids = self.submit_group(refunder, group).await?;
        let tx_id = tx_ids
            .last()
            .cloned()
            .ok_or_else(|| SettlementError::chain("refund group confirmed without transactions"))?;
        tracing::info!(invoice_id = %invoice.id, %tx_id, "invoice refunded");
        Ok(tx_id)
    }

    async fn get_invoice_details(
        &self,
        reference: &InvoiceRef,
    ) -> Result<InvoiceRecord, SettlementError> {
        let app_id = parse_app_id(&reference.chain_identifier)?;
        let app = self.application(app_id, reference).await?;
        let id = &reference.invoice_key;
        let missing = || SettlementError::NotFound(reference.to_string());

        let amount = state_uint(&app, &state_key(id, "amount")).ok_or_else(missing)?;
        let paid = state_uint(&app, &state_key(id, "paid")) == Some(1);
        let refunded = state_uint(&app, &state_key(id, "refunded")) == Some(1);

        Ok(InvoiceRecord {
            id: id.clone(),
            amount: amount as u128,
            recipient_address: state_string(&app, &state_key(id, "recipient")).unwrap_or_default(),
            creator_address: state_string(&app, &state_key(id, "creator")).unwrap_or_default(),
            due_date: state_uint(&app, &state_key(id, "due_date")).unwrap_or(0),
            description: String::new(),
            blockchain: Blockchain::Algorand,
            is_escrow: false,
            status: InvoiceStatus::from_flags(paid, refunded, false, false),
            payer_address: state_string(&app, &state_key(id, "payer")),
            chain_identifier: app_id.to_string(),
            invoice_key: id.clone(),
            token_address: None,
            tx_ids: Vec::new(),
            fee_bps: paid.then_some(0),
        })
    }

    async fn is_overdue(&self, reference: &InvoiceRef) -> Result<bool, SettlementError> {
        let record = self.get_invoice_details(reference).await?;
        Ok(state_machine::is_overdue(
            record.status,
            record.due_date,
            self.clock.now(),
        ))
    }

    fn explorer_url(&self, tx_id: &str) -> String {
        self.network.explorer_tx_url(tx_id)
    }

    fn invoice_explorer_url(&self, invoice: &InvoiceRecord) -> String {
        match (invoice.tx_ids.last(), invoice.chain_identifier.parse::<u64>()) {
            (Some(tx), _) => self.explorer_url(tx),
            (None, Ok(app_id)) => self.network.explorer_application_url(app_id),
            (None, Err(_)) => self.network.explorer_base_url.clone(),
        }
    }

    fn reset_session(&self) {
        *self.session_genesis.lock().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::debug!("Algorand session reset");
    }
}
