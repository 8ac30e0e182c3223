use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use trustinvoice_core::{
    Blockchain, ChainFamily, ConfirmationConfig, CreateInvoiceParams, InvoiceRecord, InvoiceRef,
    InvoiceStatus, NetworkConfig,
};
use trustinvoice_crypto::address::normalize_evm_address;

use crate::confirmation::{
    ConfirmationPolicy, ConfirmationSource, TransactionConfirmationWaiter, TxInclusion,
};
use crate::error::SettlementError;
use crate::ledger::evm::registry::{revert, RegistryInvoice};
use crate::ledger::evm::{EvmCall, EvmReceipt, EvmRpc, EvmTransaction, RegistryEvent};
use crate::signer::Signer;
use crate::traits::{ChainAdapter, RefundAuthority};

/// Receipts as a confirmation source: depth is `head - block + 1`.
struct ReceiptSource {
    rpc: Arc<dyn EvmRpc>,
}

#[async_trait]
impl ConfirmationSource for ReceiptSource {
    async fn inclusion(&self, tx_id: &str) -> Result<TxInclusion, SettlementError> {
        let Some(receipt) = self.rpc.transaction_receipt(tx_id).await? else {
            return Ok(TxInclusion::Pending);
        };
        if !receipt.success {
            return Ok(TxInclusion::Rejected {
                reason: receipt
                    .revert_reason
                    .unwrap_or_else(|| "execution reverted".to_string()),
            });
        }
        let head = self.rpc.block_number().await?;
        Ok(TxInclusion::Included {
            height: receipt.block_number,
            confirmations: head.saturating_sub(receipt.block_number) + 1,
        })
    }
}

/// Translate registry revert reasons into the settlement taxonomy.
fn classify(err: SettlementError) -> SettlementError {
    let SettlementError::Chain { reason } = err else {
        return err;
    };
    match reason.as_str() {
        revert::ALREADY_PAID => SettlementError::AlreadyPaid(reason),
        revert::NOT_ESCROW
        | revert::NOT_IN_ESCROW
        | revert::NOT_PAID
        | revert::ALREADY_REFUNDED
        | revert::ALREADY_RELEASED => SettlementError::NotEscrowed(reason),
        revert::NOT_RECIPIENT | revert::NOT_REFUNDER | revert::NOT_OWNER => {
            SettlementError::Unauthorized(reason)
        }
        revert::INVOICE_NOT_FOUND => SettlementError::NotFound(reason),
        revert::INVALID_RECIPIENT
        | revert::ZERO_AMOUNT
        | revert::DUE_DATE_PASSED
        | revert::TOKEN_NOT_AUTHORIZED
        | revert::INVOICE_EXISTS
        | revert::FEE_TOO_HIGH => SettlementError::Validation(reason),
        _ => SettlementError::Chain { reason },
    }
}

fn invalid_address(err: trustinvoice_crypto::CryptoError) -> SettlementError {
    SettlementError::Validation(err.to_string())
}

/// Adapter for EVM chains (Ethereum, Polygon) settling through one shared
/// invoice registry contract.
pub struct EvmAdapter {
    blockchain: Blockchain,
    network: NetworkConfig,
    rpc: Arc<dyn EvmRpc>,
    confirmation: ConfirmationConfig,
    registry: RwLock<Option<String>>,
    /// Chain id confirmed against the endpoint for this session.
    session_chain_id: Mutex<Option<u64>>,
}

impl EvmAdapter {
    /// Create an adapter. The registry address comes from
    /// `network.contract_address` or a later [`EvmAdapter::deploy_registry`].
    pub fn new(
        blockchain: Blockchain,
        network: NetworkConfig,
        rpc: Arc<dyn EvmRpc>,
        confirmation: ConfirmationConfig,
    ) -> Result<Self, SettlementError> {
        if blockchain.family() != ChainFamily::Evm {
            return Err(SettlementError::Validation(format!(
                "{} is not an EVM chain",
                blockchain
            )));
        }
        let registry = network
            .contract_address
            .as_deref()
            .map(normalize_evm_address)
            .transpose()
            .map_err(invalid_address)?;
        Ok(Self {
            blockchain,
            network,
            rpc,
            confirmation,
            registry: RwLock::new(registry),
            session_chain_id: Mutex::new(None),
        })
    }

    pub fn rpc(&self) -> &Arc<dyn EvmRpc> {
        &self.rpc
    }

    /// Address of the registry this adapter creates invoices in.
    pub fn registry_address(&self) -> Result<String, SettlementError> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                SettlementError::chain(format!("no invoice registry configured on {}", self.network.name))
            })
    }

    /// Upper bound of the network fee for one registry call, in wei.
    pub fn estimate_fee(&self) -> u128 {
        self.network.gas_limit as u128 * self.network.max_fee_per_gas_wei()
    }

    /// Deploy a registry and adopt it. Waits for deployment depth.
    pub async fn deploy_registry(
        &self,
        deployer: &dyn Signer,
        fee_recipient: &str,
        fee_bps: u16,
    ) -> Result<String, SettlementError> {
        let fee_recipient = normalize_evm_address(fee_recipient).map_err(invalid_address)?;
        let receipt = self
            .submit(
                deployer,
                None,
                0,
                EvmCall::DeployRegistry {
                    fee_recipient,
                    fee_bps,
                },
                ConfirmationPolicy::evm_deployment(&self.confirmation),
            )
            .await?;
        let address = receipt
            .contract_address
            .ok_or_else(|| SettlementError::chain("deployment receipt has no contract address"))?;
        *self.registry.write().unwrap_or_else(PoisonError::into_inner) = Some(address.clone());
        tracing::info!(
            blockchain = %self.blockchain,
            registry = %address,
            fee_bps,
            "invoice registry deployed"
        );
        Ok(address)
    }

    pub async fn platform_fee(&self) -> Result<u16, SettlementError> {
        self.rpc.platform_fee(&self.registry_address()?).await
    }

    /// Owner only. Affects payments accepted afterwards.
    pub async fn update_platform_fee(&self, owner: &dyn Signer, fee_bps: u16) -> Result<String, SettlementError> {
        self.registry_call(owner, 0, EvmCall::UpdatePlatformFee { fee_bps }).await
    }

    /// Owner only. Allow or disallow an ERC20 token for new invoices.
    pub async fn authorize_token(
        &self,
        owner: &dyn Signer,
        token: &str,
        authorized: bool,
    ) -> Result<String, SettlementError> {
        let token = normalize_evm_address(token).map_err(invalid_address)?;
        self.registry_call(owner, 0, EvmCall::AuthorizeToken { token, authorized })
            .await
    }

    /// Owner only. Blocks creation and payment.
    pub async fn pause(&self, owner: &dyn Signer) -> Result<String, SettlementError> {
        self.registry_call(owner, 0, EvmCall::Pause).await
    }

    pub async fn unpause(&self, owner: &dyn Signer) -> Result<String, SettlementError> {
        self.registry_call(owner, 0, EvmCall::Unpause).await
    }

    /// Approve the registry to move `amount` of `token` on the owner's behalf.
    pub async fn approve_token(
        &self,
        owner: &dyn Signer,
        token: &str,
        amount: u128,
    ) -> Result<String, SettlementError> {
        let spender = self.registry_address()?;
        let receipt = self
            .submit(
                owner,
                Some(token.to_string()),
                0,
                EvmCall::Approve { spender, amount },
                ConfirmationPolicy::evm_call(&self.confirmation),
            )
            .await?;
        Ok(receipt.tx_hash)
    }

    /// Top up the registry's allowance when it falls short of `amount`.
    async fn ensure_allowance(
        &self,
        owner: &dyn Signer,
        token: &str,
        amount: u128,
    ) -> Result<(), SettlementError> {
        let registry = self.registry_address()?;
        let from = owner.address(ChainFamily::Evm);
        let allowance = self.rpc.token_allowance(token, &from, &registry).await?;
        if allowance < amount {
            tracing::debug!(%token, allowance, amount, "approving registry allowance");
            self.approve_token(owner, token, amount).await?;
        }
        Ok(())
    }

    async fn ensure_chain_id(&self) -> Result<u64, SettlementError> {
        if let Some(chain_id) = *self.session_chain_id.lock().unwrap_or_else(PoisonError::into_inner) {
            return Ok(chain_id);
        }
        let chain_id = self.rpc.chain_id().await?;
        if let Some(expected) = self.network.chain_id() {
            if expected != chain_id {
                return Err(SettlementError::chain(format!(
                    "endpoint reports chain id {}, {} expects {}",
                    chain_id, self.network.name, expected
                )));
            }
        }
        *self.session_chain_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(chain_id);
        Ok(chain_id)
    }

    async fn registry_call(
        &self,
        signer: &dyn Signer,
        value: u128,
        call: EvmCall,
    ) -> Result<String, SettlementError> {
        let registry = self.registry_address()?;
        let receipt = self
            .submit(
                signer,
                Some(registry),
                value,
                call,
                ConfirmationPolicy::evm_call(&self.confirmation),
            )
            .await?;
        Ok(receipt.tx_hash)
    }

    /// Build, sign, submit, and wait. Reverts come back classified.
    async fn submit(
        &self,
        signer: &dyn Signer,
        to: Option<String>,
        value: u128,
        call: EvmCall,
        policy: ConfirmationPolicy,
    ) -> Result<EvmReceipt, SettlementError> {
        let chain_id = self.ensure_chain_id().await?;
        let from = signer.address(ChainFamily::Evm);
        let nonce = self.rpc.transaction_count(&from).await?;
        let tx = EvmTransaction {
            chain_id,
            from,
            nonce,
            to,
            value,
            gas_limit: self.network.gas_limit,
            max_fee_per_gas: self.network.max_fee_per_gas_wei(),
            call,
        };
        let raw = signer.sign(&tx.to_payload()?)?;
        let tx_hash = self.rpc.send_raw_transaction(&raw).await.map_err(classify)?;
        tracing::debug!(blockchain = %self.blockchain, %tx_hash, nonce, "transaction submitted");

        let source = ReceiptSource {
            rpc: self.rpc.clone(),
        };
        TransactionConfirmationWaiter::new(policy)
            .wait(&source, &tx_hash)
            .await
            .map_err(classify)?;

        self.rpc
            .transaction_receipt(&tx_hash)
            .await?
            .ok_or_else(|| SettlementError::chain(format!("receipt for {} disappeared", tx_hash)))
    }

    fn to_record(&self, invoice: RegistryInvoice, registry: &str) -> InvoiceRecord {
        let status = invoice.status();
        InvoiceRecord {
            id: invoice.invoice_id,
            amount: invoice.amount,
            recipient_address: invoice.recipient,
            creator_address: invoice.creator,
            due_date: invoice.due_date,
            description: invoice.description,
            blockchain: self.blockchain,
            is_escrow: invoice.is_escrow,
            status,
            payer_address: invoice.payer,
            chain_identifier: registry.to_string(),
            invoice_key: invoice.invoice_hash,
            token_address: invoice.token_address,
            tx_ids: Vec::new(),
            fee_bps: invoice.fee_bps,
        }
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn blockchain(&self) -> Blockchain {
        self.blockchain
    }

    fn network(&self) -> &NetworkConfig {
        &self.network
    }

    fn refund_authority(&self) -> RefundAuthority {
        RefundAuthority::CreatorOrRecipient
    }

    async fn create_invoice(
        &self,
        params: &CreateInvoiceParams,
        creator: &dyn Signer,
    ) -> Result<InvoiceRecord, SettlementError> {
        let registry = self.registry_address()?;
        let recipient = normalize_evm_address(&params.recipient).map_err(invalid_address)?;
        let token_address = params
            .token_address
            .as_deref()
            .map(normalize_evm_address)
            .transpose()
            .map_err(invalid_address)?;
        let salt = hex::encode(rand::random::<[u8; 32]>());

        let receipt = self
            .submit(
                creator,
                Some(registry.clone()),
                0,
                EvmCall::CreateInvoice {
                    invoice_id: params.invoice_id.clone(),
                    recipient: recipient.clone(),
                    amount: params.amount,
                    due_date: params.due_date,
                    token_address: token_address.clone(),
                    is_escrow: params.is_escrow,
                    description: params.description.clone(),
                    salt,
                },
                ConfirmationPolicy::evm_call(&self.confirmation),
            )
            .await?;

        let invoice_hash = receipt
            .logs
            .iter()
            .find_map(|log| match log {
                RegistryEvent::InvoiceCreated { invoice_hash, .. } => Some(invoice_hash.clone()),
                _ => None,
            })
            .ok_or_else(|| SettlementError::chain("receipt has no InvoiceCreated event"))?;

        tracing::info!(
            blockchain = %self.blockchain,
            invoice_id = %params.invoice_id,
            %invoice_hash,
            tx_hash = %receipt.tx_hash,
            "invoice created"
        );

        Ok(InvoiceRecord {
            id: params.invoice_id.clone(),
            amount: params.amount,
            recipient_address: recipient,
            creator_address: creator.address(ChainFamily::Evm),
            due_date: params.due_date,
            description: params.description.clone(),
            blockchain: self.blockchain,
            is_escrow: params.is_escrow,
            status: InvoiceStatus::Created,
            payer_address: None,
            chain_identifier: registry,
            invoice_key: invoice_hash,
            token_address,
            tx_ids: vec![receipt.tx_hash],
            fee_bps: None,
        })
    }

    async fn pay_invoice(
        &self,
        invoice: &InvoiceRecord,
        payer: &dyn Signer,
    ) -> Result<String, SettlementError> {
        let value = match &invoice.token_address {
            None => invoice.amount,
            Some(token) => {
                self.ensure_allowance(payer, token, invoice.amount).await?;
                0
            }
        };
        let receipt = self
            .submit(
                payer,
                Some(invoice.chain_identifier.clone()),
                value,
                EvmCall::PayInvoice {
                    invoice_hash: invoice.invoice_key.clone(),
                },
                ConfirmationPolicy::evm_call(&self.confirmation),
            )
            .await?;
        tracing::info!(
            blockchain = %self.blockchain,
            invoice_id = %invoice.id,
            tx_hash = %receipt.tx_hash,
            escrow = invoice.is_escrow,
            "invoice paid"
        );
        Ok(receipt.tx_hash)
    }

    async fn release_escrow(
        &self,
        invoice: &InvoiceRecord,
        releaser: &dyn Signer,
    ) -> Result<String, SettlementError> {
        let receipt = self
            .submit(
                releaser,
                Some(invoice.chain_identifier.clone()),
                0,
                EvmCall::ReleaseEscrow {
                    invoice_hash: invoice.invoice_key.clone(),
                },
                ConfirmationPolicy::evm_call(&self.confirmation),
            )
            .await?;
        tracing::info!(invoice_id = %invoice.id, tx_hash = %receipt.tx_hash, "escrow released");
        Ok(receipt.tx_hash)
    }

    async fn refund_invoice(
        &self,
        invoice: &InvoiceRecord,
        refunder: &dyn Signer,
    ) -> Result<String, SettlementError> {
        // Forwarded payments are returned by the refunder; escrowed ones by the registry.
        let value = match (&invoice.token_address, invoice.is_escrow) {
            (_, true) => 0,
            (None, false) => invoice.amount,
            (Some(token), false) => {
                self.ensure_allowance(refunder, token, invoice.amount).await?;
                0
            }
        };
        let receipt = self
            .submit(
                refunder,
                Some(invoice.chain_identifier.clone()),
                value,
                EvmCall::RefundInvoice {
                    invoice_hash: invoice.invoice_key.clone(),
                },
                ConfirmationPolicy::evm_call(&self.confirmation),
            )
            .await?;
        tracing::info!(invoice_id = %invoice.id, tx_hash = %receipt.tx_hash, "invoice refunded");
        Ok(receipt.tx_hash)
    }

    async fn get_invoice_details(
        &self,
        reference: &InvoiceRef,
    ) -> Result<InvoiceRecord, SettlementError> {
        let registry = normalize_evm_address(&reference.chain_identifier).map_err(invalid_address)?;
        let invoice = self
            .rpc
            .invoice(&registry, &reference.invoice_key)
            .await?
            .ok_or_else(|| SettlementError::NotFound(reference.to_string()))?;
        Ok(self.to_record(invoice, &registry))
    }

    async fn is_overdue(&self, reference: &InvoiceRef) -> Result<bool, SettlementError> {
        let registry = normalize_evm_address(&reference.chain_identifier).map_err(invalid_address)?;
        self.rpc
            .is_overdue(&registry, &reference.invoice_key)
            .await
            .map_err(classify)
            .map_err(|e| match e {
                SettlementError::NotFound(_) => SettlementError::NotFound(reference.to_string()),
                other => other,
            })
    }

    fn explorer_url(&self, tx_id: &str) -> String {
        self.network.explorer_tx_url(tx_id)
    }

    fn invoice_explorer_url(&self, invoice: &InvoiceRecord) -> String {
        match invoice.tx_ids.last() {
            Some(tx) => self.explorer_url(tx),
            None => self.network.explorer_address_url(&invoice.chain_identifier),
        }
    }

    fn reset_session(&self) {
        *self.session_chain_id.lock().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::debug!(blockchain = %self.blockchain, "EVM session reset");
    }
}
