use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use trustinvoice_core::{
    Blockchain, CreateInvoiceParams, InvoiceRecord, InvoiceRef, InvoiceStatus, UnifiedInvoice,
};

use crate::clock::{Clock, SystemClock};
use crate::error::SettlementError;
use crate::signer::Signer;
use crate::traits::ChainAdapter;

/// Order of statuses along the lifecycle. A cached record never moves back.
fn rank(status: InvoiceStatus) -> u8 {
    match status {
        InvoiceStatus::Created => 0,
        InvoiceStatus::Paid | InvoiceStatus::EscrowHeld => 1,
        InvoiceStatus::Released | InvoiceStatus::Refunded => 2,
    }
}

/// Fold a fresh chain read into what the cache already knows.
fn merge(cached: Option<InvoiceRecord>, fresh: InvoiceRecord) -> InvoiceRecord {
    let Some(cached) = cached else {
        return fresh;
    };
    if rank(fresh.status) < rank(cached.status) {
        tracing::warn!(
            invoice_id = %cached.id,
            cached = %cached.status,
            read = %fresh.status,
            "chain read is behind the cache, keeping cached status"
        );
        return cached;
    }
    let mut merged = fresh;
    merged.tx_ids = cached.tx_ids;
    if merged.description.is_empty() {
        merged.description = cached.description;
    }
    merged
}

/// Chain-agnostic entry point for the invoice lifecycle.
///
/// Dispatches each operation to the [`ChainAdapter`] registered for the
/// invoice's blockchain. Mutations are accepted only for the active chain
/// selected with [`SettlementEngine::switch_chain`]; reads go to any
/// registered chain. Invoice records read or written through the engine are
/// cached, but the chain stays authoritative: every rejection it reports is
/// surfaced even when the cache disagreed.
pub struct SettlementEngine {
    adapters: HashMap<Blockchain, Arc<dyn ChainAdapter>>,
    active: RwLock<Blockchain>,
    cache: DashMap<InvoiceRef, InvoiceRecord>,
    clock: Arc<dyn Clock>,
}

impl SettlementEngine {
    /// Create an engine with no adapters and `active` as the selected chain.
    pub fn new(active: Blockchain) -> Self {
        Self::with_clock(active, Arc::new(SystemClock))
    }

    pub fn with_clock(active: Blockchain, clock: Arc<dyn Clock>) -> Self {
        Self {
            adapters: HashMap::new(),
            active: RwLock::new(active),
            cache: DashMap::new(),
            clock,
        }
    }

    /// Register a chain adapter, keyed by its blockchain.
    pub fn register_adapter(&mut self, adapter: Arc<dyn ChainAdapter>) {
        let blockchain = adapter.blockchain();
        tracing::info!(
            %blockchain,
            network = %adapter.network().name,
            "Registering chain adapter"
        );
        self.adapters.insert(blockchain, adapter);
    }

    pub fn adapter(&self, blockchain: Blockchain) -> Result<&Arc<dyn ChainAdapter>, SettlementError> {
        self.adapters
            .get(&blockchain)
            .ok_or(SettlementError::AdapterNotFound(blockchain))
    }

    /// Registered blockchains, in display order.
    pub fn supported_blockchains(&self) -> Vec<Blockchain> {
        Blockchain::ALL
            .into_iter()
            .filter(|b| self.adapters.contains_key(b))
            .collect()
    }

    pub fn current_blockchain(&self) -> Blockchain {
        *self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Select the chain mutations are submitted to. The previous chain's
    /// session state is dropped.
    ///
    /// Callers must not switch while operations on the previous chain are
    /// still in flight.
    pub fn switch_chain(&self, blockchain: Blockchain) -> Result<(), SettlementError> {
        self.adapter(blockchain)?;
        let previous = {
            let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *active, blockchain)
        };
        if let Some(adapter) = self.adapters.get(&previous) {
            adapter.reset_session();
        }
        tracing::info!(from = %previous, to = %blockchain, "switched active chain");
        Ok(())
    }

    /// Number of invoices in the local cache.
    pub fn cached_invoices(&self) -> usize {
        self.cache.len()
    }

    /// Create an invoice on `params.blockchain`, which must be the active chain.
    pub async fn create_invoice(
        &self,
        params: &CreateInvoiceParams,
        creator: &dyn Signer,
    ) -> Result<UnifiedInvoice, SettlementError> {
        params.validate(self.clock.now())?;
        let adapter = self.active_adapter(params.blockchain)?;

        let record = adapter.create_invoice(params, creator).await?;
        self.cache.insert(record.reference(), record.clone());
        Ok(self.unify(adapter.as_ref(), record))
    }

    /// Pay exactly the invoice amount. Returns the transaction id.
    pub async fn pay_invoice(
        &self,
        reference: &InvoiceRef,
        payer: &dyn Signer,
    ) -> Result<String, SettlementError> {
        let adapter = self.active_adapter(reference.blockchain)?;
        let record = self.load(adapter.as_ref(), reference).await?;
        if record.status.is_settled() {
            return Err(SettlementError::AlreadyPaid(format!(
                "{} is {}",
                record.id, record.status
            )));
        }

        let result = adapter.pay_invoice(&record, payer).await;
        self.settle(adapter.as_ref(), reference, result).await
    }

    /// Release escrowed funds. Only the recorded recipient may release.
    pub async fn release_escrow(
        &self,
        reference: &InvoiceRef,
        releaser: &dyn Signer,
    ) -> Result<String, SettlementError> {
        let adapter = self.active_adapter(reference.blockchain)?;
        let record = self
            .current(adapter.as_ref(), reference, |r| r.status != InvoiceStatus::EscrowHeld)
            .await?;
        if !record.is_escrow {
            return Err(SettlementError::NotEscrowed(format!(
                "{} is not an escrow invoice",
                record.id
            )));
        }
        let caller = releaser.address(reference.blockchain.family());
        if !record.recipient_address.eq_ignore_ascii_case(&caller) {
            return Err(SettlementError::Unauthorized(format!(
                "{} is not the recipient of {}",
                caller, record.id
            )));
        }
        if record.status != InvoiceStatus::EscrowHeld {
            return Err(SettlementError::NotEscrowed(format!(
                "{} is {}",
                record.id, record.status
            )));
        }

        let result = adapter.release_escrow(&record, releaser).await;
        self.settle(adapter.as_ref(), reference, result).await
    }

    /// Return the full amount to the payer.
    pub async fn refund_invoice(
        &self,
        reference: &InvoiceRef,
        refunder: &dyn Signer,
    ) -> Result<String, SettlementError> {
        let adapter = self.active_adapter(reference.blockchain)?;
        let refundable = |r: &InvoiceRecord| {
            matches!(r.status, InvoiceStatus::Paid | InvoiceStatus::EscrowHeld)
        };
        let record = self
            .current(adapter.as_ref(), reference, |r| !refundable(r))
            .await?;
        let caller = refunder.address(reference.blockchain.family());
        if !adapter.refund_authority().permits(&record, &caller) {
            return Err(SettlementError::Unauthorized(format!(
                "{} may not refund {}",
                caller, record.id
            )));
        }
        if !refundable(&record) {
            return Err(SettlementError::NotEscrowed(format!(
                "{} is {}",
                record.id, record.status
            )));
        }

        let result = adapter.refund_invoice(&record, refunder).await;
        self.settle(adapter.as_ref(), reference, result).await
    }

    /// Read the invoice from its chain and refresh the cache.
    pub async fn get_invoice_details(
        &self,
        reference: &InvoiceRef,
    ) -> Result<UnifiedInvoice, SettlementError> {
        let adapter = self.adapter(reference.blockchain)?;
        let record = self.refresh(adapter.as_ref(), reference).await?;
        Ok(self.unify(adapter.as_ref(), record))
    }

    /// Past due and still unpaid. Read-only.
    pub async fn is_overdue(&self, reference: &InvoiceRef) -> Result<bool, SettlementError> {
        self.adapter(reference.blockchain)?.is_overdue(reference).await
    }

    fn active_adapter(&self, blockchain: Blockchain) -> Result<&Arc<dyn ChainAdapter>, SettlementError> {
        let active = self.current_blockchain();
        if blockchain != active {
            return Err(SettlementError::Validation(format!(
                "{} is not the active chain ({} is)",
                blockchain, active
            )));
        }
        self.adapter(blockchain)
    }

    fn cached(&self, reference: &InvoiceRef) -> Option<InvoiceRecord> {
        self.cache.get(reference).map(|entry| entry.value().clone())
    }

    /// Cached record, or a chain read when the invoice is not cached.
    async fn load(
        &self,
        adapter: &dyn ChainAdapter,
        reference: &InvoiceRef,
    ) -> Result<InvoiceRecord, SettlementError> {
        match self.cached(reference) {
            Some(record) => Ok(record),
            None => self.refresh(adapter, reference).await,
        }
    }

    /// Like [`Self::load`], but re-reads the chain when the cached record
    /// fails the precondition `stale`.
    async fn current(
        &self,
        adapter: &dyn ChainAdapter,
        reference: &InvoiceRef,
        stale: impl Fn(&InvoiceRecord) -> bool,
    ) -> Result<InvoiceRecord, SettlementError> {
        match self.cached(reference) {
            Some(record) if !stale(&record) => Ok(record),
            _ => self.refresh(adapter, reference).await,
        }
    }

    async fn refresh(
        &self,
        adapter: &dyn ChainAdapter,
        reference: &InvoiceRef,
    ) -> Result<InvoiceRecord, SettlementError> {
        let fresh = adapter.get_invoice_details(reference).await?;
        let merged = merge(self.cached(reference), fresh);
        self.cache.insert(reference.clone(), merged.clone());
        Ok(merged)
    }

    /// Record a lifecycle transaction, or resync the cache after the chain
    /// rejected one the cache thought was valid.
    async fn settle(
        &self,
        adapter: &dyn ChainAdapter,
        reference: &InvoiceRef,
        result: Result<String, SettlementError>,
    ) -> Result<String, SettlementError> {
        let tx_id = match result {
            Ok(tx_id) => tx_id,
            Err(err) => {
                if matches!(err, SettlementError::AlreadyPaid(_) | SettlementError::NotEscrowed(_)) {
                    tracing::warn!(invoice = %reference, error = %err, "chain rejected a stale cached state");
                    if let Err(refresh) = self.refresh(adapter, reference).await {
                        tracing::debug!(invoice = %reference, error = %refresh, "cache resync failed");
                    }
                }
                return Err(err);
            }
        };

        if let Err(err) = self.refresh(adapter, reference).await {
            tracing::warn!(invoice = %reference, error = %err, "could not re-read invoice after action");
        }
        if let Some(mut entry) = self.cache.get_mut(reference) {
            if !entry.tx_ids.contains(&tx_id) {
                entry.tx_ids.push(tx_id.clone());
            }
        }
        Ok(tx_id)
    }

    fn unify(&self, adapter: &dyn ChainAdapter, record: InvoiceRecord) -> UnifiedInvoice {
        let explorer_url = adapter.invoice_explorer_url(&record);
        UnifiedInvoice::from_record(record, explorer_url)
    }
}
