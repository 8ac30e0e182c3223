//! Shared node state for the HTTP handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use trustinvoice_core::Blockchain;
use trustinvoice_settlement::ledger::{AlgorandDevnet, EvmDevnet};
use trustinvoice_settlement::SettlementEngine;

/// The in-process ledgers the adapters submit to.
pub struct Ledgers {
    pub evm: HashMap<Blockchain, Arc<EvmDevnet>>,
    pub algorand: Arc<AlgorandDevnet>,
}

impl Ledgers {
    pub fn pending_transactions(&self) -> usize {
        self.evm.values().map(|devnet| devnet.pending_count()).sum::<usize>()
            + self.algorand.pending_count()
    }
}

/// Shared state for the running node, accessible from HTTP handlers.
pub struct NodeState {
    pub engine: SettlementEngine,
    pub ledgers: Ledgers,
    /// Account that deployed the registries and collects platform fees.
    pub operator: String,
    /// When the node started.
    pub start_time: Instant,
}

impl NodeState {
    pub fn new(engine: SettlementEngine, ledgers: Ledgers, operator: String) -> Self {
        Self {
            engine,
            ledgers,
            operator,
            start_time: Instant::now(),
        }
    }
}
