//! Shared fixtures for the cross-crate settlement tests.
//!
//! A [`Harness`] runs a settlement engine over three in-process ledgers
//! (Ethereum, Polygon, Algorand) that share one manual clock.

use std::sync::Arc;

use trustinvoice_core::{Blockchain, ConfirmationConfig, CreateInvoiceParams, NetworkConfig};
use trustinvoice_settlement::ledger::{AlgorandDevnet, EvmDevnet};
use trustinvoice_settlement::{AlgorandAdapter, EvmAdapter, LocalSigner, ManualClock, SettlementEngine};

pub const ETHER: u128 = 1_000_000_000_000_000_000;
pub const ALGO: u64 = 1_000_000;

/// Clock value every harness starts at.
pub const GENESIS_TIME: u64 = 1_700_000_000;
/// Due date used by [`Harness::params`]: one day after genesis.
pub const DUE_DATE: u64 = GENESIS_TIME + 86_400;

/// Fee rate the registries are deployed with.
pub const FEE_BPS: u16 = 250;

pub struct Harness {
    pub engine: Arc<SettlementEngine>,
    pub clock: Arc<ManualClock>,
    pub ethereum: Arc<EvmDevnet>,
    pub polygon: Arc<EvmDevnet>,
    pub algorand: Arc<AlgorandDevnet>,
    /// Registry administration (token authorization, fees) on Ethereum.
    pub ethereum_adapter: Arc<EvmAdapter>,
    pub algorand_adapter: Arc<AlgorandAdapter>,
    /// Registry owner and fee recipient on both EVM chains.
    pub owner: LocalSigner,
    /// Invoice creator and recipient.
    pub alice: LocalSigner,
    /// Payer.
    pub bob: LocalSigner,
    /// Bystander.
    pub carol: LocalSigner,
}

/// Fast polling so confirmation waits finish in milliseconds.
pub fn confirmation() -> ConfirmationConfig {
    ConfirmationConfig {
        poll_interval_ms: 1,
        max_poll_interval_ms: 2,
        ..ConfirmationConfig::default()
    }
}

/// Build a harness with `active` as the engine's active chain. Alice, Bob
/// and Carol hold 1000 ETH, 1000 MATIC and 1000 ALGO each.
pub async fn harness(active: Blockchain) -> Harness {
    let clock = Arc::new(ManualClock::new(GENESIS_TIME));
    let owner = LocalSigner::from_seed(&[0xA0; 32]);
    let alice = LocalSigner::from_seed(&[0xA1; 32]);
    let bob = LocalSigner::from_seed(&[0xB0; 32]);
    let carol = LocalSigner::from_seed(&[0xC0; 32]);

    let mut engine = SettlementEngine::with_clock(active, clock.clone());

    let mut evm = Vec::new();
    let mut evm_adapters = Vec::new();
    for (blockchain, network) in [
        (Blockchain::Ethereum, NetworkConfig::ethereum_sepolia()),
        (Blockchain::Polygon, NetworkConfig::polygon_mumbai()),
    ] {
        let chain_id = network.chain_id().expect("EVM preset has a numeric chain id");
        let devnet = Arc::new(EvmDevnet::new(chain_id, clock.clone()));
        for signer in [&owner, &alice, &bob, &carol] {
            devnet.fund(&signer.evm_address(), 1_000 * ETHER).unwrap();
        }
        let adapter = Arc::new(EvmAdapter::new(blockchain, network, devnet.clone(), confirmation()).unwrap());
        adapter
            .deploy_registry(&owner, &owner.evm_address(), FEE_BPS)
            .await
            .unwrap();
        engine.register_adapter(adapter.clone());
        evm.push(devnet);
        evm_adapters.push(adapter);
    }
    let polygon = evm.pop().unwrap();
    let ethereum = evm.pop().unwrap();
    let ethereum_adapter = evm_adapters.swap_remove(0);

    let algorand = Arc::new(AlgorandDevnet::new("testnet-v1.0", clock.clone()));
    for signer in [&alice, &bob, &carol] {
        algorand.fund(&signer.algorand_address(), 1_000 * ALGO);
    }
    let algorand_adapter = Arc::new(AlgorandAdapter::new(
        NetworkConfig::algorand_testnet(),
        algorand.clone(),
        clock.clone(),
        confirmation(),
    ));
    engine.register_adapter(algorand_adapter.clone());

    Harness {
        engine: Arc::new(engine),
        clock,
        ethereum,
        polygon,
        algorand,
        ethereum_adapter,
        algorand_adapter,
        owner,
        alice,
        bob,
        carol,
    }
}

impl Harness {
    /// Invoice from Alice to herself on `blockchain`, due at [`DUE_DATE`].
    pub fn params(&self, blockchain: Blockchain, id: &str, amount: u128, is_escrow: bool) -> CreateInvoiceParams {
        let recipient = match blockchain {
            Blockchain::Algorand => self.alice.algorand_address(),
            _ => self.alice.evm_address(),
        };
        CreateInvoiceParams {
            invoice_id: id.into(),
            recipient,
            amount,
            due_date: DUE_DATE,
            description: format!("Invoice {}", id),
            blockchain,
            is_escrow,
            token_address: None,
            app_id: None,
        }
    }

    /// The EVM ledger behind `blockchain`.
    pub fn evm(&self, blockchain: Blockchain) -> &Arc<EvmDevnet> {
        match blockchain {
            Blockchain::Polygon => &self.polygon,
            _ => &self.ethereum,
        }
    }
}
