//! Node assembly: ledgers, adapters, and the settlement engine.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use trustinvoice_core::units::parse_units;
use trustinvoice_core::{Blockchain, ChainFamily};
use trustinvoice_settlement::ledger::{AlgorandDevnet, EvmDevnet};
use trustinvoice_settlement::{
    AlgorandAdapter, Clock, EvmAdapter, LocalSigner, SettlementEngine, SystemClock,
};

use crate::api::start_api_server;
use crate::config::NodeConfig;
use crate::state::{Ledgers, NodeState};

/// Native balance the operator starts with on every chain, in whole units.
const OPERATOR_FUNDS: &str = "1000000";

/// The TrustInvoice node: one engine over a devnet per chain.
pub struct TrustInvoiceNode {
    config: NodeConfig,
    state: Arc<NodeState>,
}

impl TrustInvoiceNode {
    /// Start the ledgers, deploy the registries, and register every adapter.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        let state = Arc::new(build_state(&config, Arc::new(SystemClock)).await?);
        Ok(Self { config, state })
    }

    /// Serve the HTTP API until the listener fails.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .api_addr()
            .parse()
            .with_context(|| format!("invalid API address {}", self.config.api_addr()))?;
        start_api_server(addr, self.state.clone()).await
    }
}

/// Build the engine and its ledgers from configuration.
pub async fn build_state(config: &NodeConfig, clock: Arc<dyn Clock>) -> Result<NodeState> {
    let operator = LocalSigner::from_hex(&config.devnet.operator_seed)
        .map_err(|e| anyhow!("invalid operator seed: {}", e))?;
    let engine_config = &config.engine;
    let mut engine = SettlementEngine::with_clock(engine_config.default_chain, clock.clone());
    let mut evm = HashMap::new();

    for blockchain in [Blockchain::Ethereum, Blockchain::Polygon] {
        let mut network = engine_config.networks.get(blockchain).clone();
        let chain_id = network
            .chain_id()
            .ok_or_else(|| anyhow!("{} network id {} is not a chain id", blockchain, network.network_id))?;
        if let Some(configured) = network.contract_address.take() {
            tracing::warn!(%blockchain, %configured, "ignoring configured registry, deploying a fresh one");
        }

        let devnet = Arc::new(EvmDevnet::new(chain_id, clock.clone()));
        devnet.fund(
            &operator.evm_address(),
            parse_units(OPERATOR_FUNDS, blockchain.native_decimals())?,
        )?;
        let adapter = EvmAdapter::new(
            blockchain,
            network,
            devnet.clone(),
            engine_config.confirmation.clone(),
        )?;
        adapter
            .deploy_registry(&operator, &operator.evm_address(), engine_config.fee_bps)
            .await?;
        engine.register_adapter(Arc::new(adapter));
        evm.insert(blockchain, devnet);
    }

    let network = engine_config.networks.get(Blockchain::Algorand).clone();
    let algorand = Arc::new(AlgorandDevnet::new(&network.network_id, clock.clone()));
    algorand.fund(&operator.algorand_address(), micro_algos(OPERATOR_FUNDS)?);
    engine.register_adapter(Arc::new(AlgorandAdapter::new(
        network,
        algorand.clone(),
        clock,
        engine_config.confirmation.clone(),
    )));

    let ledgers = Ledgers { evm, algorand };
    for account in &config.devnet.faucet {
        match account.blockchain.family() {
            ChainFamily::Evm => {
                let devnet = ledgers
                    .evm
                    .get(&account.blockchain)
                    .ok_or_else(|| anyhow!("no ledger for {}", account.blockchain))?;
                devnet.fund(
                    &account.address,
                    parse_units(&account.amount, account.blockchain.native_decimals())?,
                )?;
            }
            ChainFamily::Algorand => {
                ledgers
                    .algorand
                    .fund(&account.address, micro_algos(&account.amount)?);
            }
        }
        tracing::info!(
            blockchain = %account.blockchain,
            address = %account.address,
            amount = %account.amount,
            "faucet account funded"
        );
    }

    Ok(NodeState::new(engine, ledgers, operator.evm_address()))
}

fn micro_algos(amount: &str) -> Result<u64> {
    let units = parse_units(amount, Blockchain::Algorand.native_decimals())?;
    u64::try_from(units).map_err(|_| anyhow!("{} ALGO exceeds the ledger's range", amount))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::FaucetAccount;
    use trustinvoice_settlement::ledger::{AlgodClient, EvmRpc};

    /// Config with fast confirmation polling for tests.
    pub(crate) fn test_config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.engine.confirmation.poll_interval_ms = 1;
        config.engine.confirmation.max_poll_interval_ms = 2;
        config
    }

    #[tokio::test]
    async fn test_build_state_registers_all_chains() {
        let state = build_state(&test_config(), Arc::new(SystemClock)).await.unwrap();
        assert_eq!(state.engine.supported_blockchains(), Blockchain::ALL.to_vec());
        assert_eq!(state.engine.current_blockchain(), Blockchain::Ethereum);
        assert_eq!(state.ledgers.evm.len(), 2);
    }

    #[tokio::test]
    async fn test_faucet_accounts_are_funded() {
        let alice = LocalSigner::from_seed(&[7; 32]);
        let mut config = test_config();
        config.devnet.faucet = vec![
            FaucetAccount {
                blockchain: Blockchain::Polygon,
                address: alice.evm_address(),
                amount: "2.5".into(),
            },
            FaucetAccount {
                blockchain: Blockchain::Algorand,
                address: alice.algorand_address(),
                amount: "50".into(),
            },
        ];
        let state = build_state(&config, Arc::new(SystemClock)).await.unwrap();

        let polygon = &state.ledgers.evm[&Blockchain::Polygon];
        assert_eq!(
            polygon.balance(&alice.evm_address()).await.unwrap(),
            2_500_000_000_000_000_000
        );
        let ethereum = &state.ledgers.evm[&Blockchain::Ethereum];
        assert_eq!(ethereum.balance(&alice.evm_address()).await.unwrap(), 0);
        assert_eq!(
            state
                .ledgers
                .algorand
                .account_balance(&alice.algorand_address())
                .await
                .unwrap(),
            50_000_000
        );
    }

    #[tokio::test]
    async fn test_bad_operator_seed() {
        let mut config = test_config();
        config.devnet.operator_seed = "zz".into();
        assert!(build_state(&config, Arc::new(SystemClock)).await.is_err());
    }
}
