use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::fee::DEFAULT_FEE_BPS;
use crate::types::Blockchain;

/// RPC and explorer settings for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Human-readable network name.
    pub name: String,
    /// JSON-RPC / algod endpoint.
    pub http_endpoint: String,
    /// EVM chain id (`"1"`, `"137"`) or Algorand genesis id (`"testnet-v1.0"`).
    pub network_id: String,
    /// Block explorer base URL, without trailing slash.
    pub explorer_base_url: String,
    /// Deployed invoice registry (EVM only).
    #[serde(default)]
    pub contract_address: Option<String>,
    /// Gas limit attached to registry calls (EVM only).
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Max fee per gas in gwei (EVM only).
    #[serde(default = "default_max_fee_per_gas_gwei")]
    pub max_fee_per_gas_gwei: u64,
}

fn default_gas_limit() -> u64 {
    300_000
}
fn default_max_fee_per_gas_gwei() -> u64 {
    30
}

impl NetworkConfig {
    fn evm(name: &str, endpoint: &str, chain_id: u64, explorer: &str, gwei: u64) -> Self {
        Self {
            name: name.into(),
            http_endpoint: endpoint.into(),
            network_id: chain_id.to_string(),
            explorer_base_url: explorer.into(),
            contract_address: None,
            gas_limit: default_gas_limit(),
            max_fee_per_gas_gwei: gwei,
        }
    }

    fn algorand(name: &str, endpoint: &str, genesis_id: &str, explorer: &str) -> Self {
        Self {
            name: name.into(),
            http_endpoint: endpoint.into(),
            network_id: genesis_id.into(),
            explorer_base_url: explorer.into(),
            contract_address: None,
            gas_limit: 0,
            max_fee_per_gas_gwei: 0,
        }
    }

    pub fn ethereum_mainnet() -> Self {
        Self::evm(
            "Ethereum Mainnet",
            "https://eth-mainnet.g.alchemy.com/v2/your-api-key",
            1,
            "https://etherscan.io",
            30,
        )
    }

    pub fn ethereum_sepolia() -> Self {
        Self::evm(
            "Sepolia Testnet",
            "https://eth-sepolia.g.alchemy.com/v2/your-api-key",
            11_155_111,
            "https://sepolia.etherscan.io",
            30,
        )
    }

    pub fn polygon_mainnet() -> Self {
        Self::evm(
            "Polygon",
            "https://polygon-rpc.com",
            137,
            "https://polygonscan.com",
            50,
        )
    }

    pub fn polygon_mumbai() -> Self {
        Self::evm(
            "Mumbai Testnet",
            "https://rpc-mumbai.maticvigil.com",
            80_001,
            "https://mumbai.polygonscan.com",
            50,
        )
    }

    pub fn algorand_mainnet() -> Self {
        Self::algorand(
            "Algorand Mainnet",
            "https://mainnet-api.4160.nodely.dev",
            "mainnet-v1.0",
            "https://algoexplorer.io",
        )
    }

    pub fn algorand_testnet() -> Self {
        Self::algorand(
            "Algorand Testnet",
            "https://testnet-api.4160.nodely.dev",
            "testnet-v1.0",
            "https://testnet.algoexplorer.io",
        )
    }

    pub fn algorand_betanet() -> Self {
        Self::algorand(
            "Algorand Betanet",
            "https://betanet-api.4160.nodely.dev",
            "betanet-v1.0",
            "https://betanet.algoexplorer.io",
        )
    }

    /// Look up a built-in preset by its short name.
    pub fn preset(name: &str) -> Result<Self, CoreError> {
        match name {
            "ethereum" | "mainnet" => Ok(Self::ethereum_mainnet()),
            "sepolia" => Ok(Self::ethereum_sepolia()),
            "polygon" => Ok(Self::polygon_mainnet()),
            "mumbai" => Ok(Self::polygon_mumbai()),
            "algorand-mainnet" => Ok(Self::algorand_mainnet()),
            "algorand" | "algorand-testnet" => Ok(Self::algorand_testnet()),
            "algorand-betanet" => Ok(Self::algorand_betanet()),
            other => Err(CoreError::UnknownNetwork(other.to_string())),
        }
    }

    /// Default network for each blockchain.
    pub fn default_for(blockchain: Blockchain) -> Self {
        match blockchain {
            Blockchain::Ethereum => Self::ethereum_mainnet(),
            Blockchain::Polygon => Self::polygon_mainnet(),
            Blockchain::Algorand => Self::algorand_testnet(),
        }
    }

    /// Explorer link for a transaction.
    pub fn explorer_tx_url(&self, tx_id: &str) -> String {
        format!("{}/tx/{}", self.explorer_base_url.trim_end_matches('/'), tx_id)
    }

    /// Explorer link for an account or contract.
    pub fn explorer_address_url(&self, address: &str) -> String {
        format!("{}/address/{}", self.explorer_base_url.trim_end_matches('/'), address)
    }

    /// Explorer link for an Algorand application.
    pub fn explorer_application_url(&self, app_id: u64) -> String {
        format!("{}/application/{}", self.explorer_base_url.trim_end_matches('/'), app_id)
    }

    /// Max fee per gas in wei.
    pub fn max_fee_per_gas_wei(&self) -> u128 {
        self.max_fee_per_gas_gwei as u128 * 1_000_000_000
    }

    /// EVM chain id, if `network_id` is numeric.
    pub fn chain_id(&self) -> Option<u64> {
        self.network_id.parse().ok()
    }
}

/// One network per supported blockchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworksConfig {
    #[serde(default = "NetworkConfig::ethereum_mainnet")]
    pub ethereum: NetworkConfig,
    #[serde(default = "NetworkConfig::polygon_mainnet")]
    pub polygon: NetworkConfig,
    #[serde(default = "NetworkConfig::algorand_testnet")]
    pub algorand: NetworkConfig,
}

impl NetworksConfig {
    pub fn get(&self, blockchain: Blockchain) -> &NetworkConfig {
        match blockchain {
            Blockchain::Ethereum => &self.ethereum,
            Blockchain::Polygon => &self.polygon,
            Blockchain::Algorand => &self.algorand,
        }
    }

    pub fn get_mut(&mut self, blockchain: Blockchain) -> &mut NetworkConfig {
        match blockchain {
            Blockchain::Ethereum => &mut self.ethereum,
            Blockchain::Polygon => &mut self.polygon,
            Blockchain::Algorand => &mut self.algorand,
        }
    }
}

impl Default for NetworksConfig {
    fn default() -> Self {
        Self {
            ethereum: NetworkConfig::ethereum_mainnet(),
            polygon: NetworkConfig::polygon_mainnet(),
            algorand: NetworkConfig::algorand_testnet(),
        }
    }
}

/// Bounds for waiting on transaction finality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Rounds to wait for an Algorand transaction.
    #[serde(default = "default_algorand_rounds")]
    pub algorand_rounds: u32,
    /// Confirmations before an EVM contract deployment is final.
    #[serde(default = "default_evm_deployment_confirmations")]
    pub evm_deployment_confirmations: u64,
    /// Confirmations before an EVM registry call is final.
    #[serde(default = "default_evm_call_confirmations")]
    pub evm_call_confirmations: u64,
    /// Polling attempts for EVM receipts.
    #[serde(default = "default_evm_max_attempts")]
    pub evm_max_attempts: u32,
    /// Delay between polls, milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Multiplier applied to the delay after each poll (1.0 = fixed interval).
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Upper bound for the delay between polls, milliseconds.
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,
}

fn default_algorand_rounds() -> u32 {
    4
}
fn default_evm_deployment_confirmations() -> u64 {
    6
}
fn default_evm_call_confirmations() -> u64 {
    1
}
fn default_evm_max_attempts() -> u32 {
    30
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_backoff_factor() -> f64 {
    1.0
}
fn default_max_poll_interval_ms() -> u64 {
    15_000
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            algorand_rounds: default_algorand_rounds(),
            evm_deployment_confirmations: default_evm_deployment_confirmations(),
            evm_call_confirmations: default_evm_call_confirmations(),
            evm_max_attempts: default_evm_max_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            backoff_factor: default_backoff_factor(),
            max_poll_interval_ms: default_max_poll_interval_ms(),
        }
    }
}

/// Settlement engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Platform fee in basis points, applied by newly deployed registries.
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u16,
    /// Chain selected at startup.
    #[serde(default = "default_chain")]
    pub default_chain: Blockchain,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub networks: NetworksConfig,
}

fn default_fee_bps() -> u16 {
    DEFAULT_FEE_BPS
}
fn default_chain() -> Blockchain {
    Blockchain::Ethereum
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fee_bps: default_fee_bps(),
            default_chain: default_chain(),
            confirmation: ConfirmationConfig::default(),
            networks: NetworksConfig::default(),
        }
    }
}
