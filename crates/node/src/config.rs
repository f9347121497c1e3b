use std::{
    num::{NonZeroU64, NonZeroUsize},
    time::{Duration, SystemTime},
};

use devnet_hardfork::Hardfork;
use devnet_miner::MineOrdering;
use devnet_primitives::{Address, Bytes, HashMap, U256};
use devnet_transaction::signature::SecretKey;
use serde::{Deserialize, Serialize};

/// Configuration of an account in the genesis state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisAccount {
    /// The account's balance.
    pub balance: U256,
    /// The account's nonce. Ignored when forking.
    #[serde(default)]
    pub nonce: u64,
    /// The account's code. Ignored when forking.
    #[serde(default)]
    pub code: Bytes,
    /// The account's storage.
    #[serde(default)]
    pub storage: HashMap<U256, U256>,
}

/// An account whose secret key is held by the node, so it can sign
/// transactions on the account's behalf.
#[derive(Clone, Debug)]
pub struct OwnedAccount {
    /// The account's secret key.
    pub secret_key: SecretKey,
    /// The account's balance in the genesis state.
    pub balance: U256,
}

/// Configuration for forking a remote chain.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkConfig {
    /// URL of the remote's JSON-RPC endpoint.
    pub url: String,
    /// The block to fork from. Defaults to the most recent block that is
    /// considered safe from reorgs.
    pub block_number: Option<u64>,
    /// Extra headers sent along with each request.
    pub http_headers: Option<std::collections::HashMap<String, String>>,
}

/// Configuration for the node's mempool.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemPoolConfig {
    /// Order in which pending transactions are mined.
    pub order: MineOrdering,
}

/// Configuration for the node's miner.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningConfig {
    /// Whether every submitted transaction is mined immediately.
    pub auto_mine: bool,
    /// Mempool configuration
    pub mem_pool: MemPoolConfig,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            auto_mine: true,
            mem_pool: MemPoolConfig::default(),
        }
    }
}

/// Tuning of the gas estimation search.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimationConfig {
    /// The first probe of the search is capped at this multiple of the
    /// lower bound.
    pub optimistic_multiplier: u64,
    /// Maximum number of probes of the search.
    pub max_iterations: usize,
    /// Pairs of `(lower bound threshold, tolerance)`, ordered by decreasing
    /// threshold. The search stops once the interval is narrower than the
    /// tolerance of the first threshold that the lower bound reaches.
    pub tolerance: Vec<(u64, u64)>,
}

impl GasEstimationConfig {
    /// Tolerance of the search interval for the provided lower bound.
    pub fn tolerance_at(&self, lower_bound: u64) -> u64 {
        self.tolerance
            .iter()
            .find(|(threshold, _)| lower_bound >= *threshold)
            .map_or(0, |(_, tolerance)| *tolerance)
    }
}

impl Default for GasEstimationConfig {
    fn default() -> Self {
        Self {
            optimistic_multiplier: 3,
            max_iterations: 20,
            tolerance: vec![
                (4_000_000, 50_000),
                (1_000_000, 10_000),
                (100_000, 1_000),
                (50_000, 500),
                (30_000, 300),
                (0, 200),
            ],
        }
    }
}

/// Configuration for the node
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Accounts whose secret keys are held by the node
    pub accounts: Vec<OwnedAccount>,
    /// Whether consecutive blocks may share a timestamp
    pub allow_blocks_with_same_timestamp: bool,
    /// Whether the contract size limit is lifted
    pub allow_unlimited_contract_size: bool,
    /// Gas limit of mined blocks
    pub block_gas_limit: NonZeroU64,
    /// Chain ID of mined blocks
    pub chain_id: u64,
    /// Recipient of the fees of mined blocks
    pub coinbase: Address,
    /// Time after which a polled filter that was not polled is removed
    pub filter_timeout: Duration,
    /// The remote chain to fork, if any
    pub fork: Option<ForkConfig>,
    /// Tuning of gas estimation
    pub gas_estimation: GasEstimationConfig,
    /// Accounts of the genesis state. When forking, these override the
    /// balances of remote accounts.
    pub genesis_state: HashMap<Address, GenesisAccount>,
    /// Hardfork of mined blocks
    pub hardfork: Hardfork,
    /// Base fee of the genesis block, or of the first block after the fork
    pub initial_base_fee_per_gas: Option<u128>,
    /// Timestamp of the genesis block. Shifts the node's clock.
    pub initial_date: Option<SystemTime>,
    /// Maximum number of block states kept in memory
    pub max_cached_states: NonZeroUsize,
    /// Minimum gas price of mined transactions, before London
    pub min_gas_price: u128,
    /// Mining configuration
    pub mining: MiningConfig,
    /// Network ID reported to clients
    pub network_id: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            allow_blocks_with_same_timestamp: false,
            allow_unlimited_contract_size: false,
            block_gas_limit: NonZeroU64::new(devnet_defaults::BLOCK_GAS_LIMIT)
                .expect("constant is non-zero"),
            chain_id: devnet_defaults::CHAIN_ID,
            coinbase: Address::ZERO,
            filter_timeout: devnet_defaults::FILTER_TIMEOUT,
            fork: None,
            gas_estimation: GasEstimationConfig::default(),
            genesis_state: HashMap::default(),
            hardfork: Hardfork::default(),
            initial_base_fee_per_gas: None,
            initial_date: None,
            max_cached_states: NonZeroUsize::new(devnet_defaults::MAX_CACHED_STATES)
                .expect("constant is non-zero"),
            min_gas_price: 0,
            mining: MiningConfig::default(),
            network_id: devnet_defaults::CHAIN_ID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_scales_with_lower_bound() {
        let config = GasEstimationConfig::default();

        assert_eq!(config.tolerance_at(21_000), 200);
        assert_eq!(config.tolerance_at(30_000), 300);
        assert_eq!(config.tolerance_at(75_000), 500);
        assert_eq!(config.tolerance_at(999_999), 1_000);
        assert_eq!(config.tolerance_at(2_000_000), 10_000);
        assert_eq!(config.tolerance_at(30_000_000), 50_000);
    }

    #[test]
    fn mining_defaults_to_auto_mine_with_priority_order() {
        let config = MiningConfig::default();

        assert!(config.auto_mine);
        assert_eq!(config.mem_pool.order, MineOrdering::Priority);
    }
}
