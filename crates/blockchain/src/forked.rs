use std::{collections::BTreeMap, num::NonZeroU64, sync::Arc};

use devnet_block_api::{
    Block as _, BlockConfig, BlockReceipt, LocalBlock, SyncBlock,
    log::{FilterLog, LogFilter},
};
use devnet_block_storage::{ReservableSparseBlockStorage, ReservationParams};
use devnet_defaults::SAFE_BLOCK_DEPTH;
use devnet_hardfork::{
    Hardfork, RuleSelector,
    chains::{chain_base_fee_params, chain_config},
    eip1559::BaseFeeParams,
};
use devnet_primitives::B256;
use devnet_rpc_client::{ForkMetadata, RemoteChainSource, RpcClientError};
use devnet_state_api::{DynState, StateDiff, irregular::StateOverride};
use devnet_state_fork::ForkState;
use devnet_utils::random::RandomHashGenerator;
use parking_lot::Mutex;

use crate::{
    Blockchain, BlockchainError, BlockchainMut, RemoteBlockchain, utils::compute_state_at_block,
    validate_next_block,
};

/// An error that occurs upon creation of a [`ForkedBlockchain`].
#[derive(Debug, thiserror::Error)]
pub enum ForkedBlockchainCreationError {
    /// Error converting the fork block
    #[error(transparent)]
    Blockchain(#[from] BlockchainError),
    /// JSON-RPC error
    #[error(transparent)]
    RpcClient(#[from] RpcClientError),
    /// The requested block number does not exist
    #[error(
        "Trying to initialize a provider with block {fork_block_number} but the current block is {latest_block_number}"
    )]
    InvalidBlockNumber {
        /// Requested fork block number
        fork_block_number: u64,
        /// Latest block number
        latest_block_number: u64,
    },
    /// The detected hardfork is not supported
    #[error(
        "Cannot fork {chain_name} from block {fork_block_number}. The hardfork must be at least Spurious Dragon, but {hardfork} was detected."
    )]
    InvalidHardfork {
        /// Name of the chain
        chain_name: String,
        /// Fork block number
        fork_block_number: u64,
        /// Detected hardfork
        hardfork: Hardfork,
    },
    /// The remote does not know the fork block
    #[error("The remote does not know block {block_number}.")]
    MissingForkBlock {
        /// Fork block number
        block_number: u64,
    },
}

/// The side of the fork that stores a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockSource {
    /// The block was mined locally, after the fork block.
    Local,
    /// The block is part of the remote chain's history, up to and including
    /// the fork block.
    Remote,
}

/// A blockchain that forks a remote chain at a fixed block number. Blocks up to
/// and including the fork block are read from the remote, all later blocks
/// are local.
#[derive(Debug)]
pub struct ForkedBlockchain {
    local_storage: ReservableSparseBlockStorage,
    remote: RemoteBlockchain,
    state_root_generator: Arc<Mutex<RandomHashGenerator>>,
    fork_block_number: u64,
    base_fee_params: BaseFeeParams,
    /// The chain ID of new blocks is either the local override or the chain
    /// ID of the remote.
    chain_id: u64,
    /// The chain ID of the remote, which may deviate from `chain_id`.
    remote_chain_id: u64,
    network_id: u64,
    rule_selector: RuleSelector,
}

impl ForkedBlockchain {
    /// Constructs a new instance that forks the provided remote source.
    ///
    /// When no fork block number is provided, the latest block that is deep
    /// enough to be considered immutable is used.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn new(
        source: Arc<dyn RemoteChainSource>,
        state_root_generator: Arc<Mutex<RandomHashGenerator>>,
        hardfork: Hardfork,
        fork_block_number: Option<u64>,
        chain_id_override: Option<u64>,
    ) -> Result<Self, ForkedBlockchainCreationError> {
        let ForkMetadata {
            chain_id: remote_chain_id,
            network_id,
            latest_block_number,
        } = source.metadata()?;

        let recommended_block_number = recommended_fork_block_number(latest_block_number);

        let fork_block_number = if let Some(fork_block_number) = fork_block_number {
            if fork_block_number > latest_block_number {
                return Err(ForkedBlockchainCreationError::InvalidBlockNumber {
                    fork_block_number,
                    latest_block_number,
                });
            }

            if fork_block_number > recommended_block_number {
                let num_confirmations = latest_block_number - fork_block_number + 1;
                let required_confirmations = SAFE_BLOCK_DEPTH + 1;
                let missing_confirmations = required_confirmations - num_confirmations;

                log::warn!(
                    "You are forking from block {fork_block_number} which has less than {required_confirmations} confirmations, and will affect the node's performance. Please use block number {recommended_block_number} or wait for the block to get {missing_confirmations} more confirmations."
                );
            }

            fork_block_number
        } else {
            recommended_block_number
        };

        let remote = RemoteBlockchain::new(source);
        let fork_block = remote
            .block_by_number(fork_block_number)
            .map_err(ForkedBlockchainCreationError::Blockchain)?
            .ok_or(ForkedBlockchainCreationError::MissingForkBlock {
                block_number: fork_block_number,
            })?;

        let chain_config = chain_config(remote_chain_id);
        let hardfork_activations = chain_config
            .map(|config| &config.hardfork_activations)
            .filter(|activations| !activations.is_empty());

        if let Some(remote_hardfork) = hardfork_activations.and_then(|activations| {
            activations.hardfork_at_block(fork_block_number, fork_block.header().timestamp)
        }) && remote_hardfork < Hardfork::SpuriousDragon
        {
            return Err(ForkedBlockchainCreationError::InvalidHardfork {
                chain_name: chain_config
                    .map_or_else(|| "unknown".to_owned(), |config| config.name.clone()),
                fork_block_number,
                hardfork: remote_hardfork,
            });
        }

        log::debug!(
            "Forking chain {remote_chain_id} at block {fork_block_number} (latest: {latest_block_number})"
        );

        Ok(Self {
            local_storage: ReservableSparseBlockStorage::empty(fork_block_number),
            remote,
            state_root_generator,
            fork_block_number,
            base_fee_params: chain_base_fee_params(remote_chain_id).clone(),
            chain_id: chain_id_override.unwrap_or(remote_chain_id),
            remote_chain_id,
            network_id,
            rule_selector: RuleSelector::forked(
                hardfork,
                remote_chain_id,
                fork_block_number,
                hardfork_activations.cloned(),
            ),
        })
    }

    /// Returns the block number of the fork block.
    pub fn fork_block_number(&self) -> u64 {
        self.fork_block_number
    }

    /// Returns the chain ID of the remote chain.
    pub fn remote_chain_id(&self) -> u64 {
        self.remote_chain_id
    }

    /// Returns the remote source.
    pub fn remote_source(&self) -> &Arc<dyn RemoteChainSource> {
        self.remote.source()
    }

    /// Returns the generator of state roots for modified fork states.
    pub fn state_root_generator(&self) -> &Arc<Mutex<RandomHashGenerator>> {
        &self.state_root_generator
    }

    /// Determines which side of the fork answers queries for the block with
    /// the provided number.
    pub fn resolve(&self, block_number: u64) -> BlockSource {
        if block_number <= self.fork_block_number {
            BlockSource::Remote
        } else {
            BlockSource::Local
        }
    }
}

impl Blockchain for ForkedBlockchain {
    fn base_fee_params(&self) -> &BaseFeeParams {
        &self.base_fee_params
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn block_by_hash(&self, hash: &B256) -> Result<Option<Arc<dyn SyncBlock>>, BlockchainError> {
        if let Some(block) = self.local_storage.block_by_hash(hash) {
            return Ok(Some(block));
        }

        Ok(self
            .remote
            .block_by_hash(hash)?
            .filter(|block| block.header().number <= self.fork_block_number)
            .map(|block| -> Arc<dyn SyncBlock> { block }))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn block_by_number(&self, number: u64) -> Result<Option<Arc<dyn SyncBlock>>, BlockchainError> {
        match self.resolve(number) {
            BlockSource::Remote => Ok(self
                .remote
                .block_by_number(number)?
                .map(|block| -> Arc<dyn SyncBlock> { block })),
            BlockSource::Local => Ok(self
                .local_storage
                .block_by_number(number)?
                .map(|block| -> Arc<dyn SyncBlock> { block })),
        }
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn block_by_transaction_hash(
        &self,
        transaction_hash: &B256,
    ) -> Result<Option<Arc<dyn SyncBlock>>, BlockchainError> {
        if let Some(block) = self.local_storage.block_by_transaction_hash(transaction_hash) {
            return Ok(Some(block));
        }

        let Some(receipt) = self.receipt_by_transaction_hash(transaction_hash)? else {
            return Ok(None);
        };

        Ok(self
            .remote
            .block_by_hash(&receipt.block_hash)?
            .map(|block| -> Arc<dyn SyncBlock> { block }))
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn chain_id_at_block_number(&self, block_number: u64) -> Result<u64, BlockchainError> {
        if block_number > self.last_block_number() {
            return Err(BlockchainError::UnknownBlockNumber);
        }

        match self.resolve(block_number) {
            BlockSource::Remote => Ok(self.remote_chain_id),
            BlockSource::Local => Ok(self.chain_id),
        }
    }

    fn hardfork(&self) -> Hardfork {
        self.rule_selector.local_hardfork()
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn hardfork_at_block_number(&self, block_number: u64) -> Result<Hardfork, BlockchainError> {
        if block_number > self.last_block_number() {
            return Err(BlockchainError::UnknownBlockNumber);
        }

        let timestamp = match self.resolve(block_number) {
            BlockSource::Remote => {
                self.remote
                    .block_by_number(block_number)?
                    .ok_or(BlockchainError::UnknownBlockNumber)?
                    .header()
                    .timestamp
            }
            // Local blocks use the local hardfork, regardless of timestamp.
            BlockSource::Local => 0,
        };

        Ok(self.rule_selector.hardfork_at(block_number, timestamp)?)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn last_block(&self) -> Result<Arc<dyn SyncBlock>, BlockchainError> {
        self.block_by_number(self.last_block_number())?
            .ok_or(BlockchainError::UnknownBlockNumber)
    }

    fn last_block_number(&self) -> u64 {
        self.local_storage.last_block_number()
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn logs(&self, filter: &LogFilter) -> Result<Vec<FilterLog>, BlockchainError> {
        let from_block = *filter.block_range.start();
        let to_block = *filter.block_range.end();

        let mut logs = Vec::new();

        if from_block <= self.fork_block_number {
            let remote_filter = LogFilter {
                block_range: from_block..=to_block.min(self.fork_block_number),
                ..filter.clone()
            };

            logs.extend(self.remote.logs(&remote_filter)?);
        }

        if to_block > self.fork_block_number {
            let local_filter = LogFilter {
                block_range: from_block.max(self.fork_block_number + 1)..=to_block,
                ..filter.clone()
            };

            logs.extend(self.local_storage.logs(&local_filter));
        }

        Ok(logs)
    }

    fn network_id(&self) -> u64 {
        self.network_id
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn receipt_by_transaction_hash(
        &self,
        transaction_hash: &B256,
    ) -> Result<Option<Arc<BlockReceipt>>, BlockchainError> {
        if let Some(receipt) = self
            .local_storage
            .receipt_by_transaction_hash(transaction_hash)
        {
            return Ok(Some(receipt));
        }

        // Transactions mined by the remote after the fork block are not part
        // of this chain.
        Ok(self
            .remote
            .receipt_by_transaction_hash(transaction_hash)?
            .filter(|receipt| receipt.block_number <= self.fork_block_number))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn state_at_block_number(
        &self,
        block_number: u64,
        state_overrides: &BTreeMap<u64, StateOverride>,
    ) -> Result<Box<dyn DynState>, BlockchainError> {
        if block_number > self.last_block_number() {
            return Err(BlockchainError::UnknownBlockNumber);
        }

        let state_root = if let Some(state_override) = state_overrides.get(&block_number) {
            state_override.state_root
        } else {
            self.block_by_number(block_number)?
                .ok_or(BlockchainError::UnknownBlockNumber)?
                .header()
                .state_root
        };

        let mut state = ForkState::new(
            self.remote.source().clone(),
            self.state_root_generator.clone(),
            block_number.min(self.fork_block_number),
            state_root,
        )?;

        let (first_block_number, last_block_number) = match self.resolve(block_number) {
            // Only override the state at the requested remote block
            BlockSource::Remote => (block_number, block_number),
            // Override blocks between the fork block and the requested block
            BlockSource::Local => (self.fork_block_number, block_number),
        };

        compute_state_at_block(
            &mut state,
            &self.local_storage,
            first_block_number,
            last_block_number,
            state_overrides,
        );

        // Override the state root in case the local state was modified
        state.set_state_root(state_root)?;

        Ok(Box::new(state))
    }
}

impl BlockchainMut for ForkedBlockchain {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn insert_block(
        &mut self,
        block: LocalBlock,
        state_diff: StateDiff,
    ) -> Result<Arc<dyn SyncBlock>, BlockchainError> {
        let last_block = self.last_block()?;

        validate_next_block(last_block.as_ref(), &block)?;

        let block: Arc<dyn SyncBlock> = self
            .local_storage
            .insert_block(block, state_diff)?
            .clone();

        Ok(block)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn reserve_blocks(&mut self, additional: u64, interval: u64) -> Result<(), BlockchainError> {
        let Some(additional) = NonZeroU64::new(additional) else {
            return Ok(());
        };

        let last_block = self.last_block()?;
        let last_header = last_block.header();

        self.local_storage.reserve_blocks(
            additional,
            ReservationParams {
                interval,
                previous_base_fee_per_gas: last_header.base_fee_per_gas,
                previous_state_root: last_header.state_root,
                previous_timestamp: last_header.timestamp,
                previous_gas_limit: last_header.gas_limit,
                coinbase: last_header.beneficiary,
                block_config: BlockConfig {
                    base_fee_params: self.base_fee_params.clone(),
                    hardfork: self.rule_selector.local_hardfork(),
                },
            },
        );

        Ok(())
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn revert_to_block(&mut self, block_number: u64) -> Result<(), BlockchainError> {
        match block_number.cmp(&self.fork_block_number) {
            std::cmp::Ordering::Less => Err(BlockchainError::CannotDeleteRemote),
            std::cmp::Ordering::Equal => {
                self.local_storage = ReservableSparseBlockStorage::empty(self.fork_block_number);

                Ok(())
            }
            std::cmp::Ordering::Greater => {
                if self.local_storage.revert_to_block(block_number) {
                    Ok(())
                } else {
                    Err(BlockchainError::UnknownBlockNumber)
                }
            }
        }
    }
}

/// Determines the recommended block number for forking a chain, based on the
/// latest block number.
///
/// If no block is deep enough to be considered immutable, the latest block
/// number is used, as such a young chain is most likely a devnet.
fn recommended_fork_block_number(latest_block_number: u64) -> u64 {
    latest_block_number
        .checked_sub(SAFE_BLOCK_DEPTH)
        .unwrap_or(latest_block_number)
}
