mod account;
mod call;
mod gas;

use std::{
    cmp::Ordering,
    collections::BTreeMap,
    num::NonZeroU64,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use devnet_block_api::{
    Block as _, BlockConfig, BlockHeader, BlockReceipt, GenesisBlockOptions, HeaderOverrides,
    LocalBlock, SyncBlock, calculate_next_base_fee_per_gas,
    log::{FilterLog, LogFilter, bloom_contains_log_filter, filter_logs},
};
use devnet_blockchain::{
    Blockchain as _, BlockchainError, BlockchainMut as _, ForkedBlockchain, LocalBlockchain,
    SyncBlockchain,
};
use devnet_executor::{ExecutionFlags, ExecutionResult, Trace, TransactionExecutor};
use devnet_hardfork::{Hardfork, chains::chain_base_fee_params, eip1559::INITIAL_BASE_FEE};
use devnet_mem_pool::{MemPool, OrderedTransaction, account_next_nonce};
use devnet_miner::{BuiltBlockAndState, miner_reward};
use devnet_primitives::{Address, B256, Bytes, HashMap, HashSet, KECCAK_EMPTY, U64, U256};
use devnet_rpc_client::{
    BlockingRpcClient, HeaderMap, RemoteChainSource, RpcClient, types::FeeHistoryResult,
};
use devnet_state_api::{
    AccountModifierFn, DynState, State as _, StateDebug as _, StateDiff,
    account::{Account, AccountInfo},
    irregular::{IrregularState, StateOverride},
    r#override::{StateOverrides, StateRefOverrider},
};
use devnet_transaction::{Signed, initial_cost, validate};
use devnet_utils::random::RandomHashGenerator;
use indexmap::IndexMap;
use lru::LruCache;
use parking_lot::Mutex;
use rpds::HashTrieMapSync;
use tokio::runtime;

use self::{
    account::{InitialAccounts, create_accounts},
    call::{RunCallArgs, run_call},
    gas::{CheckGasLimitArgs, binary_search_estimation, check_gas_limit, compute_rewards},
};
use crate::{
    block_spec::BlockSpec,
    config::NodeConfig,
    error::{CreationError, EstimateGasFailure, NodeError, TransactionFailure},
    filter::{Filter, FilterChanges, FilterCriteria, FilterData, FilterKind},
    request::{
        CallRequest, DEFAULT_MAX_PRIORITY_FEE_PER_GAS, RequestDefaults, ResolvedRequest,
        TransactionRequest, resolve_call_request, resolve_transaction_request,
    },
    snapshot::Snapshot,
    subscribe::{SubscriptionEvent, SubscriptionEventData, SubscriptionSender},
    time::{CurrentTime, TimeSinceEpoch},
};

/// Gas price suggested before London.
const DEFAULT_GAS_PRICE: u128 = 8_000_000_000;

/// The result of executing a transaction as a call.
#[derive(Clone, Debug)]
pub struct CallResult {
    /// Result of the execution
    pub execution_result: ExecutionResult,
    /// Trace of the execution
    pub trace: Trace,
}

/// The result of estimating the gas of a transaction.
#[derive(Clone, Debug)]
pub struct EstimateGasResult {
    /// The estimated gas limit
    pub estimation: u64,
    /// Traces of all probing executions
    pub traces: Vec<Trace>,
}

/// The result of mining and committing a block.
#[derive(Clone, Debug)]
pub struct MineBlockResult {
    /// The mined block
    pub block: Arc<dyn SyncBlock>,
    /// Results of the block's transactions
    pub transaction_results: Vec<ExecutionResult>,
    /// Traces of the block's transactions
    pub transaction_traces: Vec<Trace>,
}

impl MineBlockResult {
    /// Whether the block contains the transaction with the provided hash.
    pub fn has_transaction(&self, transaction_hash: &B256) -> bool {
        self.block.transaction_hashes().contains(transaction_hash)
    }
}

/// The result of sending a transaction.
#[derive(Clone, Debug)]
pub struct SendTransactionResult {
    /// Hash of the sent transaction
    pub transaction_hash: B256,
    /// Blocks that were mined while sending the transaction. Empty when
    /// auto-mining is disabled.
    pub mining_results: Vec<MineBlockResult>,
}

impl SendTransactionResult {
    /// The result and trace of the sent transaction, if it was mined.
    pub fn transaction_result_and_trace(&self) -> Option<(&ExecutionResult, &Trace)> {
        self.mining_results.iter().find_map(|result| {
            let index = result
                .block
                .transaction_hashes()
                .iter()
                .position(|hash| *hash == self.transaction_hash)?;

            result
                .transaction_results
                .get(index)
                .zip(result.transaction_traces.get(index))
        })
    }
}

/// A transaction with the block that contains it, if it was mined.
#[derive(Clone, Debug)]
pub struct TransactionAndBlock {
    /// The transaction
    pub transaction: Signed,
    /// The block that contains the transaction, if it was mined
    pub block_data: Option<BlockDataForTransaction>,
    /// Whether the transaction is still in the mempool
    pub is_pending: bool,
}

/// Block data of a mined transaction.
#[derive(Clone, Debug)]
pub struct BlockDataForTransaction {
    /// The block that contains the transaction
    pub block: Arc<dyn SyncBlock>,
    /// Index of the transaction in the block
    pub transaction_index: u64,
}

/// Metadata of the remote chain that the node forked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForkMetadata {
    /// Chain ID of the remote chain
    pub chain_id: u64,
    /// Number of the block that was forked
    pub fork_block_number: u64,
    /// Hash of the block that was forked
    pub fork_block_hash: B256,
}

/// The block in which a closure passed to
/// [`NodeData::execute_in_block_context`] runs.
pub struct BlockContext<'context> {
    /// Header of the block
    pub header: &'context BlockHeader,
    /// State after the block
    pub state: &'context dyn DynState,
}

/// The rules under which transactions execute on top of a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ExecutionRules {
    hardfork: Hardfork,
    chain_id: u64,
}

/// Identifies a state in the node's state cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct StateId(u64);

impl StateId {
    /// Increments the [`StateId`] and returns the new value.
    fn increment(&mut self) -> Self {
        self.0 += 1;

        *self
    }
}

/// The state of a development node. Every node operation is a method on this
/// aggregate.
pub struct NodeData<TimerT: Clone + TimeSinceEpoch = CurrentTime> {
    config: NodeConfig,
    blockchain: Box<dyn SyncBlockchain>,
    executor: Arc<dyn TransactionExecutor>,
    irregular_state: IrregularState,
    mem_pool: MemPool,
    beneficiary: Address,
    fork_metadata: Option<ForkMetadata>,
    remote_source: Option<Arc<dyn RemoteChainSource>>,
    is_auto_mining: bool,
    prev_randao_generator: RandomHashGenerator,
    parent_beacon_block_root_generator: RandomHashGenerator,
    block_time_offset_seconds: i64,
    next_block_base_fee_per_gas: Option<u128>,
    next_block_timestamp: Option<u64>,
    next_snapshot_id: u64,
    snapshots: BTreeMap<u64, Snapshot>,
    local_accounts: IndexMap<Address, k256::SecretKey>,
    impersonated_accounts: HashSet<Address>,
    filters: HashMap<U256, Filter>,
    last_filter_id: U256,
    subscriber: Option<SubscriptionSender>,
    timer: TimerT,
    // We need the Arc to let us avoid returning references to the cache entries which need &mut
    // self to get.
    block_state_cache: LruCache<StateId, Arc<Box<dyn DynState>>>,
    current_state_id: StateId,
    block_number_to_state_id: HashTrieMapSync<u64, StateId>,
}

impl<TimerT: Clone + TimeSinceEpoch> NodeData<TimerT> {
    /// Constructs a node. When the configuration contains a fork
    /// configuration, the remote chain is queried using the provided runtime.
    pub fn new(
        runtime: runtime::Handle,
        config: NodeConfig,
        executor: Arc<dyn TransactionExecutor>,
        subscriber: Option<SubscriptionSender>,
        timer: TimerT,
    ) -> Result<Self, CreationError> {
        let remote_source = config
            .fork
            .as_ref()
            .map(|fork_config| -> Result<Arc<dyn RemoteChainSource>, CreationError> {
                let http_headers = fork_config
                    .http_headers
                    .as_ref()
                    .map(|headers| {
                        HeaderMap::try_from(headers)
                            .map_err(|error| CreationError::InvalidHttpHeaders(error.to_string()))
                    })
                    .transpose()?;

                let rpc_client = RpcClient::new(&fork_config.url, http_headers)?;

                Ok(Arc::new(BlockingRpcClient::new(
                    Arc::new(rpc_client),
                    runtime.clone(),
                )))
            })
            .transpose()?;

        Self::with_remote_source(config, remote_source, executor, subscriber, timer)
    }

    /// Constructs a node that forks the provided remote source, if any. The
    /// fork block number is taken from the fork configuration.
    pub fn with_remote_source(
        config: NodeConfig,
        remote_source: Option<Arc<dyn RemoteChainSource>>,
        executor: Arc<dyn TransactionExecutor>,
        subscriber: Option<SubscriptionSender>,
        timer: TimerT,
    ) -> Result<Self, CreationError> {
        let InitialAccounts {
            local_accounts,
            genesis_state,
        } = create_accounts(&config);

        let BlockchainAndState {
            blockchain,
            fork_metadata,
            remote_source,
            state,
            irregular_state,
            prev_randao_generator,
            block_time_offset_seconds,
            next_block_base_fee_per_gas,
        } = create_blockchain_and_state(&config, &timer, genesis_state, remote_source)?;

        let mut block_state_cache = LruCache::new(config.max_cached_states);
        let mut block_number_to_state_id = HashTrieMapSync::default();

        let current_state_id = StateId::default();
        block_state_cache.push(current_state_id, Arc::new(state));
        block_number_to_state_id.insert_mut(blockchain.last_block_number(), current_state_id);

        let mut mem_pool = MemPool::new(config.block_gas_limit);
        mem_pool.set_min_gas_price(config.min_gas_price);

        Ok(Self {
            beneficiary: config.coinbase,
            is_auto_mining: config.mining.auto_mine,
            blockchain,
            executor,
            irregular_state,
            mem_pool,
            fork_metadata,
            remote_source,
            prev_randao_generator,
            parent_beacon_block_root_generator: RandomHashGenerator::with_seed(
                devnet_defaults::BEACON_ROOT_SEED,
            ),
            block_time_offset_seconds,
            next_block_base_fee_per_gas,
            next_block_timestamp: None,
            // Start with 1 to mimic Ganache
            next_snapshot_id: 1,
            snapshots: BTreeMap::new(),
            local_accounts,
            impersonated_accounts: HashSet::default(),
            filters: HashMap::default(),
            last_filter_id: U256::ZERO,
            subscriber,
            timer,
            block_state_cache,
            current_state_id,
            block_number_to_state_id,
            config,
        })
    }

    /// Returns the addresses of the accounts whose secret keys are held by
    /// the node.
    pub fn accounts(&self) -> impl Iterator<Item = &Address> {
        self.local_accounts.keys()
    }

    /// Returns the balance of the account at the provided block.
    pub fn balance(
        &mut self,
        address: Address,
        block_spec: Option<&BlockSpec>,
    ) -> Result<U256, NodeError> {
        self.execute_in_block_context(block_spec, move |context| -> Result<U256, NodeError> {
            Ok(context
                .state
                .basic(address)?
                .map_or(U256::ZERO, |account| account.balance))
        })?
    }

    /// Returns the block gas limit used for new blocks.
    pub fn block_gas_limit(&self) -> NonZeroU64 {
        self.mem_pool.block_gas_limit()
    }

    /// Fetches the block with the provided hash, if it exists.
    pub fn block_by_hash(&self, block_hash: &B256) -> Result<Option<Arc<dyn SyncBlock>>, NodeError> {
        Ok(self.blockchain.block_by_hash(block_hash)?)
    }

    /// Fetches the block with the provided number, if it exists.
    pub fn block_by_number(&self, block_number: u64) -> Result<Option<Arc<dyn SyncBlock>>, NodeError> {
        Ok(self.blockchain.block_by_number(block_number)?)
    }

    /// Fetches a block by block spec. Returns `None` for the pending block.
    ///
    /// Fails with [`NodeError::InvalidBlockNumberOrHash`] if the block does
    /// not exist and with [`NodeError::InvalidBlockTag`] if a safe or
    /// finalized block is requested before the merge.
    pub fn block_by_block_spec(
        &self,
        block_spec: &BlockSpec,
    ) -> Result<Option<Arc<dyn SyncBlock>>, NodeError> {
        let block = match block_spec {
            BlockSpec::Number(block_number) => Some(
                self.blockchain
                    .block_by_number(*block_number)?
                    .ok_or_else(|| self.invalid_block_spec(block_spec))?,
            ),
            BlockSpec::Hash(block_hash) => Some(
                self.blockchain
                    .block_by_hash(block_hash)?
                    .ok_or_else(|| self.invalid_block_spec(block_spec))?,
            ),
            BlockSpec::Earliest => Some(
                self.blockchain
                    .block_by_number(0)?
                    .ok_or_else(|| self.invalid_block_spec(block_spec))?,
            ),
            BlockSpec::Safe | BlockSpec::Finalized => {
                self.validate_post_merge_block_tag(block_spec)?;

                Some(self.blockchain.last_block()?)
            }
            BlockSpec::Latest => Some(self.blockchain.last_block()?),
            BlockSpec::Pending => None,
        };

        Ok(block)
    }

    /// Resolves a block spec to a block number. Returns `None` for the
    /// pending block.
    pub fn block_number_by_block_spec(&self, block_spec: &BlockSpec) -> Result<Option<u64>, NodeError> {
        let block_number = match block_spec {
            BlockSpec::Number(block_number) => Some(*block_number),
            BlockSpec::Hash(block_hash) => Some(
                self.blockchain
                    .block_by_hash(block_hash)?
                    .ok_or_else(|| self.invalid_block_spec(block_spec))?
                    .header()
                    .number,
            ),
            BlockSpec::Earliest => Some(0),
            BlockSpec::Safe | BlockSpec::Finalized => {
                self.validate_post_merge_block_tag(block_spec)?;

                Some(self.blockchain.last_block_number())
            }
            BlockSpec::Latest => Some(self.blockchain.last_block_number()),
            BlockSpec::Pending => None,
        };

        Ok(block_number)
    }

    /// Returns the chain ID of new blocks.
    pub fn chain_id(&self) -> u64 {
        self.blockchain.chain_id()
    }

    /// Returns the code of the account at the provided block.
    pub fn code(&mut self, address: Address, block_spec: Option<&BlockSpec>) -> Result<Bytes, NodeError> {
        self.execute_in_block_context(block_spec, move |context| -> Result<Bytes, NodeError> {
            let code = match context.state.basic(address)? {
                Some(account) if account.code_hash != KECCAK_EMPTY => match account.code {
                    Some(code) => code,
                    None => context.state.code_by_hash(account.code_hash)?,
                },
                _ => Bytes::new(),
            };

            Ok(code)
        })?
    }

    /// Returns the recipient of the fees of new blocks.
    pub fn coinbase(&self) -> Address {
        self.beneficiary
    }

    /// Removes a transaction from the mempool. Returns whether the
    /// transaction was pooled.
    ///
    /// Fails if the transaction was already mined.
    pub fn drop_transaction(&mut self, transaction_hash: &B256) -> Result<bool, NodeError> {
        if self.mem_pool.remove_transaction(transaction_hash).is_some() {
            log::debug!("Dropped transaction {transaction_hash} from the mempool");
            return Ok(true);
        }

        if self
            .blockchain
            .receipt_by_transaction_hash(transaction_hash)?
            .is_some()
        {
            return Err(NodeError::InvalidDropTransactionHash(*transaction_hash));
        }

        Ok(false)
    }

    /// Returns the metadata of the forked chain, if the node is forking.
    pub fn fork_metadata(&self) -> Option<&ForkMetadata> {
        self.fork_metadata.as_ref()
    }

    /// Returns the gas price that is suggested for new transactions.
    pub fn gas_price(&self) -> Result<u128, NodeError> {
        self.next_gas_price()
    }

    /// Returns the hardfork of new blocks.
    pub fn hardfork(&self) -> Hardfork {
        self.blockchain.hardfork()
    }

    /// Allows sending transactions on behalf of the account without its
    /// secret key.
    pub fn impersonate_account(&mut self, address: Address) {
        self.impersonated_accounts.insert(address);
    }

    /// Increases the offset of the node's clock, returning the new offset in
    /// seconds.
    pub fn increase_time(&mut self, increment: u64) -> i64 {
        self.block_time_offset_seconds += i64::try_from(increment).expect("increment too large");
        self.block_time_offset_seconds
    }

    /// Returns whether every submitted transaction is mined immediately.
    pub fn is_auto_mining(&self) -> bool {
        self.is_auto_mining
    }

    /// Returns the most recent block.
    pub fn last_block(&self) -> Result<Arc<dyn SyncBlock>, NodeError> {
        Ok(self.blockchain.last_block()?)
    }

    /// Returns the number of the most recent block.
    pub fn last_block_number(&self) -> u64 {
        self.blockchain.last_block_number()
    }

    /// Returns the logs that match the provided criteria. An unspecified
    /// `to_block` stands for the latest block.
    pub fn logs(&self, criteria: FilterCriteria) -> Result<Vec<FilterLog>, NodeError> {
        let filter = self.log_filter(criteria, false)?;

        Ok(self.blockchain.logs(&filter)?)
    }

    /// Returns the network ID.
    pub fn network_id(&self) -> u64 {
        self.blockchain.network_id()
    }

    /// Returns the nonce of the account at the provided block. For the
    /// pending block, this is the account's next nonce, including pooled
    /// transactions.
    pub fn nonce(&mut self, address: &Address, block_spec: Option<&BlockSpec>) -> Result<u64, NodeError> {
        if matches!(block_spec, Some(BlockSpec::Pending)) {
            let state = self.current_state()?;
            return Ok(account_next_nonce(&self.mem_pool, &**state, address)?);
        }

        let address = *address;
        self.execute_in_block_context(block_spec, move |context| -> Result<u64, NodeError> {
            Ok(context
                .state
                .basic(address)?
                .map_or(0, |account| account.nonce))
        })?
    }

    /// Returns the transactions in the mempool, both pending and queued.
    pub fn pending_transactions(&self) -> impl Iterator<Item = &Signed> {
        self.mem_pool.transactions()
    }

    /// Returns the receipt of the transaction with the provided hash, if it
    /// was mined.
    pub fn receipt_by_transaction_hash(
        &self,
        transaction_hash: &B256,
    ) -> Result<Option<Arc<BlockReceipt>>, NodeError> {
        Ok(self
            .blockchain
            .receipt_by_transaction_hash(transaction_hash)?)
    }

    /// Enables or disables auto-mining.
    pub fn set_auto_mining(&mut self, enabled: bool) {
        self.is_auto_mining = enabled;
    }

    /// Sets the recipient of the fees of new blocks.
    pub fn set_coinbase(&mut self, coinbase: Address) {
        self.beneficiary = coinbase;
    }

    /// Sets the offset of the node's clock such that the current time equals
    /// the provided timestamp.
    pub fn set_time(&mut self, timestamp: u64) -> i64 {
        let now = i64::try_from(self.timer.since_epoch()).expect("timestamp too large");
        self.block_time_offset_seconds =
            i64::try_from(timestamp).expect("timestamp too large") - now;

        self.block_time_offset_seconds
    }

    /// Stops impersonating the account. Returns whether the account was
    /// impersonated.
    pub fn stop_impersonating_account(&mut self, address: &Address) -> bool {
        self.impersonated_accounts.remove(address)
    }

    /// Returns the value of the storage slot at the provided block.
    pub fn storage_at(
        &mut self,
        address: Address,
        index: U256,
        block_spec: Option<&BlockSpec>,
    ) -> Result<U256, NodeError> {
        self.execute_in_block_context(block_spec, move |context| -> Result<U256, NodeError> {
            Ok(context.state.storage(address, index)?)
        })?
    }

    /// Fetches the transaction with the provided hash, from the mempool or
    /// the blockchain.
    pub fn transaction_by_hash(
        &self,
        transaction_hash: &B256,
    ) -> Result<Option<TransactionAndBlock>, NodeError> {
        if let Some(transaction) = self
            .mem_pool
            .transaction_by_hash(transaction_hash)
            .map(OrderedTransaction::pending)
        {
            return Ok(Some(TransactionAndBlock {
                transaction: transaction.clone(),
                block_data: None,
                is_pending: true,
            }));
        }

        let Some(block) = self
            .blockchain
            .block_by_transaction_hash(transaction_hash)?
        else {
            return Ok(None);
        };

        let Some(receipt) = self
            .blockchain
            .receipt_by_transaction_hash(transaction_hash)?
        else {
            return Ok(None);
        };

        let transaction_index = receipt.transaction_index;
        let transaction = usize::try_from(transaction_index)
            .ok()
            .and_then(|index| block.transactions().get(index))
            .cloned();

        Ok(transaction.map(|transaction| TransactionAndBlock {
            transaction,
            block_data: Some(BlockDataForTransaction {
                block,
                transaction_index,
            }),
            is_pending: false,
        }))
    }
}

// Snapshots
impl<TimerT: Clone + TimeSinceEpoch> NodeData<TimerT> {
    /// Captures the node's observable state, returning the ID of the
    /// snapshot.
    pub fn make_snapshot(&mut self) -> u64 {
        let id = self.next_snapshot_id;
        self.next_snapshot_id += 1;

        let snapshot = Snapshot {
            block_number: self.blockchain.last_block_number(),
            block_number_to_state_id: self.block_number_to_state_id.clone(),
            block_time_offset_seconds: self.block_time_offset_seconds,
            coinbase: self.beneficiary,
            irregular_state: self.irregular_state.clone(),
            mem_pool: self.mem_pool.clone(),
            next_block_base_fee_per_gas: self.next_block_base_fee_per_gas,
            next_block_timestamp: self.next_block_timestamp,
            parent_beacon_block_root_generator: self.parent_beacon_block_root_generator.clone(),
            prev_randao_generator: self.prev_randao_generator.clone(),
            time: self.timer.since_epoch(),
        };
        self.snapshots.insert(id, snapshot);

        log::debug!("Created snapshot {id} at block {}", self.blockchain.last_block_number());

        id
    }

    /// Restores the node to the snapshot with the provided ID. Returns
    /// whether the snapshot existed.
    ///
    /// The snapshot and all snapshots taken after it are consumed.
    pub fn revert_to_snapshot(&mut self, snapshot_id: u64) -> bool {
        // Snapshots are single-use, so newer snapshots are discarded as well
        let mut removed_snapshots = self.snapshots.split_off(&snapshot_id);

        let Some(snapshot) = removed_snapshots.remove(&snapshot_id) else {
            return false;
        };

        let Snapshot {
            block_number,
            block_number_to_state_id,
            block_time_offset_seconds,
            coinbase,
            irregular_state,
            mem_pool,
            next_block_base_fee_per_gas,
            next_block_timestamp,
            parent_beacon_block_root_generator,
            prev_randao_generator,
            time,
        } = snapshot;

        self.block_number_to_state_id = block_number_to_state_id;

        // We compute a new offset such that:
        // now + new_offset == snapshot_time + old_offset
        let elapsed_seconds = self.timer.since_epoch().saturating_sub(time);
        self.block_time_offset_seconds = block_time_offset_seconds
            - i64::try_from(elapsed_seconds).expect("duration too large");

        self.beneficiary = coinbase;
        self.blockchain
            .revert_to_block(block_number)
            .expect("Snapshotted block should exist");

        self.irregular_state = irregular_state;
        self.mem_pool = mem_pool;
        self.next_block_base_fee_per_gas = next_block_base_fee_per_gas;
        self.next_block_timestamp = next_block_timestamp;
        self.parent_beacon_block_root_generator = parent_beacon_block_root_generator;
        self.prev_randao_generator = prev_randao_generator;

        log::debug!("Reverted to snapshot {snapshot_id} at block {block_number}");

        true
    }
}

// Filters
impl<TimerT: Clone + TimeSinceEpoch> NodeData<TimerT> {
    /// Installs a filter for new blocks, returning its ID.
    pub fn add_block_filter(&mut self, is_subscription: bool) -> Result<U256, NodeError> {
        let block_hash = *self.blockchain.last_block()?.block_hash();

        let filter_id = self.next_filter_id();
        self.filters.insert(
            filter_id,
            Filter::new_block_filter(
                block_hash,
                self.timer.since_epoch(),
                self.config.filter_timeout,
                is_subscription,
            ),
        );

        Ok(filter_id)
    }

    /// Installs a filter for logs matching the provided criteria, returning
    /// its ID. An unspecified `to_block` matches all future blocks.
    pub fn add_log_filter(
        &mut self,
        criteria: FilterCriteria,
        is_subscription: bool,
    ) -> Result<U256, NodeError> {
        let criteria = self.log_filter(criteria, true)?;

        let logs = if is_subscription {
            Vec::new()
        } else {
            self.blockchain.logs(&self.clamp_to_last_block(&criteria))?
        };

        let filter_id = self.next_filter_id();
        self.filters.insert(
            filter_id,
            Filter::new_log_filter(
                criteria,
                logs,
                self.timer.since_epoch(),
                self.config.filter_timeout,
                is_subscription,
            ),
        );

        Ok(filter_id)
    }

    /// Installs a filter for transactions added to the mempool, returning
    /// its ID.
    pub fn add_pending_transaction_filter(&mut self, is_subscription: bool) -> U256 {
        let filter_id = self.next_filter_id();
        self.filters.insert(
            filter_id,
            Filter::new_pending_transaction_filter(
                self.timer.since_epoch(),
                self.config.filter_timeout,
                is_subscription,
            ),
        );

        filter_id
    }

    /// Drains the events that the filter collected since it was last polled.
    pub fn get_filter_changes(&mut self, filter_id: &U256) -> Result<FilterChanges, NodeError> {
        let now = self.timer.since_epoch();

        self.filters
            .get_mut(filter_id)
            .filter(|filter| !filter.is_subscription)
            .map(|filter| filter.take_events(now))
            .ok_or(NodeError::InvalidFilterId(*filter_id))
    }

    /// Returns all logs that match the criteria of the log filter, up to the
    /// latest block.
    pub fn get_filter_logs(&mut self, filter_id: &U256) -> Result<Vec<FilterLog>, NodeError> {
        let now = self.timer.since_epoch();

        let filter = self
            .filters
            .get_mut(filter_id)
            .filter(|filter| !filter.is_subscription)
            .ok_or(NodeError::InvalidFilterId(*filter_id))?;

        let FilterData::Logs { criteria, .. } = &filter.data else {
            return Err(NodeError::InvalidFilterKind {
                filter_id: *filter_id,
                expected: FilterKind::Logs,
                actual: filter.data.kind(),
            });
        };

        let criteria = criteria.clone();
        filter.refresh(now);

        Ok(self.blockchain.logs(&self.clamp_to_last_block(&criteria))?)
    }

    /// Uninstalls a polled filter. Returns whether the filter existed.
    pub fn remove_filter(&mut self, filter_id: &U256) -> bool {
        self.remove_filter_impl::<false>(filter_id)
    }

    /// Uninstalls a subscription. Returns whether the subscription existed.
    pub fn remove_subscription(&mut self, filter_id: &U256) -> bool {
        self.remove_filter_impl::<true>(filter_id)
    }

    fn remove_filter_impl<const IS_SUBSCRIPTION: bool>(&mut self, filter_id: &U256) -> bool {
        if let Some(filter) = self.filters.get(filter_id) {
            filter.is_subscription == IS_SUBSCRIPTION && self.filters.remove(filter_id).is_some()
        } else {
            false
        }
    }

    fn next_filter_id(&mut self) -> U256 {
        self.last_filter_id = self
            .last_filter_id
            .checked_add(U256::from(1))
            .expect("filter id starts at zero, so it'll never overflow for U256");
        self.last_filter_id
    }

    /// Converts user criteria into a [`LogFilter`]. An unspecified `to_block`
    /// stands for all future blocks if `is_open_ended`, and for the latest
    /// block otherwise.
    fn log_filter(&self, criteria: FilterCriteria, is_open_ended: bool) -> Result<LogFilter, NodeError> {
        let FilterCriteria {
            from_block,
            to_block,
            addresses,
            topics,
        } = criteria;

        let last_block_number = self.blockchain.last_block_number();
        let resolve = |block_spec: &BlockSpec| -> Result<u64, NodeError> {
            Ok(self
                .block_number_by_block_spec(block_spec)?
                .unwrap_or(last_block_number))
        };

        let from_block = from_block
            .as_ref()
            .map_or(Ok(last_block_number), resolve)?;

        let to_block = match to_block.as_ref() {
            Some(block_spec) => resolve(block_spec)?,
            None if is_open_ended => u64::MAX,
            None => last_block_number,
        };

        Ok(LogFilter {
            block_range: from_block..=to_block,
            addresses,
            normalized_topics: topics,
        })
    }

    fn clamp_to_last_block(&self, filter: &LogFilter) -> LogFilter {
        let to_block = (*filter.block_range.end()).min(self.blockchain.last_block_number());

        LogFilter {
            block_range: *filter.block_range.start()..=to_block,
            ..filter.clone()
        }
    }

    /// Notifies filters about a transaction that was added to the mempool.
    fn notify_subscribers_about_pending_transaction(&mut self, transaction_hash: &B256) {
        let now = self.timer.since_epoch();

        for (filter_id, filter) in self.filters.iter_mut() {
            if let FilterData::NewPendingTransactions(events) = &mut filter.data {
                if filter.is_subscription {
                    send_subscription_event(
                        self.subscriber.as_ref(),
                        SubscriptionEvent {
                            filter_id: *filter_id,
                            result: SubscriptionEventData::NewPendingTransactions(
                                *transaction_hash,
                            ),
                        },
                    );
                    filter.refresh(now);
                } else {
                    events.push(*transaction_hash);
                }
            }
        }
    }

    /// Notifies filters about a mined block and removes expired filters.
    fn notify_subscribers_about_mined_block(
        &mut self,
        block: &Arc<dyn SyncBlock>,
    ) -> Result<(), BlockchainError> {
        let now = self.timer.since_epoch();

        for (filter_id, filter) in self.filters.iter_mut() {
            match &mut filter.data {
                FilterData::Logs { criteria, logs } => {
                    let bloom = &block.header().logs_bloom;
                    if bloom_contains_log_filter(bloom, criteria) {
                        let receipts = block.fetch_transaction_receipts()?;
                        let new_logs = receipts.iter().flat_map(|receipt| receipt.logs.iter());

                        let mut filtered_logs = filter_logs(new_logs, criteria);
                        if filter.is_subscription {
                            if !filtered_logs.is_empty() {
                                send_subscription_event(
                                    self.subscriber.as_ref(),
                                    SubscriptionEvent {
                                        filter_id: *filter_id,
                                        result: SubscriptionEventData::Logs(filtered_logs),
                                    },
                                );
                                filter.refresh(now);
                            }
                        } else {
                            logs.append(&mut filtered_logs);
                        }
                    }
                }
                FilterData::NewHeads(block_hashes) => {
                    if filter.is_subscription {
                        send_subscription_event(
                            self.subscriber.as_ref(),
                            SubscriptionEvent {
                                filter_id: *filter_id,
                                result: SubscriptionEventData::NewHeads(block.clone()),
                            },
                        );
                        filter.refresh(now);
                    } else {
                        block_hashes.push(*block.block_hash());
                    }
                }
                FilterData::NewPendingTransactions(_) => (),
            }
        }

        // Remove outdated filters
        self.filters.retain(|filter_id, filter| {
            let has_expired = filter.has_expired(now);
            if has_expired {
                log::debug!("Removed expired filter {filter_id}");
            }

            !has_expired
        });

        Ok(())
    }
}

// Time and fees
impl<TimerT: Clone + TimeSinceEpoch> NodeData<TimerT> {
    /// Sets the base fee of the next block.
    ///
    /// Fails before London.
    pub fn set_next_block_base_fee_per_gas(&mut self, base_fee_per_gas: u128) -> Result<(), NodeError> {
        let hardfork = self.blockchain.hardfork();
        if hardfork < Hardfork::London {
            return Err(NodeError::SetNextBlockBaseFeePerGasUnsupported { hardfork });
        }

        self.next_block_base_fee_per_gas = Some(base_fee_per_gas);

        Ok(())
    }

    /// Pins the timestamp of the next block.
    ///
    /// Fails if the timestamp is lower than the latest block's, or equal to
    /// it unless blocks with the same timestamp are allowed.
    pub fn set_next_block_timestamp(&mut self, timestamp: u64) -> Result<u64, NodeError> {
        let latest_block = self.blockchain.last_block()?;
        let latest_timestamp = latest_block.header().timestamp;

        match timestamp.cmp(&latest_timestamp) {
            Ordering::Less => Err(NodeError::TimestampLowerThanPrevious {
                proposed: timestamp,
                previous: latest_timestamp,
            }),
            Ordering::Equal if !self.config.allow_blocks_with_same_timestamp => {
                Err(NodeError::TimestampEqualsPrevious {
                    proposed: timestamp,
                })
            }
            Ordering::Equal | Ordering::Greater => {
                self.next_block_timestamp = Some(timestamp);
                Ok(timestamp)
            }
        }
    }

    /// Returns the base fee of the next block, or `None` before London.
    pub fn next_block_base_fee_per_gas(&self) -> Result<Option<u128>, NodeError> {
        if self.blockchain.hardfork() < Hardfork::London {
            return Ok(None);
        }

        if let Some(base_fee_per_gas) = self.next_block_base_fee_per_gas {
            return Ok(Some(base_fee_per_gas));
        }

        let last_block = self.blockchain.last_block()?;
        let base_fee_per_gas = calculate_next_base_fee_per_gas(
            last_block.header(),
            self.blockchain.base_fee_params(),
            self.blockchain.hardfork(),
        );

        Ok(Some(base_fee_per_gas))
    }

    /// Returns the fee history of up to `block_count` blocks, ending with the
    /// provided block. Blocks before the fork are retrieved from the remote
    /// chain.
    ///
    /// Fails before London.
    pub fn fee_history(
        &mut self,
        block_count: u64,
        newest_block_spec: &BlockSpec,
        reward_percentiles: Option<Vec<f64>>,
    ) -> Result<FeeHistoryResult, NodeError> {
        let hardfork = self.blockchain.hardfork();
        if hardfork < Hardfork::London {
            return Err(NodeError::UnmetHardfork {
                actual: hardfork,
                minimum: Hardfork::London,
            });
        }

        let latest_block_number = self.blockchain.last_block_number();
        let pending_block_number = latest_block_number + 1;
        let newest_block_number = self
            .block_by_block_spec(newest_block_spec)?
            // None if pending block
            .map_or(pending_block_number, |block| block.header().number);

        let oldest_block_number = newest_block_number.saturating_sub(block_count.saturating_sub(1));
        let last_block_number = newest_block_number + 1;

        let pending_block = if last_block_number >= pending_block_number {
            Some(self.mine_pending_block()?)
        } else {
            None
        };

        let mut result = FeeHistoryResult {
            oldest_block: U64::from(oldest_block_number),
            base_fee_per_gas: Vec::new(),
            gas_used_ratio: Vec::new(),
            reward: reward_percentiles.as_ref().map(|_| Vec::new()),
        };

        let mut first_local_block_number = oldest_block_number;
        if let Some(ForkMetadata {
            fork_block_number, ..
        }) = self.fork_metadata
        {
            if oldest_block_number <= fork_block_number {
                let last_remote_block_number = fork_block_number.min(newest_block_number);
                let remote_block_count = last_remote_block_number - oldest_block_number + 1;

                let remote_source = self
                    .remote_source
                    .as_ref()
                    .expect("a forked node has a remote source");

                let remote_result = remote_source.fee_history(
                    remote_block_count,
                    last_remote_block_number,
                    reward_percentiles.clone().unwrap_or_default(),
                )?;

                result.base_fee_per_gas = remote_result.base_fee_per_gas;
                result.gas_used_ratio = remote_result.gas_used_ratio;
                if let Some(remote_reward) = remote_result.reward {
                    result.reward = Some(remote_reward);
                }

                first_local_block_number = last_remote_block_number + 1;

                // The remote includes the base fee of the block after its range
                if first_local_block_number <= last_block_number {
                    result.base_fee_per_gas.pop();
                }
            }
        }

        for block_number in first_local_block_number..=last_block_number {
            if block_number < pending_block_number {
                let block = self
                    .blockchain
                    .block_by_number(block_number)?
                    .expect("block numbers up to the latest block exist");
                let header = block.header();

                result
                    .base_fee_per_gas
                    .push(U256::from(header.base_fee_per_gas.unwrap_or_default()));

                if block_number < last_block_number {
                    result
                        .gas_used_ratio
                        .push(gas::gas_used_ratio(header.gas_used, header.gas_limit));

                    if let Some(reward_percentiles) = &reward_percentiles {
                        let rewards = compute_rewards(block.as_ref(), reward_percentiles)?;
                        result.reward.get_or_insert_with(Vec::new).push(rewards);
                    }
                }
            } else if block_number == pending_block_number {
                let pending_block = pending_block
                    .as_ref()
                    .expect("pending block is mined when it is part of the range");
                let header = pending_block.block.header();

                result
                    .base_fee_per_gas
                    .push(U256::from(header.base_fee_per_gas.unwrap_or_default()));

                if block_number < last_block_number {
                    result
                        .gas_used_ratio
                        .push(gas::gas_used_ratio(header.gas_used, header.gas_limit));

                    if let Some(reward_percentiles) = &reward_percentiles {
                        result
                            .reward
                            .get_or_insert_with(Vec::new)
                            .push(reward_percentiles.iter().map(|_| U256::ZERO).collect());
                    }
                }
            } else if block_number == pending_block_number + 1 {
                let pending_block = pending_block
                    .as_ref()
                    .expect("pending block is mined when it is part of the range");

                let base_fee_per_gas = calculate_next_base_fee_per_gas(
                    pending_block.block.header(),
                    self.blockchain.base_fee_params(),
                    hardfork,
                );

                result.base_fee_per_gas.push(U256::from(base_fee_per_gas));
            }
        }

        Ok(result)
    }

    fn next_gas_price(&self) -> Result<u128, NodeError> {
        let gas_price = match self.next_block_base_fee_per_gas()? {
            Some(base_fee_per_gas) => base_fee_per_gas + DEFAULT_MAX_PRIORITY_FEE_PER_GAS,
            None => DEFAULT_GAS_PRICE.max(self.mem_pool.min_gas_price()),
        };

        Ok(gas_price)
    }

    /// Computes the timestamp of the next block and, if it deviates from the
    /// node's clock, the clock offset that makes it the current time.
    fn next_block_timestamp(&self, timestamp: Option<u64>) -> Result<(u64, Option<i64>), NodeError> {
        let latest_block = self.blockchain.last_block()?;
        let latest_timestamp = latest_block.header().timestamp;

        let current_timestamp = i64::try_from(self.timer.since_epoch()).expect("timestamp too large");

        let (mut block_timestamp, mut new_offset) = if let Some(timestamp) = timestamp {
            if timestamp < latest_timestamp {
                return Err(NodeError::TimestampLowerThanPrevious {
                    proposed: timestamp,
                    previous: latest_timestamp,
                });
            }

            let offset = i64::try_from(timestamp).expect("timestamp too large") - current_timestamp;
            (timestamp, Some(offset))
        } else if let Some(next_block_timestamp) = self.next_block_timestamp {
            let offset = i64::try_from(next_block_timestamp).expect("timestamp too large")
                - current_timestamp;

            (next_block_timestamp, Some(offset))
        } else {
            let next_timestamp = u64::try_from(current_timestamp + self.block_time_offset_seconds)
                .expect("timestamp must be positive");

            (next_timestamp, None)
        };

        let timestamp_needs_increase = block_timestamp == latest_timestamp
            && !self.config.allow_blocks_with_same_timestamp;
        if timestamp_needs_increase {
            block_timestamp += 1;
            if new_offset.is_none() {
                new_offset = Some(self.block_time_offset_seconds + 1);
            }
        }

        Ok((block_timestamp, new_offset))
    }
}

// Direct state modification
impl<TimerT: Clone + TimeSinceEpoch> NodeData<TimerT> {
    /// Sets the balance of the account.
    pub fn set_balance(&mut self, address: Address, balance: U256) -> Result<(), NodeError> {
        let mut modified_state = (*self.current_state()?).clone();
        let account_info = modified_state.modify_account(
            address,
            AccountModifierFn::new(Box::new(move |account_balance, _, _| {
                *account_balance = balance;
            })),
        )?;

        self.commit_direct_modification(modified_state, |diff| {
            diff.apply_account_change(address, account_info);
        })
    }

    /// Sets the code of the account.
    pub fn set_code(&mut self, address: Address, code: Bytes) -> Result<(), NodeError> {
        let mut modified_state = (*self.current_state()?).clone();
        let account_info = modified_state.modify_account(
            address,
            AccountModifierFn::new(Box::new(move |_, _, account_code| {
                *account_code = Some(code.clone());
            })),
        )?;

        self.commit_direct_modification(modified_state, |diff| {
            diff.apply_account_change(address, account_info);
        })
    }

    /// Sets the nonce of the account.
    ///
    /// Fails if the mempool holds transactions or if the nonce would
    /// decrease.
    pub fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<(), NodeError> {
        if self.mem_pool.has_transactions() {
            return Err(NodeError::SetAccountNonceWithPendingTransactions);
        }

        let previous_nonce = self
            .current_state()?
            .basic(address)?
            .map_or(0, |account| account.nonce);

        if nonce < previous_nonce {
            return Err(NodeError::SetAccountNonceLowerThanCurrent {
                previous: previous_nonce,
                proposed: nonce,
            });
        }

        let mut modified_state = (*self.current_state()?).clone();
        let account_info = modified_state.modify_account(
            address,
            AccountModifierFn::new(Box::new(move |_, account_nonce, _| *account_nonce = nonce)),
        )?;

        self.commit_direct_modification(modified_state, |diff| {
            diff.apply_account_change(address, account_info);
        })
    }

    /// Sets the value of a storage slot of the account.
    pub fn set_account_storage_slot(
        &mut self,
        address: Address,
        index: U256,
        value: U256,
    ) -> Result<(), NodeError> {
        let mut modified_state = (*self.current_state()?).clone();
        modified_state.set_account_storage_slot(address, index, value)?;

        let account_info = modified_state.basic(address)?.unwrap_or_default();

        self.commit_direct_modification(modified_state, |diff| {
            diff.apply_storage_change(address, index, value, account_info);
        })
    }

    /// Sets the minimum gas price that pooled transactions need to be mined.
    ///
    /// Fails from London onwards, where the base fee takes its place.
    pub fn set_min_gas_price(&mut self, min_gas_price: u128) -> Result<(), NodeError> {
        if self.blockchain.hardfork() >= Hardfork::London {
            return Err(NodeError::SetMinGasPriceUnsupported);
        }

        self.mem_pool.set_min_gas_price(min_gas_price);

        Ok(())
    }

    /// Sets the gas limit of new blocks, dropping pooled transactions that no
    /// longer fit.
    pub fn set_block_gas_limit(&mut self, gas_limit: NonZeroU64) -> Result<(), NodeError> {
        let state = self.current_state()?;
        self.mem_pool
            .set_block_gas_limit(&**state, gas_limit)
            .map_err(NodeError::MemPoolUpdate)?;

        Ok(())
    }

    /// Records a direct modification of the latest state as an irregular
    /// state override, revalidates the mempool, and caches the new state.
    fn commit_direct_modification(
        &mut self,
        modified_state: Box<dyn DynState>,
        apply_change: impl FnOnce(&mut StateDiff),
    ) -> Result<(), NodeError> {
        let state_root = modified_state.state_root()?;

        self.mem_pool
            .update(&modified_state)
            .map_err(NodeError::MemPoolUpdate)?;

        let block_number = self.blockchain.last_block_number();
        let state_override = self
            .irregular_state
            .state_override_at_block_number(block_number)
            .or_insert_with(|| StateOverride::with_state_root(state_root));

        state_override.state_root = state_root;
        apply_change(&mut state_override.diff);

        self.add_state_to_cache(modified_state, block_number);

        Ok(())
    }
}

// Execution
impl<TimerT: Clone + TimeSinceEpoch> NodeData<TimerT> {
    /// Runs the provided function in the context of the block, with the
    /// state after that block. The pending block is mined without being
    /// committed. The node's own state is never modified.
    pub fn execute_in_block_context<T>(
        &mut self,
        block_spec: Option<&BlockSpec>,
        function: impl FnOnce(BlockContext<'_>) -> T,
    ) -> Result<T, NodeError> {
        let block_spec = block_spec.unwrap_or(&BlockSpec::Latest);

        let Some(block) = self.block_by_block_spec(block_spec)? else {
            let pending = self.mine_pending_block()?;

            return Ok(function(BlockContext {
                header: pending.block.header(),
                state: &*pending.state,
            }));
        };

        let state = self.get_or_compute_state(block.header().number)?;

        Ok(function(BlockContext {
            header: block.header(),
            state: &**state,
        }))
    }

    /// Resolves the hardfork and chain ID under which transactions execute
    /// on top of the provided block. The pending block follows the local
    /// rules.
    fn execution_rules_at(&self, block_spec: &BlockSpec) -> Result<ExecutionRules, NodeError> {
        let Some(block_number) = self.block_number_by_block_spec(block_spec)? else {
            return Ok(ExecutionRules {
                hardfork: self.blockchain.hardfork(),
                chain_id: self.blockchain.chain_id(),
            });
        };

        let hardfork = self
            .blockchain
            .hardfork_at_block_number(block_number)
            .map_err(|error| self.map_unknown_block_error(error, block_spec))?;
        let chain_id = self
            .blockchain
            .chain_id_at_block_number(block_number)
            .map_err(|error| self.map_unknown_block_error(error, block_spec))?;

        Ok(ExecutionRules { hardfork, chain_id })
    }

    /// Executes the request as a call on top of the provided block, with the
    /// provided state overrides applied.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn run_call(
        &mut self,
        request: CallRequest,
        block_spec: &BlockSpec,
        state_overrides: &StateOverrides,
    ) -> Result<CallResult, NodeError> {
        let caller = request.from.unwrap_or_else(|| self.default_caller());
        let block_gas_limit = self.mem_pool.block_gas_limit().get();
        let executor = self.executor.clone();
        let allow_unlimited_contract_size = self.config.allow_unlimited_contract_size;
        let rules = self.execution_rules_at(block_spec)?;

        self.execute_in_block_context(Some(block_spec), |context| -> Result<CallResult, NodeError> {
            let request = resolve_request_in_context(
                request,
                caller,
                &context,
                rules,
                state_overrides,
                block_gas_limit,
            )?;
            let transaction = request.fake_sign(caller);

            let result = run_call(RunCallArgs {
                executor: executor.as_ref(),
                header: context.header,
                state: context.state,
                state_overrides,
                hardfork: rules.hardfork,
                chain_id: rules.chain_id,
                allow_unlimited_contract_size,
                transaction: &transaction,
            })?;

            Ok(CallResult {
                execution_result: result.result,
                trace: result.trace,
            })
        })?
    }

    /// Estimates the lowest gas limit with which the request succeeds on top
    /// of the provided block.
    ///
    /// Fails with [`EstimateGasFailure`] if the request does not succeed with
    /// its own gas limit, which defaults to the block gas limit.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn estimate_gas(
        &mut self,
        request: CallRequest,
        block_spec: &BlockSpec,
    ) -> Result<EstimateGasResult, NodeError> {
        let caller = request.from.unwrap_or_else(|| self.default_caller());
        let block_gas_limit = self.mem_pool.block_gas_limit().get();
        let executor = self.executor.clone();
        let allow_unlimited_contract_size = self.config.allow_unlimited_contract_size;
        let gas_estimation = self.config.gas_estimation.clone();
        let state_overrides = StateOverrides::default();
        let rules = self.execution_rules_at(block_spec)?;

        self.execute_in_block_context(Some(block_spec), |context| -> Result<EstimateGasResult, NodeError> {
            let request = resolve_request_in_context(
                request,
                caller,
                &context,
                rules,
                &state_overrides,
                block_gas_limit,
            )?;

            let transaction = request.clone().fake_sign(caller);
            let result = run_call(RunCallArgs {
                executor: executor.as_ref(),
                header: context.header,
                state: context.state,
                state_overrides: &state_overrides,
                hardfork: rules.hardfork,
                chain_id: rules.chain_id,
                allow_unlimited_contract_size,
                transaction: &transaction,
            })?;

            if let Some(failure) =
                TransactionFailure::from_execution_result(&result.result, &result.trace)
            {
                return Err(EstimateGasFailure { failure }.into());
            }

            let mut traces = vec![result.trace];

            let args = CheckGasLimitArgs {
                executor: executor.as_ref(),
                header: context.header,
                state: context.state,
                state_overrides: &state_overrides,
                hardfork: rules.hardfork,
                chain_id: rules.chain_id,
                allow_unlimited_contract_size,
                request: &request,
                caller,
            };

            let baseline = initial_cost(&transaction, rules.hardfork);
            if check_gas_limit(&args, baseline, &mut traces)? {
                return Ok(EstimateGasResult {
                    estimation: baseline,
                    traces,
                });
            }

            let estimation = binary_search_estimation(
                &args,
                &gas_estimation,
                baseline,
                request.gas_limit(),
                &mut traces,
            )?;

            Ok(EstimateGasResult { estimation, traces })
        })?
    }

    fn default_caller(&self) -> Address {
        self.local_accounts
            .keys()
            .next()
            .copied()
            .unwrap_or(Address::ZERO)
    }
}

// Transactions
impl<TimerT: Clone + TimeSinceEpoch> NodeData<TimerT> {
    /// Signs the request with the sender's secret key, or fakes its
    /// signature if the sender is impersonated.
    pub fn sign_transaction_request(&mut self, request: TransactionRequest) -> Result<Signed, NodeError> {
        let chain_id = self.blockchain.chain_id();
        if let Some(request_chain_id) = request.chain_id.filter(|id| *id != chain_id) {
            return Err(NodeError::InvalidChainId {
                expected: chain_id,
                actual: request_chain_id,
            });
        }

        let sender = request.from;
        let hardfork = self.blockchain.hardfork();

        let nonce = {
            let state = self.current_state()?;
            account_next_nonce(&self.mem_pool, &**state, &sender)?
        };

        let defaults = RequestDefaults {
            chain_id,
            hardfork,
            gas_limit: self.mem_pool.block_gas_limit().get(),
            nonce,
            gas_price: self.next_gas_price()?,
        };

        let request =
            resolve_transaction_request(request, defaults, self.next_block_base_fee_per_gas()?)?;

        let signed = if self.impersonated_accounts.contains(&sender) {
            request.fake_sign(sender)
        } else {
            let secret_key = self
                .local_accounts
                .get(&sender)
                .ok_or(NodeError::UnknownAddress { address: sender })?;

            request.sign(secret_key)?
        };

        Ok(validate(signed, hardfork)?)
    }

    /// Signs and sends the transaction. When auto-mining, blocks are mined
    /// until the transaction is included and the mempool has no pending
    /// transactions left.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn send_transaction(
        &mut self,
        request: TransactionRequest,
    ) -> Result<SendTransactionResult, NodeError> {
        let transaction = self.sign_transaction_request(request)?;

        self.send_signed_transaction(transaction)
    }

    /// Sends a transaction that was signed elsewhere.
    ///
    /// Fails if the transaction was signed for another chain.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn send_raw_transaction(
        &mut self,
        transaction: Signed,
    ) -> Result<SendTransactionResult, NodeError> {
        if transaction
            .chain_id()
            .is_some_and(|chain_id| chain_id != self.blockchain.chain_id())
        {
            return Err(NodeError::InvalidEip155TransactionChainId);
        }

        let transaction = validate(transaction, self.blockchain.hardfork())?;

        self.send_signed_transaction(transaction)
    }

    fn send_signed_transaction(
        &mut self,
        transaction: Signed,
    ) -> Result<SendTransactionResult, NodeError> {
        if !self.is_auto_mining {
            let transaction_hash = self.add_pending_transaction(transaction)?;

            return Ok(SendTransactionResult {
                transaction_hash,
                mining_results: Vec::new(),
            });
        }

        self.validate_auto_mine_transaction(&transaction)?;

        let transaction_hash = *transaction.transaction_hash();

        if !self.mem_pool.has_transactions() {
            self.notify_subscribers_about_pending_transaction(&transaction_hash);

            let result = self.mine_and_commit_block_impl(
                move |data, overrides| data.mine_block_with_single_transaction(transaction, overrides),
                HeaderOverrides::default(),
            )?;

            return Ok(SendTransactionResult {
                transaction_hash,
                mining_results: vec![result],
            });
        }

        let snapshot_id = self.make_snapshot();

        let result = self.mine_until_included(transaction);
        match result {
            Ok(result) => {
                self.snapshots.remove(&snapshot_id);

                Ok(result)
            }
            Err(error) => {
                self.revert_to_snapshot(snapshot_id);

                Err(error)
            }
        }
    }

    fn mine_until_included(&mut self, transaction: Signed) -> Result<SendTransactionResult, NodeError> {
        let transaction_hash = self.add_pending_transaction(transaction)?;

        let mut mining_results = Vec::new();
        while !mining_results
            .iter()
            .any(|result: &MineBlockResult| result.has_transaction(&transaction_hash))
        {
            mining_results.push(self.mine_and_commit_block(HeaderOverrides::default())?);
        }

        while self.mem_pool.has_pending_transactions() {
            mining_results.push(self.mine_and_commit_block(HeaderOverrides::default())?);
        }

        Ok(SendTransactionResult {
            transaction_hash,
            mining_results,
        })
    }

    fn add_pending_transaction(&mut self, transaction: Signed) -> Result<B256, NodeError> {
        let transaction_hash = *transaction.transaction_hash();

        let state = self.current_state()?;
        self.mem_pool.add_transaction(&**state, transaction)?;

        self.notify_subscribers_about_pending_transaction(&transaction_hash);

        Ok(transaction_hash)
    }

    fn validate_auto_mine_transaction(&mut self, transaction: &Signed) -> Result<(), NodeError> {
        let next_nonce = {
            let state = self.current_state()?;
            account_next_nonce(&self.mem_pool, &**state, transaction.caller())?
        };

        match transaction.nonce().cmp(&next_nonce) {
            Ordering::Less => {
                return Err(NodeError::AutoMineNonceTooLow {
                    expected: next_nonce,
                    actual: transaction.nonce(),
                });
            }
            Ordering::Equal => (),
            Ordering::Greater => {
                return Err(NodeError::AutoMineNonceTooHigh {
                    expected: next_nonce,
                    actual: transaction.nonce(),
                });
            }
        }

        let max_priority_fee_per_gas = transaction
            .max_priority_fee_per_gas()
            .unwrap_or_else(|| transaction.gas_price());

        let min_gas_price = self.mem_pool.min_gas_price();
        if max_priority_fee_per_gas < min_gas_price {
            return Err(NodeError::AutoMinePriorityFeeTooLow {
                expected: min_gas_price,
                actual: max_priority_fee_per_gas,
            });
        }

        if let Some(next_base_fee_per_gas) = self.next_block_base_fee_per_gas()? {
            if let Some(max_fee_per_gas) = transaction.max_fee_per_gas() {
                if max_fee_per_gas < next_base_fee_per_gas {
                    return Err(NodeError::AutoMineMaxFeePerGasTooLow {
                        expected: next_base_fee_per_gas,
                        actual: max_fee_per_gas,
                    });
                }
            } else {
                let gas_price = transaction.gas_price();
                if gas_price < next_base_fee_per_gas {
                    return Err(NodeError::AutoMineGasPriceTooLow {
                        expected: next_base_fee_per_gas,
                        actual: gas_price,
                    });
                }
            }
        }

        Ok(())
    }
}

// Mining
impl<TimerT: Clone + TimeSinceEpoch> NodeData<TimerT> {
    /// Mines a block with transactions from the mempool and commits it.
    /// Unspecified header fields are derived from the node's configuration.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn mine_and_commit_block(
        &mut self,
        overrides: HeaderOverrides,
    ) -> Result<MineBlockResult, NodeError> {
        self.mine_and_commit_block_impl(Self::mine_block_with_mem_pool, overrides)
    }

    /// Mines and commits the provided number of blocks, spaced by the
    /// provided interval in seconds. Empty blocks beyond the first few are
    /// reserved without being built.
    pub fn mine_and_commit_blocks(
        &mut self,
        number_of_blocks: u64,
        interval: u64,
    ) -> Result<Vec<MineBlockResult>, NodeError> {
        use devnet_defaults::MINIMUM_RESERVABLE_BLOCKS;

        if number_of_blocks == 0 {
            return Ok(Vec::new());
        }

        let mine_block_with_interval = |data: &mut NodeData<TimerT>,
                                        mined_blocks: &mut Vec<MineBlockResult>|
         -> Result<(), NodeError> {
            let previous_timestamp = mined_blocks
                .last()
                .expect("at least one block was mined")
                .block
                .header()
                .timestamp;

            let overrides = HeaderOverrides {
                timestamp: Some(previous_timestamp + interval),
                ..HeaderOverrides::default()
            };

            let mined_block = data.mine_and_commit_block(overrides)?;
            mined_blocks.push(mined_block);

            Ok(())
        };

        // Limit the pre-allocated capacity to avoid large allocations
        let mut mined_blocks = Vec::with_capacity(
            usize::try_from(number_of_blocks.min(2 * MINIMUM_RESERVABLE_BLOCKS))
                .expect("capacity is small"),
        );

        // The first block is mined without applying the interval
        mined_blocks.push(self.mine_and_commit_block(HeaderOverrides::default())?);

        while (mined_blocks.len() as u64) < number_of_blocks && self.mem_pool.has_pending_transactions() {
            mine_block_with_interval(self, &mut mined_blocks)?;
        }

        // Mine one more block, so the reservation is surrounded by built blocks
        if (mined_blocks.len() as u64) < number_of_blocks {
            mine_block_with_interval(self, &mut mined_blocks)?;
        }

        let remaining_blocks = number_of_blocks - mined_blocks.len() as u64;

        if remaining_blocks < MINIMUM_RESERVABLE_BLOCKS {
            for _ in 0..remaining_blocks {
                mine_block_with_interval(self, &mut mined_blocks)?;
            }
        } else {
            let current_state = (*self.current_state()?).clone();

            self.blockchain
                .reserve_blocks(remaining_blocks - 1, interval)?;

            // Reserved blocks share the state of the last built block
            self.add_state_to_cache(current_state, self.blockchain.last_block_number());

            let previous_timestamp = self.blockchain.last_block()?.header().timestamp;
            let overrides = HeaderOverrides {
                timestamp: Some(previous_timestamp + interval),
                ..HeaderOverrides::default()
            };

            mined_blocks.push(self.mine_and_commit_block(overrides)?);
        }

        mined_blocks.shrink_to_fit();

        Ok(mined_blocks)
    }

    /// Mines the pending block without committing it.
    pub fn mine_pending_block(&mut self) -> Result<BuiltBlockAndState, NodeError> {
        let (block_timestamp, _new_offset) = self.next_block_timestamp(None)?;

        self.mine_block(
            Self::mine_block_with_mem_pool,
            HeaderOverrides {
                timestamp: Some(block_timestamp),
                ..HeaderOverrides::default()
            },
        )
    }

    fn mine_and_commit_block_impl(
        &mut self,
        mine_fn: impl FnOnce(&mut Self, HeaderOverrides) -> Result<BuiltBlockAndState, NodeError>,
        mut overrides: HeaderOverrides,
    ) -> Result<MineBlockResult, NodeError> {
        let (block_timestamp, new_offset) = self.next_block_timestamp(overrides.timestamp)?;
        overrides.timestamp = Some(block_timestamp);

        let result = self.mine_block(mine_fn, overrides)?;

        let block = self
            .blockchain
            .insert_block(result.block, result.state_diff)?;

        self.mem_pool
            .update(&result.state)
            .map_err(NodeError::MemPoolUpdate)?;

        if let Some(new_offset) = new_offset {
            self.block_time_offset_seconds = new_offset;
        }

        // Overrides only apply to a single block
        self.next_block_base_fee_per_gas.take();
        self.next_block_timestamp.take();

        self.parent_beacon_block_root_generator.next_value();
        self.prev_randao_generator.next_value();

        self.notify_subscribers_about_mined_block(&block)?;

        let block_number = block.header().number;
        self.add_state_to_cache(result.state, block_number);

        log::debug!(
            "Mined block {block_number} with {} transactions",
            block.transactions().len()
        );

        Ok(MineBlockResult {
            block,
            transaction_results: result.transaction_results,
            transaction_traces: result.transaction_traces,
        })
    }

    /// Mines a block with the provided function, filling in the header
    /// fields that were not overridden.
    fn mine_block(
        &mut self,
        mine_fn: impl FnOnce(&mut Self, HeaderOverrides) -> Result<BuiltBlockAndState, NodeError>,
        mut overrides: HeaderOverrides,
    ) -> Result<BuiltBlockAndState, NodeError> {
        overrides.base_fee = overrides.base_fee.or(self.next_block_base_fee_per_gas);
        overrides.beneficiary = Some(overrides.beneficiary.unwrap_or(self.beneficiary));
        overrides.gas_limit = Some(
            overrides
                .gas_limit
                .unwrap_or_else(|| self.mem_pool.block_gas_limit().get()),
        );

        let hardfork = self.blockchain.hardfork();
        if overrides.mix_hash.is_none() && hardfork >= Hardfork::Merge {
            overrides.mix_hash = Some(self.prev_randao_generator.peek());
        }

        if hardfork >= Hardfork::Cancun {
            overrides.parent_beacon_block_root = overrides
                .parent_beacon_block_root
                .or_else(|| Some(self.parent_beacon_block_root_generator.peek()));
        }

        mine_fn(self, overrides)
    }

    fn mine_block_with_mem_pool(
        &mut self,
        overrides: HeaderOverrides,
    ) -> Result<BuiltBlockAndState, NodeError> {
        let state = (*self.current_state()?).clone();
        let reward = miner_reward(self.blockchain.hardfork()).unwrap_or(0);

        let result = devnet_miner::mine_block(
            &*self.blockchain,
            state,
            &self.mem_pool,
            self.executor.as_ref(),
            self.mining_flags(),
            overrides,
            self.config.mining.mem_pool.order,
            reward,
        )?;

        Ok(result)
    }

    fn mine_block_with_single_transaction(
        &mut self,
        transaction: Signed,
        overrides: HeaderOverrides,
    ) -> Result<BuiltBlockAndState, NodeError> {
        let state = (*self.current_state()?).clone();
        let reward = miner_reward(self.blockchain.hardfork()).unwrap_or(0);

        let result = devnet_miner::mine_block_with_single_transaction(
            &*self.blockchain,
            state,
            transaction,
            self.executor.as_ref(),
            self.mining_flags(),
            overrides,
            self.mem_pool.min_gas_price(),
            reward,
        )?;

        Ok(result)
    }

    fn mining_flags(&self) -> ExecutionFlags {
        ExecutionFlags {
            allow_unlimited_contract_size: self.config.allow_unlimited_contract_size,
            ..ExecutionFlags::default()
        }
    }
}

// State cache
impl<TimerT: Clone + TimeSinceEpoch> NodeData<TimerT> {
    fn add_state_to_cache(&mut self, state: Box<dyn DynState>, block_number: u64) -> StateId {
        let state_id = self.current_state_id.increment();
        self.block_state_cache.push(state_id, Arc::new(state));
        self.block_number_to_state_id
            .insert_mut(block_number, state_id);
        state_id
    }

    fn current_state(&mut self) -> Result<Arc<Box<dyn DynState>>, NodeError> {
        self.get_or_compute_state(self.blockchain.last_block_number())
    }

    fn get_or_compute_state(&mut self, block_number: u64) -> Result<Arc<Box<dyn DynState>>, NodeError> {
        if let Some(state_id) = self.block_number_to_state_id.get(&block_number) {
            // `LruCache::try_get_or_insert` needs &mut self, but computing the state needs
            // &self.blockchain.
            if let Some(state) = self.block_state_cache.get(state_id) {
                return Ok(state.clone());
            }
        }

        let state = self
            .blockchain
            .state_at_block_number(block_number, self.irregular_state.state_overrides())?;
        let state_id = self.add_state_to_cache(state, block_number);

        Ok(self
            .block_state_cache
            .get(&state_id)
            // The state was just inserted and we have exclusive access to the cache
            .expect("State must exist")
            .clone())
    }

    fn invalid_block_spec(&self, block_spec: &BlockSpec) -> NodeError {
        NodeError::InvalidBlockNumberOrHash {
            block_spec: block_spec.clone(),
            latest_block_number: self.blockchain.last_block_number(),
        }
    }

    fn map_unknown_block_error(&self, error: BlockchainError, block_spec: &BlockSpec) -> NodeError {
        match error {
            BlockchainError::UnknownBlockNumber => self.invalid_block_spec(block_spec),
            error => NodeError::Blockchain(error),
        }
    }

    fn validate_post_merge_block_tag(&self, block_spec: &BlockSpec) -> Result<(), NodeError> {
        let hardfork = self.blockchain.hardfork();
        if hardfork < Hardfork::Merge {
            return Err(NodeError::InvalidBlockTag {
                block_spec: block_spec.clone(),
                hardfork,
            });
        }

        Ok(())
    }
}

/// Resolves a call request against the block, using the caller's nonce in
/// that block as seen through the state overrides.
fn resolve_request_in_context(
    request: CallRequest,
    caller: Address,
    context: &BlockContext<'_>,
    rules: ExecutionRules,
    state_overrides: &StateOverrides,
    block_gas_limit: u64,
) -> Result<ResolvedRequest, NodeError> {
    let nonce = StateRefOverrider::new(state_overrides, context.state)
        .basic(caller)?
        .map_or(0, |account| account.nonce);

    resolve_call_request(
        request,
        RequestDefaults {
            chain_id: rules.chain_id,
            hardfork: rules.hardfork,
            gas_limit: block_gas_limit,
            nonce,
            gas_price: 0,
        },
    )
}

fn send_subscription_event(subscriber: Option<&SubscriptionSender>, event: SubscriptionEvent) {
    let filter_id = event.filter_id;

    match subscriber {
        Some(subscriber) => {
            if subscriber.send(event).is_err() {
                log::warn!("Subscription {filter_id} has no receiver; the event was dropped");
            }
        }
        None => log::warn!("No subscriber is registered; dropped event of subscription {filter_id}"),
    }
}

struct BlockchainAndState {
    blockchain: Box<dyn SyncBlockchain>,
    fork_metadata: Option<ForkMetadata>,
    remote_source: Option<Arc<dyn RemoteChainSource>>,
    state: Box<dyn DynState>,
    irregular_state: IrregularState,
    prev_randao_generator: RandomHashGenerator,
    block_time_offset_seconds: i64,
    next_block_base_fee_per_gas: Option<u128>,
}

fn create_blockchain_and_state<TimerT: TimeSinceEpoch>(
    config: &NodeConfig,
    timer: &TimerT,
    genesis_state: HashMap<Address, Account>,
    remote_source: Option<Arc<dyn RemoteChainSource>>,
) -> Result<BlockchainAndState, CreationError> {
    let mut prev_randao_generator = RandomHashGenerator::with_seed(devnet_defaults::MIX_HASH_SEED);

    if let Some(remote_source) = remote_source {
        let state_root_generator = Arc::new(Mutex::new(RandomHashGenerator::with_seed(
            devnet_defaults::STATE_ROOT_HASH_SEED,
        )));

        let blockchain = ForkedBlockchain::new(
            remote_source.clone(),
            state_root_generator.clone(),
            config.hardfork,
            config.fork.as_ref().and_then(|fork| fork.block_number),
            Some(config.chain_id),
        )?;

        let fork_block_number = blockchain.fork_block_number();
        let fork_block = blockchain.last_block()?;

        let mut irregular_state = IrregularState::default();
        if !genesis_state.is_empty() {
            let fork_state =
                blockchain.state_at_block_number(fork_block_number, irregular_state.state_overrides())?;

            let state_root = state_root_generator.lock().next_value();
            let state_override = irregular_state
                .state_override_at_block_number(fork_block_number)
                .or_insert_with(|| StateOverride::with_state_root(state_root));

            // Genesis accounts keep the remote nonce and code
            for (address, account) in genesis_state {
                let remote_account = fork_state.basic(address)?.unwrap_or_default();
                let account_info = AccountInfo {
                    balance: account.info.balance,
                    ..remote_account
                };

                state_override
                    .diff
                    .apply_account_change(address, account_info.clone());

                for (index, value) in account.storage {
                    state_override
                        .diff
                        .apply_storage_change(address, index, value, account_info.clone());
                }
            }
        }

        let state =
            blockchain.state_at_block_number(fork_block_number, irregular_state.state_overrides())?;

        let block_time_offset_seconds = if config.initial_date.is_some() {
            block_time_offset_seconds(config, timer)?
        } else {
            let fork_block_time = UNIX_EPOCH + Duration::from_secs(fork_block.header().timestamp);
            offset_since(timer, fork_block_time)
        };

        let next_block_base_fee_per_gas = if config.hardfork >= Hardfork::London {
            config.initial_base_fee_per_gas.or_else(|| {
                fork_block
                    .header()
                    .base_fee_per_gas
                    .is_none()
                    .then_some(u128::from(INITIAL_BASE_FEE))
            })
        } else {
            None
        };

        let fork_metadata = ForkMetadata {
            chain_id: blockchain.remote_chain_id(),
            fork_block_number,
            fork_block_hash: *fork_block.block_hash(),
        };

        log::debug!(
            "Forked chain {} at block {fork_block_number}",
            fork_metadata.chain_id
        );

        Ok(BlockchainAndState {
            blockchain: Box::new(blockchain),
            fork_metadata: Some(fork_metadata),
            remote_source: Some(remote_source),
            state,
            irregular_state,
            prev_randao_generator,
            block_time_offset_seconds,
            next_block_base_fee_per_gas,
        })
    } else {
        let mix_hash = (config.hardfork >= Hardfork::Merge).then(|| prev_randao_generator.next_value());

        let genesis_timestamp = match config.initial_date {
            Some(initial_date) => initial_date
                .duration_since(UNIX_EPOCH)
                .map_err(|_error| CreationError::InvalidInitialDate(initial_date))?
                .as_secs(),
            None => timer.since_epoch(),
        };

        let genesis_diff = StateDiff::from(genesis_state);
        let genesis_block = LocalBlock::with_genesis_state(
            genesis_diff.clone(),
            &BlockConfig {
                base_fee_params: chain_base_fee_params(config.chain_id).clone(),
                hardfork: config.hardfork,
            },
            GenesisBlockOptions {
                gas_limit: Some(config.block_gas_limit.get()),
                timestamp: Some(genesis_timestamp),
                mix_hash,
                base_fee: config.initial_base_fee_per_gas,
                ..GenesisBlockOptions::default()
            },
        )?;

        let blockchain = LocalBlockchain::new(
            genesis_block,
            genesis_diff,
            config.chain_id,
            config.network_id,
            config.hardfork,
        )?;

        let irregular_state = IrregularState::default();
        let state = blockchain.state_at_block_number(0, irregular_state.state_overrides())?;

        Ok(BlockchainAndState {
            blockchain: Box::new(blockchain),
            fork_metadata: None,
            remote_source: None,
            state,
            irregular_state,
            prev_randao_generator,
            block_time_offset_seconds: block_time_offset_seconds(config, timer)?,
            next_block_base_fee_per_gas: None,
        })
    }
}

/// The clock offset that makes the configured initial date the current time.
fn block_time_offset_seconds<TimerT: TimeSinceEpoch>(
    config: &NodeConfig,
    timer: &TimerT,
) -> Result<i64, CreationError> {
    config.initial_date.map_or(Ok(0), |initial_date| {
        initial_date
            .duration_since(UNIX_EPOCH)
            .map_err(|_error| CreationError::InvalidInitialDate(initial_date))?;

        Ok(offset_since(timer, initial_date))
    })
}

/// The clock offset that makes the provided time the current time.
fn offset_since<TimerT: TimeSinceEpoch>(timer: &TimerT, time: SystemTime) -> i64 {
    match timer.since(time) {
        Ok(elapsed) => -i64::try_from(elapsed).expect("elapsed time too large"),
        Err(error) => i64::try_from(error.duration().as_secs()).expect("drift too large"),
    }
}
