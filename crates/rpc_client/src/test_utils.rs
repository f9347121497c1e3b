//! An in-memory remote chain for tests that fork without network access.

use std::sync::atomic::{AtomicUsize, Ordering};

use devnet_primitives::{Address, B256, HashMap, U64, U256};
use parking_lot::RwLock;

use crate::{
    RpcClientError, is_safe_block_number,
    method::BlockSpec,
    source::{ForkMetadata, RemoteAccount, RemoteChainSource},
    types::{FeeHistoryResult, LogFilterOptions, RpcBlock, RpcLog, RpcReceipt},
};

/// A remote chain whose data is held in memory. Account and storage values
/// are the same at every block.
#[derive(Debug, Default)]
pub struct InMemoryChainSource {
    chain_id: u64,
    latest_block_number: u64,
    accounts: RwLock<HashMap<Address, RemoteAccount>>,
    storage: RwLock<HashMap<(Address, U256), U256>>,
    blocks: RwLock<Vec<RpcBlock>>,
    receipts: RwLock<HashMap<B256, RpcReceipt>>,
    logs: RwLock<Vec<RpcLog>>,
    account_requests: AtomicUsize,
    storage_requests: AtomicUsize,
}

impl InMemoryChainSource {
    /// Constructs an empty chain with the provided chain ID and latest block
    /// number.
    pub fn new(chain_id: u64, latest_block_number: u64) -> Self {
        Self {
            chain_id,
            latest_block_number,
            ..Self::default()
        }
    }

    /// Inserts an account.
    pub fn insert_account(&self, address: Address, account: RemoteAccount) {
        self.accounts.write().insert(address, account);
    }

    /// Inserts a storage slot.
    pub fn insert_storage(&self, address: Address, index: U256, value: U256) {
        self.storage.write().insert((address, index), value);
    }

    /// Inserts a block.
    pub fn insert_block(&self, block: RpcBlock) {
        self.blocks.write().push(block);
    }

    /// Inserts a receipt.
    pub fn insert_receipt(&self, receipt: RpcReceipt) {
        self.receipts
            .write()
            .insert(receipt.transaction_hash, receipt);
    }

    /// Inserts a log.
    pub fn insert_log(&self, log: RpcLog) {
        self.logs.write().push(log);
    }

    /// The number of account requests served so far.
    pub fn account_requests(&self) -> usize {
        self.account_requests.load(Ordering::Relaxed)
    }

    /// The number of storage requests served so far.
    pub fn storage_requests(&self) -> usize {
        self.storage_requests.load(Ordering::Relaxed)
    }
}

fn block_number_of(block_spec: &BlockSpec, latest_block_number: u64) -> u64 {
    match block_spec {
        BlockSpec::Number(number) => *number,
        BlockSpec::Latest => latest_block_number,
    }
}

impl RemoteChainSource for InMemoryChainSource {
    fn metadata(&self) -> Result<ForkMetadata, RpcClientError> {
        Ok(ForkMetadata {
            chain_id: self.chain_id,
            network_id: self.chain_id,
            latest_block_number: self.latest_block_number,
        })
    }

    fn account(
        &self,
        address: Address,
        _block_number: u64,
    ) -> Result<RemoteAccount, RpcClientError> {
        self.account_requests.fetch_add(1, Ordering::Relaxed);

        Ok(self
            .accounts
            .read()
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    fn storage(
        &self,
        address: Address,
        index: U256,
        _block_number: u64,
    ) -> Result<U256, RpcClientError> {
        self.storage_requests.fetch_add(1, Ordering::Relaxed);

        Ok(self
            .storage
            .read()
            .get(&(address, index))
            .copied()
            .unwrap_or_default())
    }

    fn block_by_number(&self, block_number: u64) -> Result<Option<RpcBlock>, RpcClientError> {
        Ok(self
            .blocks
            .read()
            .iter()
            .find(|block| block.number.to::<u64>() == block_number)
            .cloned())
    }

    fn block_by_hash(&self, hash: B256) -> Result<Option<RpcBlock>, RpcClientError> {
        Ok(self
            .blocks
            .read()
            .iter()
            .find(|block| block.hash == hash)
            .cloned())
    }

    fn receipt(&self, transaction_hash: B256) -> Result<Option<RpcReceipt>, RpcClientError> {
        Ok(self.receipts.read().get(&transaction_hash).cloned())
    }

    fn logs(&self, options: LogFilterOptions) -> Result<Vec<RpcLog>, RpcClientError> {
        let from_block = block_number_of(&options.from_block, self.latest_block_number);
        let to_block = block_number_of(&options.to_block, self.latest_block_number);

        Ok(self
            .logs
            .read()
            .iter()
            .filter(|log| {
                let block_number = log.block_number.to::<u64>();
                (from_block..=to_block).contains(&block_number)
            })
            .filter(|log| {
                options
                    .address
                    .as_ref()
                    .is_none_or(|addresses| addresses.contains(&log.address))
            })
            .filter(|log| {
                options.topics.as_ref().is_none_or(|topics| {
                    topics.iter().enumerate().all(|(idx, topic)| {
                        topic.as_ref().is_none_or(|alternatives| {
                            log.topics
                                .get(idx)
                                .is_some_and(|log_topic| alternatives.contains(log_topic))
                        })
                    })
                })
            })
            .cloned()
            .collect())
    }

    fn fee_history(
        &self,
        block_count: u64,
        newest_block: u64,
        _reward_percentiles: Vec<f64>,
    ) -> Result<FeeHistoryResult, RpcClientError> {
        let oldest_block = newest_block.saturating_sub(block_count.saturating_sub(1));

        let blocks = self.blocks.read();
        let mut base_fee_per_gas = Vec::new();
        let mut gas_used_ratio = Vec::new();
        for block_number in oldest_block..=newest_block {
            let block = blocks
                .iter()
                .find(|block| block.number.to::<u64>() == block_number)
                .ok_or_else(|| RpcClientError::NotFound {
                    item: format!("block {block_number}"),
                })?;

            base_fee_per_gas.push(block.base_fee_per_gas.unwrap_or_default());
            gas_used_ratio.push(
                block.gas_used.to::<u64>() as f64 / block.gas_limit.to::<u64>().max(1) as f64,
            );
        }

        // The base fee of the block after the range
        base_fee_per_gas.push(base_fee_per_gas.last().copied().unwrap_or_default());

        Ok(FeeHistoryResult {
            oldest_block: U64::from(oldest_block),
            base_fee_per_gas,
            gas_used_ratio,
            reward: None,
        })
    }

    fn is_cacheable_block_number(&self, block_number: u64) -> Result<bool, RpcClientError> {
        Ok(is_safe_block_number(block_number, self.latest_block_number))
    }
}
