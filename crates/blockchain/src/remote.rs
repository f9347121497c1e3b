use std::sync::Arc;

use devnet_block_api::{
    Block as _, BlockReceipt, RemoteBlock, convert_remote_log, convert_remote_receipt,
    log::{FilterLog, LogFilter},
};
use devnet_primitives::{B256, HashMap};
use devnet_rpc_client::{BlockSpec, RemoteChainSource, types::LogFilterOptions};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use crate::BlockchainError;

#[derive(Debug, Default)]
struct RemoteCache {
    hash_to_block: HashMap<B256, Arc<RemoteBlock>>,
    number_to_block: HashMap<u64, Arc<RemoteBlock>>,
    transaction_hash_to_receipt: HashMap<B256, Arc<BlockReceipt>>,
}

/// Read-only access to the blocks and receipts of a remote chain. Every
/// retrieved block and receipt is cached for the lifetime of the instance.
#[derive(Debug)]
pub struct RemoteBlockchain {
    source: Arc<dyn RemoteChainSource>,
    cache: RwLock<RemoteCache>,
}

impl RemoteBlockchain {
    /// Constructs a new instance with the provided remote source.
    pub fn new(source: Arc<dyn RemoteChainSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(RemoteCache::default()),
        }
    }

    /// Retrieves the instance's remote source.
    pub fn source(&self) -> &Arc<dyn RemoteChainSource> {
        &self.source
    }

    /// Retrieves the block with the provided hash, if it exists.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn block_by_hash(&self, hash: &B256) -> Result<Option<Arc<RemoteBlock>>, BlockchainError> {
        let cache = self.cache.upgradable_read();

        if let Some(block) = cache.hash_to_block.get(hash) {
            log::trace!("Remote block cache hit for hash {hash}");
            return Ok(Some(block.clone()));
        }

        log::trace!("Remote block cache miss for hash {hash}");
        if let Some(block) = self.source.block_by_hash(*hash)? {
            let block = RemoteBlock::new(block, self.source.clone())?;

            let mut cache = RwLockUpgradableReadGuard::upgrade(cache);
            Ok(Some(cache.insert_block(block)))
        } else {
            Ok(None)
        }
    }

    /// Retrieves the block with the provided number, if it exists.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn block_by_number(&self, number: u64) -> Result<Option<Arc<RemoteBlock>>, BlockchainError> {
        let cache = self.cache.upgradable_read();

        if let Some(block) = cache.number_to_block.get(&number) {
            log::trace!("Remote block cache hit for number {number}");
            return Ok(Some(block.clone()));
        }

        log::trace!("Remote block cache miss for number {number}");
        if let Some(block) = self.source.block_by_number(number)? {
            let block = RemoteBlock::new(block, self.source.clone())?;

            let mut cache = RwLockUpgradableReadGuard::upgrade(cache);
            Ok(Some(cache.insert_block(block)))
        } else {
            Ok(None)
        }
    }

    /// Retrieves the logs of the remote chain that match the provided filter.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn logs(&self, filter: &LogFilter) -> Result<Vec<FilterLog>, BlockchainError> {
        let options = LogFilterOptions {
            from_block: BlockSpec::Number(*filter.block_range.start()),
            to_block: BlockSpec::Number(*filter.block_range.end()),
            address: if filter.addresses.is_empty() {
                None
            } else {
                Some(filter.addresses.iter().copied().collect())
            },
            topics: if filter.normalized_topics.is_empty() {
                None
            } else {
                Some(filter.normalized_topics.clone())
            },
        };

        let logs = self.source.logs(options)?;

        Ok(logs.into_iter().map(convert_remote_log).collect())
    }

    /// Retrieves the receipt of the transaction with the provided hash, if it
    /// exists.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn receipt_by_transaction_hash(
        &self,
        transaction_hash: &B256,
    ) -> Result<Option<Arc<BlockReceipt>>, BlockchainError> {
        let cache = self.cache.upgradable_read();

        if let Some(receipt) = cache.transaction_hash_to_receipt.get(transaction_hash) {
            return Ok(Some(receipt.clone()));
        }

        if let Some(receipt) = self.source.receipt(*transaction_hash)? {
            let receipt = Arc::new(convert_remote_receipt(receipt)?);

            let mut cache = RwLockUpgradableReadGuard::upgrade(cache);
            cache
                .transaction_hash_to_receipt
                .insert(*transaction_hash, receipt.clone());

            Ok(Some(receipt))
        } else {
            Ok(None)
        }
    }
}

impl RemoteCache {
    fn insert_block(&mut self, block: RemoteBlock) -> Arc<RemoteBlock> {
        let block = Arc::new(block);

        self.hash_to_block.insert(*block.block_hash(), block.clone());
        self.number_to_block
            .insert(block.header().number, block.clone());

        block
    }
}

#[cfg(test)]
mod tests {
    use devnet_primitives::{Address, B64, Bloom, Bytes, U64, U256};
    use devnet_rpc_client::{test_utils::InMemoryChainSource, types::RpcBlock};

    use super::*;

    fn rpc_block(number: u64) -> RpcBlock {
        RpcBlock {
            hash: B256::random(),
            parent_hash: B256::random(),
            sha3_uncles: B256::random(),
            miner: Address::random(),
            state_root: B256::random(),
            transactions_root: B256::random(),
            receipts_root: B256::random(),
            logs_bloom: Bloom::ZERO,
            difficulty: U256::ZERO,
            number: U64::from(number),
            gas_limit: U64::from(30_000_000),
            gas_used: U64::ZERO,
            timestamp: U64::from(1_700_000_000),
            extra_data: Bytes::new(),
            mix_hash: B256::random(),
            nonce: B64::ZERO,
            base_fee_per_gas: Some(U256::from(7)),
            withdrawals_root: None,
            parent_beacon_block_root: None,
            transactions: Vec::new(),
        }
    }

    #[test]
    fn blocks_are_cached_by_number_and_hash() -> anyhow::Result<()> {
        let source = Arc::new(InMemoryChainSource::new(1, 100));
        let rpc_block = rpc_block(10);
        let hash = rpc_block.hash;
        source.insert_block(rpc_block);

        let remote = RemoteBlockchain::new(source);

        let by_number = remote.block_by_number(10)?.expect("block exists");
        let by_hash = remote.block_by_hash(&hash)?.expect("block exists");
        assert!(Arc::ptr_eq(&by_number, &by_hash));
        assert_eq!(*by_number.block_hash(), hash);

        assert!(remote.block_by_number(11)?.is_none());

        Ok(())
    }
}
