use std::{collections::BTreeMap, sync::Arc};

use devnet_block_api::{
    Block as _, BlockReceipt, LocalBlock,
    log::{FilterLog, LogFilter, bloom_contains_log_filter, filter_logs},
};
use devnet_primitives::{B256, HashMap};

use crate::InsertError;

/// A storage solution for storing a subset of a blockchain's blocks in-memory.
#[derive(Clone, Debug, Default)]
pub struct SparseBlockStorage {
    hash_to_block: HashMap<B256, Arc<LocalBlock>>,
    number_to_block: BTreeMap<u64, Arc<LocalBlock>>,
    transaction_hash_to_block: HashMap<B256, Arc<LocalBlock>>,
    transaction_hash_to_receipt: HashMap<B256, Arc<BlockReceipt>>,
}

impl SparseBlockStorage {
    /// Constructs a new instance with the provided block.
    pub fn with_block(block: LocalBlock) -> Self {
        let block = Arc::new(block);

        let transaction_hash_to_block = block
            .transaction_hashes()
            .iter()
            .map(|transaction_hash| (*transaction_hash, block.clone()))
            .collect();

        let transaction_hash_to_receipt = block
            .transaction_receipts()
            .iter()
            .map(|receipt| (receipt.transaction_hash, receipt.clone()))
            .collect();

        let mut hash_to_block = HashMap::default();
        hash_to_block.insert(*block.block_hash(), block.clone());

        let mut number_to_block = BTreeMap::new();
        number_to_block.insert(block.header().number, block);

        Self {
            hash_to_block,
            number_to_block,
            transaction_hash_to_block,
            transaction_hash_to_receipt,
        }
    }

    /// Retrieves the block by hash, if it exists.
    pub fn block_by_hash(&self, hash: &B256) -> Option<&Arc<LocalBlock>> {
        self.hash_to_block.get(hash)
    }

    /// Retrieves the block by number, if it exists.
    pub fn block_by_number(&self, number: u64) -> Option<&Arc<LocalBlock>> {
        self.number_to_block.get(&number)
    }

    /// Retrieves the block that contains the transaction with the provided
    /// hash, if it exists.
    pub fn block_by_transaction_hash(&self, transaction_hash: &B256) -> Option<&Arc<LocalBlock>> {
        self.transaction_hash_to_block.get(transaction_hash)
    }

    /// Retrieves whether a block with the provided number exists.
    pub fn contains_block_number(&self, number: u64) -> bool {
        self.number_to_block.contains_key(&number)
    }

    /// Retrieves the receipt of the transaction with the provided hash, if it
    /// exists.
    pub fn receipt_by_transaction_hash(&self, transaction_hash: &B256) -> Option<&Arc<BlockReceipt>> {
        self.transaction_hash_to_receipt.get(transaction_hash)
    }

    /// Reverts to the block with the provided number, deleting all later
    /// blocks.
    pub fn revert_to_block(&mut self, block_number: u64) {
        let removed_blocks = self.number_to_block.split_off(&(block_number + 1));

        for block in removed_blocks.values() {
            self.hash_to_block.remove(block.block_hash());

            for transaction_hash in block.transaction_hashes() {
                self.transaction_hash_to_block.remove(transaction_hash);
                self.transaction_hash_to_receipt.remove(transaction_hash);
            }
        }
    }

    /// Inserts a block and its receipts. Errors if a block with the same hash
    /// or number, or a transaction with the same hash, already exists.
    pub fn insert_block(&mut self, block: LocalBlock) -> Result<&Arc<LocalBlock>, InsertError> {
        let block_hash = *block.block_hash();
        let block_number = block.header().number;

        if self.hash_to_block.contains_key(&block_hash)
            || self.number_to_block.contains_key(&block_number)
        {
            return Err(InsertError::DuplicateBlock {
                block_hash,
                block_number,
            });
        }

        if let Some(hash) = block
            .transaction_hashes()
            .iter()
            .find(|hash| self.transaction_hash_to_block.contains_key(*hash))
        {
            return Err(InsertError::DuplicateTransaction { hash: *hash });
        }

        if let Some(receipt) = block.transaction_receipts().iter().find(|receipt| {
            self.transaction_hash_to_receipt
                .contains_key(&receipt.transaction_hash)
        }) {
            return Err(InsertError::DuplicateReceipt {
                transaction_hash: receipt.transaction_hash,
            });
        }

        let block = Arc::new(block);

        self.transaction_hash_to_block.extend(
            block
                .transaction_hashes()
                .iter()
                .map(|transaction_hash| (*transaction_hash, block.clone())),
        );

        self.transaction_hash_to_receipt.extend(
            block
                .transaction_receipts()
                .iter()
                .map(|receipt| (receipt.transaction_hash, receipt.clone())),
        );

        self.hash_to_block.insert(block_hash, block.clone());

        Ok(self.number_to_block.entry(block_number).or_insert(block))
    }

    /// Retrieves the logs of stored blocks that match the provided filter.
    /// Blocks whose bloom does not match the filter are skipped.
    pub fn logs(&self, filter: &LogFilter) -> Vec<FilterLog> {
        self.number_to_block
            .range(filter.block_range.clone())
            .filter(|(_, block)| bloom_contains_log_filter(&block.header().logs_bloom, filter))
            .flat_map(|(_, block)| {
                filter_logs(
                    block
                        .transaction_receipts()
                        .iter()
                        .flat_map(|receipt| receipt.logs.iter()),
                    filter,
                )
            })
            .collect()
    }
}
