//! Blockchains composed of locally mined blocks, optionally forked from a
//! remote chain.
#![warn(missing_docs)]

mod forked;
mod local;
mod remote;
/// Utility functions for blockchain implementations
pub mod utils;

use core::fmt::Debug;
use std::{collections::BTreeMap, sync::Arc};

use auto_impl::auto_impl;
use devnet_block_api::{
    Block as _, BlockError, BlockReceipt, LocalBlock, RemoteBlockConversionError, SyncBlock,
    log::{FilterLog, LogFilter},
};
use devnet_block_storage::InsertError;
use devnet_hardfork::{Hardfork, RuleSelectionError, Rules, eip1559::BaseFeeParams};
use devnet_primitives::B256;
use devnet_rpc_client::RpcClientError;
use devnet_state_api::{DynState, StateDiff, StateError, irregular::StateOverride};

pub use self::{
    forked::{BlockSource, ForkedBlockchain, ForkedBlockchainCreationError},
    local::{InvalidGenesisBlock, LocalBlockchain},
    remote::RemoteBlockchain,
};

/// Errors that can occur when validating the next block of a blockchain.
#[derive(Debug, thiserror::Error)]
pub enum InvalidNextBlock {
    /// The block number does not follow the last block.
    #[error("Invalid block number: {actual}. Expected: {expected}.")]
    InvalidBlockNumber {
        /// Provided block number
        actual: u64,
        /// Expected block number
        expected: u64,
    },
    /// The parent hash does not match the last block.
    #[error("Invalid parent hash: {actual}. Expected: {expected}.")]
    InvalidParentHash {
        /// Provided parent hash
        actual: B256,
        /// Expected parent hash
        expected: B256,
    },
}

/// Combinatorial error for the blockchain API.
#[derive(Debug, thiserror::Error)]
pub enum BlockchainError {
    /// Error retrieving the data of a block
    #[error(transparent)]
    Block(#[from] BlockError),
    /// Remote blocks cannot be deleted
    #[error("Cannot delete remote block.")]
    CannotDeleteRemote,
    /// Error inserting a block into storage
    #[error(transparent)]
    Insert(#[from] InsertError),
    /// The block cannot be appended to the blockchain
    #[error(transparent)]
    InvalidNextBlock(#[from] InvalidNextBlock),
    /// Remote error
    #[error(transparent)]
    Remote(#[from] RpcClientError),
    /// Error converting a remote block
    #[error(transparent)]
    RemoteBlockConversion(#[from] RemoteBlockConversionError),
    /// Error selecting the rules of a block
    #[error(transparent)]
    RuleSelection(#[from] RuleSelectionError),
    /// State error
    #[error(transparent)]
    State(#[from] StateError),
    /// Block number does not exist in blockchain
    #[error("Unknown block number")]
    UnknownBlockNumber,
}

/// Trait for reading the blocks, receipts, and states of a blockchain.
#[auto_impl(&, Box, Arc)]
pub trait Blockchain: Debug + Send + Sync {
    /// Retrieves the base fee parameters of the blockchain.
    fn base_fee_params(&self) -> &BaseFeeParams;

    /// Retrieves the block with the provided hash, if it exists.
    fn block_by_hash(&self, hash: &B256) -> Result<Option<Arc<dyn SyncBlock>>, BlockchainError>;

    /// Retrieves the block with the provided number, if it exists.
    fn block_by_number(&self, number: u64) -> Result<Option<Arc<dyn SyncBlock>>, BlockchainError>;

    /// Retrieves the block that contains a transaction with the provided hash,
    /// if it exists.
    fn block_by_transaction_hash(
        &self,
        transaction_hash: &B256,
    ) -> Result<Option<Arc<dyn SyncBlock>>, BlockchainError>;

    /// Retrieves the chain ID used for new blocks.
    fn chain_id(&self) -> u64;

    /// Retrieves the chain ID of the block at the provided number. When
    /// forking, blocks up to the fork block carry the remote's chain ID.
    fn chain_id_at_block_number(&self, block_number: u64) -> Result<u64, BlockchainError>;

    /// Retrieves the hardfork used for new blocks.
    fn hardfork(&self) -> Hardfork;

    /// Retrieves the hardfork of the block at the provided number.
    fn hardfork_at_block_number(&self, block_number: u64) -> Result<Hardfork, BlockchainError>;

    /// Retrieves the last block in the blockchain.
    fn last_block(&self) -> Result<Arc<dyn SyncBlock>, BlockchainError>;

    /// Retrieves the last block number in the blockchain.
    fn last_block_number(&self) -> u64;

    /// Retrieves the logs that match the provided filter.
    fn logs(&self, filter: &LogFilter) -> Result<Vec<FilterLog>, BlockchainError>;

    /// Retrieves the network ID of the blockchain.
    fn network_id(&self) -> u64;

    /// Retrieves the receipt of the transaction with the provided hash, if it
    /// exists.
    fn receipt_by_transaction_hash(
        &self,
        transaction_hash: &B256,
    ) -> Result<Option<Arc<BlockReceipt>>, BlockchainError>;

    /// Retrieves the rules that apply to the block at the provided number.
    fn rules_at_block_number(&self, block_number: u64) -> Result<Rules, BlockchainError> {
        self.hardfork_at_block_number(block_number).map(Rules::new)
    }

    /// Retrieves the state at the block with the provided number, applying
    /// the provided irregular state overrides.
    fn state_at_block_number(
        &self,
        block_number: u64,
        state_overrides: &BTreeMap<u64, StateOverride>,
    ) -> Result<Box<dyn DynState>, BlockchainError>;
}

/// Trait for appending to and truncating a blockchain.
#[auto_impl(&mut, Box)]
pub trait BlockchainMut {
    /// Inserts the provided block into the blockchain, returning a reference
    /// to the inserted block.
    fn insert_block(
        &mut self,
        block: LocalBlock,
        state_diff: StateDiff,
    ) -> Result<Arc<dyn SyncBlock>, BlockchainError>;

    /// Reserves the provided number of blocks, starting from the next block
    /// number. Reserved blocks are empty and their timestamps increase by the
    /// provided interval.
    fn reserve_blocks(&mut self, additional: u64, interval: u64) -> Result<(), BlockchainError>;

    /// Reverts to the block with the provided number, deleting all later
    /// blocks.
    fn revert_to_block(&mut self, block_number: u64) -> Result<(), BlockchainError>;
}

/// Trait that meets all requirements for a synchronous blockchain.
pub trait SyncBlockchain: Blockchain + BlockchainMut + 'static {}

impl<BlockchainT> SyncBlockchain for BlockchainT where
    BlockchainT: Blockchain + BlockchainMut + 'static
{
}

/// Validates whether a block is a valid next block.
pub fn validate_next_block(
    last_block: &dyn SyncBlock,
    next_block: &LocalBlock,
) -> Result<(), InvalidNextBlock> {
    let last_header = last_block.header();
    let next_header = next_block.header();

    let next_block_number = last_header.number + 1;
    if next_header.number != next_block_number {
        return Err(InvalidNextBlock::InvalidBlockNumber {
            actual: next_header.number,
            expected: next_block_number,
        });
    }

    if next_header.parent_hash != *last_block.block_hash() {
        return Err(InvalidNextBlock::InvalidParentHash {
            actual: next_header.parent_hash,
            expected: *last_block.block_hash(),
        });
    }

    Ok(())
}
