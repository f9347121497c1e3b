//! Building and mining of blocks from the transactions in a [`MemPool`].
//!
//! [`MemPool`]: devnet_mem_pool::MemPool
#![warn(missing_docs)]

mod builder;
mod miner;
mod reward;

pub use self::{
    builder::{BlockBuilder, BlockBuilderCreationError, BlockTransactionError, BuiltBlockAndState},
    miner::{
        MineBlockError, MineOrdering, MineTransactionError, first_in_first_out_comparator,
        mine_block, mine_block_with_single_transaction, priority_comparator,
    },
    reward::miner_reward,
};

/// The gas cost of the cheapest possible transaction: a plain value transfer.
pub const MIN_TRANSACTION_GAS: u64 = 21_000;
