use core::cmp::Ordering;

use devnet_block_api::HeaderOverrides;
use devnet_blockchain::Blockchain;
use devnet_executor::{ExecutionFlags, InvalidTransaction, TransactionError, TransactionExecutor};
use devnet_mem_pool::{MemPool, OrderedTransaction};
use devnet_state_api::{DynState, State as _, StateError};
use devnet_transaction::Signed;
use serde::{Deserialize, Serialize};

use crate::{
    MIN_TRANSACTION_GAS,
    builder::{BlockBuilder, BlockBuilderCreationError, BlockTransactionError, BuiltBlockAndState},
};

/// The type of ordering to use when selecting transactions to mine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MineOrdering {
    /// Insertion order
    Fifo,
    /// Effective miner fee
    #[default]
    Priority,
}

/// An error that occurred while mining a block.
#[derive(Debug, thiserror::Error)]
pub enum MineBlockError {
    /// An error that occurred while constructing a block builder.
    #[error(transparent)]
    BlockBuilderCreation(#[from] BlockBuilderCreationError),
    /// An error that occurred while executing a transaction.
    #[error(transparent)]
    BlockTransaction(#[from] BlockTransactionError),
    /// An error that occurred while finalizing a block.
    #[error(transparent)]
    BlockFinalize(StateError),
}

/// Mines a block using as many transactions as can fit in it.
///
/// A transaction that cannot be included causes all remaining transactions of
/// its sender to be skipped for this block. Any other failure discards the
/// whole block.
#[allow(clippy::too_many_arguments)]
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
pub fn mine_block<BlockchainT: Blockchain + ?Sized>(
    blockchain: &BlockchainT,
    state: Box<dyn DynState>,
    mem_pool: &MemPool,
    executor: &dyn TransactionExecutor,
    flags: ExecutionFlags,
    overrides: HeaderOverrides,
    mine_ordering: MineOrdering,
    reward: u128,
) -> Result<BuiltBlockAndState, MineBlockError> {
    let mut block_builder = BlockBuilder::new(blockchain, state, executor, flags, overrides)?;

    let mut pending_transactions = {
        type MineOrderComparator = dyn Fn(&OrderedTransaction, &OrderedTransaction) -> Ordering;

        let base_fee = block_builder.header().base_fee;
        let comparator: Box<MineOrderComparator> = match mine_ordering {
            MineOrdering::Fifo => Box::new(first_in_first_out_comparator),
            MineOrdering::Priority => {
                Box::new(move |lhs, rhs| priority_comparator(lhs, rhs, base_fee))
            }
        };

        mem_pool.iter(comparator)
    };

    let min_gas_price = mem_pool.min_gas_price();
    while block_builder.gas_remaining() >= MIN_TRANSACTION_GAS
        && let Some(transaction) = pending_transactions.next()
    {
        let caller = *transaction.caller();
        if transaction.gas_price() < min_gas_price {
            pending_transactions.remove_caller(&caller);
            continue;
        }

        if let Err(error) = block_builder.add_transaction(transaction) {
            match error {
                BlockTransactionError::ExceedsBlockGasLimit
                | BlockTransactionError::Transaction(TransactionError::InvalidTransaction(
                    InvalidTransaction::GasPriceLessThanBasefee { .. },
                )) => {
                    log::trace!("Skipping remaining transactions of {caller} for this block");
                    pending_transactions.remove_caller(&caller);
                }
                remainder => return Err(MineBlockError::BlockTransaction(remainder)),
            }
        }
    }

    let beneficiary = block_builder.header().beneficiary;
    let rewards = vec![(beneficiary, reward)];

    block_builder
        .finalize(rewards)
        .map_err(MineBlockError::BlockFinalize)
}

/// An error that occurred while mining a block with a single transaction.
#[derive(Debug, thiserror::Error)]
pub enum MineTransactionError {
    /// An error that occurred while constructing a block builder.
    #[error(transparent)]
    BlockBuilderCreation(#[from] BlockBuilderCreationError),
    /// An error that occurred while executing a transaction.
    #[error(transparent)]
    BlockTransaction(#[from] BlockTransactionError),
    /// The transaction's gas price is lower than the next block's base fee.
    #[error(
        "Transaction gasPrice ({actual}) is too low for the next block, which has a baseFeePerGas of {expected}"
    )]
    GasPriceTooLow {
        /// The minimum gas price.
        expected: u128,
        /// The actual gas price.
        actual: u128,
    },
    /// The transaction's max fee per gas is lower than the next block's base
    /// fee.
    #[error(
        "Transaction maxFeePerGas ({actual}) is too low for the next block, which has a baseFeePerGas of {expected}"
    )]
    MaxFeePerGasTooLow {
        /// The minimum max fee per gas.
        expected: u128,
        /// The actual max fee per gas.
        actual: u128,
    },
    /// The transaction nonce is too high.
    #[error(
        "Nonce too high. Expected nonce to be {expected} but got {actual}. Note that transactions can't be queued when automining."
    )]
    NonceTooHigh {
        /// The expected nonce.
        expected: u64,
        /// The actual nonce.
        actual: u64,
    },
    /// The transaction nonce is too low.
    #[error(
        "Nonce too low. Expected nonce to be {expected} but got {actual}. Note that transactions can't be queued when automining."
    )]
    NonceTooLow {
        /// The expected nonce.
        expected: u64,
        /// The actual nonce.
        actual: u64,
    },
    /// The transaction's priority fee is lower than the minimum gas price.
    #[error("Transaction gas price is {actual}, which is below the minimum of {expected}")]
    PriorityFeeTooLow {
        /// The minimum gas price.
        expected: u128,
        /// The actual max priority fee per gas.
        actual: u128,
    },
    /// An error that occurred while querying state.
    #[error(transparent)]
    State(StateError),
}

/// Mines a block with a single transaction.
///
/// If the transaction is invalid, returns an error.
#[allow(clippy::too_many_arguments)]
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
pub fn mine_block_with_single_transaction<BlockchainT: Blockchain + ?Sized>(
    blockchain: &BlockchainT,
    state: Box<dyn DynState>,
    transaction: Signed,
    executor: &dyn TransactionExecutor,
    flags: ExecutionFlags,
    overrides: HeaderOverrides,
    min_gas_price: u128,
    reward: u128,
) -> Result<BuiltBlockAndState, MineTransactionError> {
    let max_priority_fee_per_gas = transaction
        .max_priority_fee_per_gas()
        .unwrap_or_else(|| transaction.gas_price());

    if max_priority_fee_per_gas < min_gas_price {
        return Err(MineTransactionError::PriorityFeeTooLow {
            expected: min_gas_price,
            actual: max_priority_fee_per_gas,
        });
    }

    let sender = state
        .basic(*transaction.caller())
        .map_err(MineTransactionError::State)?
        .unwrap_or_default();

    match transaction.nonce().cmp(&sender.nonce) {
        Ordering::Less => {
            return Err(MineTransactionError::NonceTooLow {
                expected: sender.nonce,
                actual: transaction.nonce(),
            });
        }
        Ordering::Equal => (),
        Ordering::Greater => {
            return Err(MineTransactionError::NonceTooHigh {
                expected: sender.nonce,
                actual: transaction.nonce(),
            });
        }
    }

    let mut block_builder = BlockBuilder::new(blockchain, state, executor, flags, overrides)?;

    if !flags.disable_base_fee_check
        && let Some(base_fee_per_gas) = block_builder.header().base_fee
    {
        match transaction.max_fee_per_gas() {
            Some(max_fee_per_gas) if max_fee_per_gas < base_fee_per_gas => {
                return Err(MineTransactionError::MaxFeePerGasTooLow {
                    expected: base_fee_per_gas,
                    actual: max_fee_per_gas,
                });
            }
            None if transaction.gas_price() < base_fee_per_gas => {
                return Err(MineTransactionError::GasPriceTooLow {
                    expected: base_fee_per_gas,
                    actual: transaction.gas_price(),
                });
            }
            _ => (),
        }
    }

    let beneficiary = block_builder.header().beneficiary;
    let rewards = vec![(beneficiary, reward)];

    block_builder.add_transaction(transaction)?;

    block_builder
        .finalize(rewards)
        .map_err(MineTransactionError::State)
}

/// Orders transactions by their insertion into the pool.
pub fn first_in_first_out_comparator(
    lhs: &OrderedTransaction,
    rhs: &OrderedTransaction,
) -> Ordering {
    lhs.order_id().cmp(&rhs.order_id())
}

/// Orders transactions by decreasing effective miner fee, breaking ties by
/// insertion into the pool.
pub fn priority_comparator(
    lhs: &OrderedTransaction,
    rhs: &OrderedTransaction,
    base_fee: Option<u128>,
) -> Ordering {
    let effective_miner_fee = move |transaction: &Signed| {
        transaction
            .effective_miner_fee(base_fee)
            .unwrap_or_default()
    };

    // Invert lhs and rhs to get decreasing order by effective miner fee
    let ordering = effective_miner_fee(rhs.pending()).cmp(&effective_miner_fee(lhs.pending()));

    // If two transactions have the same effective miner fee, sort them in
    // increasing order by insertion
    if ordering == Ordering::Equal {
        lhs.order_id().cmp(&rhs.order_id())
    } else {
        ordering
    }
}
