//! A pool of transactions waiting to be mined, split per sender into a
//! pending run of consecutive nonces and a queue of future transactions.
#![warn(missing_docs)]

mod pending;

use core::num::NonZeroU64;

use devnet_primitives::{Address, B256, HashMap, U256};
use devnet_state_api::{State, account::AccountInfo};
use devnet_transaction::{Signed, upfront_cost};
use indexmap::{IndexMap, map::Entry};

pub use self::pending::PendingTransactions;

/// A reason for which a transaction cannot be part of the pool. Used both
/// when admitting a transaction and when re-validating pooled transactions.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPoolTransaction {
    /// Transaction gas limit exceeds block gas limit.
    #[error(
        "Transaction gas limit is {transaction_gas_limit} and exceeds block gas limit of {block_gas_limit}"
    )]
    ExceedsBlockGasLimit {
        /// The block gas limit
        block_gas_limit: NonZeroU64,
        /// The transaction gas limit
        transaction_gas_limit: u64,
    },
    /// Sender does not have enough funds to send transaction.
    #[error(
        "Sender doesn't have enough funds to send tx. The max upfront cost is: {max_upfront_cost} and the sender's balance is: {sender_balance}."
    )]
    InsufficientFunds {
        /// The maximum upfront cost of the transaction
        max_upfront_cost: U256,
        /// The sender's balance
        sender_balance: U256,
    },
    /// Transaction nonce is too low.
    #[error(
        "Transaction nonce too low. Expected nonce to be at least {sender_nonce} but got {transaction_nonce}."
    )]
    NonceTooLow {
        /// Transaction's nonce.
        transaction_nonce: u64,
        /// Sender's nonce.
        sender_nonce: u64,
    },
}

/// An error that can occur when adding a transaction to the mempool.
#[derive(Debug, thiserror::Error)]
pub enum MemPoolAddTransactionError<SE> {
    /// Transaction gas limit exceeds block gas limit.
    #[error(
        "Transaction gas limit is {transaction_gas_limit} and exceeds block gas limit of {block_gas_limit}"
    )]
    ExceedsBlockGasLimit {
        /// The block gas limit
        block_gas_limit: NonZeroU64,
        /// The transaction gas limit
        transaction_gas_limit: u64,
    },
    /// Sender does not have enough funds to send transaction.
    #[error(
        "Sender doesn't have enough funds to send tx. The max upfront cost is: {max_upfront_cost} and the sender's balance is: {sender_balance}."
    )]
    InsufficientFunds {
        /// The maximum upfront cost of the transaction
        max_upfront_cost: U256,
        /// The sender's balance
        sender_balance: U256,
    },
    /// Transaction nonce is too low.
    #[error(
        "Transaction nonce too low. Expected nonce to be at least {sender_nonce} but got {transaction_nonce}."
    )]
    NonceTooLow {
        /// Transaction's nonce.
        transaction_nonce: u64,
        /// Sender's nonce.
        sender_nonce: u64,
    },
    /// Transaction already exists in the mempool.
    #[error("Known transaction: 0x{transaction_hash:x}")]
    TransactionAlreadyExists {
        /// The transaction hash
        transaction_hash: B256,
    },
    /// State error
    #[error(transparent)]
    State(#[from] SE),
    /// Replacement transaction has underpriced max fee per gas.
    #[error(
        "Replacement transaction underpriced. A gasPrice/maxFeePerGas of at least {min_new_max_fee_per_gas} is necessary to replace the existing transaction with nonce {transaction_nonce}."
    )]
    ReplacementMaxFeePerGasTooLow {
        /// The minimum new max fee per gas
        min_new_max_fee_per_gas: u128,
        /// The transaction nonce
        transaction_nonce: u64,
    },
    /// Replacement transaction has underpriced max priority fee per gas.
    #[error(
        "Replacement transaction underpriced. A gasPrice/maxPriorityFeePerGas of at least {min_new_max_priority_fee_per_gas} is necessary to replace the existing transaction with nonce {transaction_nonce}."
    )]
    ReplacementMaxPriorityFeePerGasTooLow {
        /// The minimum new max priority fee per gas
        min_new_max_priority_fee_per_gas: u128,
        /// The transaction nonce
        transaction_nonce: u64,
    },
}

impl<SE> MemPoolAddTransactionError<SE> {
    /// Converts the reason a transaction is invalid in the pool into an
    /// admission error.
    pub fn from_invalid(value: InvalidPoolTransaction) -> Self {
        match value {
            InvalidPoolTransaction::ExceedsBlockGasLimit {
                block_gas_limit,
                transaction_gas_limit,
            } => Self::ExceedsBlockGasLimit {
                block_gas_limit,
                transaction_gas_limit,
            },
            InvalidPoolTransaction::InsufficientFunds {
                max_upfront_cost,
                sender_balance,
            } => Self::InsufficientFunds {
                max_upfront_cost,
                sender_balance,
            },
            InvalidPoolTransaction::NonceTooLow {
                transaction_nonce,
                sender_nonce,
            } => Self::NonceTooLow {
                transaction_nonce,
                sender_nonce,
            },
        }
    }
}

/// Where an admitted transaction ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddTransactionOutcome {
    /// The transaction can be mined in the next block.
    Pending,
    /// The transaction waits for a gap in its sender's nonces to be filled.
    Queued,
    /// The transaction replaced a transaction with the same sender and nonce.
    Replaced {
        /// The replaced transaction
        previous: Signed,
    },
}

/// A transaction that was removed from the pool because it became invalid.
#[derive(Clone, Debug)]
pub struct DroppedTransaction {
    /// The removed transaction
    pub transaction: Signed,
    /// Why the transaction was removed
    pub reason: InvalidPoolTransaction,
}

/// A pooled transaction with an order ID.
#[derive(Clone, Debug)]
pub struct OrderedTransaction {
    order_id: usize,
    transaction: Signed,
}

impl OrderedTransaction {
    /// Retrieves the order ID of the pooled transaction.
    pub fn order_id(&self) -> usize {
        self.order_id
    }

    /// Retrieves the pooled transaction.
    pub fn pending(&self) -> &Signed {
        &self.transaction
    }

    fn caller(&self) -> &Address {
        self.transaction.caller()
    }

    fn hash(&self) -> &B256 {
        self.transaction.transaction_hash()
    }

    fn nonce(&self) -> u64 {
        self.transaction.nonce()
    }
}

/// The mempool contains transactions pending inclusion in the blockchain.
///
/// Cloning the pool captures a checkpoint that can be restored by assigning
/// the clone back.
#[derive(Clone, Debug)]
pub struct MemPool {
    /// The block's gas limit
    block_gas_limit: NonZeroU64,
    /// The minimum gas price a transaction needs to be mined
    min_gas_price: u128,
    /// Transactions that can be executed now
    pending_transactions: IndexMap<Address, Vec<OrderedTransaction>>,
    /// Mapping of transaction hashes to transaction
    hash_to_transaction: HashMap<B256, OrderedTransaction>,
    /// Transactions that can be executed in the future, once the nonce is high
    /// enough
    future_transactions: IndexMap<Address, Vec<OrderedTransaction>>,
    next_order_id: usize,
}

impl MemPool {
    /// Constructs a new [`MemPool`] with the specified block gas limit.
    pub fn new(block_gas_limit: NonZeroU64) -> Self {
        Self {
            block_gas_limit,
            min_gas_price: 0,
            pending_transactions: IndexMap::new(),
            hash_to_transaction: HashMap::default(),
            future_transactions: IndexMap::new(),
            next_order_id: 0,
        }
    }

    /// Retrieves the instance's block gas limit.
    pub fn block_gas_limit(&self) -> NonZeroU64 {
        self.block_gas_limit
    }

    /// Sets the instance's block gas limit, returning the transactions that
    /// were dropped because they no longer fit.
    pub fn set_block_gas_limit<S>(
        &mut self,
        state: &S,
        limit: NonZeroU64,
    ) -> Result<Vec<DroppedTransaction>, S::Error>
    where
        S: State + ?Sized,
    {
        self.block_gas_limit = limit;

        self.update(state)
    }

    /// Retrieves the minimum gas price a transaction needs to be mined.
    pub fn min_gas_price(&self) -> u128 {
        self.min_gas_price
    }

    /// Sets the minimum gas price a transaction needs to be mined. Pooled
    /// transactions below the floor stay in the pool until the floor drops or
    /// they are replaced.
    pub fn set_min_gas_price(&mut self, min_gas_price: u128) {
        self.min_gas_price = min_gas_price;
    }

    /// Retrieves the nonce of the last pending transaction of the account
    /// corresponding to the specified address, if it exists.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn last_pending_nonce(&self, address: &Address) -> Option<u64> {
        self.pending_transactions
            .get(address)
            .and_then(|transactions| transactions.last())
            .map(OrderedTransaction::nonce)
    }

    /// Retrieves an iterator for all future transactions.
    pub fn future_transactions(&self) -> impl Iterator<Item = &OrderedTransaction> {
        self.future_transactions.values().flatten()
    }

    /// Retrieves an iterator for all pending transactions.
    pub fn pending_transactions(&self) -> impl Iterator<Item = &OrderedTransaction> {
        self.pending_transactions.values().flatten()
    }

    /// Retrieves an iterator for all transactions in the instance. Pending
    /// transactions are followed by future transactions, grouped by sender
    /// in order of insertion.
    pub fn transactions(&self) -> impl Iterator<Item = &Signed> {
        self.pending_transactions
            .values()
            .chain(self.future_transactions.values())
            .flatten()
            .map(OrderedTransaction::pending)
    }

    /// Whether the instance has any future transactions; i.e. for which the
    /// nonces are not high enough.
    pub fn has_future_transactions(&self) -> bool {
        !self.future_transactions.is_empty()
    }

    /// Whether the instance has any pending transactions; i.e. for which the
    /// nonces are guaranteed to be high enough.
    pub fn has_pending_transactions(&self) -> bool {
        !self.pending_transactions.is_empty()
    }

    /// Whether the instance has any transactions.
    pub fn has_transactions(&self) -> bool {
        self.has_pending_transactions() || self.has_future_transactions()
    }

    /// Removes the transaction corresponding to the provided transaction hash,
    /// if it exists. Later pending transactions of the same sender are moved
    /// to the future queue.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn remove_transaction(&mut self, hash: &B256) -> Option<OrderedTransaction> {
        let old_transaction = self.hash_to_transaction.remove(hash)?;
        let caller = old_transaction.caller();

        if let Some(pending_transactions) = self.pending_transactions.get_mut(caller)
            && let Some(idx) = pending_transactions
                .iter()
                .position(|transaction| transaction.hash() == hash)
        {
            let mut invalidated_transactions = pending_transactions.split_off(idx + 1);
            let removed = pending_transactions.remove(idx);

            if pending_transactions.is_empty() {
                self.pending_transactions.shift_remove(caller);
            }

            if !invalidated_transactions.is_empty() {
                let future_transactions = self.future_transactions.entry(*caller).or_default();
                future_transactions.append(&mut invalidated_transactions);
                future_transactions.sort_by_key(OrderedTransaction::nonce);
            }

            return Some(removed);
        }

        if let Some(future_transactions) = self.future_transactions.get_mut(caller)
            && let Some(idx) = future_transactions
                .iter()
                .position(|transaction| transaction.hash() == hash)
        {
            let removed = future_transactions.remove(idx);

            if future_transactions.is_empty() {
                self.future_transactions.shift_remove(caller);
            }

            return Some(removed);
        }

        None
    }

    /// Updates the [`MemPool`] after a state change: drops transactions that
    /// became invalid, demotes pending transactions that no longer follow
    /// their sender's nonce, and promotes future transactions whose nonces
    /// became high enough.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn update<S>(&mut self, state: &S) -> Result<Vec<DroppedTransaction>, S::Error>
    where
        S: State + ?Sized,
    {
        let mut dropped = Vec::new();

        for (caller, transactions) in self.pending_transactions.iter_mut() {
            let sender = state.basic(*caller)?.unwrap_or_default();

            retain_valid(
                transactions,
                self.block_gas_limit,
                &sender,
                &mut self.hash_to_transaction,
                &mut dropped,
            );

            // Check that the pending transactions still have consecutive nonces, starting
            // from the sender's nonce
            if let Some(idx) = transactions
                .iter()
                .zip(sender.nonce..)
                .position(|(transaction, expected_nonce)| transaction.nonce() != expected_nonce)
            {
                let mut invalidated_transactions = transactions.split_off(idx);

                let future_transactions = self.future_transactions.entry(*caller).or_default();
                invalidated_transactions.append(future_transactions);
                invalidated_transactions.sort_by_key(OrderedTransaction::nonce);
                *future_transactions = invalidated_transactions;
            }

            // The pending run must remain affordable as a whole
            let mut unaffordable = split_off_unaffordable(transactions, sender.balance);
            if !unaffordable.is_empty() {
                let future_transactions = self.future_transactions.entry(*caller).or_default();
                future_transactions.append(&mut unaffordable);
                future_transactions.sort_by_key(OrderedTransaction::nonce);
            }
        }

        self.pending_transactions
            .retain(|_, transactions| !transactions.is_empty());

        for (caller, transactions) in self.future_transactions.iter_mut() {
            let sender = state.basic(*caller)?.unwrap_or_default();

            retain_valid(
                transactions,
                self.block_gas_limit,
                &sender,
                &mut self.hash_to_transaction,
                &mut dropped,
            );
        }

        self.future_transactions
            .retain(|_, transactions| !transactions.is_empty());

        // Promote future transactions that directly follow the sender's nonce
        let callers = self.future_transactions.keys().copied().collect::<Vec<_>>();
        for caller in callers {
            let sender = state.basic(caller)?.unwrap_or_default();
            let next_nonce = self
                .last_pending_nonce(&caller)
                .map_or(sender.nonce, |nonce| nonce + 1);

            self.promote_future_transactions(caller, next_nonce, sender.balance);
        }

        for transaction in &dropped {
            log::debug!(
                "Dropped transaction {} from the mempool: {}",
                transaction.transaction.transaction_hash(),
                transaction.reason
            );
        }

        Ok(dropped)
    }

    /// Returns the transaction corresponding to the provided hash, if it
    /// exists.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn transaction_by_hash(&self, hash: &B256) -> Option<&OrderedTransaction> {
        self.hash_to_transaction.get(hash)
    }

    /// Tries to add the provided transaction to the [`MemPool`].
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn add_transaction<S: State + ?Sized>(
        &mut self,
        state: &S,
        transaction: Signed,
    ) -> Result<AddTransactionOutcome, MemPoolAddTransactionError<S::Error>> {
        let transaction_gas_limit = transaction.gas_limit();
        if transaction_gas_limit > self.block_gas_limit.get() {
            return Err(MemPoolAddTransactionError::ExceedsBlockGasLimit {
                block_gas_limit: self.block_gas_limit,
                transaction_gas_limit,
            });
        }

        if self
            .hash_to_transaction
            .contains_key(transaction.transaction_hash())
        {
            return Err(MemPoolAddTransactionError::TransactionAlreadyExists {
                transaction_hash: *transaction.transaction_hash(),
            });
        }

        let sender = state.basic(*transaction.caller())?.unwrap_or_default();
        if transaction.nonce() < sender.nonce {
            return Err(MemPoolAddTransactionError::NonceTooLow {
                transaction_nonce: transaction.nonce(),
                sender_nonce: sender.nonce,
            });
        }

        // Funds are validated at admission to avoid flooding the pool
        let max_upfront_cost = upfront_cost(&transaction);
        if max_upfront_cost > sender.balance {
            return Err(MemPoolAddTransactionError::InsufficientFunds {
                max_upfront_cost,
                sender_balance: sender.balance,
            });
        }

        let next_nonce = self
            .last_pending_nonce(transaction.caller())
            .map_or(sender.nonce, |nonce| nonce + 1);

        let transaction = OrderedTransaction {
            order_id: self.next_order_id,
            transaction,
        };

        let outcome = if transaction.nonce() > next_nonce {
            self.insert_future_transaction(transaction.clone())?
        } else {
            self.insert_pending_transaction(&sender, transaction.clone())?
        };

        self.next_order_id += 1;

        log::trace!(
            "Added transaction {} to the mempool: {outcome:?}",
            transaction.hash()
        );

        self.hash_to_transaction
            .insert(*transaction.hash(), transaction);

        Ok(outcome)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn insert_pending_transaction<StateError>(
        &mut self,
        sender: &AccountInfo,
        transaction: OrderedTransaction,
    ) -> Result<AddTransactionOutcome, MemPoolAddTransactionError<StateError>> {
        let caller = *transaction.caller();
        let pending_transactions = self.pending_transactions.entry(caller).or_default();

        // The cumulative cost of the sender's pending run must be affordable
        let preceding_cost = pending_transactions
            .iter()
            .filter(|pending_transaction| pending_transaction.nonce() < transaction.nonce())
            .fold(U256::ZERO, |cost, pending_transaction| {
                cost.saturating_add(upfront_cost(&pending_transaction.transaction))
            });

        let max_upfront_cost = preceding_cost.saturating_add(upfront_cost(&transaction.transaction));
        if max_upfront_cost > sender.balance {
            if pending_transactions.is_empty() {
                self.pending_transactions.shift_remove(&caller);
            }

            return Err(MemPoolAddTransactionError::from_invalid(
                InvalidPoolTransaction::InsufficientFunds {
                    max_upfront_cost,
                    sender_balance: sender.balance,
                },
            ));
        }

        // Check whether an existing transaction can be replaced
        if let Some(replaced_transaction) = pending_transactions
            .iter_mut()
            .find(|pending_transaction| transaction.nonce() == pending_transaction.nonce())
        {
            validate_replacement_transaction(
                &replaced_transaction.transaction,
                &transaction.transaction,
            )?;

            self.hash_to_transaction.remove(replaced_transaction.hash());

            let previous = std::mem::replace(replaced_transaction, transaction).transaction;

            // A pricier replacement can make the sender's later transactions
            // unaffordable
            let unaffordable = split_off_unaffordable(pending_transactions, sender.balance);
            self.demote_to_future(caller, unaffordable);

            return Ok(AddTransactionOutcome::Replaced { previous });
        }

        let next_pending_nonce = transaction.nonce() + 1;
        pending_transactions.push(transaction);

        self.promote_future_transactions(caller, next_pending_nonce, sender.balance);

        Ok(AddTransactionOutcome::Pending)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn insert_future_transaction<StateError>(
        &mut self,
        transaction: OrderedTransaction,
    ) -> Result<AddTransactionOutcome, MemPoolAddTransactionError<StateError>> {
        let mut future_transactions = self.future_transactions.entry(*transaction.caller());

        // Check whether an existing transaction can be replaced
        if let Entry::Occupied(ref mut future_transactions) = future_transactions
            && let Some(replaced_transaction) = future_transactions
                .get_mut()
                .iter_mut()
                .find(|future_transaction| transaction.nonce() == future_transaction.nonce())
        {
            validate_replacement_transaction(
                &replaced_transaction.transaction,
                &transaction.transaction,
            )?;

            self.hash_to_transaction.remove(replaced_transaction.hash());

            let previous = std::mem::replace(replaced_transaction, transaction).transaction;
            return Ok(AddTransactionOutcome::Replaced { previous });
        }

        let future_transactions = future_transactions.or_default();
        let idx = future_transactions
            .partition_point(|future_transaction| future_transaction.nonce() < transaction.nonce());
        future_transactions.insert(idx, transaction);

        Ok(AddTransactionOutcome::Queued)
    }

    /// Moves as many future transactions of the caller as possible to the
    /// pending status, starting from the provided nonce. Promotion stops at
    /// the first transaction that the sender's balance cannot cover together
    /// with its pending transactions.
    fn promote_future_transactions(
        &mut self,
        caller: Address,
        mut next_pending_nonce: u64,
        balance: U256,
    ) {
        let Some(future_transactions) = self.future_transactions.get_mut(&caller) else {
            return;
        };

        let mut cumulative_cost = self
            .pending_transactions
            .get(&caller)
            .map_or(U256::ZERO, |transactions| cumulative_upfront_cost(transactions));

        let mut promoted = Vec::new();
        while let Some(idx) = future_transactions
            .iter()
            .position(|transaction| transaction.nonce() == next_pending_nonce)
        {
            let next_cost = cumulative_cost.saturating_add(upfront_cost(
                &future_transactions[idx].transaction,
            ));
            if next_cost > balance {
                break;
            }

            cumulative_cost = next_cost;
            promoted.push(future_transactions.remove(idx));
            next_pending_nonce += 1;
        }

        if future_transactions.is_empty() {
            self.future_transactions.shift_remove(&caller);
        }

        if !promoted.is_empty() {
            self.pending_transactions
                .entry(caller)
                .or_default()
                .append(&mut promoted);
        }
    }

    /// Moves the provided transactions of the caller to the future queue,
    /// keeping it sorted by nonce.
    fn demote_to_future(&mut self, caller: Address, mut transactions: Vec<OrderedTransaction>) {
        if transactions.is_empty() {
            return;
        }

        let future_transactions = self.future_transactions.entry(caller).or_default();
        future_transactions.append(&mut transactions);
        future_transactions.sort_by_key(OrderedTransaction::nonce);
    }

    /// Creates an iterator for all pending transactions; i.e. for which the
    /// nonces are guaranteed to be high enough.
    pub fn iter<ComparatorT>(&self, comparator: ComparatorT) -> PendingTransactions<ComparatorT>
    where
        ComparatorT: Fn(&OrderedTransaction, &OrderedTransaction) -> core::cmp::Ordering,
    {
        PendingTransactions {
            transactions: self.pending_transactions.clone(),
            comparator,
        }
    }
}

/// Calculates the next nonce of the account corresponding to the provided
/// address.
pub fn account_next_nonce<StateT: State + ?Sized>(
    mem_pool: &MemPool,
    state: &StateT,
    address: &Address,
) -> Result<u64, StateT::Error> {
    mem_pool.last_pending_nonce(address).map_or_else(
        || {
            state
                .basic(*address)
                .map(|account| account.map_or(0, |account| account.nonce))
        },
        |nonce| Ok(nonce + 1),
    )
}

fn validate_pooled_transaction(
    transaction: &Signed,
    block_gas_limit: NonZeroU64,
    sender: &AccountInfo,
) -> Result<(), InvalidPoolTransaction> {
    if transaction.gas_limit() > block_gas_limit.get() {
        return Err(InvalidPoolTransaction::ExceedsBlockGasLimit {
            block_gas_limit,
            transaction_gas_limit: transaction.gas_limit(),
        });
    }

    let max_upfront_cost = upfront_cost(transaction);
    if max_upfront_cost > sender.balance {
        return Err(InvalidPoolTransaction::InsufficientFunds {
            max_upfront_cost,
            sender_balance: sender.balance,
        });
    }

    // Mined transactions
    if transaction.nonce() < sender.nonce {
        return Err(InvalidPoolTransaction::NonceTooLow {
            transaction_nonce: transaction.nonce(),
            sender_nonce: sender.nonce,
        });
    }

    Ok(())
}

fn cumulative_upfront_cost(transactions: &[OrderedTransaction]) -> U256 {
    transactions.iter().fold(U256::ZERO, |cost, transaction| {
        cost.saturating_add(upfront_cost(&transaction.transaction))
    })
}

/// Splits off the tail of a sender's pending run, starting at the first
/// transaction that the balance cannot cover together with its predecessors.
fn split_off_unaffordable(
    transactions: &mut Vec<OrderedTransaction>,
    balance: U256,
) -> Vec<OrderedTransaction> {
    let mut cumulative_cost = U256::ZERO;
    let idx = transactions.iter().position(|transaction| {
        cumulative_cost = cumulative_cost.saturating_add(upfront_cost(&transaction.transaction));
        cumulative_cost > balance
    });

    idx.map_or_else(Vec::new, |idx| transactions.split_off(idx))
}

fn retain_valid(
    transactions: &mut Vec<OrderedTransaction>,
    block_gas_limit: NonZeroU64,
    sender: &AccountInfo,
    hash_to_transaction: &mut HashMap<B256, OrderedTransaction>,
    dropped: &mut Vec<DroppedTransaction>,
) {
    transactions.retain(|transaction| {
        match validate_pooled_transaction(&transaction.transaction, block_gas_limit, sender) {
            Ok(()) => true,
            Err(reason) => {
                hash_to_transaction.remove(transaction.hash());
                dropped.push(DroppedTransaction {
                    transaction: transaction.transaction.clone(),
                    reason,
                });

                false
            }
        }
    });
}

fn validate_replacement_transaction<StateError>(
    old_transaction: &Signed,
    new_transaction: &Signed,
) -> Result<(), MemPoolAddTransactionError<StateError>> {
    let min_new_max_fee_per_gas = min_new_fee(old_transaction.gas_price());
    if new_transaction.gas_price() < min_new_max_fee_per_gas {
        return Err(MemPoolAddTransactionError::ReplacementMaxFeePerGasTooLow {
            min_new_max_fee_per_gas,
            transaction_nonce: old_transaction.nonce(),
        });
    }

    let min_new_max_priority_fee_per_gas = min_new_fee(
        old_transaction
            .max_priority_fee_per_gas()
            .unwrap_or_else(|| old_transaction.gas_price()),
    );

    if new_transaction
        .max_priority_fee_per_gas()
        .unwrap_or_else(|| new_transaction.gas_price())
        < min_new_max_priority_fee_per_gas
    {
        return Err(
            MemPoolAddTransactionError::ReplacementMaxPriorityFeePerGasTooLow {
                min_new_max_priority_fee_per_gas,
                transaction_nonce: old_transaction.nonce(),
            },
        );
    }

    Ok(())
}

/// Computes the minimum fee a replacement transaction needs: 10% above the
/// replaced fee, rounded up.
fn min_new_fee(fee: u128) -> u128 {
    fee.saturating_mul(110).div_ceil(100)
}
