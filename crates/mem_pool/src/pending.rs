use core::{cmp::Ordering, fmt::Debug};

use devnet_primitives::Address;
use devnet_transaction::Signed;
use indexmap::IndexMap;

use crate::OrderedTransaction;

/// An iterator over pending transactions that yields them in the order of the
/// comparator, while preserving the nonce order of each sender.
pub struct PendingTransactions<ComparatorT>
where
    ComparatorT: Fn(&OrderedTransaction, &OrderedTransaction) -> Ordering,
{
    pub(crate) transactions: IndexMap<Address, Vec<OrderedTransaction>>,
    pub(crate) comparator: ComparatorT,
}

impl<ComparatorT> PendingTransactions<ComparatorT>
where
    ComparatorT: Fn(&OrderedTransaction, &OrderedTransaction) -> Ordering,
{
    /// Removes all pending transactions of the account corresponding to the
    /// provided address.
    pub fn remove_caller(&mut self, caller: &Address) -> Option<Vec<OrderedTransaction>> {
        self.transactions.shift_remove(caller)
    }
}

impl<ComparatorT> Debug for PendingTransactions<ComparatorT>
where
    ComparatorT: Fn(&OrderedTransaction, &OrderedTransaction) -> Ordering,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTransactions")
            .field("transactions", &self.transactions)
            .finish()
    }
}

impl<ComparatorT> Iterator for PendingTransactions<ComparatorT>
where
    ComparatorT: Fn(&OrderedTransaction, &OrderedTransaction) -> Ordering,
{
    type Item = Signed;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn next(&mut self) -> Option<Self::Item> {
        let comparator = &self.comparator;
        let (caller, transactions) = self
            .transactions
            .iter_mut()
            .filter(|(_, transactions)| !transactions.is_empty())
            .min_by(|(_, lhs), (_, rhs)| comparator(&lhs[0], &rhs[0]))?;

        let caller = *caller;
        let next = transactions.remove(0).transaction;

        if transactions.is_empty() {
            self.transactions.shift_remove(&caller);
        }

        Some(next)
    }
}
