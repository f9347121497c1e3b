use devnet_primitives::{Address, HashMap, U256};

use crate::{
    StateChanges,
    account::{Account, AccountInfo},
};

/// The difference between two states, which can be applied to a state to get
/// the new state using [`crate::StateCommit::commit`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateDiff {
    inner: StateChanges,
}

impl StateDiff {
    /// Applies a single change to this instance, combining it with any
    /// existing change.
    pub fn apply_account_change(&mut self, address: Address, account_info: AccountInfo) {
        self.inner
            .entry(address)
            .and_modify(|account| {
                account.info = account_info.clone();
            })
            .or_insert_with(|| Account::from(account_info));
    }

    /// Applies a single storage change to this instance, combining it with
    /// any existing change.
    ///
    /// If the account corresponding to the specified address hasn't been
    /// modified before, the provided account information is used.
    pub fn apply_storage_change(
        &mut self,
        address: Address,
        index: U256,
        value: U256,
        account_info: AccountInfo,
    ) {
        self.inner
            .entry(address)
            .or_insert_with(|| Account::from(account_info))
            .storage
            .insert(index, value);
    }

    /// Applies a state diff to this instance, combining with any and all
    /// existing changes.
    pub fn apply_diff(&mut self, diff: StateChanges) {
        for (address, account) in diff {
            match self.inner.get_mut(&address) {
                Some(existing) if !account.is_created() && !account.is_selfdestructed() => {
                    existing.info = account.info;
                    existing.storage.extend(account.storage);
                }
                _ => {
                    self.inner.insert(address, account);
                }
            }
        }
    }

    /// Retrieves the inner map.
    pub fn as_inner(&self) -> &StateChanges {
        &self.inner
    }

    /// Whether the diff contains no changes.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<StateChanges> for StateDiff {
    fn from(value: StateChanges) -> Self {
        Self { inner: value }
    }
}

impl From<StateDiff> for HashMap<Address, Account> {
    fn from(value: StateDiff) -> Self {
        value.inner
    }
}
