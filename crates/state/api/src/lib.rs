#![warn(missing_docs)]

//! Types for Ethereum state management

pub mod account;
mod diff;
pub mod r#dyn;
mod error;
pub mod irregular;
pub mod r#override;

use core::{fmt::Debug, ops::Deref};

use auto_impl::auto_impl;
use devnet_primitives::{Address, B256, Bytes, HashMap, U256};
use devnet_trie::sec_trie_root;

pub use self::{diff::StateDiff, error::StateError, r#dyn::DynState};
use crate::account::{Account, AccountInfo, BasicAccount};

/// Account storage mapping of indices to values.
pub type AccountStorage = HashMap<U256, U256>;

/// Mapping of addresses to the changes made to their accounts.
pub type StateChanges = HashMap<Address, Account>;

/// Mapping of addresses to trie state accounts.
pub type TrieState = HashMap<Address, BasicAccount>;

/// Trait for reading state information.
#[auto_impl(&, &mut, Box, Rc, Arc)]
pub trait State {
    /// Combinatorial state error.
    type Error;

    /// Get basic account information.
    fn basic(&self, address: Address) -> Result<Option<AccountInfo>, Self::Error>;

    /// Get account code by its hash
    fn code_by_hash(&self, code_hash: B256) -> Result<Bytes, Self::Error>;

    /// Get storage value of address at index.
    fn storage(&self, address: Address, index: U256) -> Result<U256, Self::Error>;
}

/// Trait for reading state information that requires mutable access, e.g.
/// to populate a cache.
#[auto_impl(&mut, Box)]
pub trait StateMut {
    /// Combinatorial state error.
    type Error;

    /// Get basic account information.
    fn basic_mut(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error>;

    /// Get account code by its hash
    fn code_by_hash_mut(&mut self, code_hash: B256) -> Result<Bytes, Self::Error>;

    /// Get storage value of address at index.
    fn storage_mut(&mut self, address: Address, index: U256) -> Result<U256, Self::Error>;
}

/// Trait for committing the changes produced by execution to a state.
#[auto_impl(&mut, Box)]
pub trait StateCommit {
    /// Commits the provided changes.
    fn commit(&mut self, changes: StateChanges);
}

type BoxedAccountModifierFn = Box<dyn Fn(&mut U256, &mut u64, &mut Option<Bytes>) + Send>;

/// Debuggable function type for modifying account information.
pub struct AccountModifierFn {
    inner: BoxedAccountModifierFn,
}

impl AccountModifierFn {
    /// Constructs an [`AccountModifierFn`] from the provided function.
    pub fn new(func: BoxedAccountModifierFn) -> Self {
        Self { inner: func }
    }
}

impl Debug for AccountModifierFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            std::any::type_name::<dyn Fn(&mut U256, &mut u64, &mut Option<Bytes>)>()
        )
    }
}

impl Deref for AccountModifierFn {
    type Target = dyn Fn(&mut U256, &mut u64, &mut Option<Bytes>);

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

/// A trait for debug operation on a database.
#[auto_impl(&mut, Box)]
pub trait StateDebug {
    /// The state's error type.
    type Error;

    /// Retrieves the storage root of the account at the specified address.
    fn account_storage_root(&self, address: &Address) -> Result<Option<B256>, Self::Error>;

    /// Inserts the provided account at the specified address.
    fn insert_account(
        &mut self,
        address: Address,
        account_info: AccountInfo,
    ) -> Result<(), Self::Error>;

    /// Modifies the account at the specified address using the provided
    /// function.
    ///
    /// Returns the modified (or created) account.
    fn modify_account(
        &mut self,
        address: Address,
        modifier: AccountModifierFn,
    ) -> Result<AccountInfo, Self::Error>;

    /// Removes and returns the account at the specified address, if it exists.
    fn remove_account(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error>;

    /// Serializes the state using ordering of addresses and storage indices.
    fn serialize(&self) -> String;

    /// Sets the storage slot at the specified address and index to the provided
    /// value.
    ///
    /// Returns the old value.
    fn set_account_storage_slot(
        &mut self,
        address: Address,
        index: U256,
        value: U256,
    ) -> Result<U256, Self::Error>;

    /// Retrieves the storage root of the database.
    fn state_root(&self) -> Result<B256, Self::Error>;
}

/// Calculates the state root hash of the provided state.
pub fn state_root<'a, I>(state: I) -> B256
where
    I: IntoIterator<Item = (&'a Address, &'a BasicAccount)>,
{
    sec_trie_root(state.into_iter().map(|(address, account)| {
        let account = alloy_rlp::encode(account);
        (address, account)
    }))
}

/// Calculates the storage root hash of the provided storage.
pub fn storage_root<'a, I>(storage: I) -> B256
where
    I: IntoIterator<Item = (&'a U256, &'a U256)>,
{
    sec_trie_root(storage.into_iter().map(|(index, value)| {
        let value = alloy_rlp::encode(value);
        (index.to_be_bytes::<32>(), value)
    }))
}
