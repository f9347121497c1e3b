#![warn(missing_docs)]

//! A state that layers local modifications on top of a remote chain's state.

use std::sync::Arc;

use devnet_primitives::{Address, B256, Bytes, HashSet, KECCAK_NULL_RLP, U256};
use devnet_rpc_client::RemoteChainSource;
use devnet_state_api::{
    AccountModifierFn, State, StateChanges, StateCommit, StateDebug, StateError, StateMut as _,
    account::AccountInfo,
};
use devnet_state_persistent::PersistentState;
use devnet_state_remote::{CachedRemoteState, RemoteState};
use devnet_utils::random::RandomHashGenerator;
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};

/// A state integrating the state of a remote chain at the fork block and a
/// local state containing all modifications made since.
#[derive(Debug)]
pub struct ForkState {
    local_state: PersistentState,
    remote_state: Arc<Mutex<CachedRemoteState>>,
    removed_storage_slots: HashSet<(Address, U256)>,
    /// A pair of the latest state root and local state root
    current_state: RwLock<(B256, B256)>,
    hash_generator: Arc<Mutex<RandomHashGenerator>>,
    removed_remote_accounts: HashSet<Address>,
}

impl ForkState {
    /// Constructs a new instance for the remote state at the provided fork
    /// block number with the provided state root.
    pub fn new(
        source: Arc<dyn RemoteChainSource>,
        hash_generator: Arc<Mutex<RandomHashGenerator>>,
        fork_block_number: u64,
        state_root: B256,
    ) -> Result<Self, StateError> {
        let remote_state = RemoteState::new(source, fork_block_number);
        let local_state = PersistentState::default();
        let local_root = local_state.state_root()?;

        Ok(Self {
            local_state,
            remote_state: Arc::new(Mutex::new(CachedRemoteState::new(remote_state))),
            removed_storage_slots: HashSet::default(),
            current_state: RwLock::new((state_root, local_root)),
            hash_generator,
            removed_remote_accounts: HashSet::default(),
        })
    }

    /// Overrides the state root of the fork state.
    pub fn set_state_root(&mut self, state_root: B256) -> Result<(), StateError> {
        let local_root = self.local_state.state_root()?;

        *self.current_state.get_mut() = (state_root, local_root);

        Ok(())
    }
}

impl Clone for ForkState {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn clone(&self) -> Self {
        Self {
            local_state: self.local_state.clone(),
            remote_state: self.remote_state.clone(),
            removed_storage_slots: self.removed_storage_slots.clone(),
            current_state: RwLock::new(*self.current_state.read()),
            hash_generator: self.hash_generator.clone(),
            removed_remote_accounts: self.removed_remote_accounts.clone(),
        }
    }
}

impl State for ForkState {
    type Error = StateError;

    fn basic(&self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        if let Some(local) = self.local_state.basic(address)? {
            Ok(Some(local))
        } else if self.removed_remote_accounts.contains(&address) {
            Ok(None)
        } else {
            self.remote_state.lock().basic_mut(address)
        }
    }

    fn code_by_hash(&self, code_hash: B256) -> Result<Bytes, Self::Error> {
        if let Ok(local) = self.local_state.code_by_hash(code_hash) {
            Ok(local)
        } else {
            self.remote_state.lock().code_by_hash_mut(code_hash)
        }
    }

    fn storage(&self, address: Address, index: U256) -> Result<U256, Self::Error> {
        let local = self.local_state.storage(address, index)?;
        if local != U256::ZERO
            || self.removed_storage_slots.contains(&(address, index))
            || self.removed_remote_accounts.contains(&address)
        {
            Ok(local)
        } else {
            self.remote_state.lock().storage_mut(address, index)
        }
    }
}

impl StateCommit for ForkState {
    fn commit(&mut self, changes: StateChanges) {
        changes.iter().for_each(|(address, account)| {
            // A created account does not inherit any remote storage.
            if account.is_selfdestructed() || account.is_created() || account.is_empty() {
                self.removed_remote_accounts.insert(*address);
            }

            account.storage.iter().for_each(|(index, value)| {
                // Zero entries are kept as "removed", as a successful local
                // lookup must not fall through to the remote.
                if *value == U256::ZERO {
                    self.removed_storage_slots.insert((*address, *index));
                }
            });
        });

        self.local_state.commit(changes);
    }
}

impl StateDebug for ForkState {
    type Error = StateError;

    fn account_storage_root(&self, _address: &Address) -> Result<Option<B256>, Self::Error> {
        // The storage of remote accounts is not known in full.
        Ok(Some(KECCAK_NULL_RLP))
    }

    fn insert_account(
        &mut self,
        address: Address,
        account_info: AccountInfo,
    ) -> Result<(), Self::Error> {
        self.local_state.insert_account(address, account_info)
    }

    fn modify_account(
        &mut self,
        address: Address,
        modifier: AccountModifierFn,
    ) -> Result<AccountInfo, Self::Error> {
        let removed = self.removed_remote_accounts.contains(&address);
        let remote_state = self.remote_state.clone();

        self.local_state.modify_account_or_else(
            address,
            modifier,
            &|| {
                if removed {
                    Ok(AccountInfo::default())
                } else {
                    Ok(remote_state.lock().basic_mut(address)?.unwrap_or_default())
                }
            },
            &|code_hash| remote_state.lock().code_by_hash_mut(code_hash),
        )
    }

    fn remove_account(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        if let Some(account_info) = self.local_state.remove_account(address)? {
            self.removed_remote_accounts.insert(address);
            Ok(Some(account_info))
        } else if self.removed_remote_accounts.contains(&address) {
            Ok(None)
        } else if let Some(account_info) = self.remote_state.lock().basic_mut(address)? {
            self.removed_remote_accounts.insert(address);
            Ok(Some(account_info))
        } else {
            Ok(None)
        }
    }

    fn serialize(&self) -> String {
        self.local_state.serialize()
    }

    fn set_account_storage_slot(
        &mut self,
        address: Address,
        index: U256,
        value: U256,
    ) -> Result<U256, Self::Error> {
        let old_value = self.storage(address, index)?;

        if value == U256::ZERO {
            self.removed_storage_slots.insert((address, index));
        }

        let removed = self.removed_remote_accounts.contains(&address);
        let remote_state = self.remote_state.clone();
        self.local_state
            .set_account_storage_slot_or_else(address, index, value, &|| {
                if removed {
                    Ok(AccountInfo::default())
                } else {
                    Ok(remote_state.lock().basic_mut(address)?.unwrap_or_default())
                }
            })?;

        Ok(old_value)
    }

    fn state_root(&self) -> Result<B256, Self::Error> {
        let local_root = self.local_state.state_root()?;

        let current_state = self.current_state.upgradable_read();

        Ok(if local_root == current_state.1 {
            current_state.0
        } else {
            let next_state_root = self.hash_generator.lock().next_value();

            *RwLockUpgradableReadGuard::upgrade(current_state) = (next_state_root, local_root);

            next_state_root
        })
    }
}
