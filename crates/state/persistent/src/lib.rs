#![warn(missing_docs)]

//! A local state backed by persistent data structures, which makes cloning
//! it for snapshots and historic block states cheap.

use std::collections::BTreeMap;

use devnet_primitives::{Address, B256, Bytes, KECCAK_EMPTY, U256};
use devnet_state_api::{
    AccountModifierFn, State, StateChanges, StateCommit, StateDebug, StateDiff, StateError,
    TrieState,
    account::{AccountInfo, BasicAccount, code_hash},
    state_root, storage_root,
};
use rpds::HashTrieMapSync;
use serde::Serialize;

#[derive(Clone, Debug)]
struct PersistentAccount {
    balance: U256,
    nonce: u64,
    code_hash: B256,
    storage: HashTrieMapSync<U256, U256>,
}

impl PersistentAccount {
    fn info(&self) -> AccountInfo {
        AccountInfo {
            balance: self.balance,
            nonce: self.nonce,
            code_hash: self.code_hash,
            code: None,
        }
    }

    fn set_info(&mut self, account_info: &AccountInfo) {
        self.balance = account_info.balance;
        self.nonce = account_info.nonce;
        self.code_hash = account_info.code_hash;
    }

    fn storage_root(&self) -> B256 {
        storage_root(self.storage.iter())
    }
}

impl From<&AccountInfo> for PersistentAccount {
    fn from(account_info: &AccountInfo) -> Self {
        Self {
            balance: account_info.balance,
            nonce: account_info.nonce,
            code_hash: account_info.code_hash,
            storage: HashTrieMapSync::new_sync(),
        }
    }
}

/// A state whose accounts, storage, and code are stored in hash array mapped
/// tries with structural sharing.
#[derive(Clone, Debug)]
pub struct PersistentState {
    accounts: HashTrieMapSync<Address, PersistentAccount>,
    contracts: HashTrieMapSync<B256, Bytes>,
}

impl Default for PersistentState {
    fn default() -> Self {
        let mut contracts = HashTrieMapSync::new_sync();
        contracts.insert_mut(KECCAK_EMPTY, Bytes::new());

        Self {
            accounts: HashTrieMapSync::new_sync(),
            contracts,
        }
    }
}

impl From<StateDiff> for PersistentState {
    fn from(value: StateDiff) -> Self {
        let mut genesis_state = PersistentState::default();
        genesis_state.commit(value.into());
        genesis_state
    }
}

impl PersistentState {
    /// Inserts the provided code using its hash, potentially overwriting an
    /// existing value.
    pub fn insert_code(&mut self, code_hash: B256, code: Bytes) {
        debug_assert_eq!(code_hash, devnet_state_api::account::code_hash(&code));

        self.contracts.insert_mut(code_hash, code);
    }

    /// Whether an account exists at the provided address.
    pub fn contains_account(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    /// Modifies the account at the given address, if it exists. Otherwise, it
    /// creates a new account using the provided `default_account_fn`.
    ///
    /// The `external_code_by_hash_fn` is used to fetch code for accounts that
    /// exist but whose code is not present in the local state.
    pub fn modify_account_or_else(
        &mut self,
        address: Address,
        modifier: AccountModifierFn,
        default_account_fn: &dyn Fn() -> Result<AccountInfo, StateError>,
        external_code_by_hash_fn: &dyn Fn(B256) -> Result<Bytes, StateError>,
    ) -> Result<AccountInfo, StateError> {
        let mut account_info = match self.accounts.get(&address) {
            Some(account) => account.info(),
            None => default_account_fn()?,
        };

        if account_info.code.is_none() {
            let code = match self.code_by_hash(account_info.code_hash) {
                Ok(code) => code,
                Err(StateError::InvalidCodeHash(code_hash)) => external_code_by_hash_fn(code_hash)?,
                Err(error) => return Err(error),
            };

            account_info.code = Some(code);
        }

        modifier(
            &mut account_info.balance,
            &mut account_info.nonce,
            &mut account_info.code,
        );

        let new_code = account_info.code.clone().unwrap_or_default();
        account_info.code_hash = code_hash(&new_code);
        self.insert_code(account_info.code_hash, new_code);

        self.upsert_account(address, &account_info);

        Ok(account_info)
    }

    /// Sets the storage slot at the given index for the account at the given
    /// address. If the account does not exist, it is created using the
    /// provided `default_account_fn`.
    ///
    /// Returns the previous value at the storage slot.
    pub fn set_account_storage_slot_or_else(
        &mut self,
        address: Address,
        index: U256,
        value: U256,
        default_account_fn: &dyn Fn() -> Result<AccountInfo, StateError>,
    ) -> Result<U256, StateError> {
        let mut account = match self.accounts.get(&address) {
            Some(account) => account.clone(),
            None => {
                let account_info = default_account_fn()?;
                if let Some(code) = account_info.code.clone() {
                    self.insert_code(account_info.code_hash, code);
                }

                PersistentAccount::from(&account_info)
            }
        };

        let old_value = account.storage.get(&index).copied().unwrap_or(U256::ZERO);
        if value == U256::ZERO {
            account.storage.remove_mut(&index);
        } else {
            account.storage.insert_mut(index, value);
        }

        self.accounts.insert_mut(address, account);

        Ok(old_value)
    }

    fn upsert_account(&mut self, address: Address, account_info: &AccountInfo) {
        let account = match self.accounts.get(&address) {
            Some(existing) => {
                let mut account = existing.clone();
                account.set_info(account_info);
                account
            }
            None => PersistentAccount::from(account_info),
        };

        self.accounts.insert_mut(address, account);
    }
}

impl State for PersistentState {
    type Error = StateError;

    fn basic(&self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        Ok(self.accounts.get(&address).map(PersistentAccount::info))
    }

    fn code_by_hash(&self, code_hash: B256) -> Result<Bytes, Self::Error> {
        self.contracts
            .get(&code_hash)
            .cloned()
            .ok_or(StateError::InvalidCodeHash(code_hash))
    }

    fn storage(&self, address: Address, index: U256) -> Result<U256, Self::Error> {
        Ok(self
            .accounts
            .get(&address)
            .and_then(|account| account.storage.get(&index).copied())
            .unwrap_or(U256::ZERO))
    }
}

impl StateCommit for PersistentState {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn commit(&mut self, changes: StateChanges) {
        for (address, mut account) in changes {
            if account.is_selfdestructed() || (account.is_empty() && !account.is_created()) {
                self.accounts.remove_mut(&address);
                continue;
            }

            if let Some(code) = account.info.code.take() {
                self.insert_code(account.info.code_hash, code);
            }

            let mut persistent_account = match self.accounts.get(&address) {
                Some(existing) if !account.is_created() => {
                    let mut existing = existing.clone();
                    existing.set_info(&account.info);
                    existing
                }
                _ => PersistentAccount::from(&account.info),
            };

            for (index, value) in account.storage {
                if value == U256::ZERO {
                    persistent_account.storage.remove_mut(&index);
                } else {
                    persistent_account.storage.insert_mut(index, value);
                }
            }

            self.accounts.insert_mut(address, persistent_account);
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SerializedAccount {
    balance: U256,
    nonce: u64,
    code_hash: B256,
    storage_root: B256,
    storage: BTreeMap<U256, U256>,
}

impl StateDebug for PersistentState {
    type Error = StateError;

    fn account_storage_root(&self, address: &Address) -> Result<Option<B256>, Self::Error> {
        Ok(self.accounts.get(address).map(PersistentAccount::storage_root))
    }

    fn insert_account(
        &mut self,
        address: Address,
        mut account_info: AccountInfo,
    ) -> Result<(), Self::Error> {
        if let Some(code) = account_info.code.take() {
            self.insert_code(account_info.code_hash, code);
        }

        self.upsert_account(address, &account_info);

        Ok(())
    }

    fn modify_account(
        &mut self,
        address: Address,
        modifier: AccountModifierFn,
    ) -> Result<AccountInfo, Self::Error> {
        self.modify_account_or_else(
            address,
            modifier,
            &|| Ok(AccountInfo::default()),
            &|code_hash| Err(StateError::InvalidCodeHash(code_hash)),
        )
    }

    fn remove_account(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        let account = self.accounts.get(&address).map(PersistentAccount::info);
        self.accounts.remove_mut(&address);

        Ok(account)
    }

    fn serialize(&self) -> String {
        let accounts: BTreeMap<Address, SerializedAccount> = self
            .accounts
            .iter()
            .map(|(address, account)| {
                let serialized = SerializedAccount {
                    balance: account.balance,
                    nonce: account.nonce,
                    code_hash: account.code_hash,
                    storage_root: account.storage_root(),
                    storage: account
                        .storage
                        .iter()
                        .map(|(index, value)| (*index, *value))
                        .collect(),
                };

                (*address, serialized)
            })
            .collect();

        serde_json::to_string_pretty(&accounts)
            .expect("maps of plain values always serialize to JSON")
    }

    fn set_account_storage_slot(
        &mut self,
        address: Address,
        index: U256,
        value: U256,
    ) -> Result<U256, Self::Error> {
        self.set_account_storage_slot_or_else(address, index, value, &|| {
            Ok(AccountInfo::default())
        })
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn state_root(&self) -> Result<B256, Self::Error> {
        let state: TrieState = self
            .accounts
            .iter()
            .map(|(address, account)| {
                let basic_account = BasicAccount {
                    nonce: account.nonce,
                    balance: account.balance,
                    storage_root: account.storage_root(),
                    code_hash: account.code_hash,
                };

                (*address, basic_account)
            })
            .collect();

        Ok(state_root(&state))
    }
}
