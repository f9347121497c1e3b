use devnet_primitives::{Address, B256, Bytes, HashMap, U256, hash_map::Entry};
use devnet_state_api::{AccountStorage, State, StateError, StateMut, account::AccountInfo};

use super::RemoteState;

#[derive(Clone, Debug, Default)]
struct AccountAndStorage {
    pub info: AccountInfo,
    pub storage: AccountStorage,
}

impl From<AccountInfo> for AccountAndStorage {
    fn from(info: AccountInfo) -> Self {
        Self {
            info,
            storage: AccountStorage::default(),
        }
    }
}

/// A cached version of [`RemoteState`].
///
/// Values are only cached if the block is deep enough below the remote's tip
/// to be immutable. Code is always cached, as it is identified by its hash.
#[derive(Debug)]
pub struct CachedRemoteState {
    remote: RemoteState,
    /// Mapping of block numbers to cached accounts
    account_cache: HashMap<u64, HashMap<Address, AccountAndStorage>>,
    /// Mapping of block numbers to cached code
    code_cache: HashMap<u64, HashMap<B256, Bytes>>,
}

impl CachedRemoteState {
    /// Constructs a new [`CachedRemoteState`].
    pub fn new(remote: RemoteState) -> Self {
        Self {
            remote,
            account_cache: HashMap::default(),
            code_cache: HashMap::default(),
        }
    }

    /// Retrieves the block number of the remote state.
    pub fn block_number(&self) -> u64 {
        self.remote.block_number()
    }
}

impl StateMut for CachedRemoteState {
    type Error = StateError;

    fn basic_mut(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        let block_accounts = self
            .account_cache
            .entry(self.remote.block_number())
            .or_default();

        if let Some(account) = block_accounts.get(&address) {
            log::trace!("Remote account cache hit: {address}");
            return Ok(Some(account.info.clone()));
        }

        if let Some(account_info) =
            fetch_remote_account(address, &self.remote, &mut self.code_cache)?
        {
            if self.remote.is_cacheable()? {
                block_accounts.insert(address, account_info.clone().into());
            }
            return Ok(Some(account_info));
        }

        Ok(None)
    }

    fn code_by_hash_mut(&mut self, code_hash: B256) -> Result<Bytes, Self::Error> {
        let block_code = self
            .code_cache
            .entry(self.remote.block_number())
            .or_default();

        block_code
            .get(&code_hash)
            .cloned()
            .ok_or(StateError::InvalidCodeHash(code_hash))
    }

    fn storage_mut(&mut self, address: Address, index: U256) -> Result<U256, Self::Error> {
        let block_accounts = self
            .account_cache
            .entry(self.remote.block_number())
            .or_default();

        Ok(match block_accounts.entry(address) {
            Entry::Occupied(mut account_entry) => {
                match account_entry.get_mut().storage.entry(index) {
                    Entry::Occupied(entry) => *entry.get(),
                    Entry::Vacant(entry) => {
                        let value = self.remote.storage(address, index)?;
                        if self.remote.is_cacheable()? {
                            *entry.insert(value)
                        } else {
                            value
                        }
                    }
                }
            }
            Entry::Vacant(account_entry) => {
                // The account needs to be loaded to cache its slots.
                let mut account =
                    fetch_remote_account(address, &self.remote, &mut self.code_cache)?
                        .map_or_else(AccountAndStorage::default, AccountAndStorage::from);

                let value = self.remote.storage(address, index)?;

                if self.remote.is_cacheable()? {
                    account.storage.insert(index, value);
                    account_entry.insert(account);
                }

                value
            }
        })
    }
}

/// Fetches an account from the remote state. If it exists, code is split off
/// and stored separately in the provided cache.
fn fetch_remote_account(
    address: Address,
    remote: &RemoteState,
    code_cache: &mut HashMap<u64, HashMap<B256, Bytes>>,
) -> Result<Option<AccountInfo>, StateError> {
    let account = remote.basic(address)?.map(|mut account_info| {
        if let Some(code) = account_info.code.take() {
            let block_code = code_cache.entry(remote.block_number()).or_default();

            block_code.entry(account_info.code_hash).or_insert(code);
        }
        account_info
    });

    Ok(account)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use devnet_primitives::Bytes;
    use devnet_rpc_client::{RemoteAccount, test_utils::InMemoryChainSource};

    use super::*;

    const LATEST_BLOCK_NUMBER: u64 = 1_000;

    fn remote_with_account(address: Address) -> Arc<InMemoryChainSource> {
        let source = Arc::new(InMemoryChainSource::new(1, LATEST_BLOCK_NUMBER));
        source.insert_account(
            address,
            RemoteAccount {
                balance: U256::from(10),
                nonce: 2,
                code: Bytes::from_static(&[0x60, 0x00]),
            },
        );
        source.insert_storage(address, U256::from(1), U256::from(7));
        source
    }

    #[test]
    fn caches_safe_block_number() -> anyhow::Result<()> {
        let address = Address::random();
        let source = remote_with_account(address);

        let mut cached = CachedRemoteState::new(RemoteState::new(source.clone(), 100));

        let account_info = cached.basic_mut(address)?.expect("account exists");
        assert_eq!(account_info.nonce, 2);
        assert!(account_info.code.is_none());
        assert_eq!(
            cached.code_by_hash_mut(account_info.code_hash)?,
            Bytes::from_static(&[0x60, 0x00])
        );

        cached.basic_mut(address)?;
        assert_eq!(source.account_requests(), 1);

        assert_eq!(cached.storage_mut(address, U256::from(1))?, U256::from(7));
        assert_eq!(cached.storage_mut(address, U256::from(1))?, U256::from(7));
        assert_eq!(source.storage_requests(), 1);

        Ok(())
    }

    #[test]
    fn no_cache_for_unsafe_block_number() -> anyhow::Result<()> {
        let address = Address::random();
        let source = remote_with_account(address);

        let mut cached =
            CachedRemoteState::new(RemoteState::new(source.clone(), LATEST_BLOCK_NUMBER));

        let account_info = cached.basic_mut(address)?.expect("account exists");
        cached.basic_mut(address)?;
        assert_eq!(source.account_requests(), 2);

        cached.storage_mut(address, U256::from(0))?;

        for entry in cached.account_cache.values() {
            assert!(entry.is_empty());
        }

        // Code is cached regardless of the block number
        cached.code_by_hash_mut(account_info.code_hash)?;

        Ok(())
    }

    #[test]
    fn empty_remote_account_does_not_exist() -> anyhow::Result<()> {
        let source = Arc::new(InMemoryChainSource::new(1, LATEST_BLOCK_NUMBER));
        let mut cached = CachedRemoteState::new(RemoteState::new(source, 100));

        assert_eq!(cached.basic_mut(Address::random())?, None);

        Ok(())
    }
}
