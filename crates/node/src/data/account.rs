use devnet_primitives::{Address, HashMap};
use devnet_state_api::account::{Account, AccountInfo, AccountStatus};
use devnet_transaction::signature::secret_key_to_address;
use indexmap::IndexMap;

use crate::config::{GenesisAccount, NodeConfig, OwnedAccount};

pub(super) struct InitialAccounts {
    pub local_accounts: IndexMap<Address, k256::SecretKey>,
    pub genesis_state: HashMap<Address, Account>,
}

/// Collects the owned accounts and the configured genesis accounts. A genesis
/// account takes precedence over an owned account with the same address.
pub(super) fn create_accounts(config: &NodeConfig) -> InitialAccounts {
    let mut local_accounts = IndexMap::default();

    let owned_accounts = config.accounts.iter().map(
        |OwnedAccount {
             secret_key,
             balance,
         }| {
            let address = secret_key_to_address(secret_key);
            local_accounts.insert(address, secret_key.clone());

            let account = Account {
                info: AccountInfo {
                    balance: *balance,
                    ..AccountInfo::default()
                },
                storage: HashMap::default(),
                status: AccountStatus::Created,
            };

            (address, account)
        },
    );

    let genesis_accounts = config.genesis_state.iter().map(
        |(
            address,
            GenesisAccount {
                balance,
                nonce,
                code,
                storage,
            },
        )| {
            let account = Account {
                info: AccountInfo::with_code(*balance, *nonce, code.clone()),
                storage: storage.clone(),
                status: AccountStatus::Created,
            };

            (*address, account)
        },
    );

    let genesis_state = owned_accounts.chain(genesis_accounts).collect();

    InitialAccounts {
        local_accounts,
        genesis_state,
    }
}
