//! Transient state overrides applied for the duration of a single call

use devnet_primitives::{Address, B256, Bytes, HashMap, U256};
use serde::Deserialize;

use crate::{
    State,
    account::{AccountInfo, code_hash},
};

/// Options for overriding account information, as provided by a caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOverrideOptions {
    /// Replacement balance
    #[serde(default)]
    pub balance: Option<U256>,
    /// Replacement nonce
    #[serde(default)]
    pub nonce: Option<U256>,
    /// Replacement code
    #[serde(default)]
    pub code: Option<Bytes>,
    /// Replacement of the entire storage
    #[serde(default, rename = "state")]
    pub storage: Option<HashMap<B256, B256>>,
    /// Changes to individual storage slots
    #[serde(default, rename = "stateDiff")]
    pub storage_diff: Option<HashMap<B256, B256>>,
}

/// Error that occurs when converting [`AccountOverrideOptions`] into an
/// [`AccountOverride`].
#[derive(Debug, thiserror::Error)]
pub enum AccountOverrideConversionError {
    /// Both the full storage and a storage diff were provided.
    #[error("The fields `state` and `stateDiff` cannot both be set for account `{address}`.")]
    StorageOverrideConflict {
        /// The account being overridden
        address: Address,
    },
    /// The nonce does not fit into 64 bits.
    #[error("The nonce override for account `{address}` exceeds 2^64 - 1.")]
    NonceOverflow {
        /// The account being overridden
        address: Address,
    },
}

/// Override of an account's storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageOverride {
    /// The provided slots replace the storage; all other slots read as zero.
    Full(HashMap<U256, U256>),
    /// The provided slots are written on top of the existing storage.
    Diff(HashMap<U256, U256>),
}

/// Values that override an account's information.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountOverride {
    /// Replacement balance
    pub balance: Option<U256>,
    /// Replacement nonce
    pub nonce: Option<u64>,
    /// Replacement code
    pub code: Option<Bytes>,
    /// Storage override
    pub storage: Option<StorageOverride>,
}

impl AccountOverride {
    /// Validates and converts the provided options for the account at the
    /// provided address.
    pub fn try_from_options(
        address: Address,
        options: AccountOverrideOptions,
    ) -> Result<Self, AccountOverrideConversionError> {
        let AccountOverrideOptions {
            balance,
            nonce,
            code,
            storage,
            storage_diff,
        } = options;

        let nonce = nonce
            .map(|nonce| {
                nonce
                    .try_into()
                    .map_err(|_error| AccountOverrideConversionError::NonceOverflow { address })
            })
            .transpose()?;

        let storage = match (storage, storage_diff) {
            (Some(_), Some(_)) => {
                return Err(AccountOverrideConversionError::StorageOverrideConflict { address });
            }
            (Some(storage), None) => Some(StorageOverride::Full(convert_storage(storage))),
            (None, Some(storage_diff)) => {
                Some(StorageOverride::Diff(convert_storage(storage_diff)))
            }
            (None, None) => None,
        };

        Ok(Self {
            balance,
            nonce,
            code,
            storage,
        })
    }
}

fn convert_storage(storage: HashMap<B256, B256>) -> HashMap<U256, U256> {
    storage
        .into_iter()
        .map(|(index, value)| (U256::from_be_bytes(index.0), U256::from_be_bytes(value.0)))
        .collect()
}

/// A set of overrides for state information.
#[derive(Clone, Debug, Default)]
pub struct StateOverrides {
    account_overrides: HashMap<Address, AccountOverride>,
    code_hash_to_code: HashMap<B256, Bytes>,
}

impl StateOverrides {
    /// Constructs a new set of state overrides.
    pub fn new(account_overrides: HashMap<Address, AccountOverride>) -> Self {
        let code_hash_to_code = account_overrides
            .values()
            .filter_map(|account_override| {
                account_override
                    .code
                    .as_ref()
                    .map(|code| (code_hash(code), code.clone()))
            })
            .collect();

        Self {
            account_overrides,
            code_hash_to_code,
        }
    }

    /// Validates and converts the provided options into a set of overrides.
    pub fn try_from_options(
        options: HashMap<Address, AccountOverrideOptions>,
    ) -> Result<Self, AccountOverrideConversionError> {
        let account_overrides = options
            .into_iter()
            .map(|(address, options)| {
                AccountOverride::try_from_options(address, options)
                    .map(|account_override| (address, account_override))
            })
            .collect::<Result<_, _>>()?;

        Ok(Self::new(account_overrides))
    }

    /// Whether no account is overridden.
    pub fn is_empty(&self) -> bool {
        self.account_overrides.is_empty()
    }

    /// Retrieves the account information for the provided address, applying
    /// any overrides.
    pub fn account_info<StateT: State>(
        &self,
        state: &StateT,
        address: &Address,
    ) -> Result<Option<AccountInfo>, StateT::Error> {
        let Some(account_override) = self.account_overrides.get(address) else {
            return state.basic(*address);
        };

        let mut account_info = state.basic(*address)?.unwrap_or_default();

        if let Some(balance) = account_override.balance {
            account_info.balance = balance;
        }

        if let Some(nonce) = account_override.nonce {
            account_info.nonce = nonce;
        }

        if let Some(code) = &account_override.code {
            account_info.code_hash = code_hash(code);
            account_info.code = Some(code.clone());
        }

        Ok(Some(account_info))
    }

    /// Retrieves the storage slot at the provided address and index, applying
    /// any overrides.
    pub fn account_storage_at<StateT: State>(
        &self,
        state: &StateT,
        address: &Address,
        index: &U256,
    ) -> Result<U256, StateT::Error> {
        let storage_override = self
            .account_overrides
            .get(address)
            .and_then(|account_override| account_override.storage.as_ref());

        match storage_override {
            Some(StorageOverride::Full(storage)) => {
                Ok(storage.get(index).copied().unwrap_or(U256::ZERO))
            }
            Some(StorageOverride::Diff(storage)) => match storage.get(index) {
                Some(value) => Ok(*value),
                None => state.storage(*address, *index),
            },
            None => state.storage(*address, *index),
        }
    }

    /// Retrieves the code corresponding to the provided hash, preferring the
    /// overridden code.
    pub fn code_by_hash<StateT: State>(
        &self,
        state: &StateT,
        code_hash: B256,
    ) -> Result<Bytes, StateT::Error> {
        match self.code_hash_to_code.get(&code_hash) {
            Some(code) => Ok(code.clone()),
            None => state.code_by_hash(code_hash),
        }
    }
}

/// A state that applies a set of overrides on top of a state without
/// modifying it.
#[derive(Debug)]
pub struct StateRefOverrider<'overrides, StateT> {
    overrides: &'overrides StateOverrides,
    state: StateT,
}

impl<'overrides, StateT> StateRefOverrider<'overrides, StateT> {
    /// Creates a new state overrider.
    pub fn new(overrides: &'overrides StateOverrides, state: StateT) -> Self {
        Self { overrides, state }
    }
}

impl<StateT: State> State for StateRefOverrider<'_, StateT> {
    type Error = StateT::Error;

    fn basic(&self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        self.overrides.account_info(&self.state, &address)
    }

    fn code_by_hash(&self, code_hash: B256) -> Result<Bytes, Self::Error> {
        self.overrides.code_by_hash(&self.state, code_hash)
    }

    fn storage(&self, address: Address, index: U256) -> Result<U256, Self::Error> {
        self.overrides
            .account_storage_at(&self.state, &address, &index)
    }
}

#[cfg(test)]
mod tests {
    use devnet_primitives::hex;

    use super::*;

    #[derive(Debug, Default)]
    struct SingleAccountState {
        address: Address,
        storage: HashMap<U256, U256>,
    }

    impl State for SingleAccountState {
        type Error = std::convert::Infallible;

        fn basic(&self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
            Ok((address == self.address).then(|| AccountInfo {
                balance: U256::from(100),
                nonce: 1,
                ..AccountInfo::default()
            }))
        }

        fn code_by_hash(&self, _code_hash: B256) -> Result<Bytes, Self::Error> {
            Ok(Bytes::new())
        }

        fn storage(&self, _address: Address, index: U256) -> Result<U256, Self::Error> {
            Ok(self.storage.get(&index).copied().unwrap_or_default())
        }
    }

    fn slot(value: u64) -> B256 {
        B256::from(U256::from(value))
    }

    #[test]
    fn rejects_conflicting_storage_overrides() {
        let address = Address::random();
        let options = AccountOverrideOptions {
            storage: Some(HashMap::default()),
            storage_diff: Some(HashMap::default()),
            ..AccountOverrideOptions::default()
        };

        let error = AccountOverride::try_from_options(address, options)
            .expect_err("conflicting storage overrides");
        assert!(matches!(
            error,
            AccountOverrideConversionError::StorageOverrideConflict { address: conflicting } if conflicting == address
        ));
    }

    #[test]
    fn rejects_oversized_nonce() {
        let options = AccountOverrideOptions {
            nonce: Some(U256::from(u64::MAX) + U256::from(1)),
            ..AccountOverrideOptions::default()
        };

        let error = AccountOverride::try_from_options(Address::random(), options)
            .expect_err("nonce overflows");
        assert!(matches!(
            error,
            AccountOverrideConversionError::NonceOverflow { .. }
        ));
    }

    #[test]
    fn full_and_diff_storage_overrides() -> anyhow::Result<()> {
        let full_address = Address::random();
        let diff_address = Address::random();

        let mut storage = HashMap::default();
        storage.insert(U256::from(1), U256::from(10));
        storage.insert(U256::from(2), U256::from(20));

        let mut options = HashMap::default();
        options.insert(
            full_address,
            AccountOverrideOptions {
                storage: Some([(slot(1), slot(11))].into_iter().collect()),
                ..AccountOverrideOptions::default()
            },
        );
        options.insert(
            diff_address,
            AccountOverrideOptions {
                balance: Some(U256::from(5)),
                storage_diff: Some([(slot(1), slot(12))].into_iter().collect()),
                ..AccountOverrideOptions::default()
            },
        );
        let overrides = StateOverrides::try_from_options(options)?;

        let full = StateRefOverrider::new(
            &overrides,
            SingleAccountState {
                address: full_address,
                storage: storage.clone(),
            },
        );
        assert_eq!(full.storage(full_address, U256::from(1))?, U256::from(11));
        assert_eq!(full.storage(full_address, U256::from(2))?, U256::ZERO);

        let diff = StateRefOverrider::new(
            &overrides,
            SingleAccountState {
                address: diff_address,
                storage,
            },
        );
        assert_eq!(diff.storage(diff_address, U256::from(1))?, U256::from(12));
        assert_eq!(diff.storage(diff_address, U256::from(2))?, U256::from(20));

        let account = diff.basic(diff_address)?.expect("account exists");
        assert_eq!(account.balance, U256::from(5));
        assert_eq!(account.nonce, 1);

        Ok(())
    }

    #[test]
    fn deserializes_options() -> anyhow::Result<()> {
        let options: AccountOverrideOptions = serde_json::from_value(serde_json::json!({
            "balance": "0x10",
            "nonce": "0x2",
            "stateDiff": { hex::encode_prefixed(slot(1)): hex::encode_prefixed(slot(2)) }
        }))?;

        assert_eq!(options.balance, Some(U256::from(16)));
        assert_eq!(options.nonce, Some(U256::from(2)));
        assert!(options.storage.is_none());
        assert_eq!(options.storage_diff.map(|diff| diff.len()), Some(1));

        Ok(())
    }
}
