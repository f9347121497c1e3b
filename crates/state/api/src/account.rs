//! Ethereum account types

use alloy_rlp::{RlpDecodable, RlpEncodable};
use devnet_primitives::{B256, Bytes, KECCAK_EMPTY, KECCAK_NULL_RLP, U256, keccak256};

use crate::AccountStorage;

/// Account information that is visible to the executor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    /// Balance of the account.
    pub balance: U256,
    /// Nonce of the account.
    pub nonce: u64,
    /// Hash of the account's code.
    pub code_hash: B256,
    /// The account's code, if loaded.
    pub code: Option<Bytes>,
}

impl AccountInfo {
    /// Constructs an account with the provided code, computing its hash.
    pub fn with_code(balance: U256, nonce: u64, code: Bytes) -> Self {
        Self {
            balance,
            nonce,
            code_hash: code_hash(&code),
            code: Some(code),
        }
    }

    /// Whether the account has no balance, nonce, or code.
    pub fn is_empty(&self) -> bool {
        (self.balance == U256::ZERO) & (self.nonce == 0) & (self.code_hash == KECCAK_EMPTY)
    }
}

impl Default for AccountInfo {
    fn default() -> Self {
        Self {
            balance: U256::ZERO,
            nonce: 0,
            code_hash: KECCAK_EMPTY,
            code: Some(Bytes::new()),
        }
    }
}

/// Computes the hash of the provided code.
pub fn code_hash(code: &Bytes) -> B256 {
    if code.is_empty() {
        KECCAK_EMPTY
    } else {
        keccak256(code)
    }
}

/// Basic account type, as stored in the account trie.
#[derive(Clone, Debug, PartialEq, Eq, RlpDecodable, RlpEncodable)]
pub struct BasicAccount {
    /// Nonce of the account.
    pub nonce: u64,
    /// Balance of the account.
    pub balance: U256,
    /// Storage root of the account.
    pub storage_root: B256,
    /// Code hash of the account.
    pub code_hash: B256,
}

impl Default for BasicAccount {
    fn default() -> Self {
        BasicAccount {
            balance: U256::ZERO,
            nonce: 0,
            code_hash: KECCAK_EMPTY,
            storage_root: KECCAK_NULL_RLP,
        }
    }
}

impl From<BasicAccount> for AccountInfo {
    fn from(account: BasicAccount) -> Self {
        Self {
            balance: account.balance,
            nonce: account.nonce,
            code_hash: account.code_hash,
            code: None,
        }
    }
}

impl From<(&AccountInfo, B256)> for BasicAccount {
    fn from((account_info, storage_root): (&AccountInfo, B256)) -> Self {
        Self {
            nonce: account_info.nonce,
            balance: account_info.balance,
            storage_root,
            code_hash: account_info.code_hash,
        }
    }
}

/// How an account was affected by execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccountStatus {
    /// The account was read or modified.
    #[default]
    Touched,
    /// The account was created; any prior storage is discarded.
    Created,
    /// The account was destroyed.
    SelfDestructed,
}

/// The changes made to an account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    /// The account's information after the changes
    pub info: AccountInfo,
    /// The storage slots that were written
    pub storage: AccountStorage,
    /// How the account was affected
    pub status: AccountStatus,
}

impl Account {
    /// Whether the account was created.
    pub fn is_created(&self) -> bool {
        self.status == AccountStatus::Created
    }

    /// Whether the account was destroyed.
    pub fn is_selfdestructed(&self) -> bool {
        self.status == AccountStatus::SelfDestructed
    }

    /// Whether the account is empty after the changes.
    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }
}

impl From<AccountInfo> for Account {
    fn from(info: AccountInfo) -> Self {
        Self {
            info,
            storage: AccountStorage::default(),
            status: AccountStatus::Touched,
        }
    }
}
