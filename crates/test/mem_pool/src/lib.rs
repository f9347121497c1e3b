//! Test utilities for mem pool tests.
#![warn(missing_docs)]

use core::num::NonZeroU64;

use devnet_mem_pool::{
    AddTransactionOutcome, DroppedTransaction, MemPool, MemPoolAddTransactionError,
};
use devnet_primitives::{Address, U256};
use devnet_state_api::{State as _, StateDebug as _, StateError, account::AccountInfo};
use devnet_state_persistent::PersistentState;
use devnet_transaction::Signed;

/// Block gas limit used by the fixture's mem pool.
pub const FIXTURE_BLOCK_GAS_LIMIT: u64 = 10_000_000;

/// A test fixture for `MemPool`.
pub struct MemPoolTestFixture {
    /// The mem pool.
    pub mem_pool: MemPool,
    /// The state.
    pub state: PersistentState,
}

impl MemPoolTestFixture {
    /// Constructs an instance with the provided accounts.
    pub fn with_accounts(accounts: &[(Address, AccountInfo)]) -> Result<Self, StateError> {
        let mut state = PersistentState::default();
        for (address, account_info) in accounts {
            state.insert_account(*address, account_info.clone())?;
        }

        Ok(MemPoolTestFixture {
            mem_pool: MemPool::new(
                NonZeroU64::new(FIXTURE_BLOCK_GAS_LIMIT).expect("literal is non-zero"),
            ),
            state,
        })
    }

    /// Tries to add the provided transaction to the mem pool.
    pub fn add_transaction(
        &mut self,
        transaction: Signed,
    ) -> Result<AddTransactionOutcome, MemPoolAddTransactionError<StateError>> {
        self.mem_pool.add_transaction(&self.state, transaction)
    }

    /// Sets the block gas limit.
    pub fn set_block_gas_limit(
        &mut self,
        block_gas_limit: NonZeroU64,
    ) -> Result<Vec<DroppedTransaction>, StateError> {
        self.mem_pool
            .set_block_gas_limit(&self.state, block_gas_limit)
    }

    /// Sets the nonce of the account at the provided address, as if
    /// transactions had been mined.
    pub fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<(), StateError> {
        let mut account_info = self.account(address)?;
        account_info.nonce = nonce;

        self.state.insert_account(address, account_info)
    }

    /// Sets the balance of the account at the provided address.
    pub fn set_balance(
        &mut self,
        address: Address,
        balance: U256,
    ) -> Result<(), StateError> {
        let mut account_info = self.account(address)?;
        account_info.balance = balance;

        self.state.insert_account(address, account_info)
    }

    /// Updates the mem pool.
    pub fn update(&mut self) -> Result<Vec<DroppedTransaction>, StateError> {
        self.mem_pool.update(&self.state)
    }

    fn account(&self, address: Address) -> Result<AccountInfo, StateError> {
        Ok(self.state.basic(address)?.unwrap_or_default())
    }
}
