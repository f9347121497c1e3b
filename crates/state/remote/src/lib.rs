#![warn(missing_docs)]

//! A state implementation that retrieves data from a remote chain.

mod cached;

use std::sync::Arc;

use devnet_primitives::{Address, B256, Bytes, U256};
use devnet_rpc_client::RemoteChainSource;
use devnet_state_api::{State, StateError, account::AccountInfo};

pub use self::cached::CachedRemoteState;

/// A state backed by a remote chain at a fixed block number.
#[derive(Clone, Debug)]
pub struct RemoteState {
    source: Arc<dyn RemoteChainSource>,
    block_number: u64,
}

impl RemoteState {
    /// Constructs a new instance using the provided remote chain and a block
    /// number from which data will be pulled.
    pub fn new(source: Arc<dyn RemoteChainSource>, block_number: u64) -> Self {
        Self {
            source,
            block_number,
        }
    }

    /// Retrieves the current block number
    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    /// Sets the block number used for requests to the remote chain.
    pub fn set_block_number(&mut self, block_number: u64) {
        self.block_number = block_number;
    }

    /// Whether the current state is cacheable based on the block number.
    pub fn is_cacheable(&self) -> Result<bool, StateError> {
        Ok(self.source.is_cacheable_block_number(self.block_number)?)
    }
}

impl State for RemoteState {
    type Error = StateError;

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self)))]
    fn basic(&self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        let account = self.source.account(address, self.block_number)?;

        // Empty accounts are indistinguishable from non-existent ones.
        if account.is_empty() {
            return Ok(None);
        }

        Ok(Some(AccountInfo::with_code(
            account.balance,
            account.nonce,
            account.code,
        )))
    }

    fn code_by_hash(&self, code_hash: B256) -> Result<Bytes, Self::Error> {
        Err(StateError::InvalidCodeHash(code_hash))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self)))]
    fn storage(&self, address: Address, index: U256) -> Result<U256, Self::Error> {
        Ok(self.source.storage(address, index, self.block_number)?)
    }
}
