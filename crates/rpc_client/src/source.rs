use std::{fmt::Debug, sync::Arc};

use auto_impl::auto_impl;
use devnet_primitives::{Address, B256, Bytes, U256};
use tokio::runtime;

use crate::{
    RpcClient, RpcClientError,
    method::BlockSpec,
    types::{FeeHistoryResult, LogFilterOptions, RpcBlock, RpcLog, RpcReceipt},
};

/// An account as stored by the remote chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteAccount {
    /// Balance
    pub balance: U256,
    /// Nonce
    pub nonce: u64,
    /// Code
    pub code: Bytes,
}

impl RemoteAccount {
    /// Whether the account has no balance, nonce, or code.
    pub fn is_empty(&self) -> bool {
        (self.balance == U256::ZERO) & (self.nonce == 0) & self.code.is_empty()
    }
}

/// Metadata of the remote chain, retrieved once when forking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForkMetadata {
    /// The chain ID of the remote
    pub chain_id: u64,
    /// The network ID of the remote
    pub network_id: u64,
    /// The latest block number of the remote
    pub latest_block_number: u64,
}

/// Blocking access to the data of a remote chain.
#[auto_impl(&, Box, Arc)]
pub trait RemoteChainSource: Debug + Send + Sync {
    /// Retrieves the metadata of the remote chain.
    fn metadata(&self) -> Result<ForkMetadata, RpcClientError>;

    /// Retrieves an account at the provided block.
    fn account(&self, address: Address, block_number: u64)
    -> Result<RemoteAccount, RpcClientError>;

    /// Retrieves a storage slot at the provided block.
    fn storage(
        &self,
        address: Address,
        index: U256,
        block_number: u64,
    ) -> Result<U256, RpcClientError>;

    /// Retrieves the block with the provided number, if it exists.
    fn block_by_number(&self, block_number: u64) -> Result<Option<RpcBlock>, RpcClientError>;

    /// Retrieves the block with the provided hash, if it exists.
    fn block_by_hash(&self, hash: B256) -> Result<Option<RpcBlock>, RpcClientError>;

    /// Retrieves the receipt of the transaction with the provided hash, if it
    /// exists.
    fn receipt(&self, transaction_hash: B256) -> Result<Option<RpcReceipt>, RpcClientError>;

    /// Retrieves the logs matching the provided options.
    fn logs(&self, options: LogFilterOptions) -> Result<Vec<RpcLog>, RpcClientError>;

    /// Retrieves the fee history of `block_count` blocks up to and including
    /// `newest_block`.
    fn fee_history(
        &self,
        block_count: u64,
        newest_block: u64,
        reward_percentiles: Vec<f64>,
    ) -> Result<FeeHistoryResult, RpcClientError>;

    /// Whether data pinned to the provided block can be cached.
    fn is_cacheable_block_number(&self, block_number: u64) -> Result<bool, RpcClientError>;
}

/// A [`RemoteChainSource`] that blocks on an async [`RpcClient`] using the
/// provided runtime.
#[derive(Clone, Debug)]
pub struct BlockingRpcClient {
    client: Arc<RpcClient>,
    runtime: runtime::Handle,
}

impl BlockingRpcClient {
    /// Constructs a new instance.
    pub fn new(client: Arc<RpcClient>, runtime: runtime::Handle) -> Self {
        Self { client, runtime }
    }

    fn block_on<FutureT: Future>(&self, future: FutureT) -> FutureT::Output {
        tokio::task::block_in_place(move || self.runtime.block_on(future))
    }
}

impl RemoteChainSource for BlockingRpcClient {
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self)))]
    fn metadata(&self) -> Result<ForkMetadata, RpcClientError> {
        self.block_on(async {
            let (chain_id, network_id, latest_block_number) = futures::try_join!(
                self.client.chain_id(),
                self.client.network_id(),
                self.client.block_number(),
            )?;

            Ok(ForkMetadata {
                chain_id,
                network_id,
                latest_block_number,
            })
        })
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self)))]
    fn account(
        &self,
        address: Address,
        block_number: u64,
    ) -> Result<RemoteAccount, RpcClientError> {
        let (balance, nonce, code) = self.block_on(
            self.client
                .get_account(address, BlockSpec::Number(block_number)),
        )?;

        Ok(RemoteAccount {
            balance,
            nonce,
            code,
        })
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self)))]
    fn storage(
        &self,
        address: Address,
        index: U256,
        block_number: u64,
    ) -> Result<U256, RpcClientError> {
        self.block_on(
            self.client
                .get_storage_at(address, index, BlockSpec::Number(block_number)),
        )
    }

    fn block_by_number(&self, block_number: u64) -> Result<Option<RpcBlock>, RpcClientError> {
        self.block_on(
            self.client
                .get_block_by_number(BlockSpec::Number(block_number)),
        )
    }

    fn block_by_hash(&self, hash: B256) -> Result<Option<RpcBlock>, RpcClientError> {
        self.block_on(self.client.get_block_by_hash(hash))
    }

    fn receipt(&self, transaction_hash: B256) -> Result<Option<RpcReceipt>, RpcClientError> {
        self.block_on(self.client.get_transaction_receipt(transaction_hash))
    }

    fn logs(&self, options: LogFilterOptions) -> Result<Vec<RpcLog>, RpcClientError> {
        self.block_on(self.client.get_logs(options))
    }

    fn fee_history(
        &self,
        block_count: u64,
        newest_block: u64,
        reward_percentiles: Vec<f64>,
    ) -> Result<FeeHistoryResult, RpcClientError> {
        self.block_on(self.client.fee_history(
            block_count,
            BlockSpec::Number(newest_block),
            reward_percentiles,
        ))
    }

    fn is_cacheable_block_number(&self, block_number: u64) -> Result<bool, RpcClientError> {
        self.block_on(self.client.is_cacheable_block_number(block_number))
    }
}
