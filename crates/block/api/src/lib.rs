#![warn(missing_docs)]

//! Locally mined and remote Ethereum blocks, along with their receipts and
//! logs.

/// Block header types and base fee calculation.
pub mod header;
mod local;
pub mod log;
pub mod receipt;
mod remote;

use std::{fmt::Debug, sync::Arc};

use auto_impl::auto_impl;
use devnet_primitives::{B256, U256};
use devnet_rpc_client::RpcClientError;
use devnet_transaction::Signed;

pub use self::{
    header::{
        BlockConfig, BlockHeader, HeaderOverrides, PartialHeader,
        calculate_next_base_fee_per_gas,
    },
    local::{GenesisBlockOptions, LocalBlock, LocalBlockCreationError},
    receipt::BlockReceipt,
    remote::{RemoteBlock, RemoteBlockConversionError, convert_remote_log, convert_remote_receipt},
};

/// Trait for implementations of an Ethereum block.
#[auto_impl(Arc)]
pub trait Block: Debug + Send + Sync {
    /// Returns the block's hash.
    fn block_hash(&self) -> &B256;

    /// Returns the block's header.
    fn header(&self) -> &BlockHeader;

    /// Returns the block's transactions. Remote blocks only carry the
    /// transactions' hashes, so their transactions are empty.
    fn transactions(&self) -> &[Signed];

    /// Returns the hashes of the block's transactions.
    fn transaction_hashes(&self) -> &[B256];

    /// Returns the receipts of the block's transactions.
    fn fetch_transaction_receipts(&self) -> Result<Vec<Arc<BlockReceipt>>, BlockError>;
}

/// Trait that meets all requirements for a synchronous block.
pub trait SyncBlock: Block + 'static {}

impl<BlockT> SyncBlock for BlockT where BlockT: Block + 'static {}

/// Errors that can occur when retrieving the data of a block.
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    /// The remote does not know the receipt of one of the block's
    /// transactions.
    #[error("The remote does not know the receipt of transaction {transaction_hash}.")]
    MissingReceipt {
        /// Hash of the transaction
        transaction_hash: B256,
    },
    /// A quantity does not fit the local representation.
    #[error("The remote returned {field} {value}, which is out of range.")]
    OutOfRange {
        /// Name of the field
        field: &'static str,
        /// The value returned by the remote
        value: U256,
    },
    /// Remote error
    #[error(transparent)]
    RpcClient(#[from] RpcClientError),
    /// The remote returned a transaction type that is not supported.
    #[error("Transaction {transaction_hash} has unsupported type {transaction_type}.")]
    UnsupportedTransactionType {
        /// Hash of the transaction
        transaction_hash: B256,
        /// The transaction type
        transaction_type: u64,
    },
}
