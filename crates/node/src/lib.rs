//! The core of a local Ethereum development node: a mempool, a miner, state
//! snapshots, forking of a remote chain, gas estimation, and log filters,
//! combined into a single aggregate that owns the node's state.
#![warn(missing_docs)]

mod block_spec;
mod config;
mod data;
mod error;
mod filter;
mod request;
mod snapshot;
mod subscribe;
/// Utilities for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
/// Types for temporal operations
pub mod time;

pub use devnet_block_api::HeaderOverrides;
pub use devnet_miner::MineOrdering;
pub use devnet_rpc_client::types::FeeHistoryResult;
pub use devnet_state_api::r#override::{
    AccountOverride, AccountOverrideOptions, StateOverrides, StorageOverride,
};

pub use self::{
    block_spec::BlockSpec,
    config::*,
    data::{
        BlockContext, BlockDataForTransaction, CallResult, EstimateGasResult, ForkMetadata,
        MineBlockResult, NodeData, SendTransactionResult, TransactionAndBlock,
    },
    error::{
        CreationError, EstimateGasFailure, NodeError, TransactionFailure,
        TransactionFailureReason,
    },
    filter::{FilterChanges, FilterCriteria, FilterKind},
    request::{CallRequest, TransactionRequest},
    subscribe::*,
};
