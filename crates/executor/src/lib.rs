//! The boundary between the node and the engine that executes transactions.
#![warn(missing_docs)]

mod result;
mod return_data;
mod trace;
mod value_transfer;

use core::fmt::Debug;

use auto_impl::auto_impl;
use devnet_hardfork::Hardfork;
use devnet_primitives::{Address, B256, U256};
use devnet_state_api::{State, StateChanges, StateError};
use devnet_transaction::Signed;

pub use self::{
    result::{ExecutionResult, HaltReason, InvalidTransaction, Output, SuccessReason},
    return_data::{ReturnData, revert_reason},
    trace::{AfterMessage, BeforeMessage, Trace, TraceMessage},
    value_transfer::ValueTransferExecutor,
};

/// Maximum size of deployed contract code (EIP-170).
pub const MAX_CODE_SIZE: usize = 0x6000;

/// Maximum size of contract creation init code (EIP-3860).
pub const MAX_INITCODE_SIZE: usize = 2 * MAX_CODE_SIZE;

/// The environment of the block in which a transaction is executed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockEnv {
    /// Number of the block
    pub number: u64,
    /// Recipient of the block's fees
    pub beneficiary: Address,
    /// Timestamp of the block
    pub timestamp: u64,
    /// Gas limit of the block
    pub gas_limit: u64,
    /// Base fee per gas of the block, from London onwards
    pub base_fee: Option<u128>,
    /// Randomness of the block, from the merge onwards
    pub prevrandao: Option<B256>,
    /// Difficulty of the block, before the merge
    pub difficulty: U256,
    /// Hardfork whose rules apply to the block
    pub hardfork: Hardfork,
    /// Chain ID used for replay protection
    pub chain_id: u64,
}

/// Flags that relax the validation of a transaction before execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionFlags {
    /// Skips the nonce check and raises the sender's balance to cover the
    /// upfront cost, if necessary.
    pub skip_balance_nonce_checks: bool,
    /// Skips the check that the gas price covers the block's base fee.
    pub disable_base_fee_check: bool,
    /// Lifts the limits on contract code and init code sizes.
    pub allow_unlimited_contract_size: bool,
}

/// The outcome of executing a transaction together with the state changes it
/// made. The changes have not been committed.
#[derive(Clone, Debug)]
pub struct ResultAndState {
    /// Result of the execution
    pub result: ExecutionResult,
    /// Changes to the state
    pub state: StateChanges,
    /// Trace of the execution
    pub trace: Trace,
}

/// Errors that prevent a transaction from being executed.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// The transaction is invalid in the current state or block.
    #[error(transparent)]
    InvalidTransaction(#[from] InvalidTransaction),
    /// Error retrieving state
    #[error(transparent)]
    State(#[from] StateError),
}

/// Trait for an engine that executes transactions against a state.
#[auto_impl(&, Box, Arc)]
pub trait TransactionExecutor: Debug + Send + Sync {
    /// Executes the provided transaction on top of the provided state in the
    /// context of the provided block, without committing its changes.
    fn run(
        &self,
        state: &dyn State<Error = StateError>,
        block: &BlockEnv,
        transaction: &Signed,
        flags: ExecutionFlags,
    ) -> Result<ResultAndState, TransactionError>;
}
