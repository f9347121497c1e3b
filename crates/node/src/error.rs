use std::time::SystemTime;

use devnet_blockchain::{BlockchainError, ForkedBlockchainCreationError, InvalidGenesisBlock};
use devnet_block_api::LocalBlockCreationError;
use devnet_executor::{ExecutionResult, HaltReason, Trace, TransactionError, revert_reason};
use devnet_hardfork::Hardfork;
use devnet_mem_pool::MemPoolAddTransactionError;
use devnet_miner::{MineBlockError, MineTransactionError};
use devnet_primitives::{Address, B256, Bytes, U256, hex};
use devnet_rpc_client::RpcClientError;
use devnet_state_api::{StateError, r#override::AccountOverrideConversionError};
use devnet_transaction::{CreationError as TransactionCreationError, signature::SignatureError};

use crate::{block_spec::BlockSpec, filter::FilterKind};

/// An error that occurred while constructing a node.
#[derive(Debug, thiserror::Error)]
pub enum CreationError {
    /// A blockchain error
    #[error(transparent)]
    Blockchain(#[from] BlockchainError),
    /// An error that occurred while constructing a forked blockchain.
    #[error(transparent)]
    ForkedBlockchainCreation(#[from] ForkedBlockchainCreationError),
    /// An error that occurred while constructing the genesis block.
    #[error(transparent)]
    GenesisBlockCreation(#[from] LocalBlockCreationError),
    /// The genesis block is not a valid first block.
    #[error(transparent)]
    InvalidGenesisBlock(#[from] InvalidGenesisBlock),
    /// An HTTP header of the fork configuration is invalid.
    #[error("Invalid HTTP header: {0}")]
    InvalidHttpHeaders(String),
    /// Invalid initial date
    #[error("The initial date configuration value {0:?} is before the UNIX epoch")]
    InvalidInitialDate(SystemTime),
    /// An error that occured while querying the remote chain.
    #[error(transparent)]
    RpcClient(#[from] RpcClientError),
    /// An error that occurred while modifying the genesis state.
    #[error(transparent)]
    State(#[from] StateError),
}

/// An error that occurred while serving a node operation.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Account override conversion error.
    #[error(transparent)]
    AccountOverrideConversionError(#[from] AccountOverrideConversionError),
    /// The transaction's gas price is below the next block's base fee.
    #[error(
        "Transaction gasPrice ({actual}) is too low for the next block, which has a baseFeePerGas of {expected}"
    )]
    AutoMineGasPriceTooLow {
        /// The next block's base fee
        expected: u128,
        /// The transaction's gas price
        actual: u128,
    },
    /// The transaction's max fee is below the next block's base fee.
    #[error(
        "Transaction maxFeePerGas ({actual}) is too low for the next block, which has a baseFeePerGas of {expected}"
    )]
    AutoMineMaxFeePerGasTooLow {
        /// The next block's base fee
        expected: u128,
        /// The transaction's max fee per gas
        actual: u128,
    },
    /// The transaction's nonce is ahead of the sender's next nonce.
    #[error(
        "Nonce too high. Expected nonce to be {expected} but got {actual}. Note that transactions can't be queued when automining."
    )]
    AutoMineNonceTooHigh {
        /// The sender's next nonce
        expected: u64,
        /// The transaction's nonce
        actual: u64,
    },
    /// The transaction's nonce was already used.
    #[error("Nonce too low. Expected nonce to be {expected} but got {actual}.")]
    AutoMineNonceTooLow {
        /// The sender's next nonce
        expected: u64,
        /// The transaction's nonce
        actual: u64,
    },
    /// The transaction's priority fee is below the node's minimum gas price.
    #[error(
        "Transaction gas price is {actual}, which is below the minimum of {expected}"
    )]
    AutoMinePriorityFeeTooLow {
        /// The minimum gas price
        expected: u128,
        /// The transaction's priority fee
        actual: u128,
    },
    /// A blockchain error
    #[error(transparent)]
    Blockchain(#[from] BlockchainError),
    /// The transaction cannot be executed successfully at the block gas
    /// limit.
    #[error(transparent)]
    EstimateGasTransactionFailure(#[from] EstimateGasFailure),
    /// The transaction request mixes legacy and EIP-1559 fee fields.
    #[error("Cannot send both gasPrice and maxFeePerGas or maxPriorityFeePerGas params")]
    InvalidFeeFields,
    /// The block number or hash does not exist.
    #[error("Received invalid block tag {block_spec}. Latest block number is {latest_block_number}")]
    InvalidBlockNumberOrHash {
        /// The requested block
        block_spec: BlockSpec,
        /// The latest block number
        latest_block_number: u64,
    },
    /// The block tag is not supported by the active hardfork.
    #[error("The '{block_spec}' block tag is not allowed in pre-merge hardforks. You are using the '{hardfork}' hardfork.")]
    InvalidBlockTag {
        /// The requested block tag
        block_spec: BlockSpec,
        /// The active hardfork
        hardfork: Hardfork,
    },
    /// The transaction to drop does not exist.
    #[error("Transaction {0} cannot be dropped because it's already mined")]
    InvalidDropTransactionHash(B256),
    /// The request targets another chain.
    #[error("Invalid chainId {actual} provided, expected {expected}")]
    InvalidChainId {
        /// The node's chain ID
        expected: u64,
        /// The requested chain ID
        actual: u64,
    },
    /// The raw transaction was signed for another chain.
    #[error("Trying to send an incompatible EIP-155 transaction, signed for another chain.")]
    InvalidEip155TransactionChainId,
    /// The filter exists, but is of another kind.
    #[error("Filter {filter_id} is a {actual:?} filter, but a {expected:?} filter was expected")]
    InvalidFilterKind {
        /// The filter's ID
        filter_id: U256,
        /// The expected kind
        expected: FilterKind,
        /// The filter's kind
        actual: FilterKind,
    },
    /// The filter does not exist.
    #[error("Filter {0} does not exist")]
    InvalidFilterId(U256),
    /// The transaction does not exist.
    #[error("Transaction hash '{0}' doesn't exist on the blockchain.")]
    InvalidTransactionHash(B256),
    /// The transaction could not be added to the mempool.
    #[error(transparent)]
    MemPoolAddTransaction(#[from] MemPoolAddTransactionError<StateError>),
    /// Revalidating the mempool after a state change failed.
    #[error(transparent)]
    MemPoolUpdate(StateError),
    /// An error that occurred while mining a block.
    #[error(transparent)]
    MineBlock(#[from] MineBlockError),
    /// An error that occurred while mining a block with a single transaction.
    #[error(transparent)]
    MineTransaction(#[from] MineTransactionError),
    /// The transaction could not be executed.
    #[error(transparent)]
    RunTransaction(#[from] TransactionError),
    /// The nonce cannot be lowered.
    #[error("New nonce ({proposed}) must not be smaller than the existing nonce ({previous})")]
    SetAccountNonceLowerThanCurrent {
        /// The existing nonce
        previous: u64,
        /// The requested nonce
        proposed: u64,
    },
    /// The nonce cannot change while the mempool holds transactions.
    #[error("Cannot set account nonce when the transaction pool is not empty")]
    SetAccountNonceWithPendingTransactions,
    /// The minimum gas price is replaced by the base fee from London onwards.
    #[error("Setting the minimum gas price is not supported when EIP-1559 is active")]
    SetMinGasPriceUnsupported,
    /// The next block's base fee can only be set from London onwards.
    #[error("Setting the next block base fee is disabled because EIP-1559 is not active")]
    SetNextBlockBaseFeePerGasUnsupported {
        /// The active hardfork
        hardfork: Hardfork,
    },
    /// Signing failed.
    #[error(transparent)]
    Signature(#[from] SignatureError),
    /// A state error
    #[error(transparent)]
    State(#[from] StateError),
    /// The proposed timestamp is lower than the previous block's.
    #[error("Timestamp {proposed} is lower than the previous block's timestamp {previous}")]
    TimestampLowerThanPrevious {
        /// The proposed timestamp
        proposed: u64,
        /// The previous block's timestamp
        previous: u64,
    },
    /// The proposed timestamp equals the previous block's.
    #[error(
        "Timestamp {proposed} is equal to the previous block's timestamp. Enable the 'allowBlocksWithSameTimestamp' option to allow this"
    )]
    TimestampEqualsPrevious {
        /// The proposed timestamp
        proposed: u64,
    },
    /// The transaction is invalid under the active rules.
    #[error(transparent)]
    TransactionCreationError(#[from] TransactionCreationError),
    /// The node holds no secret key for the sender.
    #[error("Unknown account {address}")]
    UnknownAddress {
        /// The sender
        address: Address,
    },
    /// The operation requires a later hardfork.
    #[error("Feature is only available in post-{minimum} hardforks, the current hardfork is {actual}")]
    UnmetHardfork {
        /// The active hardfork
        actual: Hardfork,
        /// The minimum required hardfork
        minimum: Hardfork,
    },
    /// An error that occured while querying the remote chain.
    #[error(transparent)]
    RpcClient(#[from] RpcClientError),
}

/// The reason a transaction failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionFailureReason {
    /// The execution reverted with the provided output.
    Revert(Bytes),
    /// The execution halted.
    Halt(HaltReason),
}

/// A failed execution, together with its decoded reason.
#[derive(Clone, Debug)]
pub struct TransactionFailure {
    /// Why the execution failed
    pub reason: TransactionFailureReason,
    /// Hex-encoded return data
    pub data: String,
    /// Trace of the execution
    pub trace: Trace,
}

impl TransactionFailure {
    /// Constructs an instance from a failed execution result. Returns `None`
    /// if the execution succeeded.
    pub fn from_execution_result(result: &ExecutionResult, trace: &Trace) -> Option<Self> {
        match result {
            ExecutionResult::Success { .. } => None,
            ExecutionResult::Revert { output, .. } => Some(Self::revert(output.clone(), trace.clone())),
            ExecutionResult::Halt { reason, .. } => Some(Self::halt(*reason, trace.clone())),
        }
    }

    /// Constructs an instance for a halted execution.
    pub fn halt(reason: HaltReason, trace: Trace) -> Self {
        Self {
            reason: TransactionFailureReason::Halt(reason),
            data: "0x".to_string(),
            trace,
        }
    }

    /// Constructs an instance for a reverted execution.
    pub fn revert(output: Bytes, trace: Trace) -> Self {
        let data = format!("0x{}", hex::encode(output.as_ref()));
        Self {
            reason: TransactionFailureReason::Revert(output),
            data,
            trace,
        }
    }
}

impl std::fmt::Display for TransactionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            TransactionFailureReason::Revert(output) => {
                if output.is_empty() {
                    write!(f, "Transaction reverted without a reason")
                } else if let Some(reason) = revert_reason(output) {
                    write!(f, "reverted with reason string '{reason}'")
                } else {
                    write!(
                        f,
                        "reverted with an unrecognized custom error (return data: {})",
                        self.data
                    )
                }
            }
            TransactionFailureReason::Halt(HaltReason::OutOfGas) => {
                write!(f, "Transaction ran out of gas")
            }
            TransactionFailureReason::Halt(HaltReason::CreateContractSizeLimit) => write!(
                f,
                "Transaction reverted: trying to deploy a contract whose code is too large"
            ),
            TransactionFailureReason::Halt(HaltReason::OpcodeNotFound) => write!(
                f,
                "VM Exception while processing transaction: invalid opcode"
            ),
            TransactionFailureReason::Halt(halt) => {
                write!(f, "VM Exception while processing transaction: {halt}")
            }
        }
    }
}

impl std::error::Error for TransactionFailure {}

/// Failure that occurred while estimating gas.
#[derive(Debug, thiserror::Error)]
#[error("{failure}")]
pub struct EstimateGasFailure {
    /// The failure at the block gas limit
    pub failure: TransactionFailure,
}
