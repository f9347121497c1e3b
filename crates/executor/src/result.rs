use devnet_primitives::{Address, Bytes, Log, U256};

/// Reason a successful execution stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuccessReason {
    /// The execution reached the end of its code.
    Stop,
    /// The execution returned data.
    Return,
}

/// Reason an execution halted exceptionally. A halt consumes all gas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HaltReason {
    /// The gas limit was exhausted.
    #[error("out of gas")]
    OutOfGas,
    /// An undefined opcode was encountered.
    #[error("invalid opcode")]
    OpcodeNotFound,
    /// A contract already exists at the created address.
    #[error("contract address collision")]
    CreateCollision,
    /// The deployed code exceeds the maximum contract size.
    #[error("contract code size exceeds the limit")]
    CreateContractSizeLimit,
    /// The deployed code starts with the reserved `0xEF` byte.
    #[error("contract code starts with 0xEF")]
    CreateContractStartingWithEF,
}

/// Output of a successful or reverted execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Output {
    /// Return data of a call
    Call(Bytes),
    /// Deployed code and the address of the created contract, if any
    Create(Bytes, Option<Address>),
}

impl Output {
    /// Returns the output data.
    pub fn data(&self) -> &Bytes {
        match self {
            Output::Call(data) | Output::Create(data, _) => data,
        }
    }

    /// Returns the address of the created contract, if any.
    pub fn address(&self) -> Option<&Address> {
        match self {
            Output::Call(_) => None,
            Output::Create(_, address) => address.as_ref(),
        }
    }

    /// Converts the output into its data.
    pub fn into_data(self) -> Bytes {
        match self {
            Output::Call(data) | Output::Create(data, _) => data,
        }
    }
}

/// The result of executing a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionResult {
    /// The execution succeeded.
    Success {
        /// Why the execution stopped
        reason: SuccessReason,
        /// Gas used by the transaction, after refunds
        gas_used: u64,
        /// Gas refunded to the sender
        gas_refunded: u64,
        /// Logs emitted by the transaction
        logs: Vec<Log>,
        /// Output of the execution
        output: Output,
    },
    /// The execution reverted.
    Revert {
        /// Gas used by the transaction
        gas_used: u64,
        /// Revert data
        output: Bytes,
    },
    /// The execution halted exceptionally.
    Halt {
        /// Why the execution halted
        reason: HaltReason,
        /// Gas used by the transaction; always the full gas limit
        gas_used: u64,
    },
}

impl ExecutionResult {
    /// Whether the execution succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    /// Whether the execution halted exceptionally.
    pub fn is_halt(&self) -> bool {
        matches!(self, ExecutionResult::Halt { .. })
    }

    /// Returns the gas used by the execution.
    pub fn gas_used(&self) -> u64 {
        match self {
            ExecutionResult::Success { gas_used, .. }
            | ExecutionResult::Revert { gas_used, .. }
            | ExecutionResult::Halt { gas_used, .. } => *gas_used,
        }
    }

    /// Returns the logs of a successful execution.
    pub fn logs(&self) -> &[Log] {
        match self {
            ExecutionResult::Success { logs, .. } => logs,
            ExecutionResult::Revert { .. } | ExecutionResult::Halt { .. } => &[],
        }
    }

    /// Returns the output data, if the execution did not halt.
    pub fn output(&self) -> Option<&Bytes> {
        match self {
            ExecutionResult::Success { output, .. } => Some(output.data()),
            ExecutionResult::Revert { output, .. } => Some(output),
            ExecutionResult::Halt { .. } => None,
        }
    }

    /// Returns the address of the contract created by a successful execution.
    pub fn created_address(&self) -> Option<Address> {
        match self {
            ExecutionResult::Success { output, .. } => output.address().copied(),
            ExecutionResult::Revert { .. } | ExecutionResult::Halt { .. } => None,
        }
    }
}

/// Reasons a transaction is rejected before execution. A rejected
/// transaction leaves no trace in the state.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTransaction {
    /// The gas limit does not cover the intrinsic gas.
    #[error("Transaction requires at least {initial_gas} gas but got {gas_limit}")]
    CallGasCostMoreThanGasLimit {
        /// Intrinsic gas of the transaction
        initial_gas: u64,
        /// Gas limit of the transaction
        gas_limit: u64,
    },
    /// The gas limit exceeds the block gas limit.
    #[error("Transaction gas limit is {gas_limit} and exceeds block gas limit of {block_gas_limit}")]
    CallerGasLimitMoreThanBlock {
        /// Gas limit of the transaction
        gas_limit: u64,
        /// Gas limit of the block
        block_gas_limit: u64,
    },
    /// The init code exceeds the maximum size.
    #[error("Transaction init code size exceeds the limit")]
    CreateInitCodeSizeLimit,
    /// The maximum fee per gas is below the block's base fee.
    #[error(
        "Transaction maxFeePerGas ({gas_price}) is too low for the next block, which has a baseFeePerGas of {base_fee}"
    )]
    GasPriceLessThanBasefee {
        /// Maximum fee per gas of the transaction
        gas_price: u128,
        /// Base fee of the block
        base_fee: u128,
    },
    /// The sender cannot afford the upfront cost.
    #[error("Sender doesn't have enough funds to send tx. The max upfront cost is: {fee} and the sender's balance is: {balance}.")]
    LackOfFundForMaxFee {
        /// Upfront cost of the transaction
        fee: Box<U256>,
        /// Balance of the sender
        balance: Box<U256>,
    },
    /// The nonce is higher than the sender's account nonce.
    #[error("Nonce too high. Expected nonce to be {state} but got {tx}.")]
    NonceTooHigh {
        /// Nonce of the transaction
        tx: u64,
        /// Nonce of the sender's account
        state: u64,
    },
    /// The nonce is lower than the sender's account nonce.
    #[error("Nonce too low. Expected nonce to be {state} but got {tx}.")]
    NonceTooLow {
        /// Nonce of the transaction
        tx: u64,
        /// Nonce of the sender's account
        state: u64,
    },
}
