use devnet_primitives::{Address, Bytes, U256};

use crate::ExecutionResult;

/// Stack tracing message
#[derive(Clone, Debug)]
pub enum TraceMessage {
    /// Event that occurs before a call or create message.
    Before(BeforeMessage),
    /// Event that occurs after a call or create message.
    After(AfterMessage),
}

/// Event that occurs before a call or create message.
#[derive(Clone, Debug)]
pub struct BeforeMessage {
    /// Call depth
    pub depth: usize,
    /// Caller
    pub caller: Address,
    /// Callee; `None` for contract creation
    pub to: Option<Address>,
    /// Whether the call is a static call
    pub is_static_call: bool,
    /// Transaction gas limit
    pub gas_limit: u64,
    /// Input data
    pub data: Bytes,
    /// Value
    pub value: U256,
    /// Code address
    pub code_address: Option<Address>,
    /// Code that was executed, if any
    pub code: Option<Bytes>,
}

/// Event that occurs after a call or create message.
#[derive(Clone, Debug)]
pub struct AfterMessage {
    /// The execution result
    pub execution_result: ExecutionResult,
    /// The newly created contract address if it's a create tx. `None`
    /// if there was an error creating the contract.
    pub contract_address: Option<Address>,
}

/// A trace of the messages of a transaction.
#[derive(Clone, Debug, Default)]
pub struct Trace {
    /// Messages
    pub messages: Vec<TraceMessage>,
    /// The return value of the call
    pub return_value: Bytes,
}

impl Trace {
    /// Adds a before message
    pub fn add_before(&mut self, message: BeforeMessage) {
        self.messages.push(TraceMessage::Before(message));
    }

    /// Adds a result message
    pub fn add_after(&mut self, message: AfterMessage) {
        if let Some(output) = message.execution_result.output() {
            self.return_value = output.clone();
        }

        self.messages.push(TraceMessage::After(message));
    }
}
