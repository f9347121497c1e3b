use std::{
    sync::Arc,
    time::{Duration, UNIX_EPOCH},
};

use devnet_executor::{
    BlockEnv, ExecutionFlags, ExecutionResult, HaltReason, ResultAndState, Trace,
    TransactionError, TransactionExecutor, ValueTransferExecutor,
};
use devnet_primitives::{Address, Log, LogData, TxKind, U256, keccak256};
use devnet_rpc_client::RemoteChainSource;
use devnet_state_api::{State, StateChanges, StateError};
use devnet_transaction::{
    Signed,
    signature::{secret_key_from_str, secret_key_to_address},
};

use crate::{
    config::{ForkConfig, NodeConfig, OwnedAccount},
    data::{NodeData, SendTransactionResult},
    error::NodeError,
    request::TransactionRequest,
    subscribe::{SubscriptionReceiver, subscription_channel},
    time::MockTime,
};

/// Secret key of the account that test configurations fund.
// Address 0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266
pub const TEST_SECRET_KEY: &str =
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Timestamp at which test clocks are stopped.
pub const TEST_TIMESTAMP: u64 = 1_700_000_000;

/// Returns one ether in wei.
pub fn one_ether() -> U256 {
    U256::from(10).pow(U256::from(18))
}

/// Constructs a test config with a single account with 1000 ether.
pub fn create_test_config() -> NodeConfig {
    NodeConfig {
        accounts: vec![OwnedAccount {
            secret_key: secret_key_from_str(TEST_SECRET_KEY)
                .expect("should construct secret key from string"),
            balance: one_ether() * U256::from(1_000),
        }],
        coinbase: Address::repeat_byte(0xc0),
        initial_base_fee_per_gas: Some(1_000_000_000),
        ..NodeConfig::default()
    }
}

/// Returns a clock that is stopped at [`TEST_TIMESTAMP`].
pub fn test_timer() -> MockTime {
    MockTime::at(UNIX_EPOCH + Duration::from_secs(TEST_TIMESTAMP))
}

/// Executor that behaves like [`ValueTransferExecutor`], but additionally
/// emits a single log for every successful call with input data. The log is
/// emitted by the recipient, has the hash of the input as its only topic, and
/// the input as its data.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogEmittingExecutor;

impl TransactionExecutor for LogEmittingExecutor {
    fn run(
        &self,
        state: &dyn State<Error = StateError>,
        block: &BlockEnv,
        transaction: &Signed,
        flags: ExecutionFlags,
    ) -> Result<ResultAndState, TransactionError> {
        let mut result = ValueTransferExecutor.run(state, block, transaction, flags)?;

        if let (TxKind::Call(to), ExecutionResult::Success { logs, .. }) =
            (transaction.kind(), &mut result.result)
        {
            let input = transaction.data();
            if !input.is_empty() {
                logs.push(Log {
                    address: to,
                    data: LogData::new_unchecked(vec![keccak256(input)], input.clone()),
                });
            }
        }

        Ok(result)
    }
}

/// Executor whose calls run out of gas below a fixed gas limit. Above it,
/// the transaction is executed by [`ValueTransferExecutor`].
#[derive(Clone, Copy, Debug)]
pub struct GasThresholdExecutor {
    /// The lowest gas limit with which transactions succeed
    pub minimum_gas_limit: u64,
}

impl TransactionExecutor for GasThresholdExecutor {
    fn run(
        &self,
        state: &dyn State<Error = StateError>,
        block: &BlockEnv,
        transaction: &Signed,
        flags: ExecutionFlags,
    ) -> Result<ResultAndState, TransactionError> {
        let gas_limit = transaction.gas_limit();
        if gas_limit < self.minimum_gas_limit {
            return Ok(ResultAndState {
                result: ExecutionResult::Halt {
                    reason: HaltReason::OutOfGas,
                    gas_used: gas_limit,
                },
                state: StateChanges::default(),
                trace: Trace::default(),
            });
        }

        ValueTransferExecutor.run(state, block, transaction, flags)
    }
}

/// A node with a mock clock, an owned account, and a subscription channel.
pub struct NodeTestFixture {
    /// The node
    pub node_data: NodeData<MockTime>,
    /// Address of the owned account
    pub owner: Address,
    /// The node's clock
    pub timer: MockTime,
    /// Receives the events of the node's subscriptions
    pub subscription_receiver: SubscriptionReceiver,
}

impl NodeTestFixture {
    /// Constructs a local node using [`create_test_config`].
    pub fn new_local() -> anyhow::Result<Self> {
        Self::with_config(create_test_config())
    }

    /// Constructs a local node with the provided configuration.
    pub fn with_config(config: NodeConfig) -> anyhow::Result<Self> {
        Self::with_executor(config, Arc::new(LogEmittingExecutor))
    }

    /// Constructs a local node with the provided configuration and executor.
    pub fn with_executor(
        config: NodeConfig,
        executor: Arc<dyn TransactionExecutor>,
    ) -> anyhow::Result<Self> {
        Self::new(config, None, executor)
    }

    /// Constructs a node that forks the provided source at the provided block
    /// number, or at the source's default fork block if `None`.
    pub fn new_forked(
        mut config: NodeConfig,
        remote_source: Arc<dyn RemoteChainSource>,
        fork_block_number: Option<u64>,
    ) -> anyhow::Result<Self> {
        config.fork = Some(ForkConfig {
            url: "http://localhost:8545".to_string(),
            block_number: fork_block_number,
            http_headers: None,
        });

        Self::new(config, Some(remote_source), Arc::new(LogEmittingExecutor))
    }

    fn new(
        config: NodeConfig,
        remote_source: Option<Arc<dyn RemoteChainSource>>,
        executor: Arc<dyn TransactionExecutor>,
    ) -> anyhow::Result<Self> {
        let owner = config
            .accounts
            .first()
            .map(|account| secret_key_to_address(&account.secret_key))
            .ok_or_else(|| anyhow::anyhow!("test configs need an owned account"))?;

        let timer = test_timer();
        let (sender, subscription_receiver) = subscription_channel();

        let node_data = NodeData::with_remote_source(
            config,
            remote_source,
            executor,
            Some(sender),
            timer.clone(),
        )?;

        Ok(Self {
            node_data,
            owner,
            timer,
            subscription_receiver,
        })
    }

    /// Sends a transfer of 1 wei from the owned account with the provided
    /// nonce.
    pub fn send_transfer(&mut self, nonce: u64) -> Result<SendTransactionResult, NodeError> {
        self.node_data.send_transaction(TransactionRequest {
            from: self.owner,
            to: Some(Address::repeat_byte(0xaa)),
            value: Some(U256::from(1)),
            gas: Some(21_000),
            nonce: Some(nonce),
            ..TransactionRequest::default()
        })
    }
}
