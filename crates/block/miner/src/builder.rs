use std::time::{SystemTime, UNIX_EPOCH};

use devnet_block_api::{
    BlockConfig, HeaderOverrides, LocalBlock, PartialHeader,
    log::ExecutionLog,
    receipt::{ExecutionReceipt, TransactionReceipt, receipts_root},
};
use devnet_blockchain::{Blockchain, BlockchainError};
use devnet_executor::{
    BlockEnv, ExecutionFlags, ExecutionResult, ResultAndState, Trace, TransactionError,
    TransactionExecutor,
};
use devnet_hardfork::Hardfork;
use devnet_primitives::{Address, Bloom, KECCAK_NULL_RLP, U256};
use devnet_state_api::{
    AccountModifierFn, DynState, StateCommit as _, StateDebug as _, StateDiff, StateError,
};
use devnet_transaction::Signed;

/// An error caused during construction of a block builder.
#[derive(Debug, thiserror::Error)]
pub enum BlockBuilderCreationError {
    /// Blockchain error
    #[error(transparent)]
    Blockchain(#[from] BlockchainError),
    /// The block is expected to have a prevrandao, as the hardfork is
    /// post-merge.
    #[error("Post-merge block is missing prevrandao")]
    MissingPrevrandao,
}

/// An error caused during execution of a transaction while building a block.
#[derive(Debug, thiserror::Error)]
pub enum BlockTransactionError {
    /// Transaction has higher gas limit than is remaining in block
    #[error("Transaction has a higher gas limit than the remaining gas in the block")]
    ExceedsBlockGasLimit,
    /// Transaction error
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// The result of building a block, including the state. This result needs to
/// be inserted into the blockchain to be persistent.
#[derive(Debug)]
pub struct BuiltBlockAndState {
    /// Mined block
    pub block: LocalBlock,
    /// State after mining the block
    pub state: Box<dyn DynState>,
    /// State diff applied by block
    pub state_diff: StateDiff,
    /// Transaction results
    pub transaction_results: Vec<ExecutionResult>,
    /// Transaction traces
    pub transaction_traces: Vec<Trace>,
}

/// A builder for constructing Ethereum blocks.
#[derive(Debug)]
pub struct BlockBuilder<'executor> {
    chain_id: u64,
    executor: &'executor dyn TransactionExecutor,
    flags: ExecutionFlags,
    hardfork: Hardfork,
    header: PartialHeader,
    receipts: Vec<TransactionReceipt<ExecutionReceipt<ExecutionLog>>>,
    state: Box<dyn DynState>,
    state_diff: StateDiff,
    transactions: Vec<Signed>,
    transaction_results: Vec<ExecutionResult>,
    transaction_traces: Vec<Trace>,
}

impl<'executor> BlockBuilder<'executor> {
    /// Creates a new instance on top of the blockchain's last block.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn new<BlockchainT: Blockchain + ?Sized>(
        blockchain: &BlockchainT,
        state: Box<dyn DynState>,
        executor: &'executor dyn TransactionExecutor,
        flags: ExecutionFlags,
        mut overrides: HeaderOverrides,
    ) -> Result<Self, BlockBuilderCreationError> {
        let hardfork = blockchain.hardfork();
        if hardfork >= Hardfork::Merge && overrides.mix_hash.is_none() {
            return Err(BlockBuilderCreationError::MissingPrevrandao);
        }

        let parent_block = blockchain.last_block()?;
        let parent_header = parent_block.header();

        overrides.parent_hash = Some(*parent_block.block_hash());
        overrides.gas_limit = overrides.gas_limit.or(Some(parent_header.gas_limit));

        let block_config = BlockConfig {
            base_fee_params: blockchain.base_fee_params().clone(),
            hardfork,
        };
        let header = PartialHeader::new(&block_config, overrides, Some(parent_header));

        Ok(Self {
            chain_id: blockchain.chain_id(),
            executor,
            flags,
            hardfork,
            header,
            receipts: Vec::new(),
            state,
            state_diff: StateDiff::default(),
            transactions: Vec::new(),
            transaction_results: Vec::new(),
            transaction_traces: Vec::new(),
        })
    }

    /// Retrieves the amount of gas used in the block, so far.
    pub fn gas_used(&self) -> u64 {
        self.header.gas_used
    }

    /// Retrieves the amount of gas left in the block.
    pub fn gas_remaining(&self) -> u64 {
        self.header.gas_limit - self.gas_used()
    }

    /// Returns the block's [`PartialHeader`].
    pub fn header(&self) -> &PartialHeader {
        &self.header
    }

    /// Retrieves the state of the block builder.
    pub fn state(&self) -> &dyn DynState {
        self.state.as_ref()
    }

    /// Constructs the environment in which the block's transactions execute.
    pub fn block_env(&self) -> BlockEnv {
        BlockEnv {
            number: self.header.number,
            beneficiary: self.header.beneficiary,
            timestamp: self.header.timestamp,
            gas_limit: self.header.gas_limit,
            base_fee: self.header.base_fee,
            prevrandao: (self.hardfork >= Hardfork::Merge).then_some(self.header.mix_hash),
            difficulty: self.header.difficulty,
            hardfork: self.hardfork,
            chain_id: self.chain_id,
        }
    }

    /// Tries to add a transaction to the block. On failure, the block is left
    /// unchanged.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn add_transaction(&mut self, transaction: Signed) -> Result<(), BlockTransactionError> {
        // The transaction's gas limit cannot be greater than the remaining gas in the
        // block
        if transaction.gas_limit() > self.gas_remaining() {
            return Err(BlockTransactionError::ExceedsBlockGasLimit);
        }

        let block = self.block_env();
        let result = self
            .executor
            .run(&self.state, &block, &transaction, self.flags)?;

        self.add_transaction_result(transaction, result);

        Ok(())
    }

    fn add_transaction_result(&mut self, transaction: Signed, result: ResultAndState) {
        let ResultAndState {
            result,
            state: state_diff,
            trace,
        } = result;

        self.state_diff.apply_diff(state_diff.clone());
        self.state.commit(state_diff);

        self.header.gas_used += result.gas_used();

        let receipt = TransactionReceipt {
            inner: ExecutionReceipt::new(
                result.is_success(),
                self.header.gas_used,
                result.logs().to_vec(),
            ),
            transaction_hash: *transaction.transaction_hash(),
            transaction_index: self.transactions.len() as u64,
            transaction_type: transaction.transaction_type(),
            from: *transaction.caller(),
            to: transaction.kind().to().copied(),
            contract_address: result.created_address(),
            gas_used: result.gas_used(),
            effective_gas_price: Some(transaction.effective_gas_price(self.header.base_fee)),
        };
        self.receipts.push(receipt);

        log::trace!(
            "Added transaction {} to block {}",
            transaction.transaction_hash(),
            self.header.number
        );

        self.transactions.push(transaction);
        self.transaction_results.push(result);
        self.transaction_traces.push(trace);
    }

    /// Finalizes the block, applying rewards to the state.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn finalize(
        mut self,
        rewards: Vec<(Address, u128)>,
    ) -> Result<BuiltBlockAndState, StateError> {
        for (address, reward) in rewards {
            if reward > 0 {
                let account_info = self.state.modify_account(
                    address,
                    AccountModifierFn::new(Box::new(move |balance, _nonce, _code| {
                        *balance += U256::from(reward);
                    })),
                )?;

                self.state_diff.apply_account_change(address, account_info);
            }
        }

        self.header.logs_bloom = {
            let mut logs_bloom = Bloom::ZERO;
            for receipt in &self.receipts {
                logs_bloom.accrue_bloom(&receipt.logs_bloom);
            }
            logs_bloom
        };

        self.header.receipts_root = receipts_root(&self.receipts);

        // Only set the state root if it wasn't specified during construction
        if self.header.state_root == KECCAK_NULL_RLP {
            self.header.state_root = self.state.state_root()?;
        }

        // Only set the timestamp if it wasn't specified during construction
        if self.header.timestamp == 0 {
            self.header.timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |duration| duration.as_secs());
        }

        let block = LocalBlock::new(self.header, self.transactions, self.receipts);

        Ok(BuiltBlockAndState {
            block,
            state: self.state,
            state_diff: self.state_diff,
            transaction_results: self.transaction_results,
            transaction_traces: self.transaction_traces,
        })
    }
}
