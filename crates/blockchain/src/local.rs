use std::{collections::BTreeMap, num::NonZeroU64, sync::Arc};

use devnet_block_api::{
    Block as _, BlockConfig, BlockReceipt, LocalBlock, SyncBlock,
    log::{FilterLog, LogFilter},
};
use devnet_block_storage::{ReservableSparseBlockStorage, ReservationParams};
use devnet_hardfork::{Hardfork, chains::chain_base_fee_params, eip1559::BaseFeeParams};
use devnet_primitives::B256;
use devnet_state_api::{DynState, StateDiff, irregular::StateOverride};
use devnet_state_persistent::PersistentState;

use crate::{
    Blockchain, BlockchainError, BlockchainMut, utils::compute_state_at_block,
    validate_next_block,
};

/// An error that occurs upon creation of a [`LocalBlockchain`].
#[derive(Debug, thiserror::Error)]
pub enum InvalidGenesisBlock {
    /// Invalid block number in the genesis block.
    #[error("Invalid block number: {actual}. Expected: 0")]
    InvalidBlockNumber {
        /// The actual block number.
        actual: u64,
    },
}

/// A blockchain consisting of local blocks only.
#[derive(Debug)]
pub struct LocalBlockchain {
    storage: ReservableSparseBlockStorage,
    base_fee_params: BaseFeeParams,
    chain_id: u64,
    network_id: u64,
    hardfork: Hardfork,
}

impl LocalBlockchain {
    /// Constructs a new instance with the provided genesis block and the
    /// state diff that produced the genesis state.
    pub fn new(
        genesis_block: LocalBlock,
        genesis_diff: StateDiff,
        chain_id: u64,
        network_id: u64,
        hardfork: Hardfork,
    ) -> Result<Self, InvalidGenesisBlock> {
        let genesis_number = genesis_block.header().number;
        if genesis_number != 0 {
            return Err(InvalidGenesisBlock::InvalidBlockNumber {
                actual: genesis_number,
            });
        }

        Ok(Self {
            storage: ReservableSparseBlockStorage::with_genesis_block(genesis_block, genesis_diff),
            base_fee_params: chain_base_fee_params(chain_id).clone(),
            chain_id,
            network_id,
            hardfork,
        })
    }
}

impl Blockchain for LocalBlockchain {
    fn base_fee_params(&self) -> &BaseFeeParams {
        &self.base_fee_params
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn block_by_hash(&self, hash: &B256) -> Result<Option<Arc<dyn SyncBlock>>, BlockchainError> {
        Ok(self
            .storage
            .block_by_hash(hash)
            .map(|block| -> Arc<dyn SyncBlock> { block }))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn block_by_number(&self, number: u64) -> Result<Option<Arc<dyn SyncBlock>>, BlockchainError> {
        Ok(self
            .storage
            .block_by_number(number)?
            .map(|block| -> Arc<dyn SyncBlock> { block }))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn block_by_transaction_hash(
        &self,
        transaction_hash: &B256,
    ) -> Result<Option<Arc<dyn SyncBlock>>, BlockchainError> {
        Ok(self
            .storage
            .block_by_transaction_hash(transaction_hash)
            .map(|block| -> Arc<dyn SyncBlock> { block }))
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn chain_id_at_block_number(&self, block_number: u64) -> Result<u64, BlockchainError> {
        if block_number > self.last_block_number() {
            return Err(BlockchainError::UnknownBlockNumber);
        }

        Ok(self.chain_id)
    }

    fn hardfork(&self) -> Hardfork {
        self.hardfork
    }

    fn hardfork_at_block_number(&self, block_number: u64) -> Result<Hardfork, BlockchainError> {
        if block_number > self.last_block_number() {
            return Err(BlockchainError::UnknownBlockNumber);
        }

        Ok(self.hardfork)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn last_block(&self) -> Result<Arc<dyn SyncBlock>, BlockchainError> {
        self.storage
            .block_by_number(self.storage.last_block_number())?
            .map(|block| -> Arc<dyn SyncBlock> { block })
            .ok_or(BlockchainError::UnknownBlockNumber)
    }

    fn last_block_number(&self) -> u64 {
        self.storage.last_block_number()
    }

    fn logs(&self, filter: &LogFilter) -> Result<Vec<FilterLog>, BlockchainError> {
        Ok(self.storage.logs(filter))
    }

    fn network_id(&self) -> u64 {
        self.network_id
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn receipt_by_transaction_hash(
        &self,
        transaction_hash: &B256,
    ) -> Result<Option<Arc<BlockReceipt>>, BlockchainError> {
        Ok(self.storage.receipt_by_transaction_hash(transaction_hash))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn state_at_block_number(
        &self,
        block_number: u64,
        state_overrides: &BTreeMap<u64, StateOverride>,
    ) -> Result<Box<dyn DynState>, BlockchainError> {
        if block_number > self.last_block_number() {
            return Err(BlockchainError::UnknownBlockNumber);
        }

        let mut state = PersistentState::default();
        compute_state_at_block(&mut state, &self.storage, 0, block_number, state_overrides);

        Ok(Box::new(state))
    }
}

impl BlockchainMut for LocalBlockchain {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn insert_block(
        &mut self,
        block: LocalBlock,
        state_diff: StateDiff,
    ) -> Result<Arc<dyn SyncBlock>, BlockchainError> {
        let last_block = self.last_block()?;

        validate_next_block(last_block.as_ref(), &block)?;

        let block: Arc<dyn SyncBlock> = self.storage.insert_block(block, state_diff)?.clone();
        Ok(block)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn reserve_blocks(&mut self, additional: u64, interval: u64) -> Result<(), BlockchainError> {
        let Some(additional) = NonZeroU64::new(additional) else {
            return Ok(());
        };

        let last_block = self.last_block()?;
        let last_header = last_block.header();

        self.storage.reserve_blocks(
            additional,
            ReservationParams {
                interval,
                previous_base_fee_per_gas: last_header.base_fee_per_gas,
                previous_state_root: last_header.state_root,
                previous_timestamp: last_header.timestamp,
                previous_gas_limit: last_header.gas_limit,
                coinbase: last_header.beneficiary,
                block_config: BlockConfig {
                    base_fee_params: self.base_fee_params.clone(),
                    hardfork: self.hardfork,
                },
            },
        );

        Ok(())
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn revert_to_block(&mut self, block_number: u64) -> Result<(), BlockchainError> {
        if self.storage.revert_to_block(block_number) {
            Ok(())
        } else {
            Err(BlockchainError::UnknownBlockNumber)
        }
    }
}

#[cfg(test)]
mod tests {
    use devnet_block_api::{GenesisBlockOptions, HeaderOverrides, PartialHeader};
    use devnet_primitives::{Address, U256};
    use devnet_state_api::{
        State as _, StateDebug as _, account::AccountInfo, irregular::IrregularState,
    };

    use super::*;

    const CHAIN_ID: u64 = 31337;

    fn block_config() -> BlockConfig {
        BlockConfig {
            base_fee_params: BaseFeeParams::default(),
            hardfork: Hardfork::Cancun,
        }
    }

    fn blockchain_with_account(address: Address, balance: u64) -> anyhow::Result<LocalBlockchain> {
        let mut genesis_diff = StateDiff::default();
        genesis_diff.apply_account_change(
            address,
            AccountInfo {
                balance: U256::from(balance),
                ..AccountInfo::default()
            },
        );

        let genesis_block = LocalBlock::with_genesis_state(
            genesis_diff.clone(),
            &block_config(),
            GenesisBlockOptions {
                mix_hash: Some(B256::random()),
                timestamp: Some(1_000),
                gas_limit: Some(30_000_000),
                ..GenesisBlockOptions::default()
            },
        )?;

        Ok(LocalBlockchain::new(
            genesis_block,
            genesis_diff,
            CHAIN_ID,
            CHAIN_ID,
            Hardfork::Cancun,
        )?)
    }

    fn next_block(blockchain: &LocalBlockchain) -> anyhow::Result<LocalBlock> {
        let last_block = blockchain.last_block()?;
        let partial_header = PartialHeader::new(
            &block_config(),
            HeaderOverrides {
                timestamp: Some(last_block.header().timestamp + 1),
                mix_hash: Some(B256::random()),
                ..HeaderOverrides::default()
            },
            Some(last_block.header()),
        );

        Ok(LocalBlock::empty(partial_header))
    }

    #[test]
    fn genesis_block_number_must_be_zero() -> anyhow::Result<()> {
        let genesis_block = LocalBlock::empty(PartialHeader::new(
            &block_config(),
            HeaderOverrides {
                number: Some(1),
                ..HeaderOverrides::default()
            },
            None,
        ));

        let result = LocalBlockchain::new(
            genesis_block,
            StateDiff::default(),
            CHAIN_ID,
            CHAIN_ID,
            Hardfork::Cancun,
        );

        assert!(matches!(
            result,
            Err(InvalidGenesisBlock::InvalidBlockNumber { actual: 1 })
        ));

        Ok(())
    }

    #[test]
    fn insert_block_validates_number_and_parent() -> anyhow::Result<()> {
        let mut blockchain = blockchain_with_account(Address::random(), 1_000)?;

        let wrong_number = LocalBlock::empty(PartialHeader::new(
            &block_config(),
            HeaderOverrides {
                number: Some(2),
                ..HeaderOverrides::default()
            },
            None,
        ));
        assert!(matches!(
            blockchain.insert_block(wrong_number, StateDiff::default()),
            Err(BlockchainError::InvalidNextBlock(
                crate::InvalidNextBlock::InvalidBlockNumber {
                    actual: 2,
                    expected: 1
                }
            ))
        ));

        let wrong_parent = LocalBlock::empty(PartialHeader::new(
            &block_config(),
            HeaderOverrides {
                number: Some(1),
                parent_hash: Some(B256::random()),
                ..HeaderOverrides::default()
            },
            None,
        ));
        assert!(matches!(
            blockchain.insert_block(wrong_parent, StateDiff::default()),
            Err(BlockchainError::InvalidNextBlock(
                crate::InvalidNextBlock::InvalidParentHash { .. }
            ))
        ));

        let block = next_block(&blockchain)?;
        let inserted = blockchain.insert_block(block, StateDiff::default())?;
        assert_eq!(inserted.header().number, 1);
        assert_eq!(blockchain.last_block_number(), 1);

        Ok(())
    }

    #[test]
    fn state_at_block_applies_diffs_and_overrides() -> anyhow::Result<()> {
        let address = Address::random();
        let mut blockchain = blockchain_with_account(address, 1_000)?;

        let mut diff = StateDiff::default();
        diff.apply_account_change(
            address,
            AccountInfo {
                balance: U256::from(900),
                nonce: 1,
                ..AccountInfo::default()
            },
        );
        let block = next_block(&blockchain)?;
        blockchain.insert_block(block, diff)?;

        let mut irregular_state = IrregularState::default();
        let state = blockchain.state_at_block_number(1, irregular_state.state_overrides())?;
        let account = state.basic(address)?.expect("account exists");
        assert_eq!(account.balance, U256::from(900));
        assert_eq!(account.nonce, 1);

        // The genesis state is unaffected by later blocks.
        let genesis_state = blockchain.state_at_block_number(0, irregular_state.state_overrides())?;
        assert_eq!(
            genesis_state.basic(address)?.map(|account| account.balance),
            Some(U256::from(1_000))
        );

        let mut override_diff = StateDiff::default();
        override_diff.apply_account_change(
            address,
            AccountInfo {
                balance: U256::from(5),
                nonce: 1,
                ..AccountInfo::default()
            },
        );
        irregular_state
            .state_override_at_block_number(1)
            .or_insert_with(|| StateOverride {
                diff: override_diff,
                state_root: B256::ZERO,
            });

        let overridden = blockchain.state_at_block_number(1, irregular_state.state_overrides())?;
        assert_eq!(
            overridden.basic(address)?.map(|account| account.balance),
            Some(U256::from(5))
        );

        assert!(matches!(
            blockchain.state_at_block_number(2, irregular_state.state_overrides()),
            Err(BlockchainError::UnknownBlockNumber)
        ));

        Ok(())
    }

    #[test]
    fn compute_state_after_reserve() -> anyhow::Result<()> {
        let address = Address::random();
        let mut blockchain = blockchain_with_account(address, 1_000_000_000)?;

        let genesis_root = blockchain.last_block()?.header().state_root;

        blockchain.reserve_blocks(10, 12)?;
        assert_eq!(blockchain.last_block_number(), 10);

        let reserved = blockchain
            .block_by_number(5)?
            .expect("reserved block is materialised");
        assert_eq!(reserved.header().timestamp, 1_000 + 5 * 12);
        assert_eq!(reserved.header().state_root, genesis_root);
        assert!(reserved.transactions().is_empty());

        let state = blockchain.state_at_block_number(7, &BTreeMap::new())?;
        assert_eq!(state.state_root()?, genesis_root);
        assert_eq!(
            state.basic(address)?.map(|account| account.balance),
            Some(U256::from(1_000_000_000))
        );

        Ok(())
    }

    #[test]
    fn revert_to_block() -> anyhow::Result<()> {
        let mut blockchain = blockchain_with_account(Address::random(), 1_000)?;

        let block = next_block(&blockchain)?;
        blockchain.insert_block(block, StateDiff::default())?;
        let block = next_block(&blockchain)?;
        blockchain.insert_block(block, StateDiff::default())?;

        blockchain.revert_to_block(1)?;
        assert_eq!(blockchain.last_block_number(), 1);
        assert!(blockchain.block_by_number(2)?.is_none());

        assert!(matches!(
            blockchain.revert_to_block(5),
            Err(BlockchainError::UnknownBlockNumber)
        ));

        Ok(())
    }
}
