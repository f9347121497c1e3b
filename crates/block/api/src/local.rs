use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use devnet_hardfork::Hardfork;
use devnet_primitives::{B256, Bytes, KECCAK_NULL_RLP};
use devnet_state_api::{StateDebug as _, StateDiff, StateError};
use devnet_state_persistent::PersistentState;
use devnet_transaction::Signed;
use devnet_trie::ordered_trie_root;

use crate::{
    Block, BlockError,
    header::{BlockConfig, BlockHeader, HeaderOverrides, PartialHeader},
    log::{ExecutionLog, FilterLog, ReceiptLog},
    receipt::{BlockReceipt, ExecutionReceipt, TransactionReceipt},
};

/// A locally mined block, which contains complete information.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalBlock {
    header: BlockHeader,
    transactions: Vec<Signed>,
    transaction_hashes: Vec<B256>,
    transaction_receipts: Vec<Arc<BlockReceipt>>,
    hash: B256,
}

impl LocalBlock {
    /// Constructs a new instance with the provided data.
    pub fn new(
        partial_header: PartialHeader,
        transactions: Vec<Signed>,
        transaction_receipts: Vec<TransactionReceipt<ExecutionReceipt<ExecutionLog>>>,
    ) -> Self {
        let transactions_root = ordered_trie_root(transactions.iter().map(Signed::encoded));

        let header = BlockHeader::new(partial_header, transactions_root);
        let hash = header.hash();

        let transaction_receipts =
            map_transaction_receipt_logs(hash, header.number, transaction_receipts)
                .map(|inner| {
                    Arc::new(BlockReceipt {
                        inner,
                        block_hash: hash,
                        block_number: header.number,
                    })
                })
                .collect();

        let transaction_hashes = transactions
            .iter()
            .map(|transaction| *transaction.transaction_hash())
            .collect();

        Self {
            header,
            transactions,
            transaction_hashes,
            transaction_receipts,
            hash,
        }
    }

    /// Constructs an empty block.
    pub fn empty(partial_header: PartialHeader) -> Self {
        let header = BlockHeader::new(partial_header, KECCAK_NULL_RLP);
        let hash = header.hash();

        Self {
            header,
            transactions: Vec::new(),
            transaction_hashes: Vec::new(),
            transaction_receipts: Vec::new(),
            hash,
        }
    }

    /// Constructs a block with the provided genesis state and options.
    pub fn with_genesis_state(
        genesis_diff: StateDiff,
        block_config: &BlockConfig,
        options: GenesisBlockOptions,
    ) -> Result<Self, LocalBlockCreationError> {
        if block_config.hardfork >= Hardfork::Merge && options.mix_hash.is_none() {
            return Err(LocalBlockCreationError::MissingPrevrandao);
        }

        let genesis_state = PersistentState::from(genesis_diff);

        let mut overrides = HeaderOverrides::from(options);
        overrides.state_root = Some(genesis_state.state_root()?);

        if overrides.timestamp.is_none() {
            overrides.timestamp = Some(
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map_err(|_error| LocalBlockCreationError::InvalidSystemTime)?
                    .as_secs(),
            );
        }

        let partial_header = PartialHeader::new(block_config, overrides, None);

        Ok(Self::empty(partial_header))
    }

    /// Retrieves the receipts of the block's transactions.
    pub fn transaction_receipts(&self) -> &[Arc<BlockReceipt>] {
        &self.transaction_receipts
    }

    /// Retrieves the block's transactions along with their receipts.
    pub fn transactions_with_receipt(&self) -> impl Iterator<Item = (&Signed, &Arc<BlockReceipt>)> {
        self.transactions
            .iter()
            .zip(self.transaction_receipts.iter())
    }
}

impl Block for LocalBlock {
    fn block_hash(&self) -> &B256 {
        &self.hash
    }

    fn header(&self) -> &BlockHeader {
        &self.header
    }

    fn transactions(&self) -> &[Signed] {
        &self.transactions
    }

    fn transaction_hashes(&self) -> &[B256] {
        &self.transaction_hashes
    }

    fn fetch_transaction_receipts(&self) -> Result<Vec<Arc<BlockReceipt>>, BlockError> {
        Ok(self.transaction_receipts.clone())
    }
}

/// Options for creating a genesis block.
#[derive(Clone, Debug, Default)]
pub struct GenesisBlockOptions {
    /// The block's extra data
    pub extra_data: Option<Bytes>,
    /// The block's gas limit
    pub gas_limit: Option<u64>,
    /// The block's timestamp
    pub timestamp: Option<u64>,
    /// The block's mix hash (or prevrandao for post-merge blockchains)
    pub mix_hash: Option<B256>,
    /// The block's base gas fee
    pub base_fee: Option<u128>,
}

impl From<GenesisBlockOptions> for HeaderOverrides {
    fn from(value: GenesisBlockOptions) -> Self {
        let GenesisBlockOptions {
            extra_data,
            gas_limit,
            timestamp,
            mix_hash,
            base_fee,
        } = value;

        Self {
            extra_data,
            gas_limit,
            timestamp,
            mix_hash,
            base_fee,
            ..HeaderOverrides::default()
        }
    }
}

/// An error that occurs upon creation of a [`LocalBlock`].
#[derive(Debug, thiserror::Error)]
pub enum LocalBlockCreationError {
    /// The system time is before the unix epoch
    #[error("The system time is before the unix epoch")]
    InvalidSystemTime,
    /// Missing prevrandao for post-merge blockchain
    #[error("Missing prevrandao for post-merge blockchain")]
    MissingPrevrandao,
    /// State error
    #[error(transparent)]
    State(#[from] StateError),
}

/// Maps the logs of the transaction receipts from [`ExecutionLog`] to
/// [`FilterLog`].
fn map_transaction_receipt_logs(
    block_hash: B256,
    block_number: u64,
    receipts: Vec<TransactionReceipt<ExecutionReceipt<ExecutionLog>>>,
) -> impl Iterator<Item = TransactionReceipt<ExecutionReceipt<FilterLog>>> {
    let mut log_index = 0;

    receipts.into_iter().map(move |receipt| {
        let TransactionReceipt {
            inner,
            transaction_hash,
            transaction_index,
            transaction_type,
            from,
            to,
            contract_address,
            gas_used,
            effective_gas_price,
        } = receipt;

        let inner = inner.map_logs(|log| {
            let index = log_index;
            log_index += 1;

            FilterLog {
                inner: ReceiptLog {
                    inner: log,
                    transaction_hash,
                },
                block_hash,
                block_number,
                log_index: index,
                transaction_index,
                // Assuming a local block is never reorged out.
                removed: false,
            }
        });

        TransactionReceipt {
            inner,
            transaction_hash,
            transaction_index,
            transaction_type,
            from,
            to,
            contract_address,
            gas_used,
            effective_gas_price,
        }
    })
}
