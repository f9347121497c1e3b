use std::sync::{Arc, OnceLock};

use devnet_primitives::{B256, LogData, U256};
use devnet_rpc_client::{
    RemoteChainSource,
    types::{RpcBlock, RpcLog, RpcReceipt},
};
use devnet_transaction::{Signed, TransactionType};

use crate::{
    Block, BlockError,
    header::BlockHeader,
    log::{ExecutionLog, FilterLog, ReceiptLog},
    receipt::{BlockReceipt, ExecutionReceipt, TransactionReceipt},
};

/// Error that occurs when trying to convert a block returned by the remote
/// into a [`RemoteBlock`].
#[derive(Debug, thiserror::Error)]
pub enum RemoteBlockConversionError {
    /// A quantity does not fit the local representation.
    #[error("The remote returned {field} {value}, which is out of range.")]
    OutOfRange {
        /// Name of the field
        field: &'static str,
        /// The value returned by the remote
        value: U256,
    },
}

/// A block that was mined by the remote chain. Its transaction receipts are
/// lazily fetched from the remote on first access.
#[derive(Debug)]
pub struct RemoteBlock {
    header: BlockHeader,
    transaction_hashes: Vec<B256>,
    hash: B256,
    receipts: OnceLock<Vec<Arc<BlockReceipt>>>,
    source: Arc<dyn RemoteChainSource>,
}

impl RemoteBlock {
    /// Constructs a new instance from the remote's representation.
    pub fn new(
        block: RpcBlock,
        source: Arc<dyn RemoteChainSource>,
    ) -> Result<Self, RemoteBlockConversionError> {
        let base_fee_per_gas = block
            .base_fee_per_gas
            .map(|base_fee| {
                u128::try_from(base_fee).map_err(|_error| RemoteBlockConversionError::OutOfRange {
                    field: "base fee",
                    value: base_fee,
                })
            })
            .transpose()?;

        let header = BlockHeader {
            parent_hash: block.parent_hash,
            ommers_hash: block.sha3_uncles,
            beneficiary: block.miner,
            state_root: block.state_root,
            transactions_root: block.transactions_root,
            receipts_root: block.receipts_root,
            logs_bloom: block.logs_bloom,
            difficulty: block.difficulty,
            number: block.number.to(),
            gas_limit: block.gas_limit.to(),
            gas_used: block.gas_used.to(),
            timestamp: block.timestamp.to(),
            extra_data: block.extra_data,
            mix_hash: block.mix_hash,
            nonce: block.nonce,
            base_fee_per_gas,
            withdrawals_root: block.withdrawals_root,
            blob_gas_used: None,
            excess_blob_gas: None,
            parent_beacon_block_root: block.parent_beacon_block_root,
            requests_hash: None,
        };

        Ok(Self {
            header,
            transaction_hashes: block.transactions,
            // The remote's hash is authoritative, as the header may lack
            // fields introduced by hardforks unknown to us.
            hash: block.hash,
            receipts: OnceLock::new(),
            source,
        })
    }
}

impl Block for RemoteBlock {
    fn block_hash(&self) -> &B256 {
        &self.hash
    }

    fn header(&self) -> &BlockHeader {
        &self.header
    }

    fn transactions(&self) -> &[Signed] {
        &[]
    }

    fn transaction_hashes(&self) -> &[B256] {
        &self.transaction_hashes
    }

    fn fetch_transaction_receipts(&self) -> Result<Vec<Arc<BlockReceipt>>, BlockError> {
        if let Some(receipts) = self.receipts.get() {
            return Ok(receipts.clone());
        }

        let receipts = self
            .transaction_hashes
            .iter()
            .map(|transaction_hash| {
                let receipt = self.source.receipt(*transaction_hash)?.ok_or(
                    BlockError::MissingReceipt {
                        transaction_hash: *transaction_hash,
                    },
                )?;

                convert_remote_receipt(receipt).map(Arc::new)
            })
            .collect::<Result<Vec<_>, BlockError>>()?;

        Ok(self.receipts.get_or_init(|| receipts).clone())
    }
}

/// Converts a receipt returned by the remote into a [`BlockReceipt`].
pub fn convert_remote_receipt(receipt: RpcReceipt) -> Result<BlockReceipt, BlockError> {
    let RpcReceipt {
        transaction_hash,
        transaction_index,
        block_hash,
        block_number,
        from,
        to,
        contract_address,
        cumulative_gas_used,
        gas_used,
        effective_gas_price,
        logs,
        logs_bloom,
        status,
        root: _,
        transaction_type,
    } = receipt;

    let transaction_type = match transaction_type.map(|transaction_type| transaction_type.to()) {
        None | Some(0u64) => TransactionType::Legacy,
        Some(1) => TransactionType::Eip2930,
        Some(2) => TransactionType::Eip1559,
        Some(transaction_type) => {
            return Err(BlockError::UnsupportedTransactionType {
                transaction_hash,
                transaction_type,
            });
        }
    };

    let effective_gas_price = effective_gas_price
        .map(|price| {
            u128::try_from(price).map_err(|_error| BlockError::OutOfRange {
                field: "effective gas price",
                value: price,
            })
        })
        .transpose()?;

    let logs = logs.into_iter().map(convert_remote_log).collect();

    Ok(BlockReceipt {
        inner: TransactionReceipt {
            inner: ExecutionReceipt {
                // Pre-Byzantium receipts carry a state root instead of a
                // status and are treated as successful.
                status: status.is_none_or(|status| status.to::<u64>() == 1),
                cumulative_gas_used: cumulative_gas_used.to(),
                logs_bloom,
                logs,
            },
            transaction_hash,
            transaction_index: transaction_index.to(),
            transaction_type,
            from,
            to,
            contract_address,
            gas_used: gas_used.to(),
            effective_gas_price,
        },
        block_hash,
        block_number: block_number.to(),
    })
}

/// Converts a log returned by the remote into a [`FilterLog`].
pub fn convert_remote_log(log: RpcLog) -> FilterLog {
    FilterLog {
        inner: ReceiptLog {
            inner: ExecutionLog {
                address: log.address,
                data: LogData::new_unchecked(log.topics, log.data),
            },
            transaction_hash: log.transaction_hash,
        },
        block_hash: log.block_hash,
        block_number: log.block_number.to(),
        log_index: log.log_index.to(),
        transaction_index: log.transaction_index.to(),
        removed: log.removed,
    }
}
