//! Ethereum receipt types

use std::ops::Deref;

use alloy_rlp::{BufMut, Encodable};
use devnet_primitives::{Address, B256, Bloom};
use devnet_transaction::TransactionType;
use devnet_trie::ordered_trie_root;

use crate::log::{ExecutionLog, FilterLog, logs_to_bloom};

/// Receipt that's generated after execution of a transaction (EIP-658).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionReceipt<LogT> {
    /// Whether the transaction succeeded
    pub status: bool,
    /// Cumulative gas used in the block after this transaction was executed
    pub cumulative_gas_used: u64,
    /// Bloom filter of the logs generated within this transaction
    pub logs_bloom: Bloom,
    /// Logs generated within this transaction
    pub logs: Vec<LogT>,
}

impl ExecutionReceipt<ExecutionLog> {
    /// Constructs a receipt with the provided logs.
    pub fn new(status: bool, cumulative_gas_used: u64, logs: Vec<ExecutionLog>) -> Self {
        Self {
            status,
            cumulative_gas_used,
            logs_bloom: logs_to_bloom(&logs),
            logs,
        }
    }
}

impl<LogT> ExecutionReceipt<LogT> {
    /// Maps the logs of the receipt to a new type.
    pub fn map_logs<NewLogT>(
        self,
        map_fn: impl FnMut(LogT) -> NewLogT,
    ) -> ExecutionReceipt<NewLogT> {
        ExecutionReceipt {
            status: self.status,
            cumulative_gas_used: self.cumulative_gas_used,
            logs_bloom: self.logs_bloom,
            logs: self.logs.into_iter().map(map_fn).collect(),
        }
    }

    fn rlp_payload_length(&self) -> usize
    where
        LogT: Encodable,
    {
        self.status.length()
            + self.cumulative_gas_used.length()
            + self.logs_bloom.length()
            + self.logs.length()
    }
}

impl<LogT: Encodable> Encodable for ExecutionReceipt<LogT> {
    fn encode(&self, out: &mut dyn BufMut) {
        alloy_rlp::Header {
            list: true,
            payload_length: self.rlp_payload_length(),
        }
        .encode(out);

        self.status.encode(out);
        self.cumulative_gas_used.encode(out);
        self.logs_bloom.encode(out);
        self.logs.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.rlp_payload_length();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

/// Type for a receipt that's created when processing a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionReceipt<ExecutionReceiptT> {
    /// Receipt that's generated after execution of a transaction
    pub inner: ExecutionReceiptT,
    /// Hash of the transaction
    pub transaction_hash: B256,
    /// Index of the transaction in the block
    pub transaction_index: u64,
    /// Type of the transaction
    pub transaction_type: TransactionType,
    /// Sender
    pub from: Address,
    /// Recipient, or `None` for contract creation
    pub to: Option<Address>,
    /// Address of the created contract
    pub contract_address: Option<Address>,
    /// Gas used by this transaction
    pub gas_used: u64,
    /// Price per gas actually paid
    pub effective_gas_price: Option<u128>,
}

impl<ExecutionReceiptT> Deref for TransactionReceipt<ExecutionReceiptT> {
    type Target = ExecutionReceiptT;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Receipt of a transaction that's part of a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockReceipt {
    /// Transaction receipt
    pub inner: TransactionReceipt<ExecutionReceipt<FilterLog>>,
    /// Hash of the block
    pub block_hash: B256,
    /// Number of the block
    pub block_number: u64,
}

impl Deref for BlockReceipt {
    type Target = TransactionReceipt<ExecutionReceipt<FilterLog>>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Encodable for FilterLog {
    fn encode(&self, out: &mut dyn BufMut) {
        self.inner.inner.encode(out);
    }

    fn length(&self) -> usize {
        self.inner.inner.length()
    }
}

/// Encodes a receipt as it is stored in the receipts trie: typed receipts are
/// prefixed by their transaction type.
pub fn encode_receipt<LogT: Encodable>(
    transaction_type: TransactionType,
    receipt: &ExecutionReceipt<LogT>,
) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(receipt.length() + 1);
    if transaction_type != TransactionType::Legacy {
        encoded.push(transaction_type.into());
    }
    receipt.encode(&mut encoded);
    encoded
}

/// Computes the receipts root of the provided receipts.
pub fn receipts_root<'receipt, LogT: Encodable + 'receipt>(
    receipts: impl IntoIterator<Item = &'receipt TransactionReceipt<ExecutionReceipt<LogT>>>,
) -> B256 {
    ordered_trie_root(
        receipts
            .into_iter()
            .map(|receipt| encode_receipt(receipt.transaction_type, &receipt.inner)),
    )
}
