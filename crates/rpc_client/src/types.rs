use devnet_primitives::{Address, B64, B256, Bloom, Bytes, U64, U256};
use serde::{Deserialize, Serialize};

use crate::method::BlockSpec;

/// A block as returned by `eth_getBlockBy*` with transaction hashes.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    /// Hash of the block
    pub hash: B256,
    /// Hash of the parent block
    pub parent_hash: B256,
    /// Hash of the ommers list
    pub sha3_uncles: B256,
    /// Beneficiary of the block
    pub miner: Address,
    /// State root after the block
    pub state_root: B256,
    /// Root of the transactions trie
    pub transactions_root: B256,
    /// Root of the receipts trie
    pub receipts_root: B256,
    /// Bloom filter of the block's logs
    pub logs_bloom: Bloom,
    /// Difficulty
    pub difficulty: U256,
    /// Block number
    pub number: U64,
    /// Gas limit
    pub gas_limit: U64,
    /// Gas used
    pub gas_used: U64,
    /// Timestamp
    pub timestamp: U64,
    /// Extra data
    pub extra_data: Bytes,
    /// Mix hash or `prevrandao`
    pub mix_hash: B256,
    /// Proof-of-work nonce
    pub nonce: B64,
    /// Base fee per gas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<U256>,
    /// Root of the withdrawals trie
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals_root: Option<B256>,
    /// Parent beacon block root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_beacon_block_root: Option<B256>,
    /// Hashes of the block's transactions
    pub transactions: Vec<B256>,
}

/// A log as returned by the remote.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    /// Address of the emitting contract
    pub address: Address,
    /// Topics
    pub topics: Vec<B256>,
    /// Data
    pub data: Bytes,
    /// Hash of the containing block
    pub block_hash: B256,
    /// Number of the containing block
    pub block_number: U64,
    /// Hash of the emitting transaction
    pub transaction_hash: B256,
    /// Index of the emitting transaction
    pub transaction_index: U64,
    /// Index of the log in the block
    pub log_index: U64,
    /// Whether the log was removed by a reorg
    #[serde(default)]
    pub removed: bool,
}

/// A transaction receipt as returned by the remote.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    /// Hash of the transaction
    pub transaction_hash: B256,
    /// Index of the transaction in the block
    pub transaction_index: U64,
    /// Hash of the containing block
    pub block_hash: B256,
    /// Number of the containing block
    pub block_number: U64,
    /// Sender
    pub from: Address,
    /// Recipient
    pub to: Option<Address>,
    /// Created contract
    pub contract_address: Option<Address>,
    /// Cumulative gas used in the block
    pub cumulative_gas_used: U64,
    /// Gas used by the transaction
    pub gas_used: U64,
    /// Effective gas price
    #[serde(default)]
    pub effective_gas_price: Option<U256>,
    /// Logs
    pub logs: Vec<RpcLog>,
    /// Bloom filter of the logs
    pub logs_bloom: Bloom,
    /// Status code (post-Byzantium)
    #[serde(default)]
    pub status: Option<U64>,
    /// State root (pre-Byzantium)
    #[serde(default)]
    pub root: Option<B256>,
    /// Transaction type
    #[serde(default, rename = "type")]
    pub transaction_type: Option<U64>,
}

/// The result of `eth_feeHistory`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeHistoryResult {
    /// The oldest block in the range
    pub oldest_block: U64,
    /// Base fees per gas, including the block after the range
    pub base_fee_per_gas: Vec<U256>,
    /// Ratios of gas used to gas limit
    pub gas_used_ratio: Vec<f64>,
    /// Requested reward percentiles per block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<Vec<Vec<U256>>>,
}

/// Options of `eth_getLogs`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilterOptions {
    /// First block of the range
    pub from_block: BlockSpec,
    /// Last block of the range
    pub to_block: BlockSpec,
    /// Emitting addresses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Vec<Address>>,
    /// Topic filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<Option<Vec<B256>>>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_receipt() -> anyhow::Result<()> {
        let receipt: RpcReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": B256::ZERO,
            "transactionIndex": "0x1",
            "blockHash": B256::ZERO,
            "blockNumber": "0x10",
            "from": Address::ZERO,
            "to": null,
            "contractAddress": Address::ZERO,
            "cumulativeGasUsed": "0x5208",
            "gasUsed": "0x5208",
            "logs": [],
            "logsBloom": Bloom::ZERO,
            "status": "0x1",
            "type": "0x2"
        }))?;

        assert_eq!(receipt.block_number, U64::from(16));
        assert_eq!(receipt.status, Some(U64::from(1)));
        assert_eq!(receipt.effective_gas_price, None);
        assert_eq!(receipt.transaction_type, Some(U64::from(2)));

        Ok(())
    }
}
