use devnet_primitives::{Address, B256, U64, U256};
use serde::{Serialize, Serializer};

use crate::types::LogFilterOptions;

/// A block identifier used as a request parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockSpec {
    /// A specific block number
    Number(u64),
    /// The remote's latest block
    Latest,
}

impl Serialize for BlockSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BlockSpec::Number(number) => U64::from(*number).serialize(serializer),
            BlockSpec::Latest => serializer.serialize_str("latest"),
        }
    }
}

/// Methods supported by the remote client.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum RequestMethod {
    /// `eth_blockNumber`
    #[serde(rename = "eth_blockNumber", with = "empty_params")]
    BlockNumber(()),
    /// `eth_chainId`
    #[serde(rename = "eth_chainId", with = "empty_params")]
    ChainId(()),
    /// `eth_feeHistory`
    #[serde(rename = "eth_feeHistory")]
    FeeHistory(U256, BlockSpec, Vec<f64>),
    /// `eth_getBalance`
    #[serde(rename = "eth_getBalance")]
    GetBalance(Address, BlockSpec),
    /// `eth_getBlockByHash`
    #[serde(rename = "eth_getBlockByHash")]
    GetBlockByHash(B256, bool),
    /// `eth_getBlockByNumber`
    #[serde(rename = "eth_getBlockByNumber")]
    GetBlockByNumber(BlockSpec, bool),
    /// `eth_getCode`
    #[serde(rename = "eth_getCode")]
    GetCode(Address, BlockSpec),
    /// `eth_getLogs`
    #[serde(rename = "eth_getLogs", with = "single_param")]
    GetLogs(LogFilterOptions),
    /// `eth_getStorageAt`
    #[serde(rename = "eth_getStorageAt")]
    GetStorageAt(Address, U256, BlockSpec),
    /// `eth_getTransactionCount`
    #[serde(rename = "eth_getTransactionCount")]
    GetTransactionCount(Address, BlockSpec),
    /// `eth_getTransactionReceipt`
    #[serde(rename = "eth_getTransactionReceipt", with = "single_param")]
    GetTransactionReceipt(B256),
    /// `net_version`
    #[serde(rename = "net_version", with = "empty_params")]
    NetVersion(()),
}

impl RequestMethod {
    /// The name of the method.
    pub fn name(&self) -> &'static str {
        match self {
            RequestMethod::BlockNumber(_) => "eth_blockNumber",
            RequestMethod::ChainId(_) => "eth_chainId",
            RequestMethod::FeeHistory(..) => "eth_feeHistory",
            RequestMethod::GetBalance(..) => "eth_getBalance",
            RequestMethod::GetBlockByHash(..) => "eth_getBlockByHash",
            RequestMethod::GetBlockByNumber(..) => "eth_getBlockByNumber",
            RequestMethod::GetCode(..) => "eth_getCode",
            RequestMethod::GetLogs(_) => "eth_getLogs",
            RequestMethod::GetStorageAt(..) => "eth_getStorageAt",
            RequestMethod::GetTransactionCount(..) => "eth_getTransactionCount",
            RequestMethod::GetTransactionReceipt(_) => "eth_getTransactionReceipt",
            RequestMethod::NetVersion(_) => "net_version",
        }
    }

    /// The block number the result is pinned to, if the result of the
    /// request can only change when that block changes.
    pub fn pinned_block_number(&self) -> Option<u64> {
        let block_spec = match self {
            RequestMethod::FeeHistory(_, block_spec, _)
            | RequestMethod::GetBalance(_, block_spec)
            | RequestMethod::GetBlockByNumber(block_spec, _)
            | RequestMethod::GetCode(_, block_spec)
            | RequestMethod::GetStorageAt(_, _, block_spec)
            | RequestMethod::GetTransactionCount(_, block_spec) => block_spec,
            RequestMethod::GetLogs(LogFilterOptions { to_block, .. }) => to_block,
            RequestMethod::BlockNumber(())
            | RequestMethod::ChainId(())
            | RequestMethod::GetBlockByHash(..)
            | RequestMethod::GetTransactionReceipt(_)
            | RequestMethod::NetVersion(()) => return None,
        };

        match block_spec {
            BlockSpec::Number(number) => Some(*number),
            BlockSpec::Latest => None,
        }
    }
}

mod empty_params {
    use serde::{Serializer, ser::SerializeSeq as _};

    pub fn serialize<S: Serializer>(_value: &(), serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_seq(Some(0))?.end()
    }
}

mod single_param {
    use serde::{Serialize, Serializer, ser::SerializeSeq as _};

    pub fn serialize<S: Serializer, T: Serialize>(
        value: &T,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(1))?;
        seq.serialize_element(value)?;
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_params_as_sequences() -> anyhow::Result<()> {
        let value = serde_json::to_value(RequestMethod::ChainId(()))?;
        assert_eq!(value, json!({ "method": "eth_chainId", "params": [] }));

        let address = Address::ZERO;
        let value =
            serde_json::to_value(RequestMethod::GetBalance(address, BlockSpec::Number(16)))?;
        assert_eq!(
            value,
            json!({ "method": "eth_getBalance", "params": [address, "0x10"] })
        );

        let hash = B256::ZERO;
        let value = serde_json::to_value(RequestMethod::GetTransactionReceipt(hash))?;
        assert_eq!(
            value,
            json!({ "method": "eth_getTransactionReceipt", "params": [hash] })
        );

        Ok(())
    }

    #[test]
    fn pinned_block_numbers() {
        assert_eq!(
            RequestMethod::GetCode(Address::ZERO, BlockSpec::Number(5)).pinned_block_number(),
            Some(5)
        );
        assert_eq!(
            RequestMethod::GetCode(Address::ZERO, BlockSpec::Latest).pinned_block_number(),
            None
        );
        assert_eq!(RequestMethod::ChainId(()).pinned_block_number(), None);
    }
}
