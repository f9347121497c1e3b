use core::fmt;

use devnet_primitives::B256;
use serde::{Deserialize, Serialize};

/// Identifies a block by number, hash, or tag.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockSpec {
    /// Block number
    Number(u64),
    /// Block hash
    Hash(B256),
    /// The genesis block
    Earliest,
    /// The most recent block
    Latest,
    /// The block that would be mined next
    Pending,
    /// The most recent safe block, from the merge onwards
    Safe,
    /// The most recent finalized block, from the merge onwards
    Finalized,
}

impl BlockSpec {
    /// Constructs a block spec for the provided block number.
    pub fn number(number: u64) -> Self {
        Self::Number(number)
    }

    /// Whether the block spec refers to the pending block.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for BlockSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockSpec::Number(number) => write!(f, "{number}"),
            BlockSpec::Hash(hash) => write!(f, "{hash}"),
            BlockSpec::Earliest => write!(f, "earliest"),
            BlockSpec::Latest => write!(f, "latest"),
            BlockSpec::Pending => write!(f, "pending"),
            BlockSpec::Safe => write!(f, "safe"),
            BlockSpec::Finalized => write!(f, "finalized"),
        }
    }
}
