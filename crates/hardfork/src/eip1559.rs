pub use alloy_eips::eip1559::{BaseFeeParams as ConstantBaseFeeParams, INITIAL_BASE_FEE};

use crate::Hardfork;

/// Possible activation points of different base fee parameters.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum BaseFeeActivation {
    /// Block number
    BlockNumber(u64),
    /// Chain hardfork
    Hardfork(Hardfork),
}

/// Constant or hardfork-dependent EIP-1559 parameters.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BaseFeeParams {
    /// The same parameters for every block.
    Constant(ConstantBaseFeeParams),
    /// Parameters that change at the listed activation points.
    Variable(Vec<(BaseFeeActivation, ConstantBaseFeeParams)>),
}

impl BaseFeeParams {
    /// Ethereum mainnet parameters.
    pub const fn ethereum() -> Self {
        Self::Constant(ConstantBaseFeeParams::ethereum())
    }

    /// Selects the parameters that apply to a block with the provided number
    /// and hardfork, if any.
    pub fn at_condition(
        &self,
        hardfork: Hardfork,
        block_number: u64,
    ) -> Option<&ConstantBaseFeeParams> {
        match self {
            Self::Constant(params) => Some(params),
            Self::Variable(activations) => activations
                .iter()
                .rev()
                .find(|(activation, _)| match activation {
                    BaseFeeActivation::BlockNumber(number) => *number <= block_number,
                    BaseFeeActivation::Hardfork(activation) => *activation <= hardfork,
                })
                .map(|(_, params)| params),
        }
    }
}

impl Default for BaseFeeParams {
    fn default() -> Self {
        Self::ethereum()
    }
}

impl From<ConstantBaseFeeParams> for BaseFeeParams {
    fn from(params: ConstantBaseFeeParams) -> Self {
        Self::Constant(params)
    }
}
