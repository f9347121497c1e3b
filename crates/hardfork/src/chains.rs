use std::sync::OnceLock;

use devnet_primitives::HashMap;

use crate::{
    Activation, Activations, ForkCondition, Hardfork,
    eip1559::BaseFeeParams,
};

/// Mainnet chain ID
pub const MAINNET_CHAIN_ID: u64 = 0x1;
/// Holesky chain ID
pub const HOLESKY_CHAIN_ID: u64 = 0x4268;
/// Hoodi chain ID
pub const HOODI_CHAIN_ID: u64 = 0x88bb0;
/// Sepolia chain ID
pub const SEPOLIA_CHAIN_ID: u64 = 0xaa36a7;

/// The configuration of a known chain.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    /// Chain name
    pub name: String,
    /// Hardfork activations for the chain
    pub hardfork_activations: Activations,
    /// Base fee parameters for the chain
    pub base_fee_params: BaseFeeParams,
}

const fn at_block(block_number: u64, hardfork: Hardfork) -> Activation {
    Activation {
        condition: ForkCondition::Block(block_number),
        hardfork,
    }
}

const fn at_timestamp(timestamp: u64, hardfork: Hardfork) -> Activation {
    Activation {
        condition: ForkCondition::Timestamp(timestamp),
        hardfork,
    }
}

const MAINNET_HARDFORKS: &[Activation] = &[
    at_block(0, Hardfork::Frontier),
    at_block(1_150_000, Hardfork::Homestead),
    at_block(1_920_000, Hardfork::DaoFork),
    at_block(2_463_000, Hardfork::Tangerine),
    at_block(2_675_000, Hardfork::SpuriousDragon),
    at_block(4_370_000, Hardfork::Byzantium),
    at_block(7_280_000, Hardfork::Constantinople),
    at_block(7_280_000, Hardfork::Petersburg),
    at_block(9_069_000, Hardfork::Istanbul),
    at_block(9_200_000, Hardfork::MuirGlacier),
    at_block(12_244_000, Hardfork::Berlin),
    at_block(12_965_000, Hardfork::London),
    at_block(13_773_000, Hardfork::ArrowGlacier),
    at_block(15_050_000, Hardfork::GrayGlacier),
    at_block(15_537_394, Hardfork::Merge),
    at_block(17_034_870, Hardfork::Shanghai),
    at_block(19_426_589, Hardfork::Cancun),
    at_timestamp(1_746_612_311, Hardfork::Prague),
];

const HOLESKY_HARDFORKS: &[Activation] = &[
    at_block(0, Hardfork::Merge),
    at_block(6_698, Hardfork::Shanghai),
    at_block(894_733, Hardfork::Cancun),
    at_timestamp(1_740_434_112, Hardfork::Prague),
];

const HOODI_HARDFORKS: &[Activation] = &[
    at_block(0, Hardfork::Cancun),
    at_timestamp(1_742_999_832, Hardfork::Prague),
];

const SEPOLIA_HARDFORKS: &[Activation] = &[
    at_block(0, Hardfork::London),
    at_block(1_450_409, Hardfork::Merge),
    at_block(2_990_908, Hardfork::Shanghai),
    at_block(5_187_023, Hardfork::Cancun),
    at_timestamp(1_741_159_776, Hardfork::Prague),
];

fn chain_configs() -> &'static HashMap<u64, ChainConfig> {
    static CONFIGS: OnceLock<HashMap<u64, ChainConfig>> = OnceLock::new();

    CONFIGS.get_or_init(|| {
        [
            (MAINNET_CHAIN_ID, "Mainnet", MAINNET_HARDFORKS),
            (HOLESKY_CHAIN_ID, "Holesky", HOLESKY_HARDFORKS),
            (HOODI_CHAIN_ID, "Hoodi", HOODI_HARDFORKS),
            (SEPOLIA_CHAIN_ID, "Sepolia", SEPOLIA_HARDFORKS),
        ]
        .into_iter()
        .map(|(chain_id, name, hardforks)| {
            let config = ChainConfig {
                name: name.to_owned(),
                hardfork_activations: hardforks.into(),
                base_fee_params: BaseFeeParams::ethereum(),
            };
            (chain_id, config)
        })
        .collect()
    })
}

/// Returns the configuration of the chain with the provided ID, if it is
/// known.
pub fn chain_config(chain_id: u64) -> Option<&'static ChainConfig> {
    chain_configs().get(&chain_id)
}

/// Returns the name of the chain with the provided ID, if it is known.
pub fn chain_name(chain_id: u64) -> Option<&'static str> {
    chain_config(chain_id).map(|config| config.name.as_str())
}

/// Returns the hardfork activations of the chain with the provided ID, if it
/// is known.
pub fn chain_hardfork_activations(chain_id: u64) -> Option<&'static Activations> {
    chain_config(chain_id).map(|config| &config.hardfork_activations)
}

/// Returns the base fee parameters of the chain with the provided ID,
/// defaulting to mainnet's.
pub fn chain_base_fee_params(chain_id: u64) -> &'static BaseFeeParams {
    static MAINNET: BaseFeeParams = BaseFeeParams::ethereum();

    chain_config(chain_id).map_or(&MAINNET, |config| &config.base_fee_params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_schedule() {
        let activations =
            chain_hardfork_activations(MAINNET_CHAIN_ID).expect("mainnet is a known chain");

        assert_eq!(
            activations.hardfork_at_block(12_964_999, 0),
            Some(Hardfork::Berlin)
        );
        assert_eq!(
            activations.hardfork_at_block(12_965_000, 0),
            Some(Hardfork::London)
        );
        assert_eq!(
            activations.hardfork_at_block(22_000_000, 1_746_612_311),
            Some(Hardfork::Prague)
        );
    }

    #[test]
    fn unknown_chain() {
        assert!(chain_config(31337).is_none());
        assert_eq!(chain_name(SEPOLIA_CHAIN_ID), Some("Sepolia"));
        assert_eq!(chain_base_fee_params(31337), &BaseFeeParams::ethereum());
    }
}
