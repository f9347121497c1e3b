use devnet_hardfork::Hardfork;
use devnet_primitives::ONE_ETHER;

/// Retrieves the miner reward for the provided hardfork. Post-merge blocks
/// have no reward.
pub fn miner_reward(hardfork: Hardfork) -> Option<u128> {
    match hardfork {
        Hardfork::Frontier
        | Hardfork::Homestead
        | Hardfork::DaoFork
        | Hardfork::Tangerine
        | Hardfork::SpuriousDragon => Some(5 * ONE_ETHER),
        Hardfork::Byzantium => Some(3 * ONE_ETHER),
        Hardfork::Constantinople
        | Hardfork::Petersburg
        | Hardfork::Istanbul
        | Hardfork::MuirGlacier
        | Hardfork::Berlin
        | Hardfork::London
        | Hardfork::ArrowGlacier
        | Hardfork::GrayGlacier => Some(2 * ONE_ETHER),
        Hardfork::Merge | Hardfork::Shanghai | Hardfork::Cancun | Hardfork::Prague => None,
    }
}
