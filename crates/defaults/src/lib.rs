#![warn(missing_docs)]

//! Default values used across the devnet crates.

use std::time::Duration;

/// The default block gas limit.
pub const BLOCK_GAS_LIMIT: u64 = 30_000_000;

/// The default chain id.
pub const CHAIN_ID: u64 = 31337;

/// Seed for the generator of `prevrandao` values.
pub const MIX_HASH_SEED: &str = "randomMixHashSeed";

/// Seed for the generator of parent beacon block roots.
pub const BEACON_ROOT_SEED: &str = "beaconRootSeed";

/// Seed for the generator of synthetic state roots of forked states.
pub const STATE_ROOT_HASH_SEED: &str = "seed";

/// Time a polled filter stays alive without being polled.
pub const FILTER_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Number of blocks behind the remote tip after which remote data is
/// considered immutable and safe to cache.
pub const SAFE_BLOCK_DEPTH: u64 = 128;

/// The number of blocks below which `mine_and_commit_blocks` mines every
/// block instead of reserving the range.
pub const MINIMUM_RESERVABLE_BLOCKS: u64 = 6;

/// The default maximum number of block states kept in memory.
pub const MAX_CACHED_STATES: usize = 100_000;
