use devnet_mem_pool::MemPool;
use devnet_primitives::Address;
use devnet_state_api::irregular::IrregularState;
use devnet_utils::random::RandomHashGenerator;
use rpds::HashTrieMapSync;

use crate::data::StateId;

pub(crate) struct Snapshot {
    pub block_number: u64,
    pub block_number_to_state_id: HashTrieMapSync<u64, StateId>,
    pub block_time_offset_seconds: i64,
    pub coinbase: Address,
    pub irregular_state: IrregularState,
    pub mem_pool: MemPool,
    pub next_block_base_fee_per_gas: Option<u128>,
    pub next_block_timestamp: Option<u64>,
    pub parent_beacon_block_root_generator: RandomHashGenerator,
    pub prev_randao_generator: RandomHashGenerator,
    /// Seconds since the UNIX epoch, according to the node's timer
    pub time: u64,
}
