//! Out-of-band state modifications

use std::collections::{BTreeMap, btree_map};

use devnet_primitives::B256;

use crate::StateDiff;

/// An override of the state at a block number, caused by a direct
/// modification rather than by mining.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateOverride {
    /// The changes made to the state
    pub diff: StateDiff,
    /// The state root after the changes
    pub state_root: B256,
}

impl StateOverride {
    /// Constructs an instance without changes for the provided state root.
    pub fn with_state_root(state_root: B256) -> Self {
        Self {
            diff: StateDiff::default(),
            state_root,
        }
    }
}

/// Container for state overrides that are applied on top of the state of
/// the block with the same number.
#[derive(Clone, Debug, Default)]
pub struct IrregularState {
    block_number_to_override: BTreeMap<u64, StateOverride>,
}

impl IrregularState {
    /// Gets an entry to the state override at the specified block number.
    pub fn state_override_at_block_number(
        &mut self,
        block_number: u64,
    ) -> btree_map::Entry<'_, u64, StateOverride> {
        self.block_number_to_override.entry(block_number)
    }

    /// Retrieves the state overrides, ordered by block number.
    pub fn state_overrides(&self) -> &BTreeMap<u64, StateOverride> {
        &self.block_number_to_override
    }
}
