use core::ops::Bound;
use std::collections::BTreeMap;

use devnet_block_storage::ReservableSparseBlockStorage;
use devnet_state_api::{StateCommit, StateDiff, irregular::StateOverride};

/// Computes the state at a given block by applying the state diffs of local
/// blocks, combined with the irregular state overrides of local blocks in the
/// range `first_local_block_number..=last_local_block_number`.
pub fn compute_state_at_block(
    state: &mut dyn StateCommit,
    local_storage: &ReservableSparseBlockStorage,
    first_local_block_number: u64,
    last_local_block_number: u64,
    state_overrides: &BTreeMap<u64, StateOverride>,
) {
    let state_diffs = local_storage
        .state_diffs_until_block(last_local_block_number)
        .unwrap_or_default();

    let mut overridden_state_diffs: BTreeMap<u64, StateDiff> = state_diffs
        .iter()
        .map(|(block_number, state_diff)| (*block_number, state_diff.clone()))
        .collect();

    for (block_number, state_override) in state_overrides.range((
        Bound::Included(&first_local_block_number),
        Bound::Included(&last_local_block_number),
    )) {
        overridden_state_diffs
            .entry(*block_number)
            .and_modify(|state_diff| {
                state_diff.apply_diff(state_override.diff.as_inner().clone());
            })
            .or_insert_with(|| state_override.diff.clone());
    }

    for (_block_number, state_diff) in overridden_state_diffs {
        state.commit(state_diff.into());
    }
}
