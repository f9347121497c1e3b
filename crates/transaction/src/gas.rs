use devnet_hardfork::{Hardfork, Rules};
use devnet_primitives::TxKind;

use crate::{AccessListItem, Signed};

const TRANSACTION_BASE_COST: u64 = 21_000;
const CREATE_COST: u64 = 32_000;
const ZERO_BYTE_COST: u64 = 4;
const NON_ZERO_BYTE_COST_FRONTIER: u64 = 68;
const NON_ZERO_BYTE_COST_ISTANBUL: u64 = 16;
const ACCESS_LIST_ADDRESS_COST: u64 = 2_400;
const ACCESS_LIST_STORAGE_KEY_COST: u64 = 1_900;
const INITCODE_WORD_COST: u64 = 2;

/// Computes the intrinsic gas of a transaction with the provided shape.
pub fn intrinsic_gas(
    kind: TxKind,
    input: &[u8],
    access_list: &[AccessListItem],
    rules: &Rules,
) -> u64 {
    let zero_bytes = input.iter().filter(|byte| **byte == 0).count() as u64;
    let non_zero_bytes = input.len() as u64 - zero_bytes;
    let non_zero_byte_cost = if rules.eip2028 {
        NON_ZERO_BYTE_COST_ISTANBUL
    } else {
        NON_ZERO_BYTE_COST_FRONTIER
    };

    let mut gas = TRANSACTION_BASE_COST
        + zero_bytes * ZERO_BYTE_COST
        + non_zero_bytes * non_zero_byte_cost;

    if kind.is_create() {
        if rules.homestead {
            gas += CREATE_COST;
        }

        if rules.shanghai {
            gas += (input.len() as u64).div_ceil(32) * INITCODE_WORD_COST;
        }
    }

    let storage_keys: u64 = access_list
        .iter()
        .map(|item| item.storage_keys.len() as u64)
        .sum();
    gas + access_list.len() as u64 * ACCESS_LIST_ADDRESS_COST
        + storage_keys * ACCESS_LIST_STORAGE_KEY_COST
}

/// Computes the minimum gas a transaction needs before execution starts.
pub fn initial_cost(transaction: &Signed, hardfork: Hardfork) -> u64 {
    intrinsic_gas(
        transaction.kind(),
        transaction.data(),
        transaction.access_list().unwrap_or_default(),
        &Rules::new(hardfork),
    )
}
