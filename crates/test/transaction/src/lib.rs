//! Test utilities for transaction-related tests.
#![warn(missing_docs)]

use devnet_hardfork::Hardfork;
use devnet_primitives::{Address, Bytes, TxKind, U256};
use devnet_transaction::{CreationError, Signed, request, validate};

/// Chain ID used by dummy transactions.
pub const DUMMY_CHAIN_ID: u64 = 123;

/// Creates a dummy EIP-155 transaction.
pub fn dummy_eip155_transaction(caller: Address, nonce: u64) -> Result<Signed, CreationError> {
    dummy_eip155_transaction_with_price(caller, nonce, 0)
}

/// Creates a dummy EIP-155 transaction with the provided gas price.
pub fn dummy_eip155_transaction_with_price(
    caller: Address,
    nonce: u64,
    gas_price: u128,
) -> Result<Signed, CreationError> {
    dummy_eip155_transaction_with_price_limit_and_value(caller, nonce, gas_price, 30_000, U256::ZERO)
}

/// Creates a dummy EIP-155 transaction with the provided gas limit.
pub fn dummy_eip155_transaction_with_limit(
    caller: Address,
    nonce: u64,
    gas_limit: u64,
) -> Result<Signed, CreationError> {
    dummy_eip155_transaction_with_price_limit_and_value(caller, nonce, 0, gas_limit, U256::ZERO)
}

/// Creates a dummy EIP-155 transaction with the provided gas price, gas limit,
/// and value.
pub fn dummy_eip155_transaction_with_price_limit_and_value(
    caller: Address,
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    value: U256,
) -> Result<Signed, CreationError> {
    let request = request::Eip155 {
        nonce,
        gas_price,
        gas_limit,
        kind: TxKind::Call(Address::random()),
        value,
        input: Bytes::new(),
        chain_id: DUMMY_CHAIN_ID,
    };

    validate(request.fake_sign(caller).into(), Hardfork::default())
}

/// Creates a dummy EIP-1559 transaction with the provided max fee and max
/// priority fee per gas.
pub fn dummy_eip1559_transaction(
    caller: Address,
    nonce: u64,
    max_fee_per_gas: u128,
    max_priority_fee_per_gas: u128,
) -> Result<Signed, CreationError> {
    let request = request::Eip1559 {
        chain_id: DUMMY_CHAIN_ID,
        nonce,
        max_priority_fee_per_gas,
        max_fee_per_gas,
        gas_limit: 30_000,
        kind: TxKind::Call(Address::random()),
        value: U256::ZERO,
        input: Bytes::new(),
        access_list: Vec::new(),
    };

    validate(request.fake_sign(caller).into(), Hardfork::default())
}
