use devnet_block_api::BlockHeader;
use devnet_executor::{BlockEnv, ExecutionFlags, ResultAndState, TransactionExecutor};
use devnet_hardfork::Hardfork;
use devnet_state_api::{
    DynState, State, StateError,
    r#override::{StateOverrides, StateRefOverrider},
};
use devnet_transaction::Signed;

use crate::error::NodeError;

pub(super) struct RunCallArgs<'a> {
    pub executor: &'a dyn TransactionExecutor,
    pub header: &'a BlockHeader,
    pub state: &'a dyn DynState,
    pub state_overrides: &'a StateOverrides,
    pub hardfork: Hardfork,
    pub chain_id: u64,
    pub allow_unlimited_contract_size: bool,
    pub transaction: &'a Signed,
}

/// Executes a transaction as a call on top of the block's state, without
/// committing its changes. Nonce, balance and base fee checks are relaxed.
pub(super) fn run_call(args: RunCallArgs<'_>) -> Result<ResultAndState, NodeError> {
    let RunCallArgs {
        executor,
        header,
        state,
        state_overrides,
        hardfork,
        chain_id,
        allow_unlimited_contract_size,
        transaction,
    } = args;

    let block = BlockEnv {
        number: header.number,
        beneficiary: header.beneficiary,
        timestamp: header.timestamp,
        gas_limit: header.gas_limit,
        base_fee: header.base_fee_per_gas.map(|_| 0),
        prevrandao: (hardfork >= Hardfork::Merge).then_some(header.mix_hash),
        difficulty: header.difficulty,
        hardfork,
        chain_id,
    };

    let flags = ExecutionFlags {
        skip_balance_nonce_checks: true,
        disable_base_fee_check: true,
        allow_unlimited_contract_size,
    };

    let state = StateRefOverrider::new(state_overrides, state);
    let state: &dyn State<Error = StateError> = &state;

    let result = executor.run(state, &block, transaction, flags)?;

    Ok(result)
}
