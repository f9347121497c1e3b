use devnet_block_api::{Block as _, BlockHeader, SyncBlock};
use devnet_executor::{Trace, TransactionExecutor};
use devnet_hardfork::Hardfork;
use devnet_primitives::{Address, U256};
use devnet_state_api::{DynState, r#override::StateOverrides};
use itertools::Itertools;

use crate::{
    config::GasEstimationConfig,
    data::call::{self, RunCallArgs},
    error::NodeError,
    request::ResolvedRequest,
};

pub(super) struct CheckGasLimitArgs<'a> {
    pub executor: &'a dyn TransactionExecutor,
    pub header: &'a BlockHeader,
    pub state: &'a dyn DynState,
    pub state_overrides: &'a StateOverrides,
    pub hardfork: Hardfork,
    pub chain_id: u64,
    pub allow_unlimited_contract_size: bool,
    pub request: &'a ResolvedRequest,
    pub caller: Address,
}

/// Tests whether the request executes successfully with the provided gas
/// limit. Reverts and halts count as failures.
pub(super) fn check_gas_limit(
    args: &CheckGasLimitArgs<'_>,
    gas_limit: u64,
    traces: &mut Vec<Trace>,
) -> Result<bool, NodeError> {
    let transaction = args
        .request
        .clone()
        .with_gas_limit(gas_limit)
        .fake_sign(args.caller);

    let result = call::run_call(RunCallArgs {
        executor: args.executor,
        header: args.header,
        state: args.state,
        state_overrides: args.state_overrides,
        hardfork: args.hardfork,
        chain_id: args.chain_id,
        allow_unlimited_contract_size: args.allow_unlimited_contract_size,
        transaction: &transaction,
    })?;

    traces.push(result.trace);

    Ok(result.result.is_success())
}

/// Searches for a tight gas limit between a failing lower bound and a
/// succeeding upper bound. Returns a gas limit for which the request is known
/// to succeed.
pub(super) fn binary_search_estimation(
    args: &CheckGasLimitArgs<'_>,
    config: &GasEstimationConfig,
    lower_bound: u64,
    upper_bound: u64,
    traces: &mut Vec<Trace>,
) -> Result<u64, NodeError> {
    search_gas_limit(config, lower_bound, upper_bound, |gas_limit| {
        check_gas_limit(args, gas_limit, traces)
    })
}

fn search_gas_limit<ErrorT>(
    config: &GasEstimationConfig,
    mut lower_bound: u64,
    mut upper_bound: u64,
    mut succeeds: impl FnMut(u64) -> Result<bool, ErrorT>,
) -> Result<u64, ErrorT> {
    let mut iteration = 0;

    while upper_bound - lower_bound > config.tolerance_at(lower_bound)
        && iteration < config.max_iterations
    {
        let optimistic = lower_bound.saturating_mul(config.optimistic_multiplier);
        let mid = if iteration == 0 && optimistic < upper_bound {
            // The lower bound is close to the gas actually used, so start near it
            optimistic
        } else {
            lower_bound + (upper_bound - lower_bound) / 2
        };

        if succeeds(mid)? {
            upper_bound = mid;
        } else {
            lower_bound = mid + 1;
        }

        iteration += 1;
    }

    Ok(upper_bound)
}

/// Computes the effective miner rewards of the block at the provided
/// percentiles of its gas usage.
pub(super) fn compute_rewards(
    block: &dyn SyncBlock,
    reward_percentiles: &[f64],
) -> Result<Vec<U256>, NodeError> {
    if block.transactions().is_empty() {
        return Ok(reward_percentiles.iter().map(|_| U256::ZERO).collect());
    }

    let base_fee_per_gas = block.header().base_fee_per_gas.unwrap_or_default();

    let receipts = block
        .fetch_transaction_receipts()
        .map_err(devnet_blockchain::BlockchainError::from)?;

    let gas_used_and_effective_reward = block
        .transactions()
        .iter()
        .zip(receipts.iter())
        .map(|(transaction, receipt)| {
            let effective_reward = transaction
                .effective_miner_fee(Some(base_fee_per_gas))
                .unwrap_or_default();

            (receipt.gas_used, effective_reward)
        })
        .sorted_by_key(|(_, effective_reward)| *effective_reward)
        .collect::<Vec<_>>();

    let block_gas_used = block.header().gas_used as f64;

    Ok(reward_percentiles
        .iter()
        .map(|percentile| {
            let target_gas = ((percentile / 100.0) * block_gas_used) as u64;

            let mut gas_used = 0;
            for (gas_used_by_transaction, effective_reward) in &gas_used_and_effective_reward {
                gas_used += gas_used_by_transaction;
                if target_gas <= gas_used {
                    return U256::from(*effective_reward);
                }
            }

            gas_used_and_effective_reward
                .last()
                .map_or(U256::ZERO, |(_, reward)| U256::from(*reward))
        })
        .collect())
}

/// Gas used to gas limit ratio
pub(super) fn gas_used_ratio(gas_used: u64, gas_limit: u64) -> f64 {
    const FLOATS_PRECISION: f64 = 100_000.0;
    gas_used as f64 * FLOATS_PRECISION / gas_limit as f64 / FLOATS_PRECISION
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search(lower_bound: u64, upper_bound: u64, required: u64) -> (u64, Vec<u64>) {
        let mut probes = Vec::new();
        let estimate = search_gas_limit::<()>(
            &GasEstimationConfig::default(),
            lower_bound,
            upper_bound,
            |gas_limit| {
                probes.push(gas_limit);
                Ok(gas_limit >= required)
            },
        )
        .expect("predicate is infallible");

        (estimate, probes)
    }

    #[test]
    fn first_probe_is_optimistic() {
        let (estimate, probes) = search(21_000, 30_000_000, 50_000);

        assert_eq!(probes[0], 63_000);
        assert!(estimate >= 50_000);
        assert!(estimate - 50_000 <= 500);
    }

    #[test]
    fn estimate_always_succeeds() {
        for required in [21_001, 45_000, 123_456, 1_000_000, 29_999_999] {
            let (estimate, _) = search(21_000, 30_000_000, required);
            assert!(estimate >= required, "{estimate} < {required}");
        }
    }

    #[test]
    fn stops_within_tolerance() {
        let (estimate, probes) = search(21_000, 21_150, 21_100);

        assert!(probes.is_empty());
        assert_eq!(estimate, 21_150);
    }

    #[test]
    fn iterations_are_bounded() {
        let config = GasEstimationConfig {
            max_iterations: 3,
            tolerance: Vec::new(),
            ..GasEstimationConfig::default()
        };

        let mut probes = 0;
        let estimate = search_gas_limit::<()>(&config, 21_000, 30_000_000, |gas_limit| {
            probes += 1;
            Ok(gas_limit >= 1_000_000)
        })
        .expect("predicate is infallible");

        assert_eq!(probes, 3);
        assert!(estimate >= 1_000_000);
    }

    #[test]
    fn ratio() {
        assert_eq!(gas_used_ratio(15_000_000, 30_000_000), 0.5);
        assert_eq!(gas_used_ratio(0, 30_000_000), 0.0);
    }
}
