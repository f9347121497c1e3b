use std::sync::Arc;

use devnet_executor::{ExecutionResult, Output};
use devnet_node::{
    AccountOverride, BlockSpec, CallRequest, HeaderOverrides, NodeError, StateOverrides,
    StorageOverride,
    test_utils::{GasThresholdExecutor, NodeTestFixture, create_test_config, one_ether},
};
use devnet_primitives::{Address, Bytes, HashMap, U256, bytes};

fn fixture_with_threshold(minimum_gas_limit: u64) -> anyhow::Result<NodeTestFixture> {
    NodeTestFixture::with_executor(
        create_test_config(),
        Arc::new(GasThresholdExecutor { minimum_gas_limit }),
    )
}

#[test]
fn estimate_is_sufficient_and_tight() -> anyhow::Result<()> {
    const MINIMUM_GAS_LIMIT: u64 = 50_000;

    let mut fixture = fixture_with_threshold(MINIMUM_GAS_LIMIT)?;
    let request = CallRequest {
        from: Some(fixture.owner),
        to: Some(Address::repeat_byte(0xaa)),
        ..CallRequest::default()
    };

    let estimation = fixture
        .node_data
        .estimate_gas(request.clone(), &BlockSpec::Latest)?
        .estimation;

    assert!(estimation >= MINIMUM_GAS_LIMIT);
    assert!(estimation - MINIMUM_GAS_LIMIT <= 500, "{estimation}");

    let result = fixture.node_data.run_call(
        CallRequest {
            gas: Some(estimation),
            ..request
        },
        &BlockSpec::Latest,
        &StateOverrides::default(),
    )?;
    assert!(result.execution_result.is_success());

    Ok(())
}

#[test]
fn estimate_of_plain_transfer_is_intrinsic_cost() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let result = fixture.node_data.estimate_gas(
        CallRequest {
            from: Some(fixture.owner),
            to: Some(Address::repeat_byte(0xaa)),
            value: Some(U256::from(1)),
            ..CallRequest::default()
        },
        &BlockSpec::Latest,
    )?;

    assert_eq!(result.estimation, 21_000);
    assert!(!result.traces.is_empty());

    Ok(())
}

#[test]
fn estimate_fails_if_block_gas_limit_is_insufficient() -> anyhow::Result<()> {
    let mut fixture = fixture_with_threshold(40_000_000)?;

    let result = fixture.node_data.estimate_gas(
        CallRequest {
            to: Some(Address::repeat_byte(0xaa)),
            ..CallRequest::default()
        },
        &BlockSpec::Latest,
    );

    assert!(matches!(
        result,
        Err(NodeError::EstimateGasTransactionFailure(_))
    ));

    Ok(())
}

#[test]
fn estimate_on_pending_block_includes_pooled_transactions() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;
    fixture.node_data.set_auto_mining(false);
    fixture.send_transfer(0)?;

    let result = fixture.node_data.estimate_gas(
        CallRequest {
            from: Some(fixture.owner),
            to: Some(Address::repeat_byte(0xaa)),
            ..CallRequest::default()
        },
        &BlockSpec::Pending,
    )?;

    assert_eq!(result.estimation, 21_000);
    assert_eq!(fixture.node_data.last_block_number(), 0);

    Ok(())
}

#[test]
fn call_applies_nonce_override() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let overrides = StateOverrides::new(HashMap::from_iter([(
        fixture.owner,
        AccountOverride {
            nonce: Some(7),
            ..AccountOverride::default()
        },
    )]));

    let result = fixture.node_data.run_call(
        CallRequest {
            from: Some(fixture.owner),
            data: Some(bytes!("6080604052")),
            ..CallRequest::default()
        },
        &BlockSpec::Latest,
        &overrides,
    )?;

    let ExecutionResult::Success {
        output: Output::Create(_, address),
        ..
    } = result.execution_result
    else {
        anyhow::bail!("expected successful creation");
    };
    assert_eq!(address, Some(fixture.owner.create(7)));

    // The override is not persisted
    assert_eq!(fixture.node_data.nonce(&fixture.owner, None)?, 0);

    Ok(())
}

#[test]
fn call_does_not_require_funds() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;
    let sender = Address::repeat_byte(0x42);

    let result = fixture.node_data.run_call(
        CallRequest {
            from: Some(sender),
            to: Some(Address::repeat_byte(0xaa)),
            value: Some(one_ether()),
            ..CallRequest::default()
        },
        &BlockSpec::Latest,
        &StateOverrides::default(),
    )?;

    assert!(result.execution_result.is_success());
    assert_eq!(fixture.node_data.balance(sender, None)?, U256::ZERO);

    Ok(())
}

#[test]
fn call_on_historical_block() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;
    fixture.send_transfer(0)?;
    fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;

    let recipient = Address::repeat_byte(0xaa);
    assert_eq!(
        fixture
            .node_data
            .balance(recipient, Some(&BlockSpec::Number(0)))?,
        U256::ZERO
    );
    assert_eq!(fixture.node_data.balance(recipient, None)?, U256::from(1));

    let result = fixture.node_data.run_call(
        CallRequest {
            from: Some(fixture.owner),
            to: Some(recipient),
            ..CallRequest::default()
        },
        &BlockSpec::Number(0),
        &StateOverrides::default(),
    )?;
    assert!(result.execution_result.is_success());

    Ok(())
}

#[test]
fn call_on_unknown_block_fails() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let result = fixture.node_data.run_call(
        CallRequest::default(),
        &BlockSpec::Number(100),
        &StateOverrides::default(),
    );

    assert!(matches!(
        result,
        Err(NodeError::InvalidBlockNumberOrHash {
            latest_block_number: 0,
            ..
        })
    ));

    Ok(())
}

#[test]
fn storage_override_replaces_storage() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;
    let contract = Address::repeat_byte(0xcc);

    fixture
        .node_data
        .set_account_storage_slot(contract, U256::from(1), U256::from(10))?;

    let overrides = StateOverrides::new(HashMap::from_iter([(
        contract,
        AccountOverride {
            code: Some(Bytes::from_static(&[0x00])),
            storage: Some(StorageOverride::Full(HashMap::from_iter([(
                U256::from(2),
                U256::from(20),
            )]))),
            ..AccountOverride::default()
        },
    )]));

    let result = fixture.node_data.run_call(
        CallRequest {
            to: Some(contract),
            ..CallRequest::default()
        },
        &BlockSpec::Latest,
        &overrides,
    )?;
    assert!(result.execution_result.is_success());

    // Direct modifications remain visible outside of calls
    assert_eq!(
        fixture
            .node_data
            .storage_at(contract, U256::from(1), None)?,
        U256::from(10)
    );

    Ok(())
}
