use devnet_block_api::Block as _;
use devnet_node::{
    HeaderOverrides, NodeData,
    test_utils::{NodeTestFixture, TEST_TIMESTAMP, one_ether},
    time::MockTime,
};
use devnet_primitives::{Address, B256, U256};
use devnet_state_api::StateDebug as _;

#[derive(Debug, PartialEq, Eq)]
struct ObservableState {
    last_block_hash: B256,
    state_root: B256,
    pending_transactions: Vec<B256>,
    next_block_base_fee_per_gas: Option<u128>,
}

fn observe(node_data: &mut NodeData<MockTime>) -> anyhow::Result<ObservableState> {
    let last_block_hash = *node_data.last_block()?.block_hash();
    let state_root = node_data.execute_in_block_context(None, |context| context.state.state_root())??;
    let pending_transactions = node_data
        .pending_transactions()
        .map(|transaction| *transaction.transaction_hash())
        .collect();
    let next_block_base_fee_per_gas = node_data.next_block_base_fee_per_gas()?;

    Ok(ObservableState {
        last_block_hash,
        state_root,
        pending_transactions,
        next_block_base_fee_per_gas,
    })
}

#[test]
fn revert_restores_observable_state() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;
    fixture.node_data.set_auto_mining(false);
    fixture.send_transfer(0)?;

    let before = observe(&mut fixture.node_data)?;
    let snapshot_id = fixture.node_data.make_snapshot();

    fixture.send_transfer(1)?;
    fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;
    fixture
        .node_data
        .set_balance(Address::repeat_byte(0xbb), one_ether())?;
    fixture.node_data.set_next_block_base_fee_per_gas(7)?;

    assert_ne!(observe(&mut fixture.node_data)?, before);

    assert!(fixture.node_data.revert_to_snapshot(snapshot_id));
    assert_eq!(observe(&mut fixture.node_data)?, before);
    assert_eq!(
        fixture
            .node_data
            .balance(Address::repeat_byte(0xbb), None)?,
        U256::ZERO
    );

    Ok(())
}

#[test]
fn snapshots_are_single_use() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let first = fixture.node_data.make_snapshot();
    fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;
    let second = fixture.node_data.make_snapshot();

    assert!(fixture.node_data.revert_to_snapshot(first));
    assert_eq!(fixture.node_data.last_block_number(), 0);

    assert!(!fixture.node_data.revert_to_snapshot(first));
    // Later snapshots are discarded as well
    assert!(!fixture.node_data.revert_to_snapshot(second));

    Ok(())
}

#[test]
fn unknown_snapshot_is_rejected() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    assert!(!fixture.node_data.revert_to_snapshot(42));

    Ok(())
}

#[test]
fn revert_rewinds_the_clock() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let snapshot_id = fixture.node_data.make_snapshot();

    fixture.timer.add_seconds(10);
    let mined = fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;
    assert_eq!(mined.block.header().timestamp, TEST_TIMESTAMP + 10);

    assert!(fixture.node_data.revert_to_snapshot(snapshot_id));

    let mined = fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;
    assert_eq!(mined.block.header().number, 1);
    assert_eq!(mined.block.header().timestamp, TEST_TIMESTAMP + 1);

    Ok(())
}

#[test]
fn snapshot_ids_increase() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let first = fixture.node_data.make_snapshot();
    let second = fixture.node_data.make_snapshot();

    assert!(second > first);

    Ok(())
}
