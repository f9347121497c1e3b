use devnet_block_api::Block as _;
use devnet_node::{
    BlockSpec, HeaderOverrides,
    test_utils::{NodeTestFixture, TEST_TIMESTAMP},
};

#[test]
fn reserved_blocks_are_spaced_by_interval() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let results = fixture.node_data.mine_and_commit_blocks(10, 60)?;

    // Two built blocks, a reservation, and a closing built block
    assert_eq!(results.len(), 3);
    assert_eq!(fixture.node_data.last_block_number(), 10);

    let first = results[0].block.header().timestamp;
    let last = fixture.node_data.last_block()?.header().timestamp;
    assert_eq!(last, first + 9 * 60);

    let reserved = fixture
        .node_data
        .block_by_number(5)?
        .ok_or_else(|| anyhow::anyhow!("reserved block exists"))?;
    assert_eq!(reserved.header().timestamp, first + 4 * 60);
    assert!(reserved.transactions().is_empty());

    Ok(())
}

#[test]
fn few_blocks_are_built_individually() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let results = fixture.node_data.mine_and_commit_blocks(4, 1)?;

    assert_eq!(results.len(), 4);
    assert_eq!(fixture.node_data.last_block_number(), 4);

    let timestamps: Vec<u64> = results
        .iter()
        .map(|result| result.block.header().timestamp)
        .collect();
    assert!(timestamps.windows(2).all(|pair| pair[1] == pair[0] + 1));

    Ok(())
}

#[test]
fn mining_zero_blocks_is_a_no_op() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    assert!(fixture.node_data.mine_and_commit_blocks(0, 1)?.is_empty());
    assert_eq!(fixture.node_data.last_block_number(), 0);

    Ok(())
}

#[test]
fn pending_transactions_spill_into_following_blocks() -> anyhow::Result<()> {
    let mut config = devnet_node::test_utils::create_test_config();
    config.mining.auto_mine = false;
    config.block_gas_limit = std::num::NonZeroU64::new(21_000).expect("non-zero");

    let mut fixture = NodeTestFixture::with_config(config)?;
    for nonce in 0..3 {
        fixture.send_transfer(nonce)?;
    }

    let results = fixture.node_data.mine_and_commit_blocks(3, 1)?;

    assert_eq!(results.len(), 3);
    assert!(
        results
            .iter()
            .all(|result| result.block.transactions().len() == 1)
    );
    assert_eq!(fixture.node_data.pending_transactions().count(), 0);

    Ok(())
}

#[test]
fn block_timestamps_follow_the_clock() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    fixture.timer.add_seconds(30);
    let result = fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;

    assert_eq!(result.block.header().timestamp, TEST_TIMESTAMP + 30);

    Ok(())
}

#[test]
fn timestamp_override_shifts_the_clock() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    fixture.node_data.mine_and_commit_block(HeaderOverrides {
        timestamp: Some(TEST_TIMESTAMP + 1_000),
        ..HeaderOverrides::default()
    })?;

    fixture.timer.add_seconds(5);
    let result = fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;

    assert_eq!(result.block.header().timestamp, TEST_TIMESTAMP + 1_005);

    Ok(())
}

#[test]
fn pending_block_is_not_committed() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;
    fixture.node_data.set_auto_mining(false);
    fixture.send_transfer(0)?;

    let pending = fixture.node_data.mine_pending_block()?;
    assert_eq!(pending.block.header().number, 1);
    assert_eq!(pending.block.transactions().len(), 1);

    assert_eq!(fixture.node_data.last_block_number(), 0);
    assert_eq!(fixture.node_data.pending_transactions().count(), 1);

    let pending_balance = fixture
        .node_data
        .balance(fixture.owner, Some(&BlockSpec::Pending))?;
    let latest_balance = fixture.node_data.balance(fixture.owner, None)?;
    assert!(pending_balance < latest_balance);

    Ok(())
}

#[test]
fn mined_blocks_link_to_their_parent() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let genesis_hash = *fixture.node_data.last_block()?.block_hash();
    let result = fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;

    assert_eq!(result.block.header().parent_hash, genesis_hash);
    assert_eq!(
        fixture
            .node_data
            .block_by_hash(result.block.block_hash())?
            .map(|block| *block.block_hash()),
        Some(*result.block.block_hash())
    );

    Ok(())
}
