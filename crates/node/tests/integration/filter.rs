use devnet_block_api::Block as _;
use devnet_node::{
    BlockSpec, FilterChanges, FilterCriteria, FilterKind, HeaderOverrides, NodeError,
    SubscriptionEventData, TransactionRequest, test_utils::NodeTestFixture,
};
use devnet_primitives::{Address, B256, Bytes, HashSet, U256, bytes, keccak256};

const EMITTER: Address = Address::repeat_byte(0xaa);

fn emit_log(fixture: &mut NodeTestFixture, data: Bytes) -> anyhow::Result<B256> {
    let result = fixture.node_data.send_transaction(TransactionRequest {
        from: fixture.owner,
        to: Some(EMITTER),
        data: Some(data),
        ..TransactionRequest::default()
    })?;

    Ok(result.transaction_hash)
}

fn criteria(addresses: &[Address], topics: Vec<Option<Vec<B256>>>) -> FilterCriteria {
    FilterCriteria {
        from_block: Some(BlockSpec::Earliest),
        addresses: addresses.iter().copied().collect::<HashSet<_>>(),
        topics,
        ..FilterCriteria::default()
    }
}

#[test]
fn logs_match_address_and_topic() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let data = bytes!("c0ffee");
    let topic = keccak256(&data);
    let transaction_hash = emit_log(&mut fixture, data.clone())?;

    let logs = fixture
        .node_data
        .logs(criteria(&[EMITTER], vec![Some(vec![topic])]))?;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].address, EMITTER);
    assert_eq!(logs[0].data.data, data);
    assert_eq!(logs[0].transaction_hash, transaction_hash);
    assert_eq!(logs[0].block_number, 1);

    // Wildcard topic
    let logs = fixture.node_data.logs(criteria(&[], vec![None]))?;
    assert_eq!(logs.len(), 1);

    let logs = fixture
        .node_data
        .logs(criteria(&[Address::repeat_byte(0xbb)], Vec::new()))?;
    assert!(logs.is_empty());

    let logs = fixture
        .node_data
        .logs(criteria(&[], vec![Some(vec![B256::repeat_byte(0x01)])]))?;
    assert!(logs.is_empty());

    Ok(())
}

#[test]
fn log_filter_collects_matching_logs() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let matching_data = bytes!("01");
    let matching = fixture.node_data.add_log_filter(
        FilterCriteria {
            topics: vec![Some(vec![keccak256(&matching_data)])],
            ..FilterCriteria::default()
        },
        false,
    )?;
    let other = fixture.node_data.add_log_filter(
        FilterCriteria {
            addresses: HashSet::from_iter([Address::repeat_byte(0xbb)]),
            ..FilterCriteria::default()
        },
        false,
    )?;

    emit_log(&mut fixture, matching_data)?;
    emit_log(&mut fixture, bytes!("02"))?;

    let FilterChanges::Logs(logs) = fixture.node_data.get_filter_changes(&matching)? else {
        anyhow::bail!("expected logs");
    };
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].block_number, 1);

    assert_eq!(
        fixture.node_data.get_filter_changes(&matching)?,
        FilterChanges::Logs(Vec::new())
    );
    assert_eq!(
        fixture.node_data.get_filter_changes(&other)?,
        FilterChanges::Logs(Vec::new())
    );

    // Filter logs are re-queried, including already polled ones
    assert_eq!(fixture.node_data.get_filter_logs(&matching)?.len(), 1);

    Ok(())
}

#[test]
fn log_subscription_receives_logs() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let filter_id = fixture.node_data.add_log_filter(
        FilterCriteria {
            addresses: HashSet::from_iter([EMITTER]),
            ..FilterCriteria::default()
        },
        true,
    )?;

    emit_log(&mut fixture, bytes!("beef"))?;

    let event = fixture.subscription_receiver.try_recv()?;
    assert_eq!(event.filter_id, filter_id);
    let SubscriptionEventData::Logs(logs) = event.result else {
        anyhow::bail!("expected logs");
    };
    assert_eq!(logs.len(), 1);

    // Subscriptions are not polled
    assert!(matches!(
        fixture.node_data.get_filter_changes(&filter_id),
        Err(NodeError::InvalidFilterId(_))
    ));

    Ok(())
}

#[test]
fn block_filter_starts_with_latest_block() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let genesis_hash = *fixture.node_data.last_block()?.block_hash();
    let filter_id = fixture.node_data.add_block_filter(false)?;

    let mined = fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;

    assert_eq!(
        fixture.node_data.get_filter_changes(&filter_id)?,
        FilterChanges::Hashes(vec![genesis_hash, *mined.block.block_hash()])
    );

    Ok(())
}

#[test]
fn new_heads_subscription_receives_blocks() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let filter_id = fixture.node_data.add_block_filter(true)?;
    let mined = fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;

    let event = fixture.subscription_receiver.try_recv()?;
    assert_eq!(event.filter_id, filter_id);
    let SubscriptionEventData::NewHeads(block) = event.result else {
        anyhow::bail!("expected a block");
    };
    assert_eq!(block.block_hash(), mined.block.block_hash());

    Ok(())
}

#[test]
fn pending_transaction_filter_collects_hashes() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;
    fixture.node_data.set_auto_mining(false);

    let filter_id = fixture.node_data.add_pending_transaction_filter(false);
    let transaction_hash = fixture.send_transfer(0)?.transaction_hash;

    assert_eq!(
        fixture.node_data.get_filter_changes(&filter_id)?,
        FilterChanges::Hashes(vec![transaction_hash])
    );

    Ok(())
}

#[test]
fn polled_filters_expire() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let polled = fixture.node_data.add_block_filter(false)?;
    let subscription = fixture.node_data.add_block_filter(true)?;

    fixture.timer.add_seconds(301);
    fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;

    assert!(matches!(
        fixture.node_data.get_filter_changes(&polled),
        Err(NodeError::InvalidFilterId(id)) if id == polled
    ));
    assert!(fixture.node_data.remove_subscription(&subscription));

    Ok(())
}

#[test]
fn polling_keeps_filters_alive() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let filter_id = fixture.node_data.add_block_filter(false)?;

    fixture.timer.add_seconds(200);
    fixture.node_data.get_filter_changes(&filter_id)?;

    fixture.timer.add_seconds(200);
    fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;

    assert!(fixture.node_data.remove_filter(&filter_id));

    Ok(())
}

#[test]
fn removal_respects_filter_mode() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let polled = fixture.node_data.add_block_filter(false)?;
    let subscription = fixture.node_data.add_pending_transaction_filter(true);

    assert!(!fixture.node_data.remove_subscription(&polled));
    assert!(!fixture.node_data.remove_filter(&subscription));

    assert!(fixture.node_data.remove_filter(&polled));
    assert!(fixture.node_data.remove_subscription(&subscription));
    assert!(!fixture.node_data.remove_filter(&U256::from(1_000)));

    Ok(())
}

#[test]
fn filter_logs_require_a_log_filter() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    let filter_id = fixture.node_data.add_block_filter(false)?;

    assert!(matches!(
        fixture.node_data.get_filter_logs(&filter_id),
        Err(NodeError::InvalidFilterKind {
            expected: FilterKind::Logs,
            actual: FilterKind::NewBlocks,
            ..
        })
    ));

    Ok(())
}
