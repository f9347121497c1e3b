use std::sync::Arc;

use devnet_block_api::Block as _;
use devnet_node::{
    BlockSpec, FilterCriteria, HeaderOverrides, NodeError,
    test_utils::{NodeTestFixture, TEST_SECRET_KEY, create_test_config, one_ether},
};
use devnet_primitives::{Address, B64, B256, Bloom, Bytes, U64, U256};
use devnet_rpc_client::{
    RemoteAccount,
    test_utils::InMemoryChainSource,
    types::{RpcBlock, RpcLog},
};
use devnet_transaction::signature::{secret_key_from_str, secret_key_to_address};

const REMOTE_CHAIN_ID: u64 = 31_338;
const LATEST_REMOTE_BLOCK: u64 = 20;

fn remote_block(number: u64) -> RpcBlock {
    RpcBlock {
        hash: B256::with_last_byte(u8::try_from(number).expect("small block number") + 1),
        parent_hash: B256::random(),
        sha3_uncles: B256::random(),
        miner: Address::random(),
        state_root: B256::random(),
        transactions_root: B256::random(),
        receipts_root: B256::random(),
        logs_bloom: Bloom::ZERO,
        difficulty: U256::ZERO,
        number: U64::from(number),
        gas_limit: U64::from(30_000_000),
        gas_used: U64::from(15_000_000),
        timestamp: U64::from(1_000 + number * 12),
        extra_data: Bytes::new(),
        mix_hash: B256::random(),
        nonce: B64::ZERO,
        base_fee_per_gas: Some(U256::from(10)),
        withdrawals_root: None,
        parent_beacon_block_root: None,
        transactions: Vec::new(),
    }
}

fn remote_chain() -> anyhow::Result<Arc<InMemoryChainSource>> {
    let owner = secret_key_to_address(&secret_key_from_str(TEST_SECRET_KEY)?);

    let source = Arc::new(InMemoryChainSource::new(
        REMOTE_CHAIN_ID,
        LATEST_REMOTE_BLOCK,
    ));
    for number in 0..=LATEST_REMOTE_BLOCK {
        source.insert_block(remote_block(number));
    }

    source.insert_account(
        owner,
        RemoteAccount {
            balance: U256::from(5),
            nonce: 3,
            code: Bytes::new(),
        },
    );

    Ok(source)
}

fn forked_fixture() -> anyhow::Result<NodeTestFixture> {
    NodeTestFixture::new_forked(create_test_config(), remote_chain()?, None)
}

#[test]
fn forks_at_latest_block_of_young_chain() -> anyhow::Result<()> {
    let fixture = forked_fixture()?;

    let metadata = fixture
        .node_data
        .fork_metadata()
        .ok_or_else(|| anyhow::anyhow!("node is forked"))?;
    assert_eq!(metadata.chain_id, REMOTE_CHAIN_ID);
    assert_eq!(metadata.fork_block_number, LATEST_REMOTE_BLOCK);
    assert_eq!(
        metadata.fork_block_hash,
        remote_block(LATEST_REMOTE_BLOCK).hash
    );

    assert_eq!(fixture.node_data.last_block_number(), LATEST_REMOTE_BLOCK);

    Ok(())
}

#[test]
fn explicit_fork_block_number() -> anyhow::Result<()> {
    let fixture = NodeTestFixture::new_forked(create_test_config(), remote_chain()?, Some(10))?;

    assert_eq!(fixture.node_data.last_block_number(), 10);
    assert_eq!(
        fixture
            .node_data
            .fork_metadata()
            .map(|metadata| metadata.fork_block_number),
        Some(10)
    );

    Ok(())
}

#[test]
fn genesis_accounts_override_remote_balance() -> anyhow::Result<()> {
    let mut fixture = forked_fixture()?;
    let owner = fixture.owner;

    assert_eq!(
        fixture.node_data.balance(owner, None)?,
        one_ether() * U256::from(1_000)
    );
    // The remote nonce is kept
    assert_eq!(fixture.node_data.nonce(&owner, None)?, 3);

    Ok(())
}

#[test]
fn state_queries_at_fork_block_need_no_hardfork_schedule() -> anyhow::Result<()> {
    let source = remote_chain()?;
    let contract = Address::repeat_byte(0xcc);
    source.insert_storage(contract, U256::from(1), U256::from(42));

    let mut fixture = NodeTestFixture::new_forked(create_test_config(), source, None)?;
    let owner = fixture.owner;
    let fork_block = BlockSpec::Number(LATEST_REMOTE_BLOCK);

    assert_eq!(
        fixture.node_data.balance(owner, Some(&fork_block))?,
        one_ether() * U256::from(1_000)
    );
    assert_eq!(fixture.node_data.nonce(&owner, Some(&fork_block))?, 3);
    assert_eq!(
        fixture
            .node_data
            .storage_at(contract, U256::from(1), Some(&fork_block))?,
        U256::from(42)
    );
    assert!(
        fixture
            .node_data
            .code(contract, Some(&fork_block))?
            .is_empty()
    );

    Ok(())
}

#[test]
fn mines_on_top_of_fork_block() -> anyhow::Result<()> {
    let mut fixture = forked_fixture()?;

    let result = fixture.send_transfer(3)?;

    assert_eq!(result.mining_results.len(), 1);
    let block = &result.mining_results[0].block;
    assert_eq!(block.header().number, LATEST_REMOTE_BLOCK + 1);
    assert_eq!(
        block.header().parent_hash,
        remote_block(LATEST_REMOTE_BLOCK).hash
    );
    assert!(block.header().timestamp > remote_block(LATEST_REMOTE_BLOCK).timestamp.to::<u64>());

    assert_eq!(fixture.node_data.nonce(&fixture.owner, None)?, 4);

    Ok(())
}

#[test]
fn remote_blocks_are_served() -> anyhow::Result<()> {
    let fixture = forked_fixture()?;

    let block = fixture
        .node_data
        .block_by_number(5)?
        .ok_or_else(|| anyhow::anyhow!("remote block exists"))?;

    assert_eq!(*block.block_hash(), remote_block(5).hash);
    assert_eq!(block.header().timestamp, 1_000 + 5 * 12);

    Ok(())
}

#[test]
fn remote_storage_is_served() -> anyhow::Result<()> {
    let source = remote_chain()?;
    let contract = Address::repeat_byte(0xcc);
    source.insert_storage(contract, U256::from(1), U256::from(42));

    let mut fixture = NodeTestFixture::new_forked(create_test_config(), source, None)?;

    assert_eq!(
        fixture
            .node_data
            .storage_at(contract, U256::from(1), None)?,
        U256::from(42)
    );

    fixture
        .node_data
        .set_account_storage_slot(contract, U256::from(1), U256::from(7))?;
    assert_eq!(
        fixture
            .node_data
            .storage_at(contract, U256::from(1), None)?,
        U256::from(7)
    );

    Ok(())
}

#[test]
fn fee_history_spans_remote_and_local_blocks() -> anyhow::Result<()> {
    let mut fixture = forked_fixture()?;

    let result = fixture.node_data.fee_history(5, &BlockSpec::Latest, None)?;

    assert_eq!(result.oldest_block, U64::from(LATEST_REMOTE_BLOCK - 4));
    // Includes the base fee of the block after the range
    assert_eq!(result.base_fee_per_gas.len(), 6);
    assert_eq!(result.gas_used_ratio.len(), 5);
    assert!(result.reward.is_none());

    assert_eq!(result.base_fee_per_gas[0], U256::from(10));
    assert_eq!(
        result.base_fee_per_gas[5],
        U256::from(1_000_000_000u64)
    );

    Ok(())
}

#[test]
fn remote_logs_are_filtered() -> anyhow::Result<()> {
    let source = remote_chain()?;
    let emitter = Address::repeat_byte(0xee);
    source.insert_log(RpcLog {
        address: emitter,
        topics: vec![B256::repeat_byte(0x01)],
        data: Bytes::new(),
        block_hash: remote_block(7).hash,
        block_number: U64::from(7),
        transaction_hash: B256::random(),
        transaction_index: U64::ZERO,
        log_index: U64::ZERO,
        removed: false,
    });

    let fixture = NodeTestFixture::new_forked(create_test_config(), source, None)?;

    let logs = fixture.node_data.logs(FilterCriteria {
        from_block: Some(BlockSpec::Number(0)),
        addresses: [emitter].into_iter().collect(),
        ..FilterCriteria::default()
    })?;

    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].block_number, 7);

    Ok(())
}

#[test]
fn revert_to_fork_block() -> anyhow::Result<()> {
    let mut fixture = forked_fixture()?;

    let snapshot_id = fixture.node_data.make_snapshot();
    fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;

    assert!(fixture.node_data.revert_to_snapshot(snapshot_id));
    assert_eq!(fixture.node_data.last_block_number(), LATEST_REMOTE_BLOCK);

    Ok(())
}

#[test]
fn unknown_remote_block_is_rejected() -> anyhow::Result<()> {
    let mut fixture = forked_fixture()?;

    let result = fixture
        .node_data
        .balance(fixture.owner, Some(&BlockSpec::Number(LATEST_REMOTE_BLOCK + 5)));

    assert!(matches!(
        result,
        Err(NodeError::InvalidBlockNumberOrHash { .. })
    ));

    Ok(())
}
