use std::num::NonZeroU64;

use devnet_block_api::Block as _;
use devnet_hardfork::Hardfork;
use devnet_mem_pool::MemPoolAddTransactionError;
use devnet_node::{
    HeaderOverrides, MineOrdering, NodeError, OwnedAccount, TransactionRequest,
    test_utils::{NodeTestFixture, TEST_SECRET_KEY, create_test_config, one_ether},
};
use devnet_primitives::{Address, B256, U256};
use devnet_transaction::signature::{secret_key_from_str, secret_key_to_address};

// Address 0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826
const SECOND_SECRET_KEY: &str =
    "c85ef7d79691fe79573b1a7064c19c1a9819ebdbd1faaab1a8ec92344438aaf4";

const RECIPIENT: Address = Address::repeat_byte(0xaa);

fn transfer(from: Address, nonce: u64) -> TransactionRequest {
    TransactionRequest {
        from,
        to: Some(RECIPIENT),
        value: Some(U256::from(1)),
        gas: Some(21_000),
        nonce: Some(nonce),
        ..TransactionRequest::default()
    }
}

fn transaction_nonces(fixture: &NodeTestFixture, block_number: u64) -> anyhow::Result<Vec<u64>> {
    let block = fixture
        .node_data
        .block_by_number(block_number)?
        .ok_or_else(|| anyhow::anyhow!("block {block_number} exists"))?;

    Ok(block
        .transactions()
        .iter()
        .map(devnet_transaction::Signed::nonce)
        .collect())
}

#[test]
fn same_sender_is_mined_in_nonce_order_across_blocks() -> anyhow::Result<()> {
    let mut config = create_test_config();
    config.mining.auto_mine = false;
    // Room for two transfers per block
    config.block_gas_limit = NonZeroU64::new(42_000).expect("non-zero");

    let mut fixture = NodeTestFixture::with_config(config)?;
    for nonce in [2, 0, 1] {
        fixture.send_transfer(nonce)?;
    }

    fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;
    fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;

    assert_eq!(transaction_nonces(&fixture, 1)?, vec![0, 1]);
    assert_eq!(transaction_nonces(&fixture, 2)?, vec![2]);

    Ok(())
}

#[test]
fn submitting_twice_is_rejected_as_known() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;
    fixture.node_data.set_auto_mining(false);

    let transaction = fixture
        .node_data
        .sign_transaction_request(transfer(fixture.owner, 0))?;
    let transaction_hash = *transaction.transaction_hash();

    fixture.node_data.send_raw_transaction(transaction.clone())?;
    let result = fixture.node_data.send_raw_transaction(transaction);

    assert!(matches!(
        result,
        Err(NodeError::MemPoolAddTransaction(
            MemPoolAddTransactionError::TransactionAlreadyExists { transaction_hash: hash }
        )) if hash == transaction_hash
    ));
    assert_eq!(fixture.node_data.pending_transactions().count(), 1);

    Ok(())
}

#[test]
fn legacy_transfer_is_mined_and_charged() -> anyhow::Result<()> {
    let secret_key = secret_key_from_str(TEST_SECRET_KEY)?;

    let mut config = create_test_config();
    config.hardfork = Hardfork::Berlin;
    config.initial_base_fee_per_gas = None;
    config.mining.auto_mine = false;
    config.accounts = vec![OwnedAccount {
        secret_key,
        balance: one_ether(),
    }];

    let mut fixture = NodeTestFixture::with_config(config)?;
    let sender = fixture.owner;
    let half_ether = one_ether() / U256::from(2);

    let transaction_hash = fixture
        .node_data
        .send_transaction(TransactionRequest {
            from: sender,
            to: Some(RECIPIENT),
            value: Some(half_ether),
            gas_price: Some(1),
            nonce: Some(0),
            ..TransactionRequest::default()
        })?
        .transaction_hash;

    let result = fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;

    assert_eq!(result.block.transactions().len(), 1);
    assert!(result.has_transaction(&transaction_hash));

    let receipt = fixture
        .node_data
        .receipt_by_transaction_hash(&transaction_hash)?
        .ok_or_else(|| anyhow::anyhow!("receipt exists"))?;

    let balance = fixture.node_data.balance(sender, None)?;
    assert_eq!(
        balance,
        one_ether() - half_ether - U256::from(receipt.gas_used)
    );
    assert_eq!(fixture.node_data.pending_transactions().count(), 0);

    Ok(())
}

#[test]
fn unaffordable_queued_transaction_does_not_block_mining() -> anyhow::Result<()> {
    let secret_key = secret_key_from_str(TEST_SECRET_KEY)?;

    // A transfer costs 21_000 * 1 + 1, so the balance covers only one
    let mut config = create_test_config();
    config.hardfork = Hardfork::Berlin;
    config.initial_base_fee_per_gas = None;
    config.mining.auto_mine = false;
    config.accounts = vec![OwnedAccount {
        secret_key,
        balance: U256::from(31_500),
    }];

    let mut fixture = NodeTestFixture::with_config(config)?;
    let sender = fixture.owner;

    let cheap_transfer = |nonce| TransactionRequest {
        gas_price: Some(1),
        ..transfer(sender, nonce)
    };

    let queued_hash = fixture
        .node_data
        .send_transaction(cheap_transfer(1))?
        .transaction_hash;
    let pending_hash = fixture
        .node_data
        .send_transaction(cheap_transfer(0))?
        .transaction_hash;
    assert_eq!(fixture.node_data.pending_transactions().count(), 2);

    let result = fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;
    assert_eq!(result.block.transactions().len(), 1);
    assert!(result.has_transaction(&pending_hash));

    // The remaining balance still does not cover the queued transaction
    let result = fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;
    assert!(result.block.transactions().is_empty());
    assert_eq!(
        fixture
            .node_data
            .pending_transactions()
            .map(|transaction| *transaction.transaction_hash())
            .collect::<Vec<_>>(),
        vec![queued_hash]
    );

    fixture.node_data.set_balance(sender, one_ether())?;
    let result = fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;
    assert!(result.has_transaction(&queued_hash));
    assert_eq!(fixture.node_data.pending_transactions().count(), 0);

    Ok(())
}

#[test]
fn nonce_gap_is_filled_before_mining() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;
    fixture.node_data.set_auto_mining(false);

    fixture.send_transfer(1)?;
    fixture.send_transfer(0)?;

    let result = fixture
        .node_data
        .mine_and_commit_block(HeaderOverrides::default())?;

    assert_eq!(result.block.transactions().len(), 2);
    assert_eq!(transaction_nonces(&fixture, 1)?, vec![0, 1]);

    Ok(())
}

#[test]
fn auto_mine_includes_queued_transactions() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;

    fixture.node_data.set_auto_mining(false);
    fixture.send_transfer(1)?;

    fixture.node_data.set_auto_mining(true);
    let result = fixture.send_transfer(0)?;

    assert_eq!(result.mining_results.len(), 1);
    assert!(result.transaction_result_and_trace().is_some());
    assert_eq!(transaction_nonces(&fixture, 1)?, vec![0, 1]);
    assert_eq!(fixture.node_data.pending_transactions().count(), 0);

    Ok(())
}

#[test]
fn lowering_the_block_gas_limit_drops_transactions() -> anyhow::Result<()> {
    let mut fixture = NodeTestFixture::new_local()?;
    fixture.node_data.set_auto_mining(false);

    fixture.send_transfer(0)?;
    fixture
        .node_data
        .set_block_gas_limit(NonZeroU64::new(20_000).expect("non-zero"))?;

    assert_eq!(fixture.node_data.pending_transactions().count(), 0);

    Ok(())
}

macro_rules! impl_ordering_test {
    ($($name:ident: $order:expr => $expected:expr,)+) => {
        $(
            paste::item! {
                #[test]
                fn [<mine_with_ $name _ordering>]() -> anyhow::Result<()> {
                    let second_key = secret_key_from_str(SECOND_SECRET_KEY)?;
                    let second_sender = secret_key_to_address(&second_key);

                    let mut config = create_test_config();
                    config.mining.auto_mine = false;
                    config.mining.mem_pool.order = $order;
                    config.accounts.push(OwnedAccount {
                        secret_key: second_key,
                        balance: one_ether(),
                    });

                    let mut fixture = NodeTestFixture::with_config(config)?;

                    let cheap = fixture.node_data.send_transaction(TransactionRequest {
                        max_fee_per_gas: Some(10_000_000_000),
                        max_priority_fee_per_gas: Some(1_000_000_000),
                        ..transfer(fixture.owner, 0)
                    })?.transaction_hash;

                    let expensive = fixture.node_data.send_transaction(TransactionRequest {
                        max_fee_per_gas: Some(10_000_000_000),
                        max_priority_fee_per_gas: Some(2_000_000_000),
                        ..transfer(second_sender, 0)
                    })?.transaction_hash;

                    let result = fixture
                        .node_data
                        .mine_and_commit_block(HeaderOverrides::default())?;

                    let expected: [B256; 2] = if $expected { [cheap, expensive] } else { [expensive, cheap] };
                    assert_eq!(result.block.transaction_hashes(), expected.as_slice());

                    Ok(())
                }
            }
        )+
    };
}

impl_ordering_test! {
    fifo: MineOrdering::Fifo => true,
    priority: MineOrdering::Priority => false,
}
