use core::num::NonZeroU64;

use devnet_mem_pool::{
    AddTransactionOutcome, InvalidPoolTransaction, MemPoolAddTransactionError,
    OrderedTransaction, account_next_nonce,
};
use devnet_primitives::{Address, B256, U256};
use devnet_state_api::account::AccountInfo;
use devnet_test_mem_pool::{FIXTURE_BLOCK_GAS_LIMIT, MemPoolTestFixture};
use devnet_test_transaction::{
    dummy_eip155_transaction, dummy_eip155_transaction_with_limit,
    dummy_eip155_transaction_with_price, dummy_eip155_transaction_with_price_limit_and_value,
    dummy_eip1559_transaction,
};

fn funded_fixture(callers: &[Address]) -> anyhow::Result<MemPoolTestFixture> {
    let accounts = callers
        .iter()
        .map(|caller| {
            (
                *caller,
                AccountInfo {
                    balance: U256::from(100_000_000_000_000u128),
                    ..AccountInfo::default()
                },
            )
        })
        .collect::<Vec<_>>();

    Ok(MemPoolTestFixture::with_accounts(&accounts)?)
}

fn pending_nonces(fixture: &MemPoolTestFixture, caller: &Address) -> Vec<u64> {
    fixture
        .mem_pool
        .pending_transactions()
        .map(OrderedTransaction::pending)
        .filter(|transaction| transaction.caller() == caller)
        .map(|transaction| transaction.nonce())
        .collect()
}

fn future_nonces(fixture: &MemPoolTestFixture, caller: &Address) -> Vec<u64> {
    fixture
        .mem_pool
        .future_transactions()
        .map(OrderedTransaction::pending)
        .filter(|transaction| transaction.caller() == caller)
        .map(|transaction| transaction.nonce())
        .collect()
}

fn fifo(lhs: &OrderedTransaction, rhs: &OrderedTransaction) -> core::cmp::Ordering {
    lhs.order_id().cmp(&rhs.order_id())
}

#[test]
fn next_nonce_is_pending() -> anyhow::Result<()> {
    let caller = Address::random();
    let mut fixture = funded_fixture(&[caller])?;

    let outcome = fixture.add_transaction(dummy_eip155_transaction(caller, 0)?)?;
    assert_eq!(outcome, AddTransactionOutcome::Pending);

    assert_eq!(pending_nonces(&fixture, &caller), vec![0]);
    assert!(!fixture.mem_pool.has_future_transactions());
    assert_eq!(fixture.mem_pool.last_pending_nonce(&caller), Some(0));
    assert_eq!(
        account_next_nonce(&fixture.mem_pool, &fixture.state, &caller)?,
        1
    );

    Ok(())
}

#[test]
fn nonce_gap_is_queued_until_filled() -> anyhow::Result<()> {
    let caller = Address::random();
    let mut fixture = funded_fixture(&[caller])?;

    assert_eq!(
        fixture.add_transaction(dummy_eip155_transaction(caller, 2)?)?,
        AddTransactionOutcome::Queued
    );
    assert_eq!(
        fixture.add_transaction(dummy_eip155_transaction(caller, 1)?)?,
        AddTransactionOutcome::Queued
    );
    assert!(!fixture.mem_pool.has_pending_transactions());
    assert_eq!(future_nonces(&fixture, &caller), vec![1, 2]);
    assert_eq!(
        account_next_nonce(&fixture.mem_pool, &fixture.state, &caller)?,
        0
    );

    assert_eq!(
        fixture.add_transaction(dummy_eip155_transaction(caller, 0)?)?,
        AddTransactionOutcome::Pending
    );

    assert_eq!(pending_nonces(&fixture, &caller), vec![0, 1, 2]);
    assert!(!fixture.mem_pool.has_future_transactions());

    Ok(())
}

#[test]
fn duplicate_transaction_is_rejected() -> anyhow::Result<()> {
    let caller = Address::random();
    let mut fixture = funded_fixture(&[caller])?;

    let transaction = dummy_eip155_transaction(caller, 0)?;
    fixture.add_transaction(transaction.clone())?;

    let result = fixture.add_transaction(transaction.clone());
    assert!(matches!(
        result,
        Err(MemPoolAddTransactionError::TransactionAlreadyExists { transaction_hash })
            if transaction_hash == *transaction.transaction_hash()
    ));

    assert_eq!(fixture.mem_pool.transactions().count(), 1);

    Ok(())
}

#[test]
fn stale_nonce_is_rejected() -> anyhow::Result<()> {
    let caller = Address::random();
    let mut fixture = funded_fixture(&[caller])?;
    fixture.set_nonce(caller, 3)?;

    let result = fixture.add_transaction(dummy_eip155_transaction(caller, 2)?);
    assert!(matches!(
        result,
        Err(MemPoolAddTransactionError::NonceTooLow {
            transaction_nonce: 2,
            sender_nonce: 3
        })
    ));

    Ok(())
}

#[test]
fn gas_limit_above_block_gas_limit_is_rejected() -> anyhow::Result<()> {
    let caller = Address::random();
    let mut fixture = funded_fixture(&[caller])?;

    let result = fixture.add_transaction(dummy_eip155_transaction_with_limit(
        caller,
        0,
        FIXTURE_BLOCK_GAS_LIMIT + 1,
    )?);
    assert!(matches!(
        result,
        Err(MemPoolAddTransactionError::ExceedsBlockGasLimit {
            transaction_gas_limit,
            ..
        }) if transaction_gas_limit == FIXTURE_BLOCK_GAS_LIMIT + 1
    ));

    Ok(())
}

#[test]
fn cumulative_cost_of_pending_run_must_be_affordable() -> anyhow::Result<()> {
    let caller = Address::random();
    let mut fixture = MemPoolTestFixture::with_accounts(&[(
        caller,
        AccountInfo {
            balance: U256::from(50_000),
            ..AccountInfo::default()
        },
    )])?;

    // Each transaction costs 30_000 * 1 + 0
    fixture.add_transaction(dummy_eip155_transaction_with_price(caller, 0, 1)?)?;

    let result = fixture.add_transaction(dummy_eip155_transaction_with_price(caller, 1, 1)?);
    assert!(matches!(
        result,
        Err(MemPoolAddTransactionError::InsufficientFunds {
            max_upfront_cost,
            sender_balance,
        }) if max_upfront_cost == U256::from(60_000) && sender_balance == U256::from(50_000)
    ));

    let result = fixture.add_transaction(dummy_eip155_transaction_with_price_limit_and_value(
        caller,
        0,
        2,
        30_000,
        U256::ZERO,
    )?);
    assert!(matches!(
        result,
        Err(MemPoolAddTransactionError::InsufficientFunds { .. })
    ));

    assert_eq!(pending_nonces(&fixture, &caller), vec![0]);

    Ok(())
}

macro_rules! impl_replacement_tests {
    ($($name:ident: $nonce:expr => $outcome:ident,)+) => {
        $(
            paste::item! {
                #[test]
                fn [<underpriced_ $name _replacement_is_rejected>]() -> anyhow::Result<()> {
                    let caller = Address::random();
                    let mut fixture = funded_fixture(&[caller])?;

                    fixture.add_transaction(dummy_eip1559_transaction(caller, $nonce, 100, 10)?)?;

                    let result = fixture.add_transaction(dummy_eip1559_transaction(caller, $nonce, 109, 20)?);
                    assert!(matches!(
                        result,
                        Err(MemPoolAddTransactionError::ReplacementMaxFeePerGasTooLow {
                            min_new_max_fee_per_gas: 110,
                            transaction_nonce: $nonce,
                        })
                    ));

                    let result = fixture.add_transaction(dummy_eip1559_transaction(caller, $nonce, 110, 10)?);
                    assert!(matches!(
                        result,
                        Err(MemPoolAddTransactionError::ReplacementMaxPriorityFeePerGasTooLow {
                            min_new_max_priority_fee_per_gas: 11,
                            transaction_nonce: $nonce,
                        })
                    ));

                    Ok(())
                }

                #[test]
                fn [<$name _replacement_with_higher_fees_succeeds>]() -> anyhow::Result<()> {
                    let caller = Address::random();
                    let mut fixture = funded_fixture(&[caller])?;

                    let original = dummy_eip1559_transaction(caller, $nonce, 100, 10)?;
                    let replacement = dummy_eip1559_transaction(caller, $nonce, 110, 11)?;

                    let outcome = fixture.add_transaction(original.clone())?;
                    assert_eq!(outcome, AddTransactionOutcome::$outcome);

                    let outcome = fixture.add_transaction(replacement.clone())?;
                    assert_eq!(outcome, AddTransactionOutcome::Replaced { previous: original.clone() });

                    assert!(fixture.mem_pool.transaction_by_hash(original.transaction_hash()).is_none());
                    assert!(fixture.mem_pool.transaction_by_hash(replacement.transaction_hash()).is_some());
                    assert_eq!(fixture.mem_pool.transactions().count(), 1);

                    Ok(())
                }
            }
        )+
    };
}

impl_replacement_tests! {
    pending: 0 => Pending,
    future: 1 => Queued,
}

#[test]
fn removing_pending_transaction_demotes_later_nonces() -> anyhow::Result<()> {
    let caller = Address::random();
    let mut fixture = funded_fixture(&[caller])?;

    let transactions = (0..3)
        .map(|nonce| dummy_eip155_transaction(caller, nonce))
        .collect::<Result<Vec<_>, _>>()?;

    for transaction in &transactions {
        fixture.add_transaction(transaction.clone())?;
    }

    let removed = fixture
        .mem_pool
        .remove_transaction(transactions[1].transaction_hash())
        .expect("transaction is pooled");
    assert_eq!(removed.pending(), &transactions[1]);

    assert_eq!(pending_nonces(&fixture, &caller), vec![0]);
    assert_eq!(future_nonces(&fixture, &caller), vec![2]);
    assert!(
        fixture
            .mem_pool
            .remove_transaction(&B256::random())
            .is_none()
    );

    Ok(())
}

#[test]
fn queued_transaction_beyond_balance_is_not_promoted() -> anyhow::Result<()> {
    let caller = Address::random();
    let mut fixture = MemPoolTestFixture::with_accounts(&[(
        caller,
        AccountInfo {
            balance: U256::from(45_000),
            ..AccountInfo::default()
        },
    )])?;

    // Each transaction costs 30_000 * 1 + 0, so only one is affordable
    assert_eq!(
        fixture.add_transaction(dummy_eip155_transaction_with_price(caller, 1, 1)?)?,
        AddTransactionOutcome::Queued
    );
    assert_eq!(
        fixture.add_transaction(dummy_eip155_transaction_with_price(caller, 0, 1)?)?,
        AddTransactionOutcome::Pending
    );

    assert_eq!(pending_nonces(&fixture, &caller), vec![0]);
    assert_eq!(future_nonces(&fixture, &caller), vec![1]);

    // Topping up the balance lets the queued transaction follow
    fixture.set_balance(caller, U256::from(60_000))?;
    assert!(fixture.update()?.is_empty());

    assert_eq!(pending_nonces(&fixture, &caller), vec![0, 1]);
    assert!(!fixture.mem_pool.has_future_transactions());

    Ok(())
}

#[test]
fn update_demotes_pending_run_beyond_balance() -> anyhow::Result<()> {
    let caller = Address::random();
    let mut fixture = MemPoolTestFixture::with_accounts(&[(
        caller,
        AccountInfo {
            balance: U256::from(100_000),
            ..AccountInfo::default()
        },
    )])?;

    for nonce in 0..3 {
        fixture.add_transaction(dummy_eip155_transaction_with_price(caller, nonce, 1)?)?;
    }
    assert_eq!(pending_nonces(&fixture, &caller), vec![0, 1, 2]);

    fixture.set_balance(caller, U256::from(65_000))?;
    let dropped = fixture.update()?;

    // Every transaction is affordable on its own, but not all of them together
    assert!(dropped.is_empty());
    assert_eq!(pending_nonces(&fixture, &caller), vec![0, 1]);
    assert_eq!(future_nonces(&fixture, &caller), vec![2]);

    Ok(())
}

#[test]
fn pricier_replacement_demotes_unaffordable_successors() -> anyhow::Result<()> {
    let caller = Address::random();
    let mut fixture = MemPoolTestFixture::with_accounts(&[(
        caller,
        AccountInfo {
            balance: U256::from(65_000),
            ..AccountInfo::default()
        },
    )])?;

    fixture.add_transaction(dummy_eip155_transaction_with_price(caller, 0, 1)?)?;
    fixture.add_transaction(dummy_eip155_transaction_with_price(caller, 1, 1)?)?;

    // Replacing nonce 1 with a price of 2 costs 60_000, on top of 30_000
    let result = fixture.add_transaction(dummy_eip155_transaction_with_price(caller, 1, 2)?);
    assert!(matches!(
        result,
        Err(MemPoolAddTransactionError::InsufficientFunds { .. })
    ));

    // Replacing nonce 0 with a price of 2 leaves nonce 1 unaffordable
    let outcome = fixture.add_transaction(dummy_eip155_transaction_with_price_limit_and_value(
        caller,
        0,
        2,
        30_000,
        U256::ZERO,
    )?)?;
    assert!(matches!(outcome, AddTransactionOutcome::Replaced { .. }));

    assert_eq!(pending_nonces(&fixture, &caller), vec![0]);
    assert_eq!(future_nonces(&fixture, &caller), vec![1]);

    Ok(())
}

#[test]
fn update_drops_mined_transactions_and_promotes_queued_ones() -> anyhow::Result<()> {
    let caller = Address::random();
    let mut fixture = funded_fixture(&[caller])?;

    fixture.add_transaction(dummy_eip155_transaction(caller, 0)?)?;
    fixture.add_transaction(dummy_eip155_transaction(caller, 1)?)?;
    fixture.add_transaction(dummy_eip155_transaction(caller, 3)?)?;

    // Nonces 0 and 1 were mined and 2 was sent elsewhere
    fixture.set_nonce(caller, 3)?;
    let dropped = fixture.update()?;

    assert_eq!(dropped.len(), 2);
    assert!(dropped.iter().all(|dropped| matches!(
        dropped.reason,
        InvalidPoolTransaction::NonceTooLow {
            sender_nonce: 3,
            ..
        }
    )));

    assert_eq!(pending_nonces(&fixture, &caller), vec![3]);
    assert!(!fixture.mem_pool.has_future_transactions());

    Ok(())
}

#[test]
fn update_drops_unaffordable_transactions() -> anyhow::Result<()> {
    let caller = Address::random();
    let mut fixture = funded_fixture(&[caller])?;

    fixture.add_transaction(dummy_eip155_transaction_with_price(caller, 0, 1)?)?;
    fixture.add_transaction(dummy_eip155_transaction(caller, 1)?)?;

    fixture.set_balance(caller, U256::from(1_000))?;
    let dropped = fixture.update()?;

    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].transaction.nonce(), 0);
    assert!(matches!(
        dropped[0].reason,
        InvalidPoolTransaction::InsufficientFunds { .. }
    ));

    // The remaining transaction no longer follows the sender's nonce
    assert!(!fixture.mem_pool.has_pending_transactions());
    assert_eq!(future_nonces(&fixture, &caller), vec![1]);

    Ok(())
}

#[test]
fn lowering_block_gas_limit_drops_and_demotes() -> anyhow::Result<()> {
    let caller = Address::random();
    let other = Address::random();
    let mut fixture = funded_fixture(&[caller, other])?;

    fixture.add_transaction(dummy_eip155_transaction_with_limit(caller, 0, 25_000)?)?;
    fixture.add_transaction(dummy_eip155_transaction_with_limit(caller, 1, 100_000)?)?;
    fixture.add_transaction(dummy_eip155_transaction_with_limit(caller, 2, 25_000)?)?;
    fixture.add_transaction(dummy_eip155_transaction_with_limit(other, 0, 25_000)?)?;

    let dropped =
        fixture.set_block_gas_limit(NonZeroU64::new(50_000).expect("literal is non-zero"))?;

    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].transaction.nonce(), 1);
    assert!(matches!(
        dropped[0].reason,
        InvalidPoolTransaction::ExceedsBlockGasLimit {
            transaction_gas_limit: 100_000,
            ..
        }
    ));

    assert_eq!(pending_nonces(&fixture, &caller), vec![0]);
    assert_eq!(future_nonces(&fixture, &caller), vec![2]);
    assert_eq!(pending_nonces(&fixture, &other), vec![0]);
    assert_eq!(fixture.mem_pool.block_gas_limit().get(), 50_000);

    Ok(())
}

#[test]
fn iteration_preserves_sender_nonce_order() -> anyhow::Result<()> {
    let caller1 = Address::random();
    let caller2 = Address::random();
    let mut fixture = funded_fixture(&[caller1, caller2])?;

    // Insertion order: caller2/1 (queued), caller1/0, caller2/0, caller1/1
    fixture.add_transaction(dummy_eip155_transaction(caller2, 1)?)?;
    fixture.add_transaction(dummy_eip155_transaction(caller1, 0)?)?;
    fixture.add_transaction(dummy_eip155_transaction(caller2, 0)?)?;
    fixture.add_transaction(dummy_eip155_transaction(caller1, 1)?)?;

    let order = fixture
        .mem_pool
        .iter(fifo)
        .map(|transaction| (*transaction.caller(), transaction.nonce()))
        .collect::<Vec<_>>();

    assert_eq!(
        order,
        vec![(caller1, 0), (caller2, 0), (caller2, 1), (caller1, 1)]
    );

    let mut pending = fixture.mem_pool.iter(fifo);
    let first = pending.next().expect("pool has transactions");
    assert_eq!(first.caller(), &caller1);

    let removed = pending.remove_caller(&caller1).expect("caller has more");
    assert_eq!(removed.len(), 1);
    assert_eq!(pending.count(), 2);

    // Iteration does not consume the pool
    assert_eq!(fixture.mem_pool.pending_transactions().count(), 4);

    Ok(())
}

#[test]
fn clone_restores_the_pool() -> anyhow::Result<()> {
    let caller = Address::random();
    let mut fixture = funded_fixture(&[caller])?;

    fixture.add_transaction(dummy_eip155_transaction(caller, 0)?)?;
    let checkpoint = fixture.mem_pool.clone();

    fixture.add_transaction(dummy_eip155_transaction(caller, 1)?)?;
    fixture.add_transaction(dummy_eip155_transaction(caller, 5)?)?;
    fixture.mem_pool.set_min_gas_price(7);

    fixture.mem_pool = checkpoint;

    assert_eq!(pending_nonces(&fixture, &caller), vec![0]);
    assert!(!fixture.mem_pool.has_future_transactions());
    assert_eq!(fixture.mem_pool.min_gas_price(), 0);

    Ok(())
}
