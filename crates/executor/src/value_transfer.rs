use devnet_hardfork::{Hardfork, Rules};
use devnet_primitives::{Address, Bytes, KECCAK_EMPTY, TxKind, U256, hash_map::Entry};
use devnet_state_api::{
    State, StateChanges, StateError,
    account::{Account, AccountStatus, code_hash},
};
use devnet_transaction::{Signed, initial_cost, upfront_cost};

use crate::{
    AfterMessage, BeforeMessage, BlockEnv, ExecutionFlags, ExecutionResult, HaltReason,
    InvalidTransaction, MAX_CODE_SIZE, MAX_INITCODE_SIZE, Output, ResultAndState, SuccessReason,
    Trace, TransactionError, TransactionExecutor,
};

const CODE_DEPOSIT_COST: u64 = 200;

/// Executor that moves value between accounts without interpreting bytecode.
/// Contract creation deploys the init code as the contract's code.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValueTransferExecutor;

/// Accounts loaded from the underlying state and modified by execution.
struct Journal<'state> {
    state: &'state dyn State<Error = StateError>,
    accounts: StateChanges,
}

impl<'state> Journal<'state> {
    fn new(state: &'state dyn State<Error = StateError>) -> Self {
        Self {
            state,
            accounts: StateChanges::default(),
        }
    }

    fn account_mut(&mut self, address: Address) -> Result<&mut Account, StateError> {
        match self.accounts.entry(address) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let info = self.state.basic(address)?.unwrap_or_default();
                Ok(entry.insert(Account::from(info)))
            }
        }
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> Result<(), StateError> {
        let sender = self.account_mut(from)?;
        sender.info.balance = sender.info.balance.saturating_sub(value);

        let recipient = self.account_mut(to)?;
        recipient.info.balance = recipient.info.balance.saturating_add(value);

        Ok(())
    }

    fn into_changes(self) -> StateChanges {
        self.accounts
    }
}

impl ValueTransferExecutor {
    fn validate(
        rules: &Rules,
        block: &BlockEnv,
        transaction: &Signed,
        flags: ExecutionFlags,
    ) -> Result<u64, InvalidTransaction> {
        let gas_limit = transaction.gas_limit();

        let initial_gas = initial_cost(transaction, rules.hardfork);
        if initial_gas > gas_limit {
            return Err(InvalidTransaction::CallGasCostMoreThanGasLimit {
                initial_gas,
                gas_limit,
            });
        }

        if gas_limit > block.gas_limit {
            return Err(InvalidTransaction::CallerGasLimitMoreThanBlock {
                gas_limit,
                block_gas_limit: block.gas_limit,
            });
        }

        if let Some(base_fee) = block.base_fee.filter(|_| rules.eip1559)
            && !flags.disable_base_fee_check
            && transaction.gas_price() < base_fee
        {
            return Err(InvalidTransaction::GasPriceLessThanBasefee {
                gas_price: transaction.gas_price(),
                base_fee,
            });
        }

        if rules.shanghai
            && transaction.kind().is_create()
            && !flags.allow_unlimited_contract_size
            && transaction.data().len() > MAX_INITCODE_SIZE
        {
            return Err(InvalidTransaction::CreateInitCodeSizeLimit);
        }

        Ok(initial_gas)
    }

    fn create(
        journal: &mut Journal<'_>,
        rules: &Rules,
        caller: Address,
        nonce: u64,
        transaction: &Signed,
        initial_gas: u64,
        flags: ExecutionFlags,
    ) -> Result<ExecutionResult, StateError> {
        let gas_limit = transaction.gas_limit();
        let halt = |reason| ExecutionResult::Halt {
            reason,
            gas_used: gas_limit,
        };

        let address = caller.create(nonce);
        let existing = journal.account_mut(address)?;
        if existing.info.nonce != 0 || existing.info.code_hash != KECCAK_EMPTY {
            return Ok(halt(HaltReason::CreateCollision));
        }

        let code = transaction.data().clone();
        if rules.is_active(Hardfork::London) && code.first() == Some(&0xEF) {
            return Ok(halt(HaltReason::CreateContractStartingWithEF));
        }

        if rules.is_active(Hardfork::SpuriousDragon)
            && !flags.allow_unlimited_contract_size
            && code.len() > MAX_CODE_SIZE
        {
            return Ok(halt(HaltReason::CreateContractSizeLimit));
        }

        let gas_used = initial_gas.saturating_add(CODE_DEPOSIT_COST * code.len() as u64);
        if gas_used > gas_limit {
            return Ok(halt(HaltReason::OutOfGas));
        }

        journal.transfer(caller, address, *transaction.value())?;

        let created = journal.account_mut(address)?;
        created.status = AccountStatus::Created;
        created.info.nonce = u64::from(rules.is_active(Hardfork::SpuriousDragon));
        created.info.code_hash = code_hash(&code);
        created.info.code = Some(code.clone());

        Ok(ExecutionResult::Success {
            reason: SuccessReason::Return,
            gas_used,
            gas_refunded: 0,
            logs: Vec::new(),
            output: Output::Create(code, Some(address)),
        })
    }
}

impl TransactionExecutor for ValueTransferExecutor {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn run(
        &self,
        state: &dyn State<Error = StateError>,
        block: &BlockEnv,
        transaction: &Signed,
        flags: ExecutionFlags,
    ) -> Result<ResultAndState, TransactionError> {
        let rules = Rules::new(block.hardfork);
        let initial_gas = Self::validate(&rules, block, transaction, flags)?;

        let caller = *transaction.caller();
        let mut journal = Journal::new(state);

        let caller_account = journal.account_mut(caller)?;
        let upfront_cost = upfront_cost(transaction);
        if flags.skip_balance_nonce_checks {
            if caller_account.info.balance < upfront_cost {
                caller_account.info.balance = upfront_cost;
            }
        } else {
            let state_nonce = caller_account.info.nonce;
            if transaction.nonce() < state_nonce {
                return Err(InvalidTransaction::NonceTooLow {
                    tx: transaction.nonce(),
                    state: state_nonce,
                }
                .into());
            } else if transaction.nonce() > state_nonce {
                return Err(InvalidTransaction::NonceTooHigh {
                    tx: transaction.nonce(),
                    state: state_nonce,
                }
                .into());
            }

            if caller_account.info.balance < upfront_cost {
                return Err(InvalidTransaction::LackOfFundForMaxFee {
                    fee: Box::new(upfront_cost),
                    balance: Box::new(caller_account.info.balance),
                }
                .into());
            }
        }

        let nonce = caller_account.info.nonce;
        caller_account.info.nonce = nonce.saturating_add(1);

        let to = transaction.kind().to().copied();
        let mut trace = Trace::default();
        trace.add_before(BeforeMessage {
            depth: 0,
            caller,
            to,
            is_static_call: false,
            gas_limit: transaction.gas_limit(),
            data: transaction.data().clone(),
            value: *transaction.value(),
            code_address: to,
            code: None,
        });

        let result = match transaction.kind() {
            TxKind::Call(to) => {
                journal.transfer(caller, to, *transaction.value())?;

                ExecutionResult::Success {
                    reason: SuccessReason::Stop,
                    gas_used: initial_gas,
                    gas_refunded: 0,
                    logs: Vec::new(),
                    output: Output::Call(Bytes::new()),
                }
            }
            TxKind::Create => {
                Self::create(&mut journal, &rules, caller, nonce, transaction, initial_gas, flags)?
            }
        };

        let base_fee = block.base_fee.filter(|_| rules.eip1559);
        let effective_gas_price = transaction.effective_gas_price(base_fee);
        let gas_used = U256::from(result.gas_used());

        let caller_account = journal.account_mut(caller)?;
        caller_account.info.balance = caller_account
            .info
            .balance
            .saturating_sub(gas_used.saturating_mul(U256::from(effective_gas_price)));

        let coinbase_gas_price = effective_gas_price.saturating_sub(base_fee.unwrap_or(0));
        if coinbase_gas_price > 0 {
            let coinbase = journal.account_mut(block.beneficiary)?;
            coinbase.info.balance = coinbase
                .info
                .balance
                .saturating_add(gas_used.saturating_mul(U256::from(coinbase_gas_price)));
        }

        log::trace!(
            "Executed transaction {} using {} gas",
            transaction.transaction_hash(),
            result.gas_used()
        );

        trace.add_after(AfterMessage {
            execution_result: result.clone(),
            contract_address: result.created_address(),
        });

        Ok(ResultAndState {
            result,
            state: journal.into_changes(),
            trace,
        })
    }
}
