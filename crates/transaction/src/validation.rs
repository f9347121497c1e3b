use devnet_hardfork::{Hardfork, Rules};
use devnet_primitives::U256;

use crate::{Signed, initial_cost};

/// Errors that make a transaction invalid under the active rules.
#[derive(Debug, thiserror::Error)]
pub enum CreationError {
    /// The transaction type is not enabled yet.
    #[error("Transaction type {transaction_type} is not supported before the {required} hardfork; the current hardfork is {hardfork}")]
    UnsupportedType {
        /// Type of the transaction
        transaction_type: u8,
        /// Hardfork that enables the type
        required: Hardfork,
        /// Active hardfork
        hardfork: Hardfork,
    },
    /// The transaction uses a chain ID before EIP-155.
    #[error("Trying to send an EIP-155 transaction before the spuriousDragon hardfork")]
    Eip155BeforeSpuriousDragon,
    /// The priority fee exceeds the maximum fee.
    #[error(
        "maxPriorityFeePerGas ({max_priority_fee_per_gas}) is bigger than maxFeePerGas ({max_fee_per_gas})"
    )]
    PriorityFeeGreaterThanMaxFee {
        /// Maximum priority fee per gas
        max_priority_fee_per_gas: u128,
        /// Maximum fee per gas
        max_fee_per_gas: u128,
    },
    /// The gas limit does not cover the intrinsic gas.
    #[error("Transaction requires at least {initial_cost} gas but got {gas_limit}")]
    InsufficientGas {
        /// Intrinsic gas
        initial_cost: u64,
        /// Gas limit of the transaction
        gas_limit: u64,
    },
}

/// Validates a transaction against the rules of the provided hardfork.
pub fn validate(transaction: Signed, hardfork: Hardfork) -> Result<Signed, CreationError> {
    let rules = Rules::new(hardfork);

    match &transaction {
        Signed::PreEip155Legacy(_) => (),
        Signed::PostEip155Legacy(_) => {
            if !rules.eip155 {
                return Err(CreationError::Eip155BeforeSpuriousDragon);
            }
        }
        Signed::Eip2930(_) => {
            if !rules.eip2930 {
                return Err(CreationError::UnsupportedType {
                    transaction_type: transaction.transaction_type().into(),
                    required: Hardfork::Berlin,
                    hardfork,
                });
            }
        }
        Signed::Eip1559(tx) => {
            if !rules.eip1559 {
                return Err(CreationError::UnsupportedType {
                    transaction_type: transaction.transaction_type().into(),
                    required: Hardfork::London,
                    hardfork,
                });
            }

            let request = tx.request();
            if request.max_priority_fee_per_gas > request.max_fee_per_gas {
                return Err(CreationError::PriorityFeeGreaterThanMaxFee {
                    max_priority_fee_per_gas: request.max_priority_fee_per_gas,
                    max_fee_per_gas: request.max_fee_per_gas,
                });
            }
        }
    }

    let initial_cost = initial_cost(&transaction, hardfork);
    if transaction.gas_limit() < initial_cost {
        return Err(CreationError::InsufficientGas {
            initial_cost,
            gas_limit: transaction.gas_limit(),
        });
    }

    Ok(transaction)
}

/// The maximum amount a sender can be charged for a transaction: the gas
/// limit at the maximum gas price, plus the transferred value.
pub fn upfront_cost(transaction: &Signed) -> U256 {
    U256::from(transaction.gas_limit())
        .saturating_mul(U256::from(transaction.gas_price()))
        .saturating_add(*transaction.value())
}

#[cfg(test)]
mod tests {
    use devnet_primitives::{Address, Bytes, TxKind};

    use super::*;
    use crate::request;

    fn eip1559(max_fee_per_gas: u128, max_priority_fee_per_gas: u128, gas_limit: u64) -> Signed {
        request::Eip1559 {
            chain_id: 1,
            nonce: 0,
            max_priority_fee_per_gas,
            max_fee_per_gas,
            gas_limit,
            kind: TxKind::Call(Address::ZERO),
            value: U256::from(5),
            input: Bytes::new(),
            access_list: Vec::new(),
        }
        .fake_sign(Address::random())
        .into()
    }

    #[test]
    fn rejects_fee_market_before_london() {
        let result = validate(eip1559(10, 1, 21_000), Hardfork::Berlin);

        assert!(matches!(
            result,
            Err(CreationError::UnsupportedType {
                required: Hardfork::London,
                ..
            })
        ));
    }

    #[test]
    fn rejects_inconsistent_fees() {
        let result = validate(eip1559(10, 11, 21_000), Hardfork::Cancun);

        assert!(matches!(
            result,
            Err(CreationError::PriorityFeeGreaterThanMaxFee { .. })
        ));
    }

    #[test]
    fn rejects_gas_limit_below_intrinsic_gas() {
        let result = validate(eip1559(10, 1, 20_999), Hardfork::Cancun);

        assert!(matches!(
            result,
            Err(CreationError::InsufficientGas {
                initial_cost: 21_000,
                gas_limit: 20_999
            })
        ));
    }

    #[test]
    fn upfront_cost_includes_value() -> anyhow::Result<()> {
        let transaction = validate(eip1559(10, 1, 21_000), Hardfork::Cancun)?;

        assert_eq!(upfront_cost(&transaction), U256::from(210_005));
        Ok(())
    }
}
