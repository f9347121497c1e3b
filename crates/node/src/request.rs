use devnet_hardfork::Hardfork;
use devnet_primitives::{Address, Bytes, TxKind, U256};
use devnet_transaction::{
    AccessListItem, Signed, request,
    signature::{SecretKey, SignatureError},
};
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// Priority fee used when a request leaves it unspecified.
pub(crate) const DEFAULT_MAX_PRIORITY_FEE_PER_GAS: u128 = 1_000_000_000;

/// A request to send a transaction, with optional fields that the node fills
/// in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// Sender
    pub from: Address,
    /// Recipient, or `None` for contract creation
    pub to: Option<Address>,
    /// Gas limit. Defaults to the block gas limit.
    pub gas: Option<u64>,
    /// Legacy gas price
    pub gas_price: Option<u128>,
    /// Maximum total fee per gas
    pub max_fee_per_gas: Option<u128>,
    /// Maximum priority fee per gas
    pub max_priority_fee_per_gas: Option<u128>,
    /// Transferred value
    pub value: Option<U256>,
    /// Input data
    pub data: Option<Bytes>,
    /// Nonce. Defaults to the sender's next nonce, including pooled
    /// transactions.
    pub nonce: Option<u64>,
    /// Chain ID. Defaults to the node's chain ID.
    pub chain_id: Option<u64>,
    /// EIP-2930 access list
    pub access_list: Option<Vec<AccessListItem>>,
}

/// A request to execute a call or estimate its gas, without persisting its
/// effects.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    /// Sender. Defaults to the node's first owned account.
    pub from: Option<Address>,
    /// Recipient, or `None` for contract creation
    pub to: Option<Address>,
    /// Gas limit. Defaults to the block gas limit.
    pub gas: Option<u64>,
    /// Legacy gas price
    pub gas_price: Option<u128>,
    /// Maximum total fee per gas
    pub max_fee_per_gas: Option<u128>,
    /// Maximum priority fee per gas
    pub max_priority_fee_per_gas: Option<u128>,
    /// Transferred value
    pub value: Option<U256>,
    /// Input data
    pub data: Option<Bytes>,
    /// EIP-2930 access list
    pub access_list: Option<Vec<AccessListItem>>,
}

/// Fee-related fields of a request, checked against the active hardfork.
pub(crate) trait FeeFields {
    fn gas_price(&self) -> Option<u128>;

    fn max_fee_per_gas(&self) -> Option<u128>;

    fn max_priority_fee_per_gas(&self) -> Option<u128>;

    fn has_access_list(&self) -> bool;
}

macro_rules! impl_fee_fields {
    ($request:ty) => {
        impl FeeFields for $request {
            fn gas_price(&self) -> Option<u128> {
                self.gas_price
            }

            fn max_fee_per_gas(&self) -> Option<u128> {
                self.max_fee_per_gas
            }

            fn max_priority_fee_per_gas(&self) -> Option<u128> {
                self.max_priority_fee_per_gas
            }

            fn has_access_list(&self) -> bool {
                self.access_list.is_some()
            }
        }
    };
}

impl_fee_fields!(TransactionRequest);
impl_fee_fields!(CallRequest);

/// Validates that the request does not mix legacy and EIP-1559 fee fields,
/// and that its fields are supported by the hardfork.
pub(crate) fn validate_fee_fields(
    hardfork: Hardfork,
    request: &impl FeeFields,
) -> Result<(), NodeError> {
    let has_eip1559_fields =
        request.max_fee_per_gas().is_some() || request.max_priority_fee_per_gas().is_some();

    if request.gas_price().is_some() && has_eip1559_fields {
        return Err(NodeError::InvalidFeeFields);
    }

    if hardfork < Hardfork::Berlin && request.has_access_list() {
        return Err(NodeError::UnmetHardfork {
            actual: hardfork,
            minimum: Hardfork::Berlin,
        });
    }

    if hardfork < Hardfork::London && has_eip1559_fields {
        return Err(NodeError::UnmetHardfork {
            actual: hardfork,
            minimum: Hardfork::London,
        });
    }

    Ok(())
}

/// An unsigned transaction with all fields resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ResolvedRequest {
    Legacy(request::Legacy),
    Eip155(request::Eip155),
    Eip2930(request::Eip2930),
    Eip1559(request::Eip1559),
}

impl ResolvedRequest {
    pub fn gas_limit(&self) -> u64 {
        match self {
            ResolvedRequest::Legacy(request) => request.gas_limit,
            ResolvedRequest::Eip155(request) => request.gas_limit,
            ResolvedRequest::Eip2930(request) => request.gas_limit,
            ResolvedRequest::Eip1559(request) => request.gas_limit,
        }
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        match &mut self {
            ResolvedRequest::Legacy(request) => request.gas_limit = gas_limit,
            ResolvedRequest::Eip155(request) => request.gas_limit = gas_limit,
            ResolvedRequest::Eip2930(request) => request.gas_limit = gas_limit,
            ResolvedRequest::Eip1559(request) => request.gas_limit = gas_limit,
        }
        self
    }

    pub fn fake_sign(self, caller: Address) -> Signed {
        match self {
            ResolvedRequest::Legacy(request) => request.fake_sign(caller).into(),
            ResolvedRequest::Eip155(request) => request.fake_sign(caller).into(),
            ResolvedRequest::Eip2930(request) => request.fake_sign(caller).into(),
            ResolvedRequest::Eip1559(request) => request.fake_sign(caller).into(),
        }
    }

    pub fn sign(self, secret_key: &SecretKey) -> Result<Signed, SignatureError> {
        let signed = match self {
            ResolvedRequest::Legacy(request) => request.sign(secret_key)?.into(),
            ResolvedRequest::Eip155(request) => request.sign(secret_key)?.into(),
            ResolvedRequest::Eip2930(request) => request.sign(secret_key)?.into(),
            ResolvedRequest::Eip1559(request) => request.sign(secret_key)?.into(),
        };

        Ok(signed)
    }
}

/// Values that fill in the unspecified fields of a request.
pub(crate) struct RequestDefaults {
    pub chain_id: u64,
    pub hardfork: Hardfork,
    pub gas_limit: u64,
    pub nonce: u64,
    /// Gas price of legacy transactions
    pub gas_price: u128,
}

/// The untyped fields shared by all transaction shapes.
pub(crate) struct CommonFields {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_limit: u64,
    pub kind: TxKind,
    pub value: U256,
    pub input: Bytes,
}

/// Builds a legacy, EIP-2930 or EIP-1559 request depending on the provided
/// fee fields. `max_fees` is only invoked for EIP-1559 requests.
pub(crate) fn build_request<E>(
    common: CommonFields,
    hardfork: Hardfork,
    gas_price: Option<u128>,
    use_eip1559: bool,
    access_list: Option<Vec<AccessListItem>>,
    default_gas_price: impl FnOnce() -> Result<u128, E>,
    max_fees: impl FnOnce() -> Result<(u128, u128), E>,
) -> Result<ResolvedRequest, E> {
    let CommonFields {
        chain_id,
        nonce,
        gas_limit,
        kind,
        value,
        input,
    } = common;

    let request = if use_eip1559 {
        let (max_fee_per_gas, max_priority_fee_per_gas) = max_fees()?;
        ResolvedRequest::Eip1559(request::Eip1559 {
            chain_id,
            nonce,
            max_priority_fee_per_gas,
            max_fee_per_gas,
            gas_limit,
            kind,
            value,
            input,
            access_list: access_list.unwrap_or_default(),
        })
    } else {
        let gas_price = gas_price.map_or_else(default_gas_price, Ok)?;
        match access_list {
            Some(access_list) if hardfork >= Hardfork::Berlin => {
                ResolvedRequest::Eip2930(request::Eip2930 {
                    chain_id,
                    nonce,
                    gas_price,
                    gas_limit,
                    kind,
                    value,
                    input,
                    access_list,
                })
            }
            _ if hardfork < Hardfork::SpuriousDragon => ResolvedRequest::Legacy(request::Legacy {
                nonce,
                gas_price,
                gas_limit,
                kind,
                value,
                input,
            }),
            _ => ResolvedRequest::Eip155(request::Eip155 {
                nonce,
                gas_price,
                gas_limit,
                kind,
                value,
                input,
                chain_id,
            }),
        }
    };

    Ok(request)
}

/// Resolves a transaction request. From London onwards, requests without a
/// gas price become EIP-1559 transactions whose max fee covers twice the next
/// block's base fee.
pub(crate) fn resolve_transaction_request(
    request: TransactionRequest,
    defaults: RequestDefaults,
    next_base_fee_per_gas: Option<u128>,
) -> Result<ResolvedRequest, NodeError> {
    validate_fee_fields(defaults.hardfork, &request)?;

    let TransactionRequest {
        from: _,
        to,
        gas,
        gas_price,
        max_fee_per_gas,
        max_priority_fee_per_gas,
        value,
        data,
        nonce,
        chain_id,
        access_list,
    } = request;

    let use_eip1559 = defaults.hardfork >= Hardfork::London
        && (gas_price.is_none() || max_fee_per_gas.is_some() || max_priority_fee_per_gas.is_some());

    let common = CommonFields {
        chain_id: chain_id.unwrap_or(defaults.chain_id),
        nonce: nonce.unwrap_or(defaults.nonce),
        gas_limit: gas.unwrap_or(defaults.gas_limit),
        kind: to.map_or(TxKind::Create, TxKind::Call),
        value: value.unwrap_or(U256::ZERO),
        input: data.unwrap_or_default(),
    };

    build_request(
        common,
        defaults.hardfork,
        gas_price,
        use_eip1559,
        access_list,
        || Ok(defaults.gas_price),
        || {
            let max_fee_from_base_fee = |max_priority_fee_per_gas: u128| {
                let base_fee_per_gas = next_base_fee_per_gas.unwrap_or_default();
                2 * base_fee_per_gas + max_priority_fee_per_gas
            };

            let fees = match (max_fee_per_gas, max_priority_fee_per_gas) {
                (Some(max_fee_per_gas), Some(max_priority_fee_per_gas)) => {
                    (max_fee_per_gas, max_priority_fee_per_gas)
                }
                (Some(max_fee_per_gas), None) => (
                    max_fee_per_gas,
                    max_fee_per_gas.min(DEFAULT_MAX_PRIORITY_FEE_PER_GAS),
                ),
                (None, Some(max_priority_fee_per_gas)) => (
                    max_fee_from_base_fee(max_priority_fee_per_gas),
                    max_priority_fee_per_gas,
                ),
                (None, None) => (
                    max_fee_from_base_fee(DEFAULT_MAX_PRIORITY_FEE_PER_GAS),
                    DEFAULT_MAX_PRIORITY_FEE_PER_GAS,
                ),
            };

            Ok(fees)
        },
    )
}

/// Resolves a call request. Unspecified fees default to zero, so that calls
/// do not require a funded sender.
pub(crate) fn resolve_call_request(
    request: CallRequest,
    defaults: RequestDefaults,
) -> Result<ResolvedRequest, NodeError> {
    validate_fee_fields(defaults.hardfork, &request)?;

    let CallRequest {
        from: _,
        to,
        gas,
        gas_price,
        max_fee_per_gas,
        max_priority_fee_per_gas,
        value,
        data,
        access_list,
    } = request;

    let use_eip1559 = defaults.hardfork >= Hardfork::London && gas_price.is_none();

    let common = CommonFields {
        chain_id: defaults.chain_id,
        nonce: defaults.nonce,
        gas_limit: gas.unwrap_or(defaults.gas_limit),
        kind: to.map_or(TxKind::Create, TxKind::Call),
        value: value.unwrap_or(U256::ZERO),
        input: data.unwrap_or_default(),
    };

    build_request(
        common,
        defaults.hardfork,
        gas_price,
        use_eip1559,
        access_list,
        || Ok(defaults.gas_price),
        || {
            let max_priority_fee_per_gas = max_priority_fee_per_gas.unwrap_or(0);
            let max_fee_per_gas = max_fee_per_gas.unwrap_or(max_priority_fee_per_gas);

            Ok((max_fee_per_gas, max_priority_fee_per_gas.min(max_fee_per_gas)))
        },
    )
}

#[cfg(test)]
mod tests {
    use devnet_primitives::address;

    use super::*;

    const SENDER: Address = address!("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");

    fn defaults(hardfork: Hardfork) -> RequestDefaults {
        RequestDefaults {
            chain_id: 31337,
            hardfork,
            gas_limit: 30_000_000,
            nonce: 7,
            gas_price: 8_000_000_000,
        }
    }

    #[test]
    fn mixed_fee_fields_are_rejected() {
        let request = TransactionRequest {
            from: SENDER,
            gas_price: Some(1),
            max_fee_per_gas: Some(2),
            ..TransactionRequest::default()
        };

        let result = resolve_transaction_request(request, defaults(Hardfork::Cancun), Some(7));
        assert!(matches!(result, Err(NodeError::InvalidFeeFields)));
    }

    #[test]
    fn eip1559_fields_require_london() {
        let request = TransactionRequest {
            from: SENDER,
            max_priority_fee_per_gas: Some(2),
            ..TransactionRequest::default()
        };

        let result = resolve_transaction_request(request, defaults(Hardfork::Berlin), None);
        assert!(matches!(
            result,
            Err(NodeError::UnmetHardfork {
                minimum: Hardfork::London,
                ..
            })
        ));
    }

    #[test]
    fn default_eip1559_fees() -> anyhow::Result<()> {
        let request = TransactionRequest {
            from: SENDER,
            to: Some(Address::random()),
            ..TransactionRequest::default()
        };

        let resolved =
            resolve_transaction_request(request, defaults(Hardfork::Cancun), Some(1_000))?;
        let ResolvedRequest::Eip1559(request) = resolved else {
            anyhow::bail!("expected an EIP-1559 request");
        };

        assert_eq!(request.nonce, 7);
        assert_eq!(request.gas_limit, 30_000_000);
        assert_eq!(
            request.max_priority_fee_per_gas,
            DEFAULT_MAX_PRIORITY_FEE_PER_GAS
        );
        assert_eq!(
            request.max_fee_per_gas,
            2_000 + DEFAULT_MAX_PRIORITY_FEE_PER_GAS
        );

        Ok(())
    }

    #[test]
    fn priority_fee_is_capped_by_max_fee() -> anyhow::Result<()> {
        let request = TransactionRequest {
            from: SENDER,
            max_fee_per_gas: Some(10),
            ..TransactionRequest::default()
        };

        let resolved = resolve_transaction_request(request, defaults(Hardfork::Cancun), Some(1))?;
        let ResolvedRequest::Eip1559(request) = resolved else {
            anyhow::bail!("expected an EIP-1559 request");
        };

        assert_eq!(request.max_priority_fee_per_gas, 10);

        Ok(())
    }

    #[test]
    fn gas_price_before_london_is_legacy() -> anyhow::Result<()> {
        let request = TransactionRequest {
            from: SENDER,
            gas_price: Some(1),
            nonce: Some(0),
            ..TransactionRequest::default()
        };

        let resolved = resolve_transaction_request(request, defaults(Hardfork::Berlin), None)?;
        let ResolvedRequest::Eip155(request) = resolved else {
            anyhow::bail!("expected an EIP-155 request");
        };

        assert_eq!(request.gas_price, 1);
        assert_eq!(request.nonce, 0);
        assert_eq!(request.chain_id, 31337);

        Ok(())
    }

    #[test]
    fn access_list_selects_eip2930() -> anyhow::Result<()> {
        let request = TransactionRequest {
            from: SENDER,
            gas_price: Some(1),
            access_list: Some(Vec::new()),
            ..TransactionRequest::default()
        };

        let resolved = resolve_transaction_request(request, defaults(Hardfork::Berlin), None)?;
        assert!(matches!(resolved, ResolvedRequest::Eip2930(_)));

        Ok(())
    }

    #[test]
    fn gas_limit_can_be_replaced() {
        let resolved = ResolvedRequest::Eip155(request::Eip155 {
            nonce: 0,
            gas_price: 1,
            gas_limit: 21_000,
            kind: TxKind::Create,
            value: U256::ZERO,
            input: Bytes::new(),
            chain_id: 1,
        });

        assert_eq!(resolved.with_gas_limit(50_000).gas_limit(), 50_000);
    }

    #[test]
    fn call_fees_default_to_zero() -> anyhow::Result<()> {
        let request = CallRequest {
            to: Some(SENDER),
            ..CallRequest::default()
        };

        let resolved = resolve_call_request(request, defaults(Hardfork::Cancun))?;
        let ResolvedRequest::Eip1559(request) = resolved else {
            anyhow::bail!("expected an EIP-1559 request");
        };

        assert_eq!(request.max_fee_per_gas, 0);
        assert_eq!(request.max_priority_fee_per_gas, 0);
        assert_eq!(request.gas_limit, 30_000_000);

        Ok(())
    }
}
