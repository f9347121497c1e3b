#![warn(missing_docs)]

//! Ethereum transaction types.
//!
//! The supported transaction shapes form a closed set, represented by the
//! [`Signed`] enum. Every fee or signing decision matches on it exhaustively.

mod gas;
pub mod request;
/// Transaction signatures.
pub mod signature;
pub mod signed;
mod utils;
mod validation;

use devnet_primitives::{Address, B256, Bytes, TxKind, U256};

pub use self::{
    gas::{initial_cost, intrinsic_gas},
    validation::{CreationError, upfront_cost, validate},
};

/// An entry of an EIP-2930 access list.
#[derive(Clone, Debug, Default, PartialEq, Eq, alloy_rlp::RlpEncodable, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessListItem {
    /// Accessed address
    pub address: Address,
    /// Accessed storage keys
    pub storage_keys: Vec<B256>,
}

/// The type of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TransactionType {
    /// Legacy transaction
    Legacy = 0,
    /// EIP-2930 transaction
    Eip2930 = 1,
    /// EIP-1559 transaction
    Eip1559 = 2,
}

impl From<TransactionType> for u8 {
    fn from(value: TransactionType) -> Self {
        value as u8
    }
}

/// A signed transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signed {
    /// Legacy transaction without replay protection
    PreEip155Legacy(signed::Legacy),
    /// Legacy transaction with EIP-155 replay protection
    PostEip155Legacy(signed::Eip155),
    /// EIP-2930 access list transaction
    Eip2930(signed::Eip2930),
    /// EIP-1559 fee market transaction
    Eip1559(signed::Eip1559),
}

macro_rules! field {
    ($self:ident, $name:ident) => {
        match $self {
            Signed::PreEip155Legacy(tx) => &tx.request().$name,
            Signed::PostEip155Legacy(tx) => &tx.request().$name,
            Signed::Eip2930(tx) => &tx.request().$name,
            Signed::Eip1559(tx) => &tx.request().$name,
        }
    };
}

impl Signed {
    /// The address of the sender.
    pub fn caller(&self) -> &Address {
        match self {
            Signed::PreEip155Legacy(tx) => tx.caller(),
            Signed::PostEip155Legacy(tx) => tx.caller(),
            Signed::Eip2930(tx) => tx.caller(),
            Signed::Eip1559(tx) => tx.caller(),
        }
    }

    /// The hash of the transaction.
    pub fn transaction_hash(&self) -> &B256 {
        match self {
            Signed::PreEip155Legacy(tx) => tx.transaction_hash(),
            Signed::PostEip155Legacy(tx) => tx.transaction_hash(),
            Signed::Eip2930(tx) => tx.transaction_hash(),
            Signed::Eip1559(tx) => tx.transaction_hash(),
        }
    }

    /// The network encoding of the transaction.
    pub fn encoded(&self) -> Vec<u8> {
        match self {
            Signed::PreEip155Legacy(tx) => tx.encoded(),
            Signed::PostEip155Legacy(tx) => tx.encoded(),
            Signed::Eip2930(tx) => tx.encoded(),
            Signed::Eip1559(tx) => tx.encoded(),
        }
    }

    /// Whether the transaction was created with a fake signature.
    pub fn is_impersonated(&self) -> bool {
        match self {
            Signed::PreEip155Legacy(tx) => tx.signature().is_fake(),
            Signed::PostEip155Legacy(tx) => tx.signature().is_fake(),
            Signed::Eip2930(tx) => tx.signature().is_fake(),
            Signed::Eip1559(tx) => tx.signature().is_fake(),
        }
    }

    /// The type of the transaction.
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Signed::PreEip155Legacy(_) | Signed::PostEip155Legacy(_) => TransactionType::Legacy,
            Signed::Eip2930(_) => TransactionType::Eip2930,
            Signed::Eip1559(_) => TransactionType::Eip1559,
        }
    }

    /// The nonce of the transaction.
    pub fn nonce(&self) -> u64 {
        *field!(self, nonce)
    }

    /// The gas limit of the transaction.
    pub fn gas_limit(&self) -> u64 {
        *field!(self, gas_limit)
    }

    /// The gas price, or the maximum fee per gas for EIP-1559 transactions.
    pub fn gas_price(&self) -> u128 {
        match self {
            Signed::PreEip155Legacy(tx) => tx.request().gas_price,
            Signed::PostEip155Legacy(tx) => tx.request().gas_price,
            Signed::Eip2930(tx) => tx.request().gas_price,
            Signed::Eip1559(tx) => tx.request().max_fee_per_gas,
        }
    }

    /// The maximum fee per gas, if the transaction has fee market fields.
    pub fn max_fee_per_gas(&self) -> Option<u128> {
        match self {
            Signed::PreEip155Legacy(_) | Signed::PostEip155Legacy(_) | Signed::Eip2930(_) => None,
            Signed::Eip1559(tx) => Some(tx.request().max_fee_per_gas),
        }
    }

    /// The maximum priority fee per gas, if the transaction has fee market
    /// fields.
    pub fn max_priority_fee_per_gas(&self) -> Option<u128> {
        match self {
            Signed::PreEip155Legacy(_) | Signed::PostEip155Legacy(_) | Signed::Eip2930(_) => None,
            Signed::Eip1559(tx) => Some(tx.request().max_priority_fee_per_gas),
        }
    }

    /// Whether the transaction calls an account or creates a contract.
    pub fn kind(&self) -> TxKind {
        *field!(self, kind)
    }

    /// The value transferred.
    pub fn value(&self) -> &U256 {
        field!(self, value)
    }

    /// The input data.
    pub fn data(&self) -> &Bytes {
        field!(self, input)
    }

    /// The chain ID, if the transaction is replay-protected.
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Signed::PreEip155Legacy(_) => None,
            Signed::PostEip155Legacy(tx) => Some(tx.request().chain_id),
            Signed::Eip2930(tx) => Some(tx.request().chain_id),
            Signed::Eip1559(tx) => Some(tx.request().chain_id),
        }
    }

    /// The access list, if the transaction has one.
    pub fn access_list(&self) -> Option<&[AccessListItem]> {
        match self {
            Signed::PreEip155Legacy(_) | Signed::PostEip155Legacy(_) => None,
            Signed::Eip2930(tx) => Some(&tx.request().access_list),
            Signed::Eip1559(tx) => Some(&tx.request().access_list),
        }
    }

    /// The price per gas the sender pays in a block with the provided base fee.
    pub fn effective_gas_price(&self, base_fee: Option<u128>) -> u128 {
        match self {
            Signed::PreEip155Legacy(_) | Signed::PostEip155Legacy(_) | Signed::Eip2930(_) => {
                self.gas_price()
            }
            Signed::Eip1559(tx) => {
                let request = tx.request();
                base_fee.map_or(request.max_fee_per_gas, |base_fee| {
                    request
                        .max_fee_per_gas
                        .min(base_fee.saturating_add(request.max_priority_fee_per_gas))
                })
            }
        }
    }

    /// The fee per gas that the block producer receives in a block with the
    /// provided base fee, or `None` if the transaction cannot pay the base fee.
    pub fn effective_miner_fee(&self, base_fee: Option<u128>) -> Option<u128> {
        let base_fee = base_fee.unwrap_or(0);
        let max_fee = self.gas_price();
        if max_fee < base_fee {
            return None;
        }

        Some(match self.max_priority_fee_per_gas() {
            Some(max_priority_fee) => max_priority_fee.min(max_fee - base_fee),
            None => max_fee - base_fee,
        })
    }
}
