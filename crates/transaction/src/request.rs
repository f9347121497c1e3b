//! Unsigned transaction requests.

use alloy_rlp::Encodable;
use devnet_primitives::{Address, B256, Bytes, TxKind, U256, keccak256};

use crate::{
    AccessListItem, Signed, TransactionType,
    signature::{Fakeable, SecretKey, Signature, SignatureError},
    signed,
    utils::{encode_list, enveloped},
};

/// A legacy transaction request without replay protection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Legacy {
    /// Nonce
    pub nonce: u64,
    /// Gas price
    pub gas_price: u128,
    /// Gas limit
    pub gas_limit: u64,
    /// Call or create
    pub kind: TxKind,
    /// Value
    pub value: U256,
    /// Input data
    pub input: Bytes,
}

/// A legacy transaction request with EIP-155 replay protection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Eip155 {
    /// Nonce
    pub nonce: u64,
    /// Gas price
    pub gas_price: u128,
    /// Gas limit
    pub gas_limit: u64,
    /// Call or create
    pub kind: TxKind,
    /// Value
    pub value: U256,
    /// Input data
    pub input: Bytes,
    /// Chain ID
    pub chain_id: u64,
}

/// An EIP-2930 access list transaction request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Eip2930 {
    /// Chain ID
    pub chain_id: u64,
    /// Nonce
    pub nonce: u64,
    /// Gas price
    pub gas_price: u128,
    /// Gas limit
    pub gas_limit: u64,
    /// Call or create
    pub kind: TxKind,
    /// Value
    pub value: U256,
    /// Input data
    pub input: Bytes,
    /// Access list
    pub access_list: Vec<AccessListItem>,
}

/// An EIP-1559 fee market transaction request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Eip1559 {
    /// Chain ID
    pub chain_id: u64,
    /// Nonce
    pub nonce: u64,
    /// Maximum fee per gas paid to the block producer
    pub max_priority_fee_per_gas: u128,
    /// Maximum total fee per gas
    pub max_fee_per_gas: u128,
    /// Gas limit
    pub gas_limit: u64,
    /// Call or create
    pub kind: TxKind,
    /// Value
    pub value: U256,
    /// Input data
    pub input: Bytes,
    /// Access list
    pub access_list: Vec<AccessListItem>,
}

impl Legacy {
    pub(crate) fn fields(&self) -> [&dyn Encodable; 6] {
        [
            &self.nonce,
            &self.gas_price,
            &self.gas_limit,
            &self.kind,
            &self.value,
            &self.input,
        ]
    }

    /// The hash that is signed.
    pub fn signing_hash(&self) -> B256 {
        keccak256(encode_list(&self.fields()))
    }
}

impl Eip155 {
    pub(crate) fn fields(&self) -> [&dyn Encodable; 6] {
        [
            &self.nonce,
            &self.gas_price,
            &self.gas_limit,
            &self.kind,
            &self.value,
            &self.input,
        ]
    }

    /// The hash that is signed.
    pub fn signing_hash(&self) -> B256 {
        let replay_protection: [&dyn Encodable; 3] = [&self.chain_id, &0u8, &0u8];

        let mut fields = self.fields().to_vec();
        fields.extend_from_slice(&replay_protection);

        keccak256(encode_list(&fields))
    }
}

impl Eip2930 {
    pub(crate) fn fields(&self) -> [&dyn Encodable; 8] {
        [
            &self.chain_id,
            &self.nonce,
            &self.gas_price,
            &self.gas_limit,
            &self.kind,
            &self.value,
            &self.input,
            &self.access_list,
        ]
    }

    /// The hash that is signed.
    pub fn signing_hash(&self) -> B256 {
        keccak256(enveloped(
            TransactionType::Eip2930,
            &encode_list(&self.fields()),
        ))
    }
}

impl Eip1559 {
    pub(crate) fn fields(&self) -> [&dyn Encodable; 9] {
        [
            &self.chain_id,
            &self.nonce,
            &self.max_priority_fee_per_gas,
            &self.max_fee_per_gas,
            &self.gas_limit,
            &self.kind,
            &self.value,
            &self.input,
            &self.access_list,
        ]
    }

    /// The hash that is signed.
    pub fn signing_hash(&self) -> B256 {
        keccak256(enveloped(
            TransactionType::Eip1559,
            &encode_list(&self.fields()),
        ))
    }
}

macro_rules! impl_signing {
    ($request:ident, $variant:ident) => {
        impl $request {
            /// Signs the request with the provided secret key.
            pub fn sign(self, secret_key: &SecretKey) -> Result<signed::$request, SignatureError> {
                let hash = self.signing_hash();
                let signature = Signature::sign_hash(&hash, secret_key)?;

                Ok(signed::$request::new(
                    self,
                    Fakeable::recover(signature, &hash)?,
                ))
            }

            /// Creates a transaction with a fake signature for the provided
            /// caller, used for impersonation.
            pub fn fake_sign(self, caller: Address) -> signed::$request {
                signed::$request::new(self, Fakeable::fake(caller))
            }
        }

        impl From<signed::$request> for Signed {
            fn from(transaction: signed::$request) -> Self {
                Signed::$variant(transaction)
            }
        }
    };
}

impl_signing!(Legacy, PreEip155Legacy);
impl_signing!(Eip155, PostEip155Legacy);
impl_signing!(Eip2930, Eip2930);
impl_signing!(Eip1559, Eip1559);

#[cfg(test)]
mod tests {
    use devnet_primitives::address;

    use super::*;
    use crate::signature::{secret_key_from_str, secret_key_to_address};

    const SECRET_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn dummy_eip1559() -> Eip1559 {
        Eip1559 {
            chain_id: 123,
            nonce: 0,
            max_priority_fee_per_gas: 1,
            max_fee_per_gas: 2,
            gas_limit: 30_000,
            kind: TxKind::Call(address!("0x0000000000000000000000000000000000000001")),
            value: U256::from(3),
            input: Bytes::new(),
            access_list: Vec::new(),
        }
    }

    #[test]
    fn signing_recovers_the_signer() -> anyhow::Result<()> {
        let secret_key = secret_key_from_str(SECRET_KEY)?;
        let transaction = dummy_eip1559().sign(&secret_key)?;

        assert_eq!(*transaction.caller(), secret_key_to_address(&secret_key));
        Ok(())
    }

    #[test]
    fn eip155_signing_hash_depends_on_chain_id() {
        let request = Eip155 {
            nonce: 0,
            gas_price: 1,
            gas_limit: 21_000,
            kind: TxKind::Create,
            value: U256::ZERO,
            input: Bytes::new(),
            chain_id: 1,
        };
        let other_chain = Eip155 {
            chain_id: 2,
            ..request.clone()
        };

        assert_ne!(request.signing_hash(), other_chain.signing_hash());
    }

    #[test]
    fn fake_signatures_differ_per_sender() {
        let first = dummy_eip1559().fake_sign(Address::random());
        let second = dummy_eip1559().fake_sign(Address::random());

        assert_ne!(first.transaction_hash(), second.transaction_hash());
    }
}
