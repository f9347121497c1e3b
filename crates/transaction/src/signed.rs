//! Signed transactions.

use std::sync::OnceLock;

use alloy_rlp::Encodable;
use devnet_primitives::{Address, B256, keccak256};

use crate::{
    TransactionType, request,
    signature::{Fakeable, Signature},
    utils::{encode_list, enveloped},
};

/// A signed pre-EIP-155 legacy transaction.
pub type Legacy = SignedRequest<request::Legacy>;
/// A signed EIP-155 legacy transaction.
pub type Eip155 = SignedRequest<request::Eip155>;
/// A signed EIP-2930 transaction.
pub type Eip2930 = SignedRequest<request::Eip2930>;
/// A signed EIP-1559 transaction.
pub type Eip1559 = SignedRequest<request::Eip1559>;

/// Encoding of a request together with its signature.
pub trait SignedEncoding {
    /// Returns the network encoding of the request signed with the provided
    /// signature.
    fn encode_signed(&self, signature: &Signature) -> Vec<u8>;
}

impl SignedEncoding for request::Legacy {
    fn encode_signed(&self, signature: &Signature) -> Vec<u8> {
        let v = signature.legacy_v(None);
        let signature_fields: [&dyn Encodable; 3] = [&v, &signature.r, &signature.s];

        let mut fields = self.fields().to_vec();
        fields.extend_from_slice(&signature_fields);
        encode_list(&fields)
    }
}

impl SignedEncoding for request::Eip155 {
    fn encode_signed(&self, signature: &Signature) -> Vec<u8> {
        let v = signature.legacy_v(Some(self.chain_id));
        let signature_fields: [&dyn Encodable; 3] = [&v, &signature.r, &signature.s];

        let mut fields = self.fields().to_vec();
        fields.extend_from_slice(&signature_fields);
        encode_list(&fields)
    }
}

impl SignedEncoding for request::Eip2930 {
    fn encode_signed(&self, signature: &Signature) -> Vec<u8> {
        let signature_fields: [&dyn Encodable; 3] =
            [&signature.y_parity, &signature.r, &signature.s];

        let mut fields = self.fields().to_vec();
        fields.extend_from_slice(&signature_fields);
        enveloped(TransactionType::Eip2930, &encode_list(&fields))
    }
}

impl SignedEncoding for request::Eip1559 {
    fn encode_signed(&self, signature: &Signature) -> Vec<u8> {
        let signature_fields: [&dyn Encodable; 3] =
            [&signature.y_parity, &signature.r, &signature.s];

        let mut fields = self.fields().to_vec();
        fields.extend_from_slice(&signature_fields);
        enveloped(TransactionType::Eip1559, &encode_list(&fields))
    }
}

/// A transaction request with its (possibly fake) signature.
#[derive(Clone, Debug)]
pub struct SignedRequest<RequestT> {
    request: RequestT,
    signature: Fakeable,
    /// Cached transaction hash
    hash: OnceLock<B256>,
}

impl<RequestT> SignedRequest<RequestT> {
    pub(crate) fn new(request: RequestT, signature: Fakeable) -> Self {
        Self {
            request,
            signature,
            hash: OnceLock::new(),
        }
    }

    /// The unsigned request.
    pub fn request(&self) -> &RequestT {
        &self.request
    }

    /// The address of the sender.
    pub fn caller(&self) -> &Address {
        self.signature.caller()
    }

    /// The signature.
    pub fn signature(&self) -> &Fakeable {
        &self.signature
    }
}

impl<RequestT: SignedEncoding> SignedRequest<RequestT> {
    /// The network encoding of the transaction.
    pub fn encoded(&self) -> Vec<u8> {
        self.request.encode_signed(&self.signature.as_signature())
    }

    /// The hash of the transaction.
    pub fn transaction_hash(&self) -> &B256 {
        self.hash.get_or_init(|| keccak256(self.encoded()))
    }
}

impl<RequestT: PartialEq> PartialEq for SignedRequest<RequestT> {
    fn eq(&self, other: &Self) -> bool {
        self.request == other.request && self.signature == other.signature
    }
}

impl<RequestT: Eq> Eq for SignedRequest<RequestT> {}
