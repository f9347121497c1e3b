use alloy_rlp::Encodable;

use crate::TransactionType;

/// RLP-encodes the provided fields as a list.
pub(crate) fn encode_list(fields: &[&dyn Encodable]) -> Vec<u8> {
    let payload_length = fields.iter().map(|field| field.length()).sum();
    let header = alloy_rlp::Header {
        list: true,
        payload_length,
    };

    let mut out = Vec::with_capacity(header.length() + payload_length);
    header.encode(&mut out);
    for field in fields {
        field.encode(&mut out);
    }

    out
}

/// Prefixes a typed transaction payload with its type byte.
pub(crate) fn enveloped(transaction_type: TransactionType, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(transaction_type.into());
    out.extend_from_slice(payload);
    out
}
