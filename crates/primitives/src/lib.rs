#![warn(missing_docs)]

//! Primitive types shared by all devnet crates.

pub use alloy_primitives::{
    Address, B64, B256, Bloom, BloomInput, Bytes, Log, LogData, TxKind, U64, U256, address, b256,
    bytes, hex, keccak256,
    map::{HashMap, HashSet, hash_map},
};

/// Hash of empty bytecode.
pub const KECCAK_EMPTY: B256 = alloy_primitives::KECCAK256_EMPTY;

/// Root hash of an empty trie.
pub const KECCAK_NULL_RLP: B256 =
    b256!("0x56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

/// Hash of an RLP-encoded empty list.
pub const KECCAK_RLP_EMPTY_ARRAY: B256 =
    b256!("0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347");

/// The number of wei in one ether.
pub const ONE_ETHER: u128 = 1_000_000_000_000_000_000;
