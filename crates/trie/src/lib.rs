#![warn(missing_docs)]

//! Merkle-Patricia trie root computations using Keccak-256.

use devnet_primitives::B256;
use hash256_std_hasher::Hash256StdHasher;
use sha3::{
    Digest, Keccak256,
    digest::generic_array::{GenericArray, typenum::consts::U32},
};

/// Computes the root of a trie containing the provided key-value pairs.
pub fn trie_root<I, K, V>(entries: I) -> B256
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<[u8]> + Ord,
    V: AsRef<[u8]>,
{
    into_b256(triehash::trie_root::<Keccak, _, _, _>(entries))
}

/// Computes the root of a trie whose keys are hashed before insertion, as
/// used by the account and storage tries.
pub fn sec_trie_root<I, K, V>(entries: I) -> B256
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<[u8]>,
    V: AsRef<[u8]>,
{
    into_b256(triehash::sec_trie_root::<Keccak, _, _, _>(entries))
}

/// Computes the root of a trie keyed by the RLP-encoded index of each value,
/// as used by the transactions and receipts tries.
pub fn ordered_trie_root<I, V>(values: I) -> B256
where
    I: IntoIterator<Item = V>,
    V: AsRef<[u8]>,
{
    into_b256(triehash::ordered_trie_root::<Keccak, I>(values))
}

fn into_b256(hash: GenericArray<u8, U32>) -> B256 {
    B256::from_slice(hash.as_slice())
}

struct Keccak;

impl hash_db::Hasher for Keccak {
    type Out = GenericArray<u8, U32>;

    type StdHasher = Hash256StdHasher;

    const LENGTH: usize = 32;

    fn hash(data: &[u8]) -> Self::Out {
        Keccak256::digest(data)
    }
}

#[cfg(test)]
mod tests {
    use devnet_primitives::KECCAK_NULL_RLP;

    use super::*;

    #[test]
    fn empty_roots_match_null_rlp() {
        assert_eq!(ordered_trie_root(Vec::<Vec<u8>>::new()), KECCAK_NULL_RLP);
        assert_eq!(
            sec_trie_root(Vec::<(Vec<u8>, Vec<u8>)>::new()),
            KECCAK_NULL_RLP
        );
        assert_eq!(trie_root(Vec::<(Vec<u8>, Vec<u8>)>::new()), KECCAK_NULL_RLP);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let first = sec_trie_root([(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]);
        let second =
            sec_trie_root([(b"b".to_vec(), b"2".to_vec()), (b"a".to_vec(), b"1".to_vec())]);

        assert_eq!(first, second);
        assert_ne!(first, KECCAK_NULL_RLP);
    }
}
