use devnet_hardfork::{
    Hardfork,
    eip1559::{BaseFeeParams, INITIAL_BASE_FEE},
};
use devnet_primitives::{
    Address, B64, B256, Bloom, Bytes, KECCAK_NULL_RLP, KECCAK_RLP_EMPTY_ARRAY, U256, b256,
    keccak256,
};

/// SHA-256 of an empty list of EIP-7685 requests.
const EMPTY_REQUESTS_HASH: B256 =
    b256!("0xe3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");

/// ethereum block header
#[derive(Clone, Debug, Default, PartialEq, Eq, alloy_rlp::RlpDecodable, alloy_rlp::RlpEncodable)]
#[rlp(trailing)]
pub struct BlockHeader {
    /// The parent block's hash
    pub parent_hash: B256,
    /// The ommers' root hash
    pub ommers_hash: B256,
    /// The block's beneficiary address
    pub beneficiary: Address,
    /// The state's root hash
    pub state_root: B256,
    /// The transactions' root hash
    pub transactions_root: B256,
    /// The receipts' root hash
    pub receipts_root: B256,
    /// The logs' bloom
    pub logs_bloom: Bloom,
    /// The block's difficulty
    pub difficulty: U256,
    /// The block's number
    pub number: u64,
    /// The block's gas limit
    pub gas_limit: u64,
    /// The amount of gas used by the block
    pub gas_used: u64,
    /// The block's timestamp
    pub timestamp: u64,
    /// The block's extra data
    pub extra_data: Bytes,
    /// The block's mix hash
    pub mix_hash: B256,
    /// The block's nonce
    pub nonce: B64,
    /// `BaseFee` was added by EIP-1559 and is ignored in legacy headers.
    pub base_fee_per_gas: Option<u128>,
    /// `WithdrawalsHash` was added by EIP-4895 and is ignored in legacy
    /// headers.
    pub withdrawals_root: Option<B256>,
    /// Blob gas used was added by EIP-4844 and is ignored in older headers.
    pub blob_gas_used: Option<u64>,
    /// Excess blob gas was added by EIP-4844 and is ignored in older headers.
    pub excess_blob_gas: Option<u64>,
    /// The hash tree root of the parent beacon block for the given execution
    /// block (EIP-4788).
    pub parent_beacon_block_root: Option<B256>,
    /// The commitment hash calculated for a list of [EIP-7685] data requests.
    ///
    /// [EIP-7685]: https://eips.ethereum.org/EIPS/eip-7685
    pub requests_hash: Option<B256>,
}

impl BlockHeader {
    /// Constructs a header from the provided [`PartialHeader`] and hashtree
    /// root of the transactions.
    pub fn new(partial_header: PartialHeader, transactions_root: B256) -> Self {
        Self {
            parent_hash: partial_header.parent_hash,
            ommers_hash: partial_header.ommers_hash,
            beneficiary: partial_header.beneficiary,
            state_root: partial_header.state_root,
            transactions_root,
            receipts_root: partial_header.receipts_root,
            logs_bloom: partial_header.logs_bloom,
            difficulty: partial_header.difficulty,
            number: partial_header.number,
            gas_limit: partial_header.gas_limit,
            gas_used: partial_header.gas_used,
            timestamp: partial_header.timestamp,
            extra_data: partial_header.extra_data,
            mix_hash: partial_header.mix_hash,
            nonce: partial_header.nonce,
            base_fee_per_gas: partial_header.base_fee,
            withdrawals_root: partial_header.withdrawals_root,
            blob_gas_used: partial_header.blob_gas_used,
            excess_blob_gas: partial_header.excess_blob_gas,
            parent_beacon_block_root: partial_header.parent_beacon_block_root,
            requests_hash: partial_header.requests_hash,
        }
    }

    /// Calculates the block's hash.
    pub fn hash(&self) -> B256 {
        let encoded = alloy_rlp::encode(self);
        keccak256(encoded)
    }
}

/// Data of a block header that can be overridden when mining a block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderOverrides {
    /// The parent block's hash
    pub parent_hash: Option<B256>,
    /// The block's beneficiary
    pub beneficiary: Option<Address>,
    /// The state's root hash
    pub state_root: Option<B256>,
    /// The block's difficulty
    pub difficulty: Option<U256>,
    /// The block's number
    pub number: Option<u64>,
    /// The block's gas limit
    pub gas_limit: Option<u64>,
    /// The block's timestamp
    pub timestamp: Option<u64>,
    /// The block's extra data
    pub extra_data: Option<Bytes>,
    /// The block's mix hash (or prevrandao)
    pub mix_hash: Option<B256>,
    /// The block's nonce
    pub nonce: Option<B64>,
    /// The block's base gas fee
    pub base_fee: Option<u128>,
    /// Base fee params to calculate the base fee, if it is not set
    pub base_fee_params: Option<BaseFeeParams>,
    /// The block's withdrawals root
    pub withdrawals_root: Option<B256>,
    /// The hash tree root of the parent beacon block
    pub parent_beacon_block_root: Option<B256>,
}

/// Partial header definition without transactions root
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartialHeader {
    /// The parent block's hash
    pub parent_hash: B256,
    /// The ommers' root hash
    pub ommers_hash: B256,
    /// The block's beneficiary address
    pub beneficiary: Address,
    /// The state's root hash
    pub state_root: B256,
    /// The receipts' root hash
    pub receipts_root: B256,
    /// The logs' bloom
    pub logs_bloom: Bloom,
    /// The block's difficulty
    pub difficulty: U256,
    /// The block's number
    pub number: u64,
    /// The block's gas limit
    pub gas_limit: u64,
    /// The amount of gas used by the block
    pub gas_used: u64,
    /// The block's timestamp
    pub timestamp: u64,
    /// The block's extra data
    pub extra_data: Bytes,
    /// The block's mix hash
    pub mix_hash: B256,
    /// The block's nonce
    pub nonce: B64,
    /// `BaseFee` was added by EIP-1559 and is ignored in legacy headers.
    pub base_fee: Option<u128>,
    /// `WithdrawalsHash` was added by EIP-4895 and is ignored in legacy
    /// headers.
    pub withdrawals_root: Option<B256>,
    /// Blob gas used was added by EIP-4844 and is ignored in older headers.
    pub blob_gas_used: Option<u64>,
    /// Excess blob gas was added by EIP-4844 and is ignored in older headers.
    pub excess_blob_gas: Option<u64>,
    /// The hash tree root of the parent beacon block for the given execution
    /// block (EIP-4788).
    pub parent_beacon_block_root: Option<B256>,
    /// The commitment hash calculated for a list of EIP-7685 data requests.
    pub requests_hash: Option<B256>,
}

impl PartialHeader {
    /// Constructs a new instance based on the provided [`HeaderOverrides`] and
    /// parent [`BlockHeader`] for the given [`Hardfork`].
    pub fn new(
        block_config: &BlockConfig,
        overrides: HeaderOverrides,
        parent: Option<&BlockHeader>,
    ) -> Self {
        let BlockConfig {
            base_fee_params,
            hardfork,
        } = block_config;
        let hardfork = *hardfork;

        let timestamp = overrides.timestamp.unwrap_or_default();
        let number = overridden_block_number(parent, &overrides);

        let parent_hash = overrides.parent_hash.unwrap_or_else(|| {
            if let Some(parent) = parent {
                parent.hash()
            } else {
                B256::ZERO
            }
        });

        let base_fee = overrides.base_fee.or_else(|| {
            if hardfork >= Hardfork::London {
                Some(if let Some(parent) = &parent {
                    calculate_next_base_fee_per_gas(
                        parent,
                        overrides
                            .base_fee_params
                            .as_ref()
                            .unwrap_or(base_fee_params),
                        hardfork,
                    )
                } else {
                    u128::from(INITIAL_BASE_FEE)
                })
            } else {
                None
            }
        });

        let is_cancun = hardfork >= Hardfork::Cancun;

        Self {
            parent_hash,
            ommers_hash: KECCAK_RLP_EMPTY_ARRAY,
            beneficiary: overrides.beneficiary.unwrap_or_default(),
            state_root: overrides.state_root.unwrap_or(KECCAK_NULL_RLP),
            receipts_root: KECCAK_NULL_RLP,
            logs_bloom: Bloom::default(),
            difficulty: overrides.difficulty.unwrap_or_else(|| {
                if hardfork >= Hardfork::Merge {
                    U256::ZERO
                } else {
                    parent.map_or(U256::from(1), |parent| parent.difficulty)
                }
            }),
            number,
            gas_limit: overrides.gas_limit.unwrap_or(1_000_000),
            gas_used: 0,
            timestamp,
            extra_data: overrides.extra_data.unwrap_or_default(),
            mix_hash: overrides.mix_hash.unwrap_or_default(),
            nonce: overrides.nonce.unwrap_or_else(|| {
                if hardfork >= Hardfork::Merge {
                    B64::ZERO
                } else {
                    B64::from(66u64)
                }
            }),
            base_fee,
            withdrawals_root: overrides.withdrawals_root.or_else(|| {
                if hardfork >= Hardfork::Shanghai {
                    Some(KECCAK_NULL_RLP)
                } else {
                    None
                }
            }),
            blob_gas_used: is_cancun.then_some(0),
            excess_blob_gas: is_cancun.then_some(0),
            parent_beacon_block_root: overrides.parent_beacon_block_root.or_else(|| {
                if is_cancun {
                    // Initial value from https://eips.ethereum.org/EIPS/eip-4788
                    Some(B256::ZERO)
                } else {
                    None
                }
            }),
            requests_hash: (hardfork >= Hardfork::Prague).then_some(EMPTY_REQUESTS_HASH),
        }
    }
}

impl From<BlockHeader> for PartialHeader {
    fn from(header: BlockHeader) -> PartialHeader {
        Self {
            parent_hash: header.parent_hash,
            ommers_hash: header.ommers_hash,
            beneficiary: header.beneficiary,
            state_root: header.state_root,
            receipts_root: header.receipts_root,
            logs_bloom: header.logs_bloom,
            difficulty: header.difficulty,
            number: header.number,
            gas_limit: header.gas_limit,
            gas_used: header.gas_used,
            timestamp: header.timestamp,
            extra_data: header.extra_data,
            mix_hash: header.mix_hash,
            nonce: header.nonce,
            base_fee: header.base_fee_per_gas,
            withdrawals_root: header.withdrawals_root,
            blob_gas_used: header.blob_gas_used,
            excess_blob_gas: header.excess_blob_gas,
            parent_beacon_block_root: header.parent_beacon_block_root,
            requests_hash: header.requests_hash,
        }
    }
}

/// Defines the configurations needed for building a block
#[derive(Clone, Debug)]
pub struct BlockConfig {
    /// Associated base fee params
    pub base_fee_params: BaseFeeParams,
    /// Associated hardfork
    pub hardfork: Hardfork,
}

/// Determines the block number based on the provided parent header and
/// (potential) overrides.
pub fn overridden_block_number(
    parent_header: Option<&BlockHeader>,
    overrides: &HeaderOverrides,
) -> u64 {
    overrides.number.unwrap_or({
        if let Some(parent) = parent_header {
            parent.number + 1
        } else {
            0
        }
    })
}

/// Calculates the next base fee for a post-London block, given the parent's
/// header.
///
/// # Panics
///
/// Panics if the base fee params have no entry for post-London hardforks.
pub fn calculate_next_base_fee_per_gas(
    parent: &BlockHeader,
    base_fee_params: &BaseFeeParams,
    hardfork: Hardfork,
) -> u128 {
    let base_fee_params = base_fee_params
        .at_condition(hardfork, parent.number + 1)
        .copied()
        .expect("Chain must have base fee params for post-London hardforks");

    let gas_used = u128::from(parent.gas_used);
    let gas_limit = u128::from(parent.gas_limit);

    // EIP-1559 specifies an initial base fee block number at which to use the
    // initial base fee, but we always use it if the parent block is missing the
    // base fee.
    let base_fee = parent
        .base_fee_per_gas
        .unwrap_or(u128::from(INITIAL_BASE_FEE));

    let gas_target = gas_limit / base_fee_params.elasticity_multiplier;

    match gas_used.cmp(&gas_target) {
        core::cmp::Ordering::Equal => base_fee,
        core::cmp::Ordering::Greater => {
            base_fee
                + core::cmp::max(
                    // Ensure a minimum increase of 1.
                    1,
                    base_fee * (gas_used - gas_target)
                        / (gas_target * base_fee_params.max_change_denominator),
                )
        }
        core::cmp::Ordering::Less => base_fee.saturating_sub(
            base_fee * (gas_target - gas_used)
                / (gas_target * base_fee_params.max_change_denominator),
        ),
    }
}
