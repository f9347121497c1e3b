use std::{num::NonZeroU64, sync::Arc};

use devnet_block_api::{
    Block as _, BlockConfig, BlockReceipt, HeaderOverrides, LocalBlock, PartialHeader,
    log::{FilterLog, LogFilter},
};
use devnet_primitives::{Address, B256, HashMap};
use devnet_state_api::StateDiff;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use super::SparseBlockStorage;
use crate::InsertError;

/// A reservation for a sequence of blocks that have not yet been inserted into
/// storage.
#[derive(Clone, Debug)]
struct Reservation {
    first_number: u64,
    last_number: u64,
    interval: u64,
    previous_base_fee_per_gas: Option<u128>,
    previous_state_root: B256,
    previous_timestamp: u64,
    previous_gas_limit: u64,
    /// The number of state diffs that lead up to the reserved blocks' state
    previous_diff_count: usize,
    coinbase: Address,
    block_config: BlockConfig,
}

/// Parameters of the blocks that are being reserved, taken from the last
/// block before the reservation.
#[derive(Clone, Debug)]
pub struct ReservationParams {
    /// Number of seconds between consecutive reserved blocks
    pub interval: u64,
    /// Base fee of the previous block
    pub previous_base_fee_per_gas: Option<u128>,
    /// State root of the previous block
    pub previous_state_root: B256,
    /// Timestamp of the previous block
    pub previous_timestamp: u64,
    /// Gas limit of the previous block
    pub previous_gas_limit: u64,
    /// Beneficiary of the reserved blocks
    pub coinbase: Address,
    /// Configuration of the reserved blocks
    pub block_config: BlockConfig,
}

/// A storage solution for storing a subset of a blockchain's blocks in-memory,
/// while lazily loading blocks that have been reserved.
#[derive(Debug)]
pub struct ReservableSparseBlockStorage {
    reservations: RwLock<Vec<Reservation>>,
    storage: RwLock<SparseBlockStorage>,
    // We can store the state diffs contiguously, as reservations don't contain any diffs.
    // Diffs are a mapping from one state to the next, so the genesis block contains the initial
    // state.
    state_diffs: Vec<(u64, StateDiff)>,
    number_to_diff_index: HashMap<u64, usize>,
    last_block_number: u64,
}

impl ReservableSparseBlockStorage {
    /// Constructs a new instance with no blocks, continuing after the
    /// provided block number.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn empty(last_block_number: u64) -> Self {
        Self {
            reservations: RwLock::new(Vec::new()),
            storage: RwLock::new(SparseBlockStorage::default()),
            state_diffs: Vec::new(),
            number_to_diff_index: HashMap::default(),
            last_block_number,
        }
    }

    /// Constructs a new instance with the provided block as genesis block.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn with_genesis_block(block: LocalBlock, diff: StateDiff) -> Self {
        Self {
            reservations: RwLock::new(Vec::new()),
            storage: RwLock::new(SparseBlockStorage::with_block(block)),
            state_diffs: vec![(0, diff)],
            number_to_diff_index: std::iter::once((0, 0)).collect(),
            last_block_number: 0,
        }
    }

    /// Retrieves the block by hash, if it exists.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn block_by_hash(&self, hash: &B256) -> Option<Arc<LocalBlock>> {
        self.storage.read().block_by_hash(hash).cloned()
    }

    /// Retrieves the block by number, if it exists. Reserved blocks are
    /// materialised on first access.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn block_by_number(&self, number: u64) -> Result<Option<Arc<LocalBlock>>, InsertError> {
        Ok(self
            .try_fulfilling_reservation(number)?
            .or_else(|| self.storage.read().block_by_number(number).cloned()))
    }

    /// Retrieves the block that contains the transaction with the provided
    /// hash, if it exists.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn block_by_transaction_hash(&self, transaction_hash: &B256) -> Option<Arc<LocalBlock>> {
        self.storage
            .read()
            .block_by_transaction_hash(transaction_hash)
            .cloned()
    }

    /// Retrieves whether a block with the provided number exists, either
    /// materialised or reserved.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn contains_block_number(&self, number: u64) -> bool {
        if self.storage.read().contains_block_number(number) {
            return true;
        }

        find_reservation(&self.reservations.read(), number).is_some()
    }

    /// Retrieves the last block number.
    pub fn last_block_number(&self) -> u64 {
        self.last_block_number
    }

    /// Retrieves the logs of materialised blocks that match the provided
    /// filter. Reserved blocks are empty, so they contain no logs.
    pub fn logs(&self, filter: &LogFilter) -> Vec<FilterLog> {
        self.storage.read().logs(filter)
    }

    /// Retrieves the receipt of the transaction with the provided hash, if it
    /// exists.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn receipt_by_transaction_hash(&self, transaction_hash: &B256) -> Option<Arc<BlockReceipt>> {
        self.storage
            .read()
            .receipt_by_transaction_hash(transaction_hash)
            .cloned()
    }

    /// Retrieves the sequence of diffs from the genesis state to the state of
    /// the block with the provided number, if it exists.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn state_diffs_until_block(&self, block_number: u64) -> Option<&[(u64, StateDiff)]> {
        let diff_count = self
            .number_to_diff_index
            .get(&block_number)
            .map(|index| index + 1)
            .or_else(|| {
                let reservations = self.reservations.read();
                find_reservation(&reservations, block_number)
                    .map(|reservation| reservation.previous_diff_count)
            })?;

        self.state_diffs.get(..diff_count)
    }

    /// Inserts a block and its receipts. Errors if a block with the same hash
    /// or number already exists.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn insert_block(
        &mut self,
        block: LocalBlock,
        state_diff: StateDiff,
    ) -> Result<&Arc<LocalBlock>, InsertError> {
        let block_number = block.header().number;

        let block = self.storage.get_mut().insert_block(block)?;

        self.last_block_number = block_number;
        self.number_to_diff_index
            .insert(block_number, self.state_diffs.len());
        self.state_diffs.push((block_number, state_diff));

        Ok(block)
    }

    /// Reserves the provided number of blocks, starting from the next block
    /// number.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn reserve_blocks(&mut self, additional: NonZeroU64, params: ReservationParams) {
        let ReservationParams {
            interval,
            previous_base_fee_per_gas,
            previous_state_root,
            previous_timestamp,
            previous_gas_limit,
            coinbase,
            block_config,
        } = params;

        let reservation = Reservation {
            first_number: self.last_block_number + 1,
            last_number: self.last_block_number + additional.get(),
            interval,
            previous_base_fee_per_gas,
            previous_state_root,
            previous_timestamp,
            previous_gas_limit,
            previous_diff_count: self.state_diffs.len(),
            coinbase,
            block_config,
        };

        log::debug!(
            "Reserved blocks {}..={} with an interval of {interval} seconds",
            reservation.first_number,
            reservation.last_number
        );

        self.reservations.get_mut().push(reservation);
        self.last_block_number += additional.get();
    }

    /// Reverts to the block with the provided number, deleting all later
    /// blocks.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn revert_to_block(&mut self, block_number: u64) -> bool {
        if block_number > self.last_block_number {
            return false;
        }

        self.last_block_number = block_number;

        self.storage.get_mut().revert_to_block(block_number);

        // Only retain reservations that are not fully reverted
        self.reservations.get_mut().retain_mut(|reservation| {
            if reservation.last_number <= block_number {
                true
            } else if reservation.first_number <= block_number {
                reservation.last_number = block_number;
                true
            } else {
                false
            }
        });

        // Remove all diffs that are newer than the reverted block
        let diff_count = self
            .number_to_diff_index
            .get(&block_number)
            .map(|index| index + 1)
            .or_else(|| {
                find_reservation(self.reservations.get_mut(), block_number)
                    .map(|reservation| reservation.previous_diff_count)
            })
            // Reverting to a block that precedes all local blocks, e.g. the
            // fork block.
            .unwrap_or(0);

        self.state_diffs.truncate(diff_count);
        self.number_to_diff_index
            .retain(|number, _| *number <= block_number);

        true
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    fn try_fulfilling_reservation(
        &self,
        block_number: u64,
    ) -> Result<Option<Arc<LocalBlock>>, InsertError> {
        let reservations = self.reservations.upgradable_read();

        reservations
            .iter()
            .position(|reservation| {
                reservation.first_number <= block_number && block_number <= reservation.last_number
            })
            .map(|idx| {
                let mut reservations = RwLockUpgradableReadGuard::upgrade(reservations);
                let reservation = reservations.remove(idx);

                let timestamp = reservation.previous_timestamp
                    + reservation.interval * (block_number - reservation.first_number + 1);

                if block_number != reservation.first_number {
                    reservations.push(Reservation {
                        last_number: block_number - 1,
                        ..reservation.clone()
                    });
                }

                if block_number != reservation.last_number {
                    reservations.push(Reservation {
                        first_number: block_number + 1,
                        previous_timestamp: timestamp,
                        ..reservation.clone()
                    });
                }

                let block = LocalBlock::empty(PartialHeader::new(
                    &reservation.block_config,
                    HeaderOverrides {
                        number: Some(block_number),
                        beneficiary: Some(reservation.coinbase),
                        state_root: Some(reservation.previous_state_root),
                        base_fee: reservation.previous_base_fee_per_gas,
                        gas_limit: Some(reservation.previous_gas_limit),
                        timestamp: Some(timestamp),
                        ..HeaderOverrides::default()
                    },
                    None,
                ));

                // The reservation lock is held until the block is stored, so
                // concurrent lookups observe either the reservation or the block.
                let mut storage = self.storage.write();
                let block = storage.insert_block(block)?.clone();
                drop(reservations);

                Ok(block)
            })
            .transpose()
    }
}

fn find_reservation(reservations: &[Reservation], number: u64) -> Option<&Reservation> {
    reservations
        .iter()
        .find(|reservation| reservation.first_number <= number && number <= reservation.last_number)
}
