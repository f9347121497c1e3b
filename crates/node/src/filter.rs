use std::time::Duration;

use devnet_block_api::log::{FilterLog, LogFilter};
use devnet_primitives::{Address, B256, HashSet};

use crate::block_spec::BlockSpec;

/// Criteria of a log filter, as provided by the user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    /// First block of the range. Defaults to the latest block.
    pub from_block: Option<BlockSpec>,
    /// Last block of the range. Defaults to the latest block for queries,
    /// and to all future blocks for installed filters.
    pub to_block: Option<BlockSpec>,
    /// Emitting addresses. An empty set matches any address.
    pub addresses: HashSet<Address>,
    /// Topics per position. `None` matches any topic, otherwise any of the
    /// alternatives must match.
    pub topics: Vec<Option<Vec<B256>>>,
}

/// The kind of events a filter collects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    /// Logs of mined blocks
    Logs,
    /// Hashes of mined blocks
    NewBlocks,
    /// Hashes of transactions that were added to the mempool
    NewPendingTransactions,
}

/// Events collected by a filter since it was last polled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterChanges {
    /// Matching logs
    Logs(Vec<FilterLog>),
    /// Block or transaction hashes
    Hashes(Vec<B256>),
}

#[derive(Clone, Debug)]
pub(crate) enum FilterData {
    Logs {
        criteria: LogFilter,
        logs: Vec<FilterLog>,
    },
    NewHeads(Vec<B256>),
    NewPendingTransactions(Vec<B256>),
}

impl FilterData {
    pub fn kind(&self) -> FilterKind {
        match self {
            FilterData::Logs { .. } => FilterKind::Logs,
            FilterData::NewHeads(_) => FilterKind::NewBlocks,
            FilterData::NewPendingTransactions(_) => FilterKind::NewPendingTransactions,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Filter {
    pub data: FilterData,
    /// Seconds since the UNIX epoch after which the filter expires
    deadline: u64,
    timeout: Duration,
    pub is_subscription: bool,
}

impl Filter {
    pub fn new_block_filter(
        block_hash: B256,
        now: u64,
        timeout: Duration,
        is_subscription: bool,
    ) -> Self {
        Self::new(
            FilterData::NewHeads(vec![block_hash]),
            now,
            timeout,
            is_subscription,
        )
    }

    pub fn new_log_filter(
        criteria: LogFilter,
        logs: Vec<FilterLog>,
        now: u64,
        timeout: Duration,
        is_subscription: bool,
    ) -> Self {
        Self::new(
            FilterData::Logs { criteria, logs },
            now,
            timeout,
            is_subscription,
        )
    }

    pub fn new_pending_transaction_filter(
        now: u64,
        timeout: Duration,
        is_subscription: bool,
    ) -> Self {
        Self::new(
            FilterData::NewPendingTransactions(Vec::new()),
            now,
            timeout,
            is_subscription,
        )
    }

    fn new(data: FilterData, now: u64, timeout: Duration, is_subscription: bool) -> Self {
        Self {
            data,
            deadline: now.saturating_add(timeout.as_secs()),
            timeout,
            is_subscription,
        }
    }

    /// Whether the filter was not polled in time. Subscriptions never expire.
    pub fn has_expired(&self, now: u64) -> bool {
        !self.is_subscription && now >= self.deadline
    }

    /// Pushes back the filter's deadline.
    pub fn refresh(&mut self, now: u64) {
        self.deadline = now.saturating_add(self.timeout.as_secs());
    }

    /// Drains the collected events and refreshes the deadline.
    pub fn take_events(&mut self, now: u64) -> FilterChanges {
        self.refresh(now);

        match &mut self.data {
            FilterData::Logs { logs, .. } => FilterChanges::Logs(std::mem::take(logs)),
            FilterData::NewHeads(hashes) | FilterData::NewPendingTransactions(hashes) => {
                FilterChanges::Hashes(std::mem::take(hashes))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use devnet_primitives::Address;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(300);

    fn log_criteria() -> LogFilter {
        LogFilter {
            block_range: 0..=u64::MAX,
            addresses: [Address::random()].into_iter().collect(),
            normalized_topics: Vec::new(),
        }
    }

    #[test]
    fn polled_filter_expires_after_timeout() {
        let mut filter = Filter::new_pending_transaction_filter(1_000, TIMEOUT, false);
        assert!(!filter.has_expired(1_299));
        assert!(filter.has_expired(1_300));

        filter.refresh(1_200);
        assert!(!filter.has_expired(1_300));
        assert!(filter.has_expired(1_500));
    }

    #[test]
    fn subscription_never_expires() {
        let filter = Filter::new_log_filter(log_criteria(), Vec::new(), 0, TIMEOUT, true);

        assert!(!filter.has_expired(u64::MAX));
    }

    #[test]
    fn take_events_drains_buffer() {
        let block_hash = B256::random();
        let mut filter = Filter::new_block_filter(block_hash, 0, TIMEOUT, false);

        assert_eq!(
            filter.take_events(10),
            FilterChanges::Hashes(vec![block_hash])
        );
        assert_eq!(filter.take_events(20), FilterChanges::Hashes(Vec::new()));
        assert!(!filter.has_expired(319));
    }

    #[test]
    fn kind_of_data() {
        let filter = Filter::new_log_filter(log_criteria(), Vec::new(), 0, TIMEOUT, false);
        assert_eq!(filter.data.kind(), FilterKind::Logs);

        let filter = Filter::new_block_filter(B256::ZERO, 0, TIMEOUT, false);
        assert_eq!(filter.data.kind(), FilterKind::NewBlocks);
    }
}
