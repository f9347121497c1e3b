//! Ethereum log types

use std::ops::{Deref, RangeInclusive};

use devnet_primitives::{Address, B256, Bloom, BloomInput, HashSet, Log};

/// Log generated after execution of a transaction.
pub type ExecutionLog = Log;

/// A log that's part of a transaction receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiptLog {
    /// Execution log
    pub inner: ExecutionLog,
    /// transaction hash
    pub transaction_hash: B256,
}

impl Deref for ReceiptLog {
    type Target = ExecutionLog;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// A log that's part of a mined block, as returned by filters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterLog {
    /// Receipt log
    pub inner: ReceiptLog,
    /// Hash of the containing block
    pub block_hash: B256,
    /// Number of the containing block
    pub block_number: u64,
    /// Index of the log in the block
    pub log_index: u64,
    /// Index of the emitting transaction in the block
    pub transaction_index: u64,
    /// Whether the log was removed by a reorg
    pub removed: bool,
}

impl Deref for FilterLog {
    type Target = ReceiptLog;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Criteria for matching logs, with resolved block numbers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFilter {
    /// Inclusive range of block numbers
    pub block_range: RangeInclusive<u64>,
    /// Emitting addresses. An empty set matches any address.
    pub addresses: HashSet<Address>,
    /// Topics per position. `None` matches any topic, otherwise any of the
    /// alternatives must match.
    pub normalized_topics: Vec<Option<Vec<B256>>>,
}

/// Constructs a bloom filter from the provided logs.
pub fn logs_to_bloom<'log>(logs: impl IntoIterator<Item = &'log ExecutionLog>) -> Bloom {
    let mut bloom = Bloom::ZERO;
    for log in logs {
        add_log_to_bloom(log, &mut bloom);
    }
    bloom
}

/// Adds the log to a bloom hash.
pub fn add_log_to_bloom(log: &ExecutionLog, bloom: &mut Bloom) {
    bloom.accrue(BloomInput::Raw(log.address.as_slice()));

    log.topics()
        .iter()
        .for_each(|topic| bloom.accrue(BloomInput::Raw(topic.as_slice())));
}

/// Whether the bloom filter might contain logs matching the filter. False
/// positives are possible, false negatives are not.
pub fn bloom_contains_log_filter(bloom: &Bloom, filter: &LogFilter) -> bool {
    let contains_address = filter.addresses.is_empty()
        || filter
            .addresses
            .iter()
            .any(|address| bloom.contains_input(BloomInput::Raw(address.as_slice())));

    contains_address
        && filter.normalized_topics.iter().all(|topics| {
            topics.as_ref().is_none_or(|topics| {
                topics
                    .iter()
                    .any(|topic| bloom.contains_input(BloomInput::Raw(topic.as_slice())))
            })
        })
}

/// Whether the log address matches the address filter.
pub fn matches_address_filter(log_address: &Address, address_filter: &HashSet<Address>) -> bool {
    address_filter.is_empty() || address_filter.contains(log_address)
}

/// Whether the log topics match the topics filter.
pub fn matches_topics_filter(log_topics: &[B256], topics_filter: &[Option<Vec<B256>>]) -> bool {
    if topics_filter.len() > log_topics.len() {
        return false;
    }

    topics_filter
        .iter()
        .zip(log_topics.iter())
        .all(|(normalized_topics, log_topic)| {
            normalized_topics
                .as_ref()
                .is_none_or(|normalized_topics| normalized_topics.contains(log_topic))
        })
}

/// Selects the logs that match the filter.
pub fn filter_logs<'log>(
    logs: impl IntoIterator<Item = &'log FilterLog>,
    filter: &LogFilter,
) -> Vec<FilterLog> {
    logs.into_iter()
        .filter(|log| {
            filter.block_range.contains(&log.block_number)
                && matches_address_filter(&log.address, &filter.addresses)
                && matches_topics_filter(log.topics(), &filter.normalized_topics)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use devnet_primitives::{Bytes, LogData};

    use super::*;

    fn filter_log(address: Address, topics: Vec<B256>, block_number: u64) -> FilterLog {
        FilterLog {
            inner: ReceiptLog {
                inner: ExecutionLog {
                    address,
                    data: LogData::new_unchecked(topics, Bytes::new()),
                },
                transaction_hash: B256::random(),
            },
            block_hash: B256::random(),
            block_number,
            log_index: 0,
            transaction_index: 0,
            removed: false,
        }
    }

    fn filter(addresses: &[Address], topics: Vec<Option<Vec<B256>>>) -> LogFilter {
        LogFilter {
            block_range: 0..=u64::MAX,
            addresses: addresses.iter().copied().collect(),
            normalized_topics: topics,
        }
    }

    #[test]
    fn topics_filter_positions() {
        let first = B256::random();
        let second = B256::random();
        let log_topics = [first, second];

        assert!(matches_topics_filter(&log_topics, &[]));
        assert!(matches_topics_filter(&log_topics, &[None, Some(vec![second])]));
        assert!(matches_topics_filter(
            &log_topics,
            &[Some(vec![B256::random(), first])]
        ));
        assert!(!matches_topics_filter(&log_topics, &[Some(vec![second])]));
        assert!(!matches_topics_filter(&log_topics, &[None, None, None]));
    }

    #[test]
    fn bloom_never_rejects_matching_logs() {
        let logs: Vec<FilterLog> = (0..16)
            .map(|_| filter_log(Address::random(), vec![B256::random(), B256::random()], 1))
            .collect();

        let bloom = logs_to_bloom(logs.iter().map(|log| &log.inner.inner));

        for log in &logs {
            let criteria = [
                filter(&[log.address], Vec::new()),
                filter(&[], vec![Some(vec![log.topics()[0]])]),
                filter(
                    &[Address::random(), log.address],
                    vec![None, Some(vec![B256::random(), log.topics()[1]])],
                ),
            ];

            for criteria in criteria {
                assert_eq!(filter_logs([log], &criteria).len(), 1);
                assert!(bloom_contains_log_filter(&bloom, &criteria));
            }
        }
    }

    #[test]
    fn empty_bloom_rejects_specific_address() {
        let criteria = filter(&[Address::random()], Vec::new());

        assert!(!bloom_contains_log_filter(&Bloom::ZERO, &criteria));
        assert!(bloom_contains_log_filter(
            &Bloom::ZERO,
            &filter(&[], vec![None])
        ));
    }

    #[test]
    fn filter_logs_respects_block_range() {
        let address = Address::random();
        let logs = [
            filter_log(address, Vec::new(), 1),
            filter_log(address, Vec::new(), 5),
        ];

        let criteria = LogFilter {
            block_range: 2..=5,
            ..filter(&[address], Vec::new())
        };

        let filtered = filter_logs(&logs, &criteria);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].block_number, 5);
    }
}
