use crate::{Activations, Hardfork, Rules};

/// Errors that can occur when selecting the rules for a block.
#[derive(Debug, thiserror::Error)]
pub enum RuleSelectionError {
    /// The remote chain's hardfork schedule is unknown.
    #[error(
        "No known hardfork for execution on historical block {block_number} (relative to fork block number {fork_block_number}) in chain with id {chain_id}. The node was not configured with a hardfork activation history."
    )]
    MissingHardforkActivations {
        /// Requested block number
        block_number: u64,
        /// Fork block number
        fork_block_number: u64,
        /// Chain id of the remote chain
        chain_id: u64,
    },
    /// The block precedes every known activation.
    #[error(
        "Could not find a hardfork to run for block {block_number}, after having looked for one in the hardfork activation history, which was: {activations:?}."
    )]
    UnknownBlockSpec {
        /// Requested block number
        block_number: u64,
        /// The activation schedule that was consulted
        activations: Activations,
    },
}

#[derive(Clone, Debug)]
struct RemoteSchedule {
    chain_id: u64,
    fork_block_number: u64,
    activations: Option<Activations>,
}

/// Maps a block to the rules it is executed under.
///
/// Locally produced blocks always use the configured hardfork. When forking,
/// blocks at or before the fork block were produced by the remote chain and
/// use that chain's own schedule.
#[derive(Clone, Debug)]
pub struct RuleSelector {
    local_hardfork: Hardfork,
    remote: Option<RemoteSchedule>,
}

impl RuleSelector {
    /// Constructs a selector for a chain that only has local blocks.
    pub fn local(hardfork: Hardfork) -> Self {
        Self {
            local_hardfork: hardfork,
            remote: None,
        }
    }

    /// Constructs a selector for a chain forked from a remote chain at the
    /// provided block number.
    pub fn forked(
        hardfork: Hardfork,
        remote_chain_id: u64,
        fork_block_number: u64,
        remote_activations: Option<Activations>,
    ) -> Self {
        Self {
            local_hardfork: hardfork,
            remote: Some(RemoteSchedule {
                chain_id: remote_chain_id,
                fork_block_number,
                activations: remote_activations,
            }),
        }
    }

    /// The hardfork used for locally produced blocks.
    pub fn local_hardfork(&self) -> Hardfork {
        self.local_hardfork
    }

    /// Whether the block was produced by the remote chain.
    pub fn is_remote_block(&self, block_number: u64) -> bool {
        self.remote
            .as_ref()
            .is_some_and(|remote| block_number <= remote.fork_block_number)
    }

    /// Returns the hardfork of a block with the provided number and timestamp.
    pub fn hardfork_at(
        &self,
        block_number: u64,
        timestamp: u64,
    ) -> Result<Hardfork, RuleSelectionError> {
        match &self.remote {
            Some(remote) if block_number <= remote.fork_block_number => {
                let activations = remote.activations.as_ref().ok_or(
                    RuleSelectionError::MissingHardforkActivations {
                        block_number,
                        fork_block_number: remote.fork_block_number,
                        chain_id: remote.chain_id,
                    },
                )?;

                activations
                    .hardfork_at_block(block_number, timestamp)
                    .ok_or_else(|| RuleSelectionError::UnknownBlockSpec {
                        block_number,
                        activations: activations.clone(),
                    })
            }
            _ => Ok(self.local_hardfork),
        }
    }

    /// Returns the rules of a block with the provided number and timestamp.
    pub fn rules_at(&self, block_number: u64, timestamp: u64) -> Result<Rules, RuleSelectionError> {
        self.hardfork_at(block_number, timestamp).map(Rules::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{MAINNET_CHAIN_ID, chain_hardfork_activations};

    #[test]
    fn local_chain_uses_configured_hardfork() -> anyhow::Result<()> {
        let selector = RuleSelector::local(Hardfork::Shanghai);

        assert_eq!(selector.hardfork_at(0, 0)?, Hardfork::Shanghai);
        assert_eq!(selector.hardfork_at(1_000_000, 0)?, Hardfork::Shanghai);
        assert!(!selector.is_remote_block(0));

        Ok(())
    }

    #[test]
    fn forked_chain_uses_remote_schedule_below_seam() -> anyhow::Result<()> {
        let selector = RuleSelector::forked(
            Hardfork::Cancun,
            MAINNET_CHAIN_ID,
            16_000_000,
            chain_hardfork_activations(MAINNET_CHAIN_ID).cloned(),
        );

        assert_eq!(selector.hardfork_at(9_199_999, 0)?, Hardfork::Istanbul);
        assert_eq!(selector.hardfork_at(9_200_000, 0)?, Hardfork::MuirGlacier);
        assert_eq!(selector.hardfork_at(12_000_000, 0)?, Hardfork::MuirGlacier);
        assert_eq!(selector.hardfork_at(12_244_000, 0)?, Hardfork::Berlin);
        assert_eq!(selector.hardfork_at(16_000_000, 0)?, Hardfork::Merge);
        assert_eq!(selector.hardfork_at(16_000_001, 0)?, Hardfork::Cancun);

        let rules = selector.rules_at(12_000_000, 0)?;
        assert!(!rules.eip1559);

        Ok(())
    }

    #[test]
    fn missing_remote_schedule_is_an_error() {
        let selector = RuleSelector::forked(Hardfork::Cancun, 999, 100, None);

        assert!(matches!(
            selector.hardfork_at(50, 0),
            Err(RuleSelectionError::MissingHardforkActivations {
                block_number: 50,
                fork_block_number: 100,
                chain_id: 999,
            })
        ));
        assert!(selector.hardfork_at(101, 0).is_ok());
    }

    #[test]
    fn block_before_first_remote_activation_is_an_error() {
        let activations = Activations::new(vec![crate::Activation {
            condition: crate::ForkCondition::Block(10),
            hardfork: Hardfork::London,
        }]);
        let selector = RuleSelector::forked(Hardfork::Cancun, 5, 100, Some(activations));

        assert!(matches!(
            selector.hardfork_at(5, 0),
            Err(RuleSelectionError::UnknownBlockSpec { block_number: 5, .. })
        ));
    }
}
