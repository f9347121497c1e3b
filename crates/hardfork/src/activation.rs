use crate::Hardfork;

/// Fork condition for a hardfork.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ForkCondition {
    /// Activation based on block number.
    Block(u64),
    /// Activation based on UNIX timestamp.
    Timestamp(u64),
}

impl ForkCondition {
    /// Whether the condition is met by a block with the provided number and
    /// timestamp.
    pub fn is_met(&self, block_number: u64, timestamp: u64) -> bool {
        match self {
            ForkCondition::Block(activation) => block_number >= *activation,
            ForkCondition::Timestamp(activation) => timestamp >= *activation,
        }
    }
}

/// The activation of a hardfork.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activation {
    /// The condition for the hardfork activation.
    pub condition: ForkCondition,
    /// The hardfork to be activated.
    pub hardfork: Hardfork,
}

/// The hardfork schedule of a chain, ordered by activation.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct Activations {
    hardforks: Vec<Activation>,
}

impl Activations {
    /// Constructs a new instance with the provided activations.
    pub fn new(hardforks: Vec<Activation>) -> Self {
        Self { hardforks }
    }

    /// Creates a schedule for a new chain that starts at the provided
    /// hardfork.
    pub fn with_hardfork(hardfork: Hardfork) -> Self {
        Self {
            hardforks: vec![Activation {
                condition: ForkCondition::Block(0),
                hardfork,
            }],
        }
    }

    /// Whether the schedule is empty.
    pub fn is_empty(&self) -> bool {
        self.hardforks.is_empty()
    }

    /// Returns the hardfork active for a block with the provided number and
    /// timestamp, if any activation applies.
    pub fn hardfork_at_block(&self, block_number: u64, timestamp: u64) -> Option<Hardfork> {
        self.hardforks
            .iter()
            .rev()
            .find(|activation| activation.condition.is_met(block_number, timestamp))
            .map(|activation| activation.hardfork)
    }

    /// Returns the activation condition of the provided hardfork, if it is
    /// part of the schedule.
    pub fn condition_of(&self, hardfork: Hardfork) -> Option<ForkCondition> {
        self.hardforks
            .iter()
            .find(|activation| activation.hardfork == hardfork)
            .map(|activation| activation.condition)
    }

    /// Returns the activations.
    pub fn as_slice(&self) -> &[Activation] {
        &self.hardforks
    }
}

impl From<&[Activation]> for Activations {
    fn from(hardforks: &[Activation]) -> Self {
        Self {
            hardforks: hardforks.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> Activations {
        Activations::new(vec![
            Activation {
                condition: ForkCondition::Block(10),
                hardfork: Hardfork::Berlin,
            },
            Activation {
                condition: ForkCondition::Block(20),
                hardfork: Hardfork::London,
            },
            Activation {
                condition: ForkCondition::Timestamp(1_000),
                hardfork: Hardfork::Shanghai,
            },
        ])
    }

    #[test]
    fn block_before_first_activation_has_no_hardfork() {
        assert_eq!(schedule().hardfork_at_block(9, 0), None);
    }

    #[test]
    fn latest_met_activation_wins() {
        let activations = schedule();

        assert_eq!(activations.hardfork_at_block(10, 0), Some(Hardfork::Berlin));
        assert_eq!(activations.hardfork_at_block(19, 999), Some(Hardfork::Berlin));
        assert_eq!(activations.hardfork_at_block(20, 999), Some(Hardfork::London));
        assert_eq!(
            activations.hardfork_at_block(21, 1_000),
            Some(Hardfork::Shanghai)
        );
    }

    #[test]
    fn single_hardfork_schedule_starts_at_genesis() {
        let activations = Activations::with_hardfork(Hardfork::Cancun);

        assert_eq!(activations.hardfork_at_block(0, 0), Some(Hardfork::Cancun));
        assert_eq!(
            activations.condition_of(Hardfork::Cancun),
            Some(ForkCondition::Block(0))
        );
    }
}
