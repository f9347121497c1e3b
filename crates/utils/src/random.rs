use devnet_primitives::{B256, keccak256};

/// A generator of deterministic pseudo-random hashes, where each value is the
/// Keccak-256 hash of the previous one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RandomHashGenerator {
    seed: B256,
    next_value: B256,
}

impl RandomHashGenerator {
    /// Constructs a generator whose first value is the hash of the seed.
    pub fn with_seed(seed: &str) -> Self {
        let seed = keccak256(seed.as_bytes());

        Self {
            seed,
            next_value: seed,
        }
    }

    /// Constructs a generator whose first value is the provided value.
    pub fn with_value(next_value: B256) -> Self {
        Self {
            seed: next_value,
            next_value,
        }
    }

    /// Returns the next value and advances the generator.
    pub fn next_value(&mut self) -> B256 {
        let next_value = keccak256(self.next_value.as_slice());

        std::mem::replace(&mut self.next_value, next_value)
    }

    /// Returns the next value without advancing the generator.
    pub fn peek(&self) -> B256 {
        self.next_value
    }

    /// Sets the next value.
    pub fn set_next(&mut self, next_value: B256) {
        self.next_value = next_value;
    }

    /// Resets the generator to its seed.
    pub fn reset(&mut self) {
        self.next_value = self.seed;
    }
}
