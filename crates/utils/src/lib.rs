//! Utility types and functions used across the devnet codebase.

#![warn(missing_docs)]

/// Types related to random number generation.
pub mod random;
