use crate::Hardfork;

/// The protocol rules that apply under a hardfork.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rules {
    /// The hardfork the rules are derived from.
    pub hardfork: Hardfork,
    /// Contract creation costs 32,000 extra gas (EIP-2).
    pub homestead: bool,
    /// Replay-protected signatures (EIP-155).
    pub eip155: bool,
    /// Cheaper calldata (EIP-2028).
    pub eip2028: bool,
    /// Access list transactions (EIP-2930).
    pub eip2930: bool,
    /// Fee market with a base fee (EIP-1559).
    pub eip1559: bool,
    /// `prevrandao` replaces the difficulty and block rewards stop
    /// (EIP-3675, EIP-4399).
    pub merge: bool,
    /// Initcode metering (EIP-3860) and withdrawals (EIP-4895).
    pub shanghai: bool,
    /// Parent beacon block root in the header (EIP-4788).
    pub cancun: bool,
}

impl Rules {
    /// Derives the rules for the provided hardfork.
    pub fn new(hardfork: Hardfork) -> Self {
        Self {
            hardfork,
            homestead: hardfork >= Hardfork::Homestead,
            eip155: hardfork >= Hardfork::SpuriousDragon,
            eip2028: hardfork >= Hardfork::Istanbul,
            eip2930: hardfork >= Hardfork::Berlin,
            eip1559: hardfork >= Hardfork::London,
            merge: hardfork >= Hardfork::Merge,
            shanghai: hardfork >= Hardfork::Shanghai,
            cancun: hardfork >= Hardfork::Cancun,
        }
    }

    /// Whether the provided hardfork is active under these rules.
    pub fn is_active(&self, hardfork: Hardfork) -> bool {
        self.hardfork >= hardfork
    }
}

impl From<Hardfork> for Rules {
    fn from(hardfork: Hardfork) -> Self {
        Self::new(hardfork)
    }
}
