use std::fmt::{self, Display, Formatter};

use primitive_types::U256;

/// A block height/number on the synced chain.
///
/// Modeled as a 256-bit unsigned integer (matching the protocol's total
/// difficulty width) rather than `u64`, so arithmetic never wraps even in
/// adversarial or pathological peer-reported states. All arithmetic used by
/// the sync engine saturates at `U256::MAX` instead of wrapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockNumber(U256);

impl BlockNumber {
    pub const ZERO: BlockNumber = BlockNumber(U256::zero());

    pub fn new(value: u64) -> Self {
        BlockNumber(U256::from(value))
    }

    pub fn as_u64(&self) -> u64 {
        self.0.low_u64()
    }

    pub fn saturating_add(&self, rhs: u64) -> Self {
        let (sum, overflowed) = self.0.overflowing_add(U256::from(rhs));
        if overflowed {
            BlockNumber(U256::MAX)
        } else {
            BlockNumber(sum)
        }
    }

    pub fn saturating_sub(&self, rhs: u64) -> Self {
        let rhs = U256::from(rhs);
        if rhs > self.0 {
            BlockNumber(U256::zero())
        } else {
            BlockNumber(self.0 - rhs)
        }
    }

    /// Difference to `other`, saturating at zero if `other` is larger.
    pub fn saturating_diff(&self, other: &BlockNumber) -> u64 {
        if self.0 <= other.0 {
            0
        } else {
            (self.0 - other.0).low_u64()
        }
    }
}

impl Display for BlockNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BlockNumber {
    fn from(value: u64) -> Self {
        BlockNumber::new(value)
    }
}
