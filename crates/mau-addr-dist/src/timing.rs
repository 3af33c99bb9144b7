/// Number of timing phases an address can be distributed in.
pub const PHASES: usize = 3;

/// Base sweep period in picoseconds (interval exponent `0`).
pub const SWEEP_BASE_PERIOD_PS: u64 = 1_000;

/// Largest legal sweep-interval exponent.
pub const SWEEP_INTERVAL_MAX: u8 = 24;

/// Packet timing phase in which an address is distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Phase {
    /// Match/lookup time of the packet header.
    Header,
    /// End-of-packet time.
    Eop,
    /// Second, transactional end-of-packet time.
    Teop,
}

impl Phase {
    /// All phases in array-index order.
    pub const ALL: [Self; PHASES] = [Self::Header, Self::Eop, Self::Teop];

    /// Returns the array index for this phase.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Converts a sweep-interval exponent to a period in picoseconds.
///
/// Returns `None` for exponents above [`SWEEP_INTERVAL_MAX`].
#[must_use]
pub const fn sweep_period_ps(interval: u8) -> Option<u64> {
    if interval > SWEEP_INTERVAL_MAX {
        None
    } else {
        Some(SWEEP_BASE_PERIOD_PS << interval)
    }
}
