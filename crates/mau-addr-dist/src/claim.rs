//! Priority arbitration for an ALU shared by several (row, column) producers.

use crate::{LOGICAL_COLUMNS, LOGICAL_ROWS};

/// Current owner of a claimed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ClaimOwner {
    /// Logical row of the owning RAM.
    pub row: usize,
    /// Logical column of the owning RAM.
    pub col: usize,
    /// Claim priority; lower values win.
    pub prio: u8,
}

/// Claim state for one ALU.
///
/// Only the highest-priority (lowest value) claimant owns the ALU and the
/// first claimant wins ties. Every claimant is remembered in a per-row column
/// bitmap so fabric audits can see losers as well as the winner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AddrClaim {
    owner: Option<ClaimOwner>,
    claimants: [u16; LOGICAL_ROWS],
}

impl AddrClaim {
    /// Creates an unclaimed resource.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the resource for `(row, col)` at `prio`.
    ///
    /// Returns `true` when the caller owns the resource afterwards: it was
    /// unclaimed, the caller already owned it at this priority, or `prio`
    /// strictly dominates the current owner. Out-of-range coordinates never win.
    pub fn claim(&mut self, row: usize, col: usize, prio: u8) -> bool {
        if row >= LOGICAL_ROWS || col >= LOGICAL_COLUMNS {
            self.complain(row, col, prio);
            return false;
        }
        self.claimants[row] |= 1 << col;

        let candidate = ClaimOwner { row, col, prio };
        let wins = match self.owner {
            None => true,
            Some(owner) => owner == candidate || prio < owner.prio,
        };
        if wins {
            self.owner = Some(candidate);
        } else {
            self.complain(row, col, prio);
        }
        wins
    }

    /// Logs a claim that lost arbitration.
    pub fn complain(&self, row: usize, col: usize, prio: u8) {
        match self.owner {
            Some(owner) => tracing::debug!(
                row,
                col,
                prio,
                owner_row = owner.row,
                owner_col = owner.col,
                owner_prio = owner.prio,
                "alu claim lost arbitration"
            ),
            None => tracing::debug!(row, col, prio, "alu claim rejected"),
        }
    }

    /// Returns the current owner, if any.
    #[must_use]
    pub const fn owner(&self) -> Option<ClaimOwner> {
        self.owner
    }

    /// Returns the bitmap of columns on `row` that ever claimed this resource.
    #[must_use]
    pub fn claimant_columns(&self, row: usize) -> u16 {
        self.claimants.get(row).copied().unwrap_or(0)
    }

    /// Returns `true` when `(row, col)` ever claimed this resource.
    #[must_use]
    pub fn is_claimant(&self, row: usize, col: usize) -> bool {
        col < LOGICAL_COLUMNS && self.claimant_columns(row) & (1 << col) != 0
    }

    /// Forgets the owner and every claimant.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
