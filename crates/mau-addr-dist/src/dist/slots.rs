//! Row and bus slot storage.

use crate::{AddrDistFault, AddrKind, AddrType, Location, Phase, INVALID_ADDR};

/// One address-carrying wire: a logical row for one kind, or an overflow bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AddrSlot {
    /// Address on the wire; [`INVALID_ADDR`] when undriven.
    pub addr: u32,
    /// Tag of the last write.
    pub tag: Option<AddrType>,
    /// Logical table that first drove the wire this cycle.
    pub srctab: Option<usize>,
    /// Thread of the last write.
    pub ingress: bool,
    /// Set once a consumer acknowledged the address.
    pub consumed: bool,
}

impl AddrSlot {
    /// An undriven slot.
    pub const EMPTY: Self = Self {
        addr: INVALID_ADDR,
        tag: None,
        srctab: None,
        ingress: false,
        consumed: false,
    };

    pub(crate) const fn driven(addr: u32, tag: AddrType, table: usize, ingress: bool) -> Self {
        Self {
            addr,
            tag: Some(tag),
            srctab: Some(table),
            ingress,
            consumed: false,
        }
    }

    /// Returns `true` when something drove this slot this cycle.
    #[must_use]
    pub const fn is_driven(&self) -> bool {
        self.addr != INVALID_ADDR
    }

    /// Returns `true` when the slot holds an address nobody consumed.
    #[must_use]
    pub const fn is_leftover(&self) -> bool {
        self.is_driven() && !self.consumed
    }

    /// Returns `true` when a write of `addr` tagged `tag` would change nothing.
    pub(crate) fn matches(&self, addr: u32, tag: AddrType, ingress: bool) -> bool {
        self.addr == addr && self.tag == Some(tag) && self.ingress == ingress
    }

    /// Returns the slot contents when a reader of `kind` on `ingress` may see them.
    pub(crate) fn visible_to(&self, kind: AddrKind, ingress: bool) -> Option<u32> {
        if !self.is_driven() {
            return None;
        }
        if self.ingress != ingress {
            tracing::debug!(%kind, addr = self.addr, ingress, "read rejected: thread mismatch");
            return None;
        }
        if self.tag.map(AddrType::kind) != Some(kind) {
            tracing::debug!(
                %kind,
                addr = self.addr,
                tag = ?self.tag,
                "read rejected: tag mismatch"
            );
            return None;
        }
        Some(self.addr)
    }
}

/// An address left on a row or bus at the end of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Leftover {
    /// Resource kind of the address.
    pub kind: AddrKind,
    /// Phase it was distributed in.
    pub phase: Phase,
    /// Row or bus holding it.
    pub location: Location,
    /// The address.
    pub addr: u32,
}

impl From<Leftover> for AddrDistFault {
    fn from(leftover: Leftover) -> Self {
        Self::UnconsumedAddr {
            kind: leftover.kind,
            phase: leftover.phase,
            location: leftover.location,
            addr: leftover.addr,
        }
    }
}
