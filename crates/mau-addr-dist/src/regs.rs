//! Configuration registers read by the distribution fabric.
//!
//! These mirror the crossbar, ALU-select and deferred-RAM control fields the
//! register layer decodes; only the per-table and per-ALU selection semantics
//! matter here.

use crate::{
    AddrKind, DeferredRamRewriteInfo, OverflowBus, ADDR_KINDS, LOGICAL_TABLES, METER_ALUS,
    OVERFLOW_BUSES, STATS_ALUS,
};

/// Default meter colour-write latency in picoseconds.
pub const DEFAULT_COLOR_WRITE_LATENCY_PS: u64 = 8_000;

/// Home rows and overflow routing of one table for one resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TableRouting {
    /// Logical rows receiving the address directly.
    pub home_rows: u16,
    /// Overflow buses the address is also driven onto.
    pub overflow: [bool; OVERFLOW_BUSES],
}

impl TableRouting {
    /// Returns `true` when the address is routed onto `bus`.
    #[must_use]
    pub const fn uses_bus(&self, bus: OverflowBus) -> bool {
        self.overflow[bus.index()]
    }
}

/// Deferred-RAM controls of one stats or meter ALU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct DeferredRamCtl {
    /// Update at EOP time instead of header time.
    pub eop_enabled: bool,
    /// Also update at TEOP time.
    pub teop_enabled: bool,
    /// Thread the deferred RAM serves; `true` for egress.
    pub egress_thread: bool,
    /// Drop the deferred update when the packet ended in error.
    pub suppress_on_error: bool,
    /// Remap applied when the address is committed to the deferred RAM.
    pub rewrite: DeferredRamRewriteInfo,
}

impl DeferredRamCtl {
    /// Returns `true` when the ALU defers updates for the given thread.
    #[must_use]
    pub const fn defers(&self, ingress: bool) -> bool {
        (self.eop_enabled || self.teop_enabled) && self.egress_thread != ingress
    }
}

/// Register state consumed by [`crate::MauAddrDist`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct AddrDistRegs {
    /// Routing per resource kind (indexed by [`AddrKind::index`]) and table.
    pub routing: [[TableRouting; LOGICAL_TABLES]; ADDR_KINDS],
    /// One-hot stats ALU selection per table.
    pub stats_alu_select: [u8; LOGICAL_TABLES],
    /// One-hot meter ALU selection per table.
    pub meter_alu_select: [u8; LOGICAL_TABLES],
    /// Bitmap of tables belonging to the egress thread.
    pub egress_tables: u16,
    /// Deferred-RAM controls per stats ALU.
    pub stats_deferred: [DeferredRamCtl; STATS_ALUS],
    /// Deferred-RAM controls per meter ALU.
    pub meter_deferred: [DeferredRamCtl; METER_ALUS],
    /// Colour-write latency per meter ALU, in picoseconds.
    pub color_write_latency_ps: [u64; METER_ALUS],
}

impl Default for AddrDistRegs {
    fn default() -> Self {
        Self {
            routing: [[TableRouting::default(); LOGICAL_TABLES]; ADDR_KINDS],
            stats_alu_select: [0; LOGICAL_TABLES],
            meter_alu_select: [0; LOGICAL_TABLES],
            egress_tables: 0,
            stats_deferred: [DeferredRamCtl::default(); STATS_ALUS],
            meter_deferred: [DeferredRamCtl::default(); METER_ALUS],
            color_write_latency_ps: [DEFAULT_COLOR_WRITE_LATENCY_PS; METER_ALUS],
        }
    }
}

impl AddrDistRegs {
    /// Routing of `table` for `kind`; `None` past the last table.
    #[must_use]
    pub fn routing(&self, kind: AddrKind, table: usize) -> Option<&TableRouting> {
        self.routing.get(kind.index())?.get(table)
    }

    fn routing_mut(&mut self, kind: AddrKind, table: usize) -> Option<&mut TableRouting> {
        self.routing.get_mut(kind.index())?.get_mut(table)
    }

    /// Sets the home-row mask of `table` for `kind`.
    ///
    /// Out-of-range tables are ignored.
    pub fn set_home_rows(&mut self, kind: AddrKind, table: usize, rows: u16) {
        if let Some(routing) = self.routing_mut(kind, table) {
            routing.home_rows = rows;
        }
    }

    /// Routes `table` onto or off an overflow bus for `kind`.
    ///
    /// Out-of-range tables are ignored.
    pub fn set_overflow(&mut self, kind: AddrKind, table: usize, bus: OverflowBus, on: bool) {
        if let Some(routing) = self.routing_mut(kind, table) {
            routing.overflow[bus.index()] = on;
        }
    }

    /// Whether `table` belongs to the egress thread; `None` past the last table.
    #[must_use]
    pub const fn is_egress(&self, table: usize) -> Option<bool> {
        if table < LOGICAL_TABLES {
            Some(self.egress_tables & (1 << table) != 0)
        } else {
            None
        }
    }

    /// Assigns `table` to the egress or ingress thread.
    ///
    /// Out-of-range tables are ignored.
    pub const fn set_table_egress(&mut self, table: usize, egress: bool) {
        if table >= LOGICAL_TABLES {
            return;
        }
        if egress {
            self.egress_tables |= 1 << table;
        } else {
            self.egress_tables &= !(1 << table);
        }
    }

    /// ALU-select mask of `table` for `kind`; zero for kinds without ALUs and
    /// `None` past the last table.
    #[must_use]
    pub fn alu_select(&self, kind: AddrKind, table: usize) -> Option<u8> {
        match kind {
            AddrKind::Stats => self.stats_alu_select.get(table).copied(),
            AddrKind::Meter => self.meter_alu_select.get(table).copied(),
            AddrKind::Action | AddrKind::Idletime => (table < LOGICAL_TABLES).then_some(0),
        }
    }

    /// Deferred-RAM controls of ALU `alu` for `kind`.
    #[must_use]
    pub fn deferred_ctl(&self, kind: AddrKind, alu: usize) -> Option<&DeferredRamCtl> {
        match kind {
            AddrKind::Stats => self.stats_deferred.get(alu),
            AddrKind::Meter => self.meter_deferred.get(alu),
            AddrKind::Action | AddrKind::Idletime => None,
        }
    }
}
