use thiserror::Error;

use crate::{AddrKind, OverflowBus, Phase};

/// Number of hazard classes.
pub const HAZARD_CLASSES: usize = 4;

/// Hazard classes used for policy decisions and diagnostics aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum HazardClass {
    /// Static configuration is illegal or inconsistent.
    Config,
    /// Two producers drove conflicting values onto one row, bus or slot.
    MultiWrite,
    /// An address was produced but never used, or used without a producer.
    Consumption,
    /// A predicated-off table asserted an address.
    Predication,
}

impl HazardClass {
    /// All classes in counter-index order.
    pub const ALL: [Self; HAZARD_CLASSES] = [
        Self::Config,
        Self::MultiWrite,
        Self::Consumption,
        Self::Predication,
    ];

    /// Returns the counter index for this class.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Where a leftover or conflicting address sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Location {
    /// A logical row.
    Row(usize),
    /// An overflow bus.
    Bus(OverflowBus),
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Row(row) => write!(f, "row {row}"),
            Self::Bus(bus) => write!(f, "{bus:?} overflow bus"),
        }
    }
}

/// Hardware-fidelity check failures raised by the address-distribution model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum AddrDistFault {
    /// A table, row, column, ALU or EOP index is outside the stage geometry.
    #[error("{what} index {index} out of range")]
    IndexOutOfRange {
        /// Kind of index.
        what: &'static str,
        /// Offending value.
        index: usize,
    },
    /// VPN range rejected by the hole arithmetic.
    #[error("illegal vpn range min={min:#x} max={max:#x} hole={hole_pos:?}")]
    IllegalVpnRange {
        /// Requested minimum VPN.
        min: u32,
        /// Requested maximum VPN.
        max: u32,
        /// Requested hole position.
        hole_pos: Option<u32>,
    },
    /// A table selects more than one ALU of one kind.
    #[error("table {table} selects multiple {kind} alus (mask {alu_mask:#x})")]
    MultipleAlusSelected {
        /// Resource kind.
        kind: AddrKind,
        /// Logical table.
        table: usize,
        /// Configured ALU-select mask.
        alu_mask: u8,
    },
    /// A table was driven from the thread it does not belong to.
    #[error("{kind} address from table {table} driven as ingress={ingress} against its thread")]
    IngressEgressMismatch {
        /// Resource kind.
        kind: AddrKind,
        /// Logical table.
        table: usize,
        /// Thread the caller used.
        ingress: bool,
    },
    /// A meter ALU has no claimed colour MAPRAM.
    #[error("{kind} alu {alu} has no claimed owner")]
    NoAluOwner {
        /// Resource kind.
        kind: AddrKind,
        /// ALU index.
        alu: usize,
    },
    /// A table defers an address but selects no ALU of that kind.
    #[error("table {table} defers a {kind} address without selecting an alu")]
    NoAluSelected {
        /// Resource kind.
        kind: AddrKind,
        /// Logical table.
        table: usize,
    },
    /// A table defers an address to an ALU whose deferred RAM does not serve
    /// the packet's thread.
    #[error(
        "table {table} defers a {kind} address to alu {alu}, which does not defer for ingress={ingress}"
    )]
    AluNotDeferring {
        /// Resource kind.
        kind: AddrKind,
        /// Logical table.
        table: usize,
        /// ALU selected by the table.
        alu: usize,
        /// Thread of the packet.
        ingress: bool,
    },
    /// A physical RAM claims two ALUs of the same kind.
    #[error("row {row} column {col} claims {kind} alus {alu} and {other_alu}")]
    SharedAluClaimant {
        /// Resource kind.
        kind: AddrKind,
        /// Logical row.
        row: usize,
        /// Logical column.
        col: usize,
        /// First ALU.
        alu: usize,
        /// Second ALU.
        other_alu: usize,
    },
    /// A deferred address needs an EOP number but the thread has none.
    #[error("{kind} address from table {table} deferred without an eop number")]
    MissingEopNum {
        /// Resource kind.
        kind: AddrKind,
        /// Logical table.
        table: usize,
    },
    /// Two tables wrote different addresses or tags into one row.
    #[error(
        "{kind} {phase:?} row {row}: table {table} wrote {addr:#x} over {other_addr:#x} from table {other_table}"
    )]
    ConflictingRowWrite {
        /// Resource kind.
        kind: AddrKind,
        /// Timing phase.
        phase: Phase,
        /// Logical row.
        row: usize,
        /// Writing table.
        table: usize,
        /// Address being written.
        addr: u32,
        /// Table that wrote first.
        other_table: usize,
        /// Address already present.
        other_addr: u32,
    },
    /// Two tables drove different addresses or tags onto one overflow bus.
    #[error("{bus:?} overflow bus: table {table} drove {addr:#x} onto {other_addr:#x}")]
    ConflictingBusWrite {
        /// Overflow bus.
        bus: OverflowBus,
        /// Timing phase.
        phase: Phase,
        /// Writing table.
        table: usize,
        /// Address being driven.
        addr: u32,
        /// Address already on the bus.
        other_addr: u32,
    },
    /// Two deferred addresses target one deferred-RAM slot.
    #[error("{kind} deferred slot table {table} eop {eop_num} written twice")]
    ConflictingDeferredWrite {
        /// Resource kind.
        kind: AddrKind,
        /// Logical table.
        table: usize,
        /// EOP number.
        eop_num: u8,
    },
    /// A distributed address was never consumed.
    #[error("{kind} {phase:?} address {addr:#x} on {location} never consumed")]
    UnconsumedAddr {
        /// Resource kind.
        kind: AddrKind,
        /// Timing phase.
        phase: Phase,
        /// Row or bus.
        location: Location,
        /// Leftover address.
        addr: u32,
    },
    /// A consumer acknowledged an address that is not on its row.
    #[error("{kind} {phase:?} {location}: consumed {addr:#x} but {expected:#x} was distributed")]
    ConsumeMismatch {
        /// Resource kind.
        kind: AddrKind,
        /// Timing phase.
        phase: Phase,
        /// Row or bus.
        location: Location,
        /// Address that was distributed.
        expected: u32,
        /// Address the consumer reported.
        addr: u32,
    },
    /// A consumer read an overflow bus nobody drove this cycle.
    #[error("{kind} read of undriven {bus:?} overflow bus")]
    UndrivenBusRead {
        /// Resource kind.
        kind: AddrKind,
        /// Overflow bus.
        bus: OverflowBus,
    },
    /// EOP processing met a deferral that was never finalized.
    #[error("{kind} deferral from table {table} eop {eop_num} reached eop unfinalized")]
    UnfinalizedDeferral {
        /// Resource kind.
        kind: AddrKind,
        /// Logical table.
        table: usize,
        /// EOP number.
        eop_num: u8,
    },
    /// A committed deferral reached no row and was not suppressed by an error.
    #[error(
        "{kind} deferral {addr:#x} from table {table} eop {eop_num} reached no row at {phase:?}"
    )]
    DroppedDeferral {
        /// Resource kind.
        kind: AddrKind,
        /// Phase that dropped it.
        phase: Phase,
        /// Logical table.
        table: usize,
        /// EOP number.
        eop_num: u8,
        /// The dropped address.
        addr: u32,
    },
    /// A predicated-off table asserted a non-zero address.
    #[error("{kind} address {addr:#x} from disabled table {table}")]
    DisabledTableAddr {
        /// Resource kind.
        kind: AddrKind,
        /// Logical table.
        table: usize,
        /// Address asserted.
        addr: u32,
    },
}

impl AddrDistFault {
    /// Returns the hazard class that governs this fault's severity.
    #[must_use]
    pub const fn class(&self) -> HazardClass {
        match self {
            Self::IndexOutOfRange { .. }
            | Self::IllegalVpnRange { .. }
            | Self::MultipleAlusSelected { .. }
            | Self::IngressEgressMismatch { .. }
            | Self::NoAluOwner { .. }
            | Self::NoAluSelected { .. }
            | Self::AluNotDeferring { .. }
            | Self::SharedAluClaimant { .. }
            | Self::MissingEopNum { .. } => HazardClass::Config,
            Self::ConflictingRowWrite { .. }
            | Self::ConflictingBusWrite { .. }
            | Self::ConflictingDeferredWrite { .. } => HazardClass::MultiWrite,
            Self::UnconsumedAddr { .. }
            | Self::ConsumeMismatch { .. }
            | Self::UndrivenBusRead { .. }
            | Self::UnfinalizedDeferral { .. }
            | Self::DroppedDeferral { .. } => HazardClass::Consumption,
            Self::DisabledTableAddr { .. } => HazardClass::Predication,
        }
    }
}
