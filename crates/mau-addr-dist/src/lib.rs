//! Address distribution for one match-action unit stage.
//!
//! Routes action, stats, meter and idle-time addresses from logical tables
//! to the physical rows and overflow buses that consume them, and checks
//! every hand-off the way the hardware would.

/// Stage geometry constants and address classification.
pub mod geometry;
pub use geometry::{
    alu_logical_row, row_bit, rows_in, AddrKind, AddrType, OverflowBus, ADDR_KINDS, INVALID_ADDR,
    LOGICAL_COLUMNS, LOGICAL_ROWS, LOGICAL_TABLES, METER_ALUS, METER_ALU_LOGICAL_ROWS,
    METER_TYPE_MASK, METER_TYPE_SHIFT, OVERFLOW_BUSES, STATS_ALUS, STATS_ALU_LOGICAL_ROWS,
};

/// Timing phases and sweep periods.
pub mod timing;
pub use timing::{sweep_period_ps, Phase, PHASES, SWEEP_BASE_PERIOD_PS, SWEEP_INTERVAL_MAX};

/// Fault taxonomy for hardware-fidelity checks.
pub mod fault;
pub use fault::{AddrDistFault, HazardClass, Location, HAZARD_CLASSES};

/// Strict or relaxed handling of failed checks.
pub mod policy;
pub use policy::{VerificationPolicy, VerificationProfile};

/// Priority-based ownership of an ALU by physical RAMs.
pub mod claim;
pub use claim::{AddrClaim, ClaimOwner};

/// Deferred-RAM address remapping.
pub mod rewrite;
pub use rewrite::DeferredRamRewriteInfo;

/// Stage-owned MAPRAM access.
pub mod arena;
pub use arena::{ColorWriteEntry, MapramArena, MapramId};

/// Sweep and dump state machines.
pub mod sweep;
pub use sweep::{
    holevpn_check, holevpn_count, holevpn_incr, holevpn_init_min, SweepEdge, SweepInfo, SweepKind,
    SweepMonitor, SweepScheduler, SweepStatus,
};

/// Configuration registers read during distribution.
pub mod regs;
pub use regs::{AddrDistRegs, DeferredRamCtl, TableRouting, DEFAULT_COLOR_WRITE_LATENCY_PS};

/// Counters and last-fault record.
pub mod diag;
pub use diag::DistDiagnostics;

/// The per-stage distribution orchestrator.
pub mod dist;
pub use dist::{
    AddrSlot, DeferKey, DeferStage, DeferredAddr, Leftover, MauAddrDist, SweepTarget, ALL_TABLES,
};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use tracing_subscriber as _;
