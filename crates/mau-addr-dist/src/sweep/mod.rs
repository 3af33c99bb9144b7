//! Periodic sweep and dump state machines.

/// VPN-with-hole counting helpers.
pub mod holevpn;
/// Sweeper state for one table or ALU.
pub mod info;

pub use holevpn::{
    hole_field, hole_mask, holevpn_check, holevpn_count, holevpn_group, holevpn_incr,
    holevpn_init_min, HOLE_AVOID, HOLE_BITS, HOLE_POS_MAX, VPN_BITS, VPN_COUNT, VPN_MASK,
};
pub use info::{SweepEdge, SweepInfo, SweepKind, SweepMonitor, SweepStatus};

/// Receiver of sweeper running-state transitions.
///
/// Implemented by the external scheduler that ticks `meter_sweep` and
/// `idletime_sweep`. Each transition is reported once, never per tick.
pub trait SweepScheduler {
    /// An idle-time sweeper for logical table `table` changed state.
    fn idletime_sweeper_upcall(&mut self, table: usize, edge: SweepEdge);

    /// A meter sweeper for meter ALU `alu` changed state.
    fn meter_sweeper_upcall(&mut self, alu: usize, edge: SweepEdge);
}
