//! Diagnostic counters for the address-distribution model.

use crate::{AddrDistFault, AddrKind, HazardClass, ADDR_KINDS, HAZARD_CLASSES};

/// Saturating counters and last-fault record kept by one stage.
///
/// Counters survive per-cycle `reset()`; they only clear through
/// [`DistDiagnostics::reset`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DistDiagnostics {
    last_fault: Option<AddrDistFault>,
    hazard_counts: [u32; HAZARD_CLASSES],
    distributed: [u32; ADDR_KINDS],
    cycles: u32,
}

impl DistDiagnostics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failed check, whether strict or relaxed.
    pub fn record_fault(&mut self, fault: &AddrDistFault) {
        let slot = &mut self.hazard_counts[fault.class().index()];
        *slot = slot.saturating_add(1);
        self.last_fault = Some(fault.clone());
    }

    /// Records one address written to a row or bus.
    pub const fn record_distribution(&mut self, kind: AddrKind) {
        let slot = &mut self.distributed[kind.index()];
        *slot = slot.saturating_add(1);
    }

    /// Records the start of a simulated cycle.
    pub const fn record_cycle(&mut self) {
        self.cycles = self.cycles.saturating_add(1);
    }

    /// Most recent failed check.
    #[must_use]
    pub const fn last_fault(&self) -> Option<&AddrDistFault> {
        self.last_fault.as_ref()
    }

    /// Failed checks of `class` so far.
    #[must_use]
    pub const fn hazard_count(&self, class: HazardClass) -> u32 {
        self.hazard_counts[class.index()]
    }

    /// Row and bus writes of `kind` so far.
    #[must_use]
    pub const fn distributed(&self, kind: AddrKind) -> u32 {
        self.distributed[kind.index()]
    }

    /// Cycles started so far.
    #[must_use]
    pub const fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Clears every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
