//! Per-stage address distribution.
//!
//! [`MauAddrDist`] owns the per-cycle row and bus state of one stage. Each
//! cycle the logical tables push their addresses in with the
//! `distrib_*_addresses` family, physical RAMs read them back by logical row
//! and acknowledge them with the `*_addr_consume` family, and the owner calls
//! [`MauAddrDist::check_addrs_consumed`] before [`MauAddrDist::reset`].
//!
//! Every hardware-fidelity check goes through the configured
//! [`VerificationPolicy`]: strict classes abort the call with an
//! [`AddrDistFault`], relaxed classes log and continue.

use std::collections::{BTreeMap, VecDeque};

use crate::{
    alu_logical_row, row_bit, rows_in, AddrClaim, AddrDistFault, AddrDistRegs, AddrKind, AddrType,
    ColorWriteEntry, DistDiagnostics, Location, OverflowBus, Phase, SweepInfo, SweepKind,
    VerificationPolicy, ADDR_KINDS, INVALID_ADDR, LOGICAL_ROWS, LOGICAL_TABLES, METER_ALUS,
    OVERFLOW_BUSES, PHASES, STATS_ALUS,
};

/// Deferred (EOP/TEOP) address handling.
pub mod deferred;
/// Meter colour-write queue.
pub mod color;
/// Row and bus slot storage.
pub mod slots;
/// ALU claims and sweeper delegation.
pub mod sweeps;

pub use deferred::{DeferKey, DeferStage, DeferredAddr};
pub use slots::{AddrSlot, Leftover};
pub use sweeps::SweepTarget;

/// Mask with every logical table enabled.
pub const ALL_TABLES: u16 = u16::MAX;

/// Address distribution state of one MAU stage.
#[derive(Debug)]
pub struct MauAddrDist {
    policy: VerificationPolicy,
    regs: AddrDistRegs,
    diag: DistDiagnostics,
    rows: [[[AddrSlot; LOGICAL_ROWS]; ADDR_KINDS]; PHASES],
    buses: [[AddrSlot; OVERFLOW_BUSES]; PHASES],
    not_enabled: [[u32; LOGICAL_TABLES]; ADDR_KINDS],
    table_thread: [Option<bool>; LOGICAL_TABLES],
    pred_enabled: u16,
    eop_num: [Option<u8>; 2],
    deferred: BTreeMap<DeferKey, DeferredAddr>,
    stats_claims: [AddrClaim; STATS_ALUS],
    meter_claims: [AddrClaim; METER_ALUS],
    idle_sweeps: Vec<SweepInfo>,
    stats_dumps: Vec<SweepInfo>,
    meter_sweeps: Vec<SweepInfo>,
    color_queues: [VecDeque<ColorWriteEntry>; METER_ALUS],
}

impl Default for MauAddrDist {
    fn default() -> Self {
        Self::new(VerificationPolicy::default(), AddrDistRegs::default())
    }
}

fn thread_index(ingress: bool) -> usize {
    usize::from(!ingress)
}

impl MauAddrDist {
    /// Creates a stage with every table enabled and nothing distributed.
    #[must_use]
    pub fn new(policy: VerificationPolicy, regs: AddrDistRegs) -> Self {
        Self {
            policy,
            regs,
            diag: DistDiagnostics::new(),
            rows: [[[AddrSlot::EMPTY; LOGICAL_ROWS]; ADDR_KINDS]; PHASES],
            buses: [[AddrSlot::EMPTY; OVERFLOW_BUSES]; PHASES],
            not_enabled: [[INVALID_ADDR; LOGICAL_TABLES]; ADDR_KINDS],
            table_thread: [None; LOGICAL_TABLES],
            pred_enabled: ALL_TABLES,
            eop_num: [None; 2],
            deferred: BTreeMap::new(),
            stats_claims: Default::default(),
            meter_claims: Default::default(),
            idle_sweeps: (0..LOGICAL_TABLES)
                .map(|table| SweepInfo::new(SweepKind::Idle, table))
                .collect(),
            stats_dumps: (0..LOGICAL_TABLES)
                .map(|table| SweepInfo::new(SweepKind::StatsDump, table))
                .collect(),
            meter_sweeps: (0..METER_ALUS)
                .map(|alu| SweepInfo::new(SweepKind::Meter, alu))
                .collect(),
            color_queues: std::array::from_fn(|_| VecDeque::new()),
        }
    }

    /// Active verification policy.
    #[must_use]
    pub const fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    /// Replaces the verification policy.
    pub const fn set_policy(&mut self, policy: VerificationPolicy) {
        self.policy = policy;
    }

    /// Configuration registers.
    #[must_use]
    pub const fn regs(&self) -> &AddrDistRegs {
        &self.regs
    }

    /// Mutable configuration registers.
    pub const fn regs_mut(&mut self) -> &mut AddrDistRegs {
        &mut self.regs
    }

    /// Fault and distribution counters.
    #[must_use]
    pub const fn diagnostics(&self) -> &DistDiagnostics {
        &self.diag
    }

    /// Clears per-cycle state: rows, buses, shadows, thread bindings and EOP numbers.
    ///
    /// Deferred addresses, claims, sweepers and queued colour writes persist
    /// across cycles.
    pub fn reset(&mut self) {
        self.rows = [[[AddrSlot::EMPTY; LOGICAL_ROWS]; ADDR_KINDS]; PHASES];
        self.buses = [[AddrSlot::EMPTY; OVERFLOW_BUSES]; PHASES];
        self.not_enabled = [[INVALID_ADDR; LOGICAL_TABLES]; ADDR_KINDS];
        self.table_thread = [None; LOGICAL_TABLES];
        self.pred_enabled = ALL_TABLES;
        self.eop_num = [None; 2];
        self.diag.record_cycle();
    }

    /// Sets the mask of tables the predication unit enabled this cycle.
    pub const fn set_pred_enabled(&mut self, tables: u16) {
        self.pred_enabled = tables;
    }

    /// Mask of tables enabled this cycle.
    #[must_use]
    pub const fn pred_enabled(&self) -> u16 {
        self.pred_enabled
    }

    /// Sets the EOP number of the packet on the given thread.
    pub fn set_eop_num(&mut self, ingress: bool, eop_num: Option<u8>) {
        self.eop_num[thread_index(ingress)] = eop_num;
    }

    /// EOP number of the packet on the given thread.
    #[must_use]
    pub fn eop_num(&self, ingress: bool) -> Option<u8> {
        self.eop_num[thread_index(ingress)]
    }

    pub(crate) fn raise(&mut self, fault: AddrDistFault) -> Result<(), AddrDistFault> {
        self.diag.record_fault(&fault);
        self.policy.enforce(fault)
    }

    /// Records a fault the model cannot continue past, whatever the policy.
    pub(crate) fn fatal<T>(&mut self, fault: AddrDistFault) -> Result<T, AddrDistFault> {
        self.diag.record_fault(&fault);
        tracing::error!(%fault, "address-distribution index fault");
        Err(fault)
    }

    pub(crate) fn check_index(
        &mut self,
        what: &'static str,
        index: usize,
        limit: usize,
    ) -> Result<(), AddrDistFault> {
        if index < limit {
            Ok(())
        } else {
            self.fatal(AddrDistFault::IndexOutOfRange { what, index })
        }
    }

    /// Resolves the single ALU of `kind` selected by `table`.
    ///
    /// Several selected ALUs is a configuration fault; when relaxed, the
    /// highest one wins.
    pub(crate) fn alu_for(
        &mut self,
        kind: AddrKind,
        table: usize,
    ) -> Result<Option<usize>, AddrDistFault> {
        let alus = match kind {
            AddrKind::Stats => STATS_ALUS,
            AddrKind::Meter => METER_ALUS,
            AddrKind::Action | AddrKind::Idletime => return Ok(None),
        };
        let mask = self.regs.alu_select(kind, table).unwrap_or(0) & ((1_u8 << alus) - 1);
        if mask == 0 {
            return Ok(None);
        }
        if mask.count_ones() > 1 {
            self.raise(AddrDistFault::MultipleAlusSelected {
                kind,
                table,
                alu_mask: mask,
            })?;
        }
        Ok(Some((u8::BITS - 1 - mask.leading_zeros()) as usize))
    }

    /// Rows `table` drives in `phase`, given its resolved ALU.
    pub(crate) fn rows_for(
        &self,
        kind: AddrKind,
        table: usize,
        alu: Option<usize>,
        ingress: bool,
        phase: Phase,
        error: bool,
    ) -> u16 {
        let home = match phase {
            Phase::Header => self.regs.routing(kind, table).map_or(0, |r| r.home_rows),
            Phase::Eop | Phase::Teop => 0,
        };
        let Some(alu) = alu else {
            return home;
        };
        let Some(alu_row) = alu_logical_row(kind, alu) else {
            return home;
        };
        let ctl = self.regs.deferred_ctl(kind, alu).copied().unwrap_or_default();
        let deferred = ctl.defers(ingress) && !(error && ctl.suppress_on_error);
        let drives_alu_row = match phase {
            Phase::Header => !ctl.defers(ingress),
            Phase::Eop => deferred && ctl.eop_enabled,
            Phase::Teop => deferred && ctl.teop_enabled,
        };
        if drives_alu_row {
            home | row_bit(alu_row)
        } else {
            home
        }
    }

    /// Logical rows a stats address from `table` reaches in `phase`.
    ///
    /// Header rows are the home rows plus the ALU row when the ALU updates
    /// immediately; EOP and TEOP rows are the ALU row alone when the ALU
    /// defers on this thread and `error` does not suppress the update.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range table or a strict multi-ALU selection.
    pub fn calculate_stats_rows(
        &mut self,
        table: usize,
        ingress: bool,
        phase: Phase,
        error: bool,
    ) -> Result<u16, AddrDistFault> {
        self.calculate_rows(AddrKind::Stats, table, ingress, phase, error)
    }

    /// Logical rows a meter address from `table` reaches in `phase`.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range table or a strict multi-ALU selection.
    pub fn calculate_meter_rows(
        &mut self,
        table: usize,
        ingress: bool,
        phase: Phase,
        error: bool,
    ) -> Result<u16, AddrDistFault> {
        self.calculate_rows(AddrKind::Meter, table, ingress, phase, error)
    }

    fn calculate_rows(
        &mut self,
        kind: AddrKind,
        table: usize,
        ingress: bool,
        phase: Phase,
        error: bool,
    ) -> Result<u16, AddrDistFault> {
        self.check_index("table", table, LOGICAL_TABLES)?;
        let alu = self.alu_for(kind, table)?;
        Ok(self.rows_for(kind, table, alu, ingress, phase, error))
    }

    /// Checks that `table` is driven from its configured thread, and from a
    /// single thread within the cycle.
    fn check_thread(
        &mut self,
        kind: AddrKind,
        table: usize,
        ingress: bool,
    ) -> Result<(), AddrDistFault> {
        let configured_ingress = self.regs.is_egress(table) == Some(false);
        let bound = self.table_thread[table].unwrap_or(ingress);
        if configured_ingress != ingress || bound != ingress {
            self.raise(AddrDistFault::IngressEgressMismatch {
                kind,
                table,
                ingress,
            })?;
        }
        self.table_thread[table] = Some(ingress);
        Ok(())
    }

    pub(crate) fn write_row(
        &mut self,
        phase: Phase,
        kind: AddrKind,
        row: usize,
        table: usize,
        addr: u32,
        ingress: bool,
    ) -> Result<(), AddrDistFault> {
        let tag = AddrType::classify(kind, addr);
        let current = self.rows[phase.index()][kind.index()][row];
        if current.is_driven() {
            if current.matches(addr, tag, ingress) {
                return Ok(());
            }
            self.raise(AddrDistFault::ConflictingRowWrite {
                kind,
                phase,
                row,
                table,
                addr,
                other_table: current.srctab.unwrap_or(table),
                other_addr: current.addr,
            })?;
        }
        self.rows[phase.index()][kind.index()][row] = AddrSlot::driven(addr, tag, table, ingress);
        self.diag.record_distribution(kind);
        Ok(())
    }

    /// Drives `addr` onto an overflow bus.
    ///
    /// Buses wire-OR: a differing second writer is flagged, yet the bus keeps
    /// the OR of both values, the first writer's table and the last tag.
    pub(crate) fn write_bus(
        &mut self,
        phase: Phase,
        bus: OverflowBus,
        kind: AddrKind,
        table: usize,
        addr: u32,
        ingress: bool,
    ) -> Result<(), AddrDistFault> {
        let tag = AddrType::classify(kind, addr);
        let current = self.buses[phase.index()][bus.index()];
        if !current.is_driven() {
            self.buses[phase.index()][bus.index()] = AddrSlot::driven(addr, tag, table, ingress);
            self.diag.record_distribution(kind);
            return Ok(());
        }
        if current.matches(addr, tag, ingress) {
            return Ok(());
        }
        self.raise(AddrDistFault::ConflictingBusWrite {
            bus,
            phase,
            table,
            addr,
            other_addr: current.addr,
        })?;
        let slot = &mut self.buses[phase.index()][bus.index()];
        slot.addr |= addr;
        slot.tag = Some(tag);
        slot.ingress = ingress;
        slot.consumed = false;
        self.diag.record_distribution(kind);
        Ok(())
    }

    fn distrib_addresses(
        &mut self,
        kind: AddrKind,
        table: usize,
        ingress: bool,
        addr: u32,
    ) -> Result<(), AddrDistFault> {
        self.check_index("table", table, LOGICAL_TABLES)?;
        if addr == INVALID_ADDR {
            return Ok(());
        }
        let alu = self.alu_for(kind, table)?;
        if self.pred_enabled & row_bit(table) == 0 {
            self.not_enabled[kind.index()][table] |= addr;
            return self.raise(AddrDistFault::DisabledTableAddr { kind, table, addr });
        }
        self.check_thread(kind, table, ingress)?;

        let rows = self.rows_for(kind, table, alu, ingress, Phase::Header, false);
        for row in rows_in(rows) {
            self.write_row(Phase::Header, kind, row, table, addr, ingress)?;
        }
        let routing = self.regs.routing(kind, table).copied().unwrap_or_default();
        for bus in OverflowBus::ALL {
            if routing.uses_bus(bus) {
                self.write_bus(Phase::Header, bus, kind, table, addr, ingress)?;
            }
        }
        tracing::trace!(%kind, table, ingress, addr, rows, "header address distributed");

        let Some(alu) = alu else {
            return Ok(());
        };
        let defers = self
            .regs
            .deferred_ctl(kind, alu)
            .is_some_and(|ctl| ctl.defers(ingress));
        if !defers {
            return Ok(());
        }
        match self.eop_num(ingress) {
            Some(eop_num) => self.defer_addresses(kind, table, Some(alu), ingress, addr, eop_num),
            None => self.raise(AddrDistFault::MissingEopNum { kind, table }),
        }
    }

    /// Distributes an action-data address from `table` at header time.
    ///
    /// # Errors
    ///
    /// Returns the first strict check that failed.
    pub fn distrib_action_addresses(
        &mut self,
        table: usize,
        ingress: bool,
        addr: u32,
    ) -> Result<(), AddrDistFault> {
        self.distrib_addresses(AddrKind::Action, table, ingress, addr)
    }

    /// Distributes a stats address from `table` at header time.
    ///
    /// When the selected stats ALU defers on this thread the address is also
    /// recorded against the thread's EOP number.
    ///
    /// # Errors
    ///
    /// Returns the first strict check that failed.
    pub fn distrib_stats_addresses(
        &mut self,
        table: usize,
        ingress: bool,
        addr: u32,
    ) -> Result<(), AddrDistFault> {
        self.distrib_addresses(AddrKind::Stats, table, ingress, addr)
    }

    /// Distributes a meter, stateful or selector address from `table` at header time.
    ///
    /// # Errors
    ///
    /// Returns the first strict check that failed.
    pub fn distrib_meter_addresses(
        &mut self,
        table: usize,
        ingress: bool,
        addr: u32,
    ) -> Result<(), AddrDistFault> {
        self.distrib_addresses(AddrKind::Meter, table, ingress, addr)
    }

    /// Distributes an idle-time address from `table` at header time.
    ///
    /// # Errors
    ///
    /// Returns the first strict check that failed.
    pub fn distrib_idletime_addresses(
        &mut self,
        table: usize,
        ingress: bool,
        addr: u32,
    ) -> Result<(), AddrDistFault> {
        self.distrib_addresses(AddrKind::Idletime, table, ingress, addr)
    }

    /// Address of `kind` on logical row `row` in `phase`, as seen from one thread.
    ///
    /// Returns [`INVALID_ADDR`] when the row is out of range, undriven, or was
    /// driven by the other thread or with another tag.
    #[must_use]
    pub fn addr(&self, kind: AddrKind, phase: Phase, row: usize, ingress: bool) -> u32 {
        self.rows[phase.index()][kind.index()]
            .get(row)
            .and_then(|slot| slot.visible_to(kind, ingress))
            .unwrap_or(INVALID_ADDR)
    }

    /// Header-time action-data address on `row`.
    #[must_use]
    pub fn action_addr(&self, row: usize, ingress: bool) -> u32 {
        self.addr(AddrKind::Action, Phase::Header, row, ingress)
    }

    /// Header-time stats address on `row`.
    #[must_use]
    pub fn stats_addr(&self, row: usize, ingress: bool) -> u32 {
        self.addr(AddrKind::Stats, Phase::Header, row, ingress)
    }

    /// Header-time meter address on `row`.
    #[must_use]
    pub fn meter_addr(&self, row: usize, ingress: bool) -> u32 {
        self.addr(AddrKind::Meter, Phase::Header, row, ingress)
    }

    /// Header-time idle-time address on `row`.
    #[must_use]
    pub fn idle_addr(&self, row: usize, ingress: bool) -> u32 {
        self.addr(AddrKind::Idletime, Phase::Header, row, ingress)
    }

    /// Raw slot of `kind` on `row` in `phase`.
    #[must_use]
    pub fn row_slot(&self, kind: AddrKind, phase: Phase, row: usize) -> Option<&AddrSlot> {
        self.rows[phase.index()][kind.index()].get(row)
    }

    /// Raw slot of `bus` in `phase`.
    #[must_use]
    pub const fn bus_slot(&self, phase: Phase, bus: OverflowBus) -> &AddrSlot {
        &self.buses[phase.index()][bus.index()]
    }

    /// Address of `kind` on an overflow bus.
    ///
    /// Reading a bus nobody drove is a consumption fault; a bus carrying the
    /// other thread or another kind reads as [`INVALID_ADDR`].
    ///
    /// # Errors
    ///
    /// Returns the fault when undriven-bus reads are strict.
    pub fn overflow_addr(
        &mut self,
        bus: OverflowBus,
        kind: AddrKind,
        phase: Phase,
        ingress: bool,
    ) -> Result<u32, AddrDistFault> {
        let slot = self.buses[phase.index()][bus.index()];
        if !slot.is_driven() {
            self.raise(AddrDistFault::UndrivenBusRead { kind, bus })?;
            return Ok(INVALID_ADDR);
        }
        Ok(slot.visible_to(kind, ingress).unwrap_or(INVALID_ADDR))
    }

    /// Addresses of `kind` that predicated-off `table` asserted this cycle, ORed.
    #[must_use]
    pub fn not_enabled_addr(&self, kind: AddrKind, table: usize) -> u32 {
        self.not_enabled[kind.index()]
            .get(table)
            .copied()
            .unwrap_or(INVALID_ADDR)
    }

    /// Acknowledges `addr` of `kind` on `row` in `phase`.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range row, or when `addr` is not what the row
    /// carries and consumption checks are strict.
    pub fn consume(
        &mut self,
        kind: AddrKind,
        phase: Phase,
        row: usize,
        addr: u32,
    ) -> Result<(), AddrDistFault> {
        self.check_index("row", row, LOGICAL_ROWS)?;
        let slot = self.rows[phase.index()][kind.index()][row];
        if !slot.is_driven() || slot.addr != addr {
            return self.raise(AddrDistFault::ConsumeMismatch {
                kind,
                phase,
                location: Location::Row(row),
                expected: slot.addr,
                addr,
            });
        }
        self.rows[phase.index()][kind.index()][row].consumed = true;
        Ok(())
    }

    /// Acknowledges the header-time action-data address on `row`.
    ///
    /// # Errors
    ///
    /// See [`MauAddrDist::consume`].
    pub fn action_addr_consume(&mut self, row: usize, addr: u32) -> Result<(), AddrDistFault> {
        self.consume(AddrKind::Action, Phase::Header, row, addr)
    }

    /// Acknowledges the header-time stats address on `row`.
    ///
    /// # Errors
    ///
    /// See [`MauAddrDist::consume`].
    pub fn stats_addr_consume(&mut self, row: usize, addr: u32) -> Result<(), AddrDistFault> {
        self.consume(AddrKind::Stats, Phase::Header, row, addr)
    }

    /// Acknowledges the header-time meter address on `row`.
    ///
    /// # Errors
    ///
    /// See [`MauAddrDist::consume`].
    pub fn meter_addr_consume(&mut self, row: usize, addr: u32) -> Result<(), AddrDistFault> {
        self.consume(AddrKind::Meter, Phase::Header, row, addr)
    }

    /// Acknowledges the header-time idle-time address on `row`.
    ///
    /// # Errors
    ///
    /// See [`MauAddrDist::consume`].
    pub fn idle_addr_consume(&mut self, row: usize, addr: u32) -> Result<(), AddrDistFault> {
        self.consume(AddrKind::Idletime, Phase::Header, row, addr)
    }

    /// Acknowledges `addr` on an overflow bus.
    ///
    /// # Errors
    ///
    /// Fails when `addr` is not what the bus carries and consumption checks
    /// are strict.
    pub fn overflow_addr_consume(
        &mut self,
        bus: OverflowBus,
        phase: Phase,
        addr: u32,
    ) -> Result<(), AddrDistFault> {
        let slot = self.buses[phase.index()][bus.index()];
        if !slot.is_driven() || slot.addr != addr {
            let kind = slot.tag.map_or(AddrKind::Action, AddrType::kind);
            return self.raise(AddrDistFault::ConsumeMismatch {
                kind,
                phase,
                location: Location::Bus(bus),
                expected: slot.addr,
                addr,
            });
        }
        self.buses[phase.index()][bus.index()].consumed = true;
        Ok(())
    }

    /// Every address distributed this cycle that nobody consumed.
    #[must_use]
    pub fn unconsumed_addrs(&self) -> Vec<Leftover> {
        let mut leftovers = Vec::new();
        for phase in Phase::ALL {
            for kind in AddrKind::ALL {
                for (row, slot) in self.rows[phase.index()][kind.index()].iter().enumerate() {
                    if slot.is_leftover() {
                        leftovers.push(Leftover {
                            kind,
                            phase,
                            location: Location::Row(row),
                            addr: slot.addr,
                        });
                    }
                }
            }
            for bus in OverflowBus::ALL {
                let slot = &self.buses[phase.index()][bus.index()];
                if let (true, Some(tag)) = (slot.is_leftover(), slot.tag) {
                    leftovers.push(Leftover {
                        kind: tag.kind(),
                        phase,
                        location: Location::Bus(bus),
                        addr: slot.addr,
                    });
                }
            }
        }
        leftovers
    }

    /// Returns `true` when every distributed address was consumed.
    #[must_use]
    pub fn all_addrs_consumed(&self) -> bool {
        self.unconsumed_addrs().is_empty()
    }

    /// Raises a consumption fault per leftover address.
    ///
    /// # Errors
    ///
    /// Returns the first leftover when consumption checks are strict.
    pub fn check_addrs_consumed(&mut self) -> Result<(), AddrDistFault> {
        for leftover in self.unconsumed_addrs() {
            self.raise(leftover.into())?;
        }
        Ok(())
    }
}
