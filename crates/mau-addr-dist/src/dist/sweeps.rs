//! ALU claims and delegation to the per-table and per-ALU sweepers.

use super::MauAddrDist;
use crate::{
    AddrClaim, AddrDistFault, AddrKind, MapramArena, MapramId, SweepEdge, SweepInfo,
    SweepMonitor, SweepScheduler, LOGICAL_ROWS, LOGICAL_TABLES, METER_ALUS,
};

/// Which sweeper an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum SweepTarget {
    /// Idle-time sweeper of a logical table.
    Idle(usize),
    /// Stats-dump walker of a logical table.
    StatsDump(usize),
    /// Meter sweeper of a meter ALU.
    Meter(usize),
}

impl SweepTarget {
    const fn bound(self) -> (&'static str, usize, usize) {
        match self {
            Self::Idle(table) | Self::StatsDump(table) => ("table", table, LOGICAL_TABLES),
            Self::Meter(alu) => ("meter alu", alu, METER_ALUS),
        }
    }
}

impl MauAddrDist {
    /// Claims stats ALU `alu` for the RAM at `(row, col)`.
    ///
    /// Returns `false` for an out-of-range ALU or a losing claim.
    pub fn stats_alu_claim(&mut self, alu: usize, row: usize, col: usize, prio: u8) -> bool {
        self.stats_claims
            .get_mut(alu)
            .is_some_and(|claim| claim.claim(row, col, prio))
    }

    /// Claims meter ALU `alu` for the RAM at `(row, col)`.
    ///
    /// Returns `false` for an out-of-range ALU or a losing claim.
    pub fn meter_alu_claim(&mut self, alu: usize, row: usize, col: usize, prio: u8) -> bool {
        self.meter_claims
            .get_mut(alu)
            .is_some_and(|claim| claim.claim(row, col, prio))
    }

    /// Claim state of ALU `alu` of `kind`.
    #[must_use]
    pub fn alu_claim(&self, kind: AddrKind, alu: usize) -> Option<&AddrClaim> {
        match kind {
            AddrKind::Stats => self.stats_claims.get(alu),
            AddrKind::Meter => self.meter_claims.get(alu),
            AddrKind::Action | AddrKind::Idletime => None,
        }
    }

    /// Drops every stats and meter ALU claim.
    pub fn reset_alu_claims(&mut self) {
        self.stats_claims.iter_mut().for_each(AddrClaim::reset);
        self.meter_claims.iter_mut().for_each(AddrClaim::reset);
    }

    /// Checks that no RAM claimed two ALUs of one kind.
    ///
    /// # Errors
    ///
    /// Returns the first shared claimant when configuration checks are strict.
    pub fn check_alu_claims(&mut self) -> Result<(), AddrDistFault> {
        let mut shared = Vec::new();
        for (kind, claims) in [
            (AddrKind::Stats, &self.stats_claims[..]),
            (AddrKind::Meter, &self.meter_claims[..]),
        ] {
            for (alu, claim) in claims.iter().enumerate() {
                for (other_alu, other) in claims.iter().enumerate().skip(alu + 1) {
                    for row in 0..LOGICAL_ROWS {
                        let common = claim.claimant_columns(row) & other.claimant_columns(row);
                        if common != 0 {
                            shared.push(AddrDistFault::SharedAluClaimant {
                                kind,
                                row,
                                col: common.trailing_zeros() as usize,
                                alu,
                                other_alu,
                            });
                        }
                    }
                }
            }
        }
        for fault in shared {
            self.raise(fault)?;
        }
        Ok(())
    }

    /// Sweeper addressed by `target`.
    #[must_use]
    pub fn sweeper(&self, target: SweepTarget) -> Option<&SweepInfo> {
        match target {
            SweepTarget::Idle(table) => self.idle_sweeps.get(table),
            SweepTarget::StatsDump(table) => self.stats_dumps.get(table),
            SweepTarget::Meter(alu) => self.meter_sweeps.get(alu),
        }
    }

    fn sweeper_mut(&mut self, target: SweepTarget) -> Result<&mut SweepInfo, AddrDistFault> {
        let (what, index, limit) = target.bound();
        self.check_index(what, index, limit)?;
        let sweeper = match target {
            SweepTarget::Idle(table) => self.idle_sweeps.get_mut(table),
            SweepTarget::StatsDump(table) => self.stats_dumps.get_mut(table),
            SweepTarget::Meter(alu) => self.meter_sweeps.get_mut(alu),
        };
        sweeper.ok_or(AddrDistFault::IndexOutOfRange { what, index })
    }

    /// Polling handle on the cursor of `target`.
    #[must_use]
    pub fn sweep_monitor(&self, target: SweepTarget) -> Option<SweepMonitor> {
        self.sweeper(target).map(SweepInfo::monitor)
    }

    /// Sets the VPN range walked by `target`.
    ///
    /// A rejected range leaves the previous one in place. An enabled sweeper
    /// that was waiting for a range starts at `now`, and the edge is
    /// forwarded to `scheduler`.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range target, or an illegal range when
    /// configuration checks are strict.
    pub fn set_sweep_vpn_range<S: SweepScheduler + ?Sized>(
        &mut self,
        target: SweepTarget,
        min: u32,
        max: u32,
        hole_pos: Option<u32>,
        now: u64,
        scheduler: &mut S,
    ) -> Result<Option<SweepEdge>, AddrDistFault> {
        let sweeper = self.sweeper_mut(target)?;
        if !sweeper.set_vpn_range(min, max, hole_pos) {
            return self
                .raise(AddrDistFault::IllegalVpnRange { min, max, hole_pos })
                .map(|()| None);
        }
        let edge = sweeper.sweep_start(now);
        notify(scheduler, target, edge);
        Ok(edge)
    }

    /// Registers a stage MAPRAM serving `vpn` with `target`.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range target.
    pub fn add_sweep_mapram(
        &mut self,
        target: SweepTarget,
        id: MapramId,
        vpn: u32,
        prio: u32,
    ) -> Result<(), AddrDistFault> {
        self.sweeper_mut(target)?.add_mapram(id, vpn, prio);
        Ok(())
    }

    /// Updates enablement and interval of `target`, forwarding any running
    /// state change to `scheduler`.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range target.
    pub fn configure_sweep<S: SweepScheduler + ?Sized>(
        &mut self,
        target: SweepTarget,
        enabled: bool,
        interval: u8,
        now: u64,
        scheduler: &mut S,
    ) -> Result<Option<SweepEdge>, AddrDistFault> {
        let edge = self
            .sweeper_mut(target)?
            .set_sweep_config(enabled, interval, now);
        notify(scheduler, target, edge);
        Ok(edge)
    }

    /// Starts `target` if its configuration allows.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range target.
    pub fn sweep_start<S: SweepScheduler + ?Sized>(
        &mut self,
        target: SweepTarget,
        now: u64,
        scheduler: &mut S,
    ) -> Result<Option<SweepEdge>, AddrDistFault> {
        let edge = self.sweeper_mut(target)?.sweep_start(now);
        notify(scheduler, target, edge);
        Ok(edge)
    }

    /// Stops `target`.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range target.
    pub fn sweep_end<S: SweepScheduler + ?Sized>(
        &mut self,
        target: SweepTarget,
        scheduler: &mut S,
    ) -> Result<Option<SweepEdge>, AddrDistFault> {
        let edge = self.sweeper_mut(target)?.sweep_end();
        notify(scheduler, target, edge);
        Ok(edge)
    }

    /// Runs the idle-time sweep steps of `table` due at `now`.
    ///
    /// Returns the idle notifications raised.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range table.
    pub fn idletime_sweep<A: MapramArena + ?Sized>(
        &mut self,
        table: usize,
        now: u64,
        arena: &mut A,
    ) -> Result<u32, AddrDistFault> {
        Ok(self.sweeper_mut(SweepTarget::Idle(table))?.sweep(now, arena))
    }

    /// Runs the meter sweep steps of `alu` due at `now`.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range ALU.
    pub fn meter_sweep<A: MapramArena + ?Sized>(
        &mut self,
        alu: usize,
        now: u64,
        arena: &mut A,
    ) -> Result<(), AddrDistFault> {
        self.sweeper_mut(SweepTarget::Meter(alu))?.sweep(now, arena);
        Ok(())
    }

    /// Records an idle hit on `word` of the MAPRAM serving `vpn` in `table`.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range table.
    pub fn idle_hit<A: MapramArena + ?Sized>(
        &mut self,
        table: usize,
        vpn: u32,
        word: usize,
        arena: &mut A,
    ) -> Result<bool, AddrDistFault> {
        Ok(self.sweeper_mut(SweepTarget::Idle(table))?.hit(vpn, word, arena))
    }

    /// Reads every idle word of `table` in sweep order.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range table.
    pub fn idle_dump<A: MapramArena + ?Sized>(
        &mut self,
        table: usize,
        clear: bool,
        arena: &mut A,
    ) -> Result<Vec<u64>, AddrDistFault> {
        Ok(self.sweeper_mut(SweepTarget::Idle(table))?.dump(clear, arena))
    }

    /// Reads one idle word of `table`.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range table.
    pub fn idle_dump_word<A: MapramArena + ?Sized>(
        &mut self,
        table: usize,
        vpn: u32,
        word: usize,
        clear: bool,
        arena: &mut A,
    ) -> Result<Option<u64>, AddrDistFault> {
        Ok(self
            .sweeper_mut(SweepTarget::Idle(table))?
            .dump_word(vpn, word, clear, arena))
    }

    /// Reads every stats word of `table` in sweep order.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range table.
    pub fn stats_dump<A: MapramArena + ?Sized>(
        &mut self,
        table: usize,
        clear: bool,
        arena: &mut A,
    ) -> Result<Vec<u64>, AddrDistFault> {
        Ok(self
            .sweeper_mut(SweepTarget::StatsDump(table))?
            .dump(clear, arena))
    }

    /// Reads one stats word of `table`.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range table.
    pub fn stats_dump_word<A: MapramArena + ?Sized>(
        &mut self,
        table: usize,
        vpn: u32,
        word: usize,
        clear: bool,
        arena: &mut A,
    ) -> Result<Option<u64>, AddrDistFault> {
        Ok(self
            .sweeper_mut(SweepTarget::StatsDump(table))?
            .dump_word(vpn, word, clear, arena))
    }
}

fn notify<S: SweepScheduler + ?Sized>(
    scheduler: &mut S,
    target: SweepTarget,
    edge: Option<SweepEdge>,
) {
    let Some(edge) = edge else {
        return;
    };
    match target {
        SweepTarget::Idle(table) => scheduler.idletime_sweeper_upcall(table, edge),
        SweepTarget::Meter(alu) => scheduler.meter_sweeper_upcall(alu, edge),
        SweepTarget::StatsDump(_) => {}
    }
}
