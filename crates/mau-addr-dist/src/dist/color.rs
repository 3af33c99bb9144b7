//! Meter colour writes delayed by the MAPRAM write latency.

use super::MauAddrDist;
use crate::{
    AddrDistFault, AddrKind, ColorWriteEntry, DeferredRamRewriteInfo, MapramArena, METER_ALUS,
};

impl MauAddrDist {
    /// Queues a colour write from meter ALU `alu`.
    ///
    /// The write targets the colour MAPRAM that currently owns the ALU's
    /// claim and lands `color_write_latency_ps` after `issue_time`.
    ///
    /// # Errors
    ///
    /// Fails on an out-of-range ALU, or when nothing claimed the ALU and
    /// configuration checks are strict.
    pub fn queue_color_write(
        &mut self,
        alu: usize,
        issue_time: u64,
        addr: u32,
        color: u8,
    ) -> Result<(), AddrDistFault> {
        self.check_index("meter alu", alu, METER_ALUS)?;
        let Some(owner) = self.meter_claims[alu].owner() else {
            return self.raise(AddrDistFault::NoAluOwner {
                kind: AddrKind::Meter,
                alu,
            });
        };
        let entry = ColorWriteEntry {
            issue_time,
            write_latency: self.regs.color_write_latency_ps[alu],
            addr,
            mapram_row: owner.row,
            mapram_col: owner.col,
            color,
        };
        tracing::trace!(alu, issue_time, addr, color, "colour write queued");
        self.color_queues[alu].push_back(entry);
        Ok(())
    }

    /// Applies, in arrival order, the queued writes of `alu` that are due at `now`.
    ///
    /// Stops at the first entry not yet due. Returns the number applied.
    pub fn dequeue_color_writes<A: MapramArena + ?Sized>(
        &mut self,
        alu: usize,
        now: u64,
        arena: &mut A,
    ) -> usize {
        let Some(queue) = self.color_queues.get_mut(alu) else {
            return 0;
        };
        let mut applied = 0;
        while let Some(entry) = queue.front().copied() {
            if !entry.is_due(now) {
                break;
            }
            queue.pop_front();
            arena.write_color(&entry);
            applied += 1;
        }
        applied
    }

    /// Applies every queued write of `alu` regardless of latency.
    pub fn flush_queued_color_writes<A: MapramArena + ?Sized>(
        &mut self,
        alu: usize,
        arena: &mut A,
    ) -> usize {
        let Some(queue) = self.color_queues.get_mut(alu) else {
            return 0;
        };
        let applied = queue.len();
        for entry in queue.drain(..) {
            arena.write_color(&entry);
        }
        applied
    }

    /// Applies a moveregs remap to the colour writes queued on `alu`.
    ///
    /// Returns the number of addresses that changed.
    pub fn update_queued_addr(&mut self, alu: usize, rewrite: &DeferredRamRewriteInfo) -> usize {
        let Some(queue) = self.color_queues.get_mut(alu) else {
            return 0;
        };
        let mut moved = 0;
        for entry in queue.iter_mut() {
            let addr = rewrite.rewrite_addr(entry.addr);
            if addr != entry.addr {
                entry.addr = addr;
                moved += 1;
            }
        }
        moved
    }

    /// Colour writes still queued on `alu`, oldest first.
    pub fn queued_color_writes(&self, alu: usize) -> impl Iterator<Item = &ColorWriteEntry> + '_ {
        self.color_queues.get(alu).into_iter().flatten()
    }
}
