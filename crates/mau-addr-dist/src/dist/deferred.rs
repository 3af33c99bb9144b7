//! EOP and TEOP distribution of deferred stats and meter addresses.

use super::MauAddrDist;
use crate::{rows_in, AddrDistFault, AddrKind, DeferredRamRewriteInfo, Phase, LOGICAL_TABLES};

/// Key of one deferred address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DeferKey {
    /// Resource kind, stats or meter.
    pub kind: AddrKind,
    /// Logical table that produced the address.
    pub table: usize,
    /// EOP number of the packet.
    pub eop_num: u8,
}

/// Progress of a deferred address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DeferStage {
    /// Stashed at header time, not yet committed to the deferred RAM.
    Pending,
    /// Committed; waits for EOP.
    Eop,
    /// Committed; waits for TEOP.
    Teop,
}

/// A deferred address and where it is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DeferredAddr {
    /// Address, rewritten once committed.
    pub addr: u32,
    /// Thread of the packet.
    pub ingress: bool,
    /// ALU whose deferred RAM holds the address.
    pub alu: usize,
    /// Progress.
    pub stage: DeferStage,
}

impl MauAddrDist {
    /// Stashes a stats address from `table` for EOP-time distribution.
    ///
    /// # Errors
    ///
    /// Fails when the table selects no stats ALU or one that does not defer
    /// on this thread, or on a strict conflicting stash for the same EOP
    /// number.
    pub fn defer_stats_addresses(
        &mut self,
        table: usize,
        ingress: bool,
        addr: u32,
        eop_num: u8,
    ) -> Result<(), AddrDistFault> {
        self.check_index("table", table, LOGICAL_TABLES)?;
        let alu = self.alu_for(AddrKind::Stats, table)?;
        self.defer_addresses(AddrKind::Stats, table, alu, ingress, addr, eop_num)
    }

    /// Stashes a meter address from `table` for EOP-time distribution.
    ///
    /// # Errors
    ///
    /// Fails when the table selects no meter ALU or one that does not defer
    /// on this thread, or on a strict conflicting stash for the same EOP
    /// number.
    pub fn defer_meter_addresses(
        &mut self,
        table: usize,
        ingress: bool,
        addr: u32,
        eop_num: u8,
    ) -> Result<(), AddrDistFault> {
        self.check_index("table", table, LOGICAL_TABLES)?;
        let alu = self.alu_for(AddrKind::Meter, table)?;
        self.defer_addresses(AddrKind::Meter, table, alu, ingress, addr, eop_num)
    }

    pub(crate) fn defer_addresses(
        &mut self,
        kind: AddrKind,
        table: usize,
        alu: Option<usize>,
        ingress: bool,
        addr: u32,
        eop_num: u8,
    ) -> Result<(), AddrDistFault> {
        let Some(alu) = alu else {
            return self.raise(AddrDistFault::NoAluSelected { kind, table });
        };
        let defers = self
            .regs
            .deferred_ctl(kind, alu)
            .is_some_and(|ctl| ctl.defers(ingress));
        if !defers {
            return self.raise(AddrDistFault::AluNotDeferring {
                kind,
                table,
                alu,
                ingress,
            });
        }
        let key = DeferKey {
            kind,
            table,
            eop_num,
        };
        if self.deferred.get(&key).is_some_and(|prev| prev.addr != addr) {
            self.raise(AddrDistFault::ConflictingDeferredWrite {
                kind,
                table,
                eop_num,
            })?;
        }
        self.deferred.insert(
            key,
            DeferredAddr {
                addr,
                ingress,
                alu,
                stage: DeferStage::Pending,
            },
        );
        tracing::trace!(%kind, table, eop_num, addr, alu, "address deferred");
        Ok(())
    }

    /// Commits pending stats deferrals to their ALUs' deferred RAMs.
    ///
    /// # Errors
    ///
    /// Fails on a strict deferred-slot conflict.
    pub fn finalize_stats_addresses(&mut self) -> Result<(), AddrDistFault> {
        self.finalize_addresses(AddrKind::Stats)
    }

    /// Commits pending meter deferrals to their ALUs' deferred RAMs.
    ///
    /// # Errors
    ///
    /// Fails on a strict deferred-slot conflict.
    pub fn finalize_meter_addresses(&mut self) -> Result<(), AddrDistFault> {
        self.finalize_addresses(AddrKind::Meter)
    }

    /// Each ALU holds one deferred-RAM entry per EOP number; a second table
    /// landing on it replaces the first.
    fn finalize_addresses(&mut self, kind: AddrKind) -> Result<(), AddrDistFault> {
        let pending: Vec<DeferKey> = self
            .deferred
            .iter()
            .filter(|(key, entry)| key.kind == kind && entry.stage == DeferStage::Pending)
            .map(|(key, _)| *key)
            .collect();

        for key in pending {
            let Some(entry) = self.deferred.get(&key).copied() else {
                continue;
            };
            let rival = self
                .deferred
                .iter()
                .find(|(other, other_entry)| {
                    **other != key
                        && other.kind == kind
                        && other.eop_num == key.eop_num
                        && other_entry.alu == entry.alu
                        && other_entry.stage != DeferStage::Pending
                })
                .map(|(other, _)| *other);
            if let Some(rival) = rival {
                self.raise(AddrDistFault::ConflictingDeferredWrite {
                    kind,
                    table: key.table,
                    eop_num: key.eop_num,
                })?;
                self.deferred.remove(&rival);
            }

            let ctl = self
                .regs
                .deferred_ctl(kind, entry.alu)
                .copied()
                .unwrap_or_default();
            let addr = ctl.rewrite.rewrite_addr(entry.addr);
            let stage = if ctl.eop_enabled {
                DeferStage::Eop
            } else {
                DeferStage::Teop
            };
            self.deferred.insert(
                key,
                DeferredAddr {
                    addr,
                    stage,
                    ..entry
                },
            );
            tracing::trace!(
                %kind,
                table = key.table,
                eop_num = key.eop_num,
                addr,
                ?stage,
                "deferral committed"
            );
        }
        Ok(())
    }

    /// Drives the stats addresses deferred under `eop_num` at EOP time.
    ///
    /// `error` suppresses updates on ALUs configured to drop errored packets.
    ///
    /// # Errors
    ///
    /// Returns the first strict check that failed.
    pub fn distrib_stats_addresses_eop(
        &mut self,
        eop_num: u8,
        ingress: bool,
        error: bool,
    ) -> Result<(), AddrDistFault> {
        self.distrib_deferred(AddrKind::Stats, Phase::Eop, eop_num, ingress, error)
    }

    /// Drives the meter addresses deferred under `eop_num` at EOP time.
    ///
    /// # Errors
    ///
    /// Returns the first strict check that failed.
    pub fn distrib_meter_addresses_eop(
        &mut self,
        eop_num: u8,
        ingress: bool,
        error: bool,
    ) -> Result<(), AddrDistFault> {
        self.distrib_deferred(AddrKind::Meter, Phase::Eop, eop_num, ingress, error)
    }

    /// Drives the stats addresses deferred under `eop_num` at TEOP time.
    ///
    /// # Errors
    ///
    /// Returns the first strict check that failed.
    pub fn teop_output_stats_addr(
        &mut self,
        eop_num: u8,
        ingress: bool,
        error: bool,
    ) -> Result<(), AddrDistFault> {
        self.distrib_deferred(AddrKind::Stats, Phase::Teop, eop_num, ingress, error)
    }

    /// Drives the meter addresses deferred under `eop_num` at TEOP time.
    ///
    /// # Errors
    ///
    /// Returns the first strict check that failed.
    pub fn teop_output_meter_addr(
        &mut self,
        eop_num: u8,
        ingress: bool,
        error: bool,
    ) -> Result<(), AddrDistFault> {
        self.distrib_deferred(AddrKind::Meter, Phase::Teop, eop_num, ingress, error)
    }

    fn distrib_deferred(
        &mut self,
        kind: AddrKind,
        phase: Phase,
        eop_num: u8,
        ingress: bool,
        error: bool,
    ) -> Result<(), AddrDistFault> {
        let keys: Vec<DeferKey> = self
            .deferred
            .iter()
            .filter(|(key, entry)| {
                key.kind == kind && key.eop_num == eop_num && entry.ingress == ingress
            })
            .map(|(key, _)| *key)
            .collect();

        for key in keys {
            let Some(entry) = self.deferred.get(&key).copied() else {
                continue;
            };
            match (phase, entry.stage) {
                (_, DeferStage::Pending) => {
                    self.deferred.remove(&key);
                    self.raise(AddrDistFault::UnfinalizedDeferral {
                        kind,
                        table: key.table,
                        eop_num,
                    })?;
                    continue;
                }
                (Phase::Eop, DeferStage::Eop) | (Phase::Teop, DeferStage::Teop) => {}
                _ => continue,
            }

            let ctl = self
                .regs
                .deferred_ctl(kind, entry.alu)
                .copied()
                .unwrap_or_default();
            let rows = self.rows_for(kind, key.table, Some(entry.alu), ingress, phase, error);
            if rows == 0 && !(error && ctl.suppress_on_error) {
                self.deferred.remove(&key);
                self.raise(AddrDistFault::DroppedDeferral {
                    kind,
                    phase,
                    table: key.table,
                    eop_num,
                    addr: entry.addr,
                })?;
                continue;
            }
            for row in rows_in(rows) {
                self.write_row(phase, kind, row, key.table, entry.addr, ingress)?;
            }
            tracing::trace!(
                %kind,
                ?phase,
                table = key.table,
                eop_num,
                addr = entry.addr,
                rows,
                "deferred address distributed"
            );

            if phase == Phase::Eop && ctl.teop_enabled {
                self.deferred.insert(
                    key,
                    DeferredAddr {
                        stage: DeferStage::Teop,
                        ..entry
                    },
                );
            } else {
                self.deferred.remove(&key);
            }
        }
        Ok(())
    }

    /// Applies a moveregs remap to every in-flight deferral of `table`.
    ///
    /// Returns the number of addresses that changed.
    pub fn update_eop_addr(
        &mut self,
        kind: AddrKind,
        table: usize,
        rewrite: &DeferredRamRewriteInfo,
    ) -> usize {
        let mut moved = 0;
        for (key, entry) in &mut self.deferred {
            if key.kind != kind || key.table != table {
                continue;
            }
            let addr = rewrite.rewrite_addr(entry.addr);
            if addr != entry.addr {
                tracing::debug!(
                    %kind,
                    table,
                    eop_num = key.eop_num,
                    from = entry.addr,
                    to = addr,
                    "deferred address moved"
                );
                entry.addr = addr;
                moved += 1;
            }
        }
        moved
    }

    /// Deferred address of `kind` from `table` under `eop_num`.
    #[must_use]
    pub fn deferred_addr(
        &self,
        kind: AddrKind,
        table: usize,
        eop_num: u8,
    ) -> Option<&DeferredAddr> {
        self.deferred.get(&DeferKey {
            kind,
            table,
            eop_num,
        })
    }

    /// Every deferral not yet fully distributed.
    pub fn deferred_addrs(&self) -> impl Iterator<Item = (&DeferKey, &DeferredAddr)> + '_ {
        self.deferred.iter()
    }
}
