//! Per-table and per-ALU sweep state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::holevpn::{holevpn_check, holevpn_count, holevpn_incr, holevpn_init_min, VPN_COUNT};
use crate::{sweep_period_ps, MapramArena, MapramId};

/// What a sweeper drives on its MAPRAMs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum SweepKind {
    /// Idle-time aging and dumps for one logical table.
    Idle,
    /// Stats dumps for one logical table.
    StatsDump,
    /// Meter refresh for one meter ALU.
    Meter,
}

/// Running-state transition reported to the owner of a sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum SweepEdge {
    /// The sweeper started; the scheduler should tick it every `period_ps`.
    Started {
        /// Sweep period in picoseconds.
        period_ps: u64,
    },
    /// The sweeper keeps running with a new period.
    Retimed {
        /// Sweep period in picoseconds.
        period_ps: u64,
    },
    /// The sweeper stopped.
    Stopped,
}

/// Sweep cursor shared with diagnostics observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SweepStatus {
    /// Whether the sweeper is running.
    pub running: bool,
    /// Next position in the sweep sequence.
    pub seq_pos: usize,
    /// Time of the next due sweep step, in picoseconds.
    pub next_sweep_ps: u64,
    /// VPNs swept since construction.
    pub vpns_swept: u64,
    /// Full passes over the sequence since construction.
    pub passes_completed: u64,
}

/// Read-only handle a diagnostics thread can poll.
#[derive(Debug, Clone)]
pub struct SweepMonitor {
    status: Arc<Mutex<SweepStatus>>,
}

impl SweepMonitor {
    /// Returns the current sweep cursor.
    #[must_use]
    pub fn snapshot(&self) -> SweepStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MapramRef {
    id: MapramId,
    vpn: u32,
    prio: u32,
}

/// Sweep and dump state of one logical table or meter ALU.
///
/// MAPRAMs are owned by the stage and referenced by [`MapramId`]; they are
/// visited in priority order, or in sequence order first when a hole is
/// configured, so sweeps and dumps match the hardware walk.
#[derive(Debug)]
pub struct SweepInfo {
    kind: SweepKind,
    index: usize,
    min_vpn: u32,
    max_vpn: u32,
    hole_pos: Option<u32>,
    sweep_interval: u8,
    enabled: bool,
    seq_to_vpn: [u32; VPN_COUNT],
    seq_len: usize,
    vpn_to_seq: [Option<u8>; VPN_COUNT],
    vpn_valid_mask: u64,
    maprams: Vec<MapramRef>,
    status: Arc<Mutex<SweepStatus>>,
}

impl SweepInfo {
    /// Creates a disabled sweeper with an empty VPN range.
    #[must_use]
    pub fn new(kind: SweepKind, index: usize) -> Self {
        Self {
            kind,
            index,
            min_vpn: 0,
            max_vpn: 0,
            hole_pos: None,
            sweep_interval: 0,
            enabled: false,
            seq_to_vpn: [0; VPN_COUNT],
            seq_len: 0,
            vpn_to_seq: [None; VPN_COUNT],
            vpn_valid_mask: 0,
            maprams: Vec::new(),
            status: Arc::new(Mutex::new(SweepStatus::default())),
        }
    }

    fn lock_status(&self) -> MutexGuard<'_, SweepStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sweeper kind.
    #[must_use]
    pub const fn kind(&self) -> SweepKind {
        self.kind
    }

    /// Owning logical table or meter ALU.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Configured minimum VPN.
    #[must_use]
    pub const fn min_vpn(&self) -> u32 {
        self.min_vpn
    }

    /// Configured maximum VPN.
    #[must_use]
    pub const fn max_vpn(&self) -> u32 {
        self.max_vpn
    }

    /// Configured hole position.
    #[must_use]
    pub const fn hole_pos(&self) -> Option<u32> {
        self.hole_pos
    }

    /// Configured sweep-interval exponent.
    #[must_use]
    pub const fn sweep_interval(&self) -> u8 {
        self.sweep_interval
    }

    /// Whether sweeping is enabled by configuration.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// VPNs in sweep order.
    #[must_use]
    pub fn seq_to_vpn(&self) -> &[u32] {
        &self.seq_to_vpn[..self.seq_len]
    }

    /// Sweep position of `vpn`, if it is part of the range.
    #[must_use]
    pub fn vpn_to_seq(&self, vpn: u32) -> Option<usize> {
        self.vpn_to_seq
            .get(vpn as usize)
            .copied()
            .flatten()
            .map(usize::from)
    }

    /// Bitmap of VPNs inside the configured range.
    #[must_use]
    pub const fn vpn_valid_mask(&self) -> u64 {
        self.vpn_valid_mask
    }

    /// Returns a handle for polling the sweep cursor from another thread.
    #[must_use]
    pub fn monitor(&self) -> SweepMonitor {
        SweepMonitor {
            status: Arc::clone(&self.status),
        }
    }

    /// Returns the current sweep cursor.
    #[must_use]
    pub fn status(&self) -> SweepStatus {
        *self.lock_status()
    }

    /// Configures the VPN range and rebuilds the sequence tables.
    ///
    /// Returns `false` and leaves every table untouched when the range fails
    /// [`holevpn_check`].
    pub fn set_vpn_range(&mut self, min: u32, max: u32, hole_pos: Option<u32>) -> bool {
        if !holevpn_check(min, max, hole_pos) {
            return false;
        }

        let len = holevpn_count(min, max, hole_pos);
        let mut seq_to_vpn = [0; VPN_COUNT];
        let mut vpn_to_seq = [None; VPN_COUNT];
        let mut valid = 0_u64;
        let mut vpn = holevpn_init_min(min, hole_pos);
        for (seq, slot) in seq_to_vpn.iter_mut().enumerate().take(len) {
            *slot = vpn;
            vpn_to_seq[vpn as usize] = u8::try_from(seq).ok();
            valid |= 1 << vpn;
            vpn = holevpn_incr(vpn, hole_pos);
        }

        self.min_vpn = min;
        self.max_vpn = max;
        self.hole_pos = hole_pos;
        self.seq_to_vpn = seq_to_vpn;
        self.seq_len = len;
        self.vpn_to_seq = vpn_to_seq;
        self.vpn_valid_mask = valid;
        self.lock_status().seq_pos = 0;
        self.sort_maprams();
        tracing::debug!(
            kind = ?self.kind,
            index = self.index,
            min,
            max,
            ?hole_pos,
            len,
            "sweep vpn range configured"
        );
        true
    }

    /// References a stage-owned MAPRAM serving `vpn`.
    pub fn add_mapram(&mut self, id: MapramId, vpn: u32, prio: u32) {
        self.maprams.push(MapramRef { id, vpn, prio });
    }

    /// Drops every MAPRAM reference.
    pub fn clear_maprams(&mut self) {
        self.maprams.clear();
    }

    /// Orders MAPRAMs for sweeps and dumps.
    pub fn sort_maprams(&mut self) {
        if self.hole_pos.is_some() {
            let vpn_to_seq = self.vpn_to_seq;
            self.maprams.sort_by_key(|m| {
                let seq = vpn_to_seq
                    .get(m.vpn as usize)
                    .copied()
                    .flatten()
                    .map_or(usize::MAX, usize::from);
                (seq, m.prio)
            });
        } else {
            self.maprams.sort_by_key(|m| m.prio);
        }
    }

    /// MAPRAMs in visiting order.
    pub fn maprams(&self) -> impl Iterator<Item = MapramId> + '_ {
        self.maprams.iter().map(|m| m.id)
    }

    fn maprams_for(&self, vpn: u32) -> impl Iterator<Item = MapramId> + '_ {
        self.maprams
            .iter()
            .filter(move |m| m.vpn == vpn)
            .map(|m| m.id)
    }

    fn can_run(&self) -> bool {
        self.enabled && self.seq_len > 0 && sweep_period_ps(self.sweep_interval).is_some()
    }

    /// Updates enablement and interval, reporting the resulting transition.
    pub fn set_sweep_config(&mut self, enabled: bool, interval: u8, now: u64) -> Option<SweepEdge> {
        let old_interval = self.sweep_interval;
        self.enabled = enabled;
        self.sweep_interval = interval;
        let running = self.lock_status().running;

        match (running, self.can_run()) {
            (false, true) => self.sweep_start(now),
            (true, false) => self.sweep_end(),
            (true, true) if old_interval != interval => {
                let period_ps = sweep_period_ps(interval)?;
                self.lock_status().next_sweep_ps = now.saturating_add(period_ps);
                Some(SweepEdge::Retimed { period_ps })
            }
            _ => None,
        }
    }

    /// Starts sweeping if configuration allows and it is not already running.
    #[doc(alias = "idle_sweep_start")]
    pub fn sweep_start(&mut self, now: u64) -> Option<SweepEdge> {
        if !self.can_run() {
            return None;
        }
        let period_ps = sweep_period_ps(self.sweep_interval)?;
        let mut status = self.lock_status();
        if status.running {
            return None;
        }
        status.running = true;
        status.seq_pos = 0;
        status.next_sweep_ps = now.saturating_add(period_ps);
        drop(status);
        tracing::debug!(kind = ?self.kind, index = self.index, period_ps, "sweeper started");
        Some(SweepEdge::Started { period_ps })
    }

    /// Stops sweeping if it is running.
    #[doc(alias = "idle_sweep_end")]
    pub fn sweep_end(&mut self) -> Option<SweepEdge> {
        let mut status = self.lock_status();
        if !status.running {
            return None;
        }
        status.running = false;
        drop(status);
        tracing::debug!(kind = ?self.kind, index = self.index, "sweeper stopped");
        Some(SweepEdge::Stopped)
    }

    /// Sweeps every VPN step due at `now`, at most one full pass per call.
    ///
    /// Returns the idle notifications raised by the swept MAPRAMs.
    #[doc(alias = "idle_sweep")]
    pub fn sweep<A: MapramArena + ?Sized>(&mut self, now: u64, arena: &mut A) -> u32 {
        let Some(period_ps) = sweep_period_ps(self.sweep_interval) else {
            return 0;
        };
        let mut due = Vec::new();
        {
            let mut status = self.lock_status();
            if !status.running || self.seq_len == 0 {
                return 0;
            }
            while status.next_sweep_ps <= now && due.len() < self.seq_len {
                due.push(self.seq_to_vpn[status.seq_pos]);
                status.seq_pos = (status.seq_pos + 1) % self.seq_len;
                if status.seq_pos == 0 {
                    status.passes_completed += 1;
                }
                status.vpns_swept += 1;
                status.next_sweep_ps = status.next_sweep_ps.saturating_add(period_ps);
            }
            if status.next_sweep_ps <= now {
                status.next_sweep_ps = now.saturating_add(period_ps);
            }
        }

        let mut notifications = 0_u32;
        for vpn in due {
            let ids: Vec<_> = self.maprams_for(vpn).collect();
            for id in ids {
                match self.kind {
                    SweepKind::Idle => {
                        notifications = notifications.saturating_add(arena.idle_sweep(id, now));
                    }
                    SweepKind::Meter => arena.meter_sweep(id, now),
                    SweepKind::StatsDump => {}
                }
            }
        }
        notifications
    }

    /// Records a hit on `word` of the MAPRAM serving `vpn`.
    ///
    /// Returns `false` when no MAPRAM serves `vpn`.
    #[doc(alias = "idle_hit")]
    pub fn hit<A: MapramArena + ?Sized>(&self, vpn: u32, word: usize, arena: &mut A) -> bool {
        match self.maprams_for(vpn).next() {
            Some(id) => {
                arena.idle_hit(id, word);
                true
            }
            None => false,
        }
    }

    /// Reads one word of the MAPRAM serving `vpn`.
    #[doc(alias = "idle_dump_word")]
    pub fn dump_word<A: MapramArena + ?Sized>(
        &self,
        vpn: u32,
        word: usize,
        clear: bool,
        arena: &mut A,
    ) -> Option<u64> {
        let id = self.maprams_for(vpn).next()?;
        if word >= arena.words(id) {
            return None;
        }
        self.read_word(id, word, clear, arena)
    }

    /// Reads every word of every MAPRAM in sweep order.
    #[doc(alias = "idle_dump")]
    pub fn dump<A: MapramArena + ?Sized>(&self, clear: bool, arena: &mut A) -> Vec<u64> {
        let mut words = Vec::new();
        for &vpn in self.seq_to_vpn() {
            for id in self.maprams_for(vpn) {
                for word in 0..arena.words(id) {
                    if let Some(value) = self.read_word(id, word, clear, arena) {
                        words.push(value);
                    }
                }
            }
        }
        words
    }

    fn read_word<A: MapramArena + ?Sized>(
        &self,
        id: MapramId,
        word: usize,
        clear: bool,
        arena: &mut A,
    ) -> Option<u64> {
        match self.kind {
            SweepKind::Idle => Some(arena.idle_dump_word(id, word, clear)),
            SweepKind::StatsDump => Some(arena.stats_dump_word(id, word, clear)),
            SweepKind::Meter => None,
        }
    }
}
