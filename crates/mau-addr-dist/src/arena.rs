//! Stage-owned MAPRAM storage seen through arena indices.

/// Index of a MAPRAM inside the stage-owned arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MapramId(pub usize);

/// Colour write waiting for its MAPRAM write latency to elapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ColorWriteEntry {
    /// Time the meter ALU produced the colour, in picoseconds.
    pub issue_time: u64,
    /// Delay before the write lands, in picoseconds.
    pub write_latency: u64,
    /// Meter address whose colour is written.
    pub addr: u32,
    /// Logical row of the colour MAPRAM.
    pub mapram_row: usize,
    /// Logical column of the colour MAPRAM.
    pub mapram_col: usize,
    /// Colour value.
    pub color: u8,
}

impl ColorWriteEntry {
    /// Time at which the write becomes durable.
    #[must_use]
    pub const fn deadline(&self) -> u64 {
        self.issue_time.saturating_add(self.write_latency)
    }

    /// Returns `true` once the write may be applied at `now`.
    ///
    /// A dequeue at `now` serves a meter access that completes one write
    /// latency later, so every write landing by then is visible to it.
    #[must_use]
    pub const fn is_due(&self, now: u64) -> bool {
        self.deadline() <= now.saturating_add(self.write_latency)
    }
}

/// MAPRAM operations the address-distribution model drives.
///
/// The MAPRAMs themselves (idle counters, colour bits, stats words) belong
/// to the enclosing stage; sweepers hold only [`MapramId`]s into it.
pub trait MapramArena {
    /// Number of addressable words in a MAPRAM.
    fn words(&self, id: MapramId) -> usize;

    /// Ages every idle counter in a MAPRAM; returns the notifications raised.
    fn idle_sweep(&mut self, id: MapramId, now: u64) -> u32;

    /// Marks one idle word as recently hit.
    fn idle_hit(&mut self, id: MapramId, word: usize);

    /// Reads one idle word, optionally clearing it.
    fn idle_dump_word(&mut self, id: MapramId, word: usize, clear: bool) -> u64;

    /// Refreshes the meter state backed by a MAPRAM.
    fn meter_sweep(&mut self, id: MapramId, now: u64);

    /// Reads one stats word, optionally clearing it.
    fn stats_dump_word(&mut self, id: MapramId, word: usize, clear: bool) -> u64;

    /// Applies a colour write whose latency has elapsed.
    fn write_color(&mut self, entry: &ColorWriteEntry);
}
