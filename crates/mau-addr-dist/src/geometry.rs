//! Fixed stage geometry: table, row, bus and ALU counts plus address tags.

/// Number of logical tables time-multiplexed onto one stage.
pub const LOGICAL_TABLES: usize = 16;
/// Number of logical rows (left and right half of each physical row).
pub const LOGICAL_ROWS: usize = 16;
/// Number of logical columns (RAM positions) per logical row.
pub const LOGICAL_COLUMNS: usize = 12;
/// Number of stats ALUs per stage.
pub const STATS_ALUS: usize = 4;
/// Number of meter ALUs per stage.
pub const METER_ALUS: usize = 4;
/// Number of overflow buses shared by all logical tables.
pub const OVERFLOW_BUSES: usize = 3;
/// Number of resource kinds carried by the distribution fabric.
pub const ADDR_KINDS: usize = 4;

/// Sentinel returned by address reads that found nothing valid.
pub const INVALID_ADDR: u32 = 0;

/// Logical row hosting each stats ALU.
pub const STATS_ALU_LOGICAL_ROWS: [usize; STATS_ALUS] = [1, 5, 9, 13];
/// Logical row hosting each meter ALU.
pub const METER_ALU_LOGICAL_ROWS: [usize; METER_ALUS] = [3, 7, 11, 15];

/// Bit position of the meter-type field inside a meter address.
pub const METER_TYPE_SHIFT: u32 = 24;
/// Mask of the meter-type field after shifting.
pub const METER_TYPE_MASK: u32 = 0x7;

const _: () = assert_alu_layout();

const fn assert_alu_layout() {
    let mut i = 0;
    while i < STATS_ALUS {
        assert!(
            STATS_ALU_LOGICAL_ROWS[i] < LOGICAL_ROWS,
            "stats alu row out of range"
        );
        let mut j = 0;
        while j < METER_ALUS {
            assert!(
                STATS_ALU_LOGICAL_ROWS[i] != METER_ALU_LOGICAL_ROWS[j],
                "stats and meter alus cannot share a row"
            );
            j += 1;
        }
        if i > 0 {
            assert!(
                STATS_ALU_LOGICAL_ROWS[i - 1] < STATS_ALU_LOGICAL_ROWS[i],
                "stats alu rows must ascend"
            );
        }
        i += 1;
    }

    let mut k = 0;
    while k < METER_ALUS {
        assert!(
            METER_ALU_LOGICAL_ROWS[k] < LOGICAL_ROWS,
            "meter alu row out of range"
        );
        if k > 0 {
            assert!(
                METER_ALU_LOGICAL_ROWS[k - 1] < METER_ALU_LOGICAL_ROWS[k],
                "meter alu rows must ascend"
            );
        }
        k += 1;
    }

    assert!(LOGICAL_ROWS <= 16, "row masks are 16 bits wide");
    assert!(LOGICAL_TABLES <= 16, "table masks are 16 bits wide");
    assert!(LOGICAL_COLUMNS <= 16, "column masks are 16 bits wide");
}

/// Returns the single-bit mask for a logical row.
#[must_use]
pub const fn row_bit(row: usize) -> u16 {
    1 << row
}

/// Iterates the logical rows set in `mask`, lowest first.
pub fn rows_in(mask: u16) -> impl Iterator<Item = usize> {
    (0..LOGICAL_ROWS).filter(move |row| mask & row_bit(*row) != 0)
}

/// Resource kind carried by the address-distribution fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AddrKind {
    /// Action-data RAM address.
    Action,
    /// Stats RAM address.
    Stats,
    /// Meter / stateful / selector RAM address.
    Meter,
    /// Idle-time MAPRAM address.
    Idletime,
}

impl AddrKind {
    /// All kinds in array-index order.
    pub const ALL: [Self; ADDR_KINDS] = [Self::Action, Self::Stats, Self::Meter, Self::Idletime];

    /// Returns the array index for this kind.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns `true` for the kinds served by an ALU with deferred RAM.
    #[must_use]
    pub const fn has_alu(self) -> bool {
        matches!(self, Self::Stats | Self::Meter)
    }

    /// Short lowercase name used in log fields.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Stats => "stats",
            Self::Meter => "meter",
            Self::Idletime => "idletime",
        }
    }
}

impl std::fmt::Display for AddrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Resource-kind tag stored alongside a distributed address.
///
/// Rows keep one slot per [`AddrKind`], so a tag mismatch on a row can only
/// come from the meter family, whose addresses carry a type field. Overflow
/// buses are shared by every kind and keep whichever tag was written last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AddrType {
    /// Action-data address.
    Action,
    /// Stats address.
    Stats,
    /// Colour meter address.
    Meter,
    /// Stateful ALU address.
    Stateful,
    /// Selector address.
    Selector,
    /// Idle-time address.
    Idletime,
}

impl AddrType {
    /// Derives the tag of `addr` when distributed as `kind`.
    #[must_use]
    pub const fn classify(kind: AddrKind, addr: u32) -> Self {
        match kind {
            AddrKind::Action => Self::Action,
            AddrKind::Stats => Self::Stats,
            AddrKind::Idletime => Self::Idletime,
            AddrKind::Meter => match (addr >> METER_TYPE_SHIFT) & METER_TYPE_MASK {
                2 => Self::Stateful,
                3 => Self::Selector,
                _ => Self::Meter,
            },
        }
    }

    /// Returns the resource kind this tag belongs to.
    #[must_use]
    pub const fn kind(self) -> AddrKind {
        match self {
            Self::Action => AddrKind::Action,
            Self::Stats => AddrKind::Stats,
            Self::Meter | Self::Stateful | Self::Selector => AddrKind::Meter,
            Self::Idletime => AddrKind::Idletime,
        }
    }
}

/// Overflow bus identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum OverflowBus {
    /// Primary overflow bus.
    Primary,
    /// Secondary overflow bus routed towards higher rows.
    SecondaryUp,
    /// Secondary overflow bus routed towards lower rows.
    SecondaryDown,
}

impl OverflowBus {
    /// All buses in array-index order.
    pub const ALL: [Self; OVERFLOW_BUSES] = [Self::Primary, Self::SecondaryUp, Self::SecondaryDown];

    /// Returns the array index for this bus.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Returns the logical row hosting the ALU `alu` of `kind`, if `kind` has ALUs.
#[must_use]
pub const fn alu_logical_row(kind: AddrKind, alu: usize) -> Option<usize> {
    match kind {
        AddrKind::Stats if alu < STATS_ALUS => Some(STATS_ALU_LOGICAL_ROWS[alu]),
        AddrKind::Meter if alu < METER_ALUS => Some(METER_ALU_LOGICAL_ROWS[alu]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        alu_logical_row, row_bit, rows_in, AddrKind, AddrType, OverflowBus, METER_ALUS,
        METER_ALU_LOGICAL_ROWS, STATS_ALUS, STATS_ALU_LOGICAL_ROWS,
    };

    #[test]
    fn rows_in_visits_set_bits_in_order() {
        let rows: Vec<_> = rows_in(row_bit(0) | row_bit(4) | row_bit(15)).collect();
        assert_eq!(rows, vec![0, 4, 15]);
        assert_eq!(rows_in(0).count(), 0);
    }

    #[test]
    fn meter_type_field_selects_tag() {
        assert_eq!(AddrType::classify(AddrKind::Meter, 0x0100_0010), AddrType::Meter);
        assert_eq!(AddrType::classify(AddrKind::Meter, 0x0200_0010), AddrType::Stateful);
        assert_eq!(AddrType::classify(AddrKind::Meter, 0x0300_0010), AddrType::Selector);
        assert_eq!(AddrType::classify(AddrKind::Stats, 0x0300_0010), AddrType::Stats);
        for tag in [AddrType::Meter, AddrType::Stateful, AddrType::Selector] {
            assert_eq!(tag.kind(), AddrKind::Meter);
        }
    }

    #[test]
    fn alu_rows_resolve_per_kind() {
        for alu in 0..STATS_ALUS {
            assert_eq!(
                alu_logical_row(AddrKind::Stats, alu),
                Some(STATS_ALU_LOGICAL_ROWS[alu])
            );
        }
        for alu in 0..METER_ALUS {
            assert_eq!(
                alu_logical_row(AddrKind::Meter, alu),
                Some(METER_ALU_LOGICAL_ROWS[alu])
            );
        }
        assert_eq!(alu_logical_row(AddrKind::Action, 0), None);
        assert_eq!(alu_logical_row(AddrKind::Stats, STATS_ALUS), None);
    }

    #[test]
    fn index_order_matches_all_tables() {
        for (i, kind) in AddrKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
        for (i, bus) in OverflowBus::ALL.iter().enumerate() {
            assert_eq!(bus.index(), i);
        }
    }
}
