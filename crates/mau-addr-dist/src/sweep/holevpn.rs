//! VPN-with-hole arithmetic.
//!
//! A holed VPN reserves a 2-bit field at `hole_pos` whose value `0b11` is
//! never used. Counting treats that field as the fastest-moving digit: the
//! low `hole_pos + 2` bits are rotated so the field sits at bit 0, the value
//! is incremented, `0b11` is skipped, and the bits are rotated back.

/// Width of a VPN in bits.
pub const VPN_BITS: u32 = 6;
/// Number of distinct VPN values.
pub const VPN_COUNT: usize = 1 << VPN_BITS;
/// Mask of the legal VPN bits.
pub const VPN_MASK: u32 = (1 << VPN_BITS) - 1;
/// Width of the hole field in bits.
pub const HOLE_BITS: u32 = 2;
/// Reserved hole-field value that never appears in a sweep sequence.
pub const HOLE_AVOID: u32 = 0b11;
/// Highest legal hole position.
pub const HOLE_POS_MAX: u32 = VPN_BITS - HOLE_BITS;

const HOLE_FIELD_MASK: u32 = (1 << HOLE_BITS) - 1;
/// Usable hole-field values per group once [`HOLE_AVOID`] is skipped.
const GROUP_SIZE: u32 = HOLE_FIELD_MASK;

/// Returns `true` when `hole_pos` is absent or inside the VPN field.
#[must_use]
pub const fn hole_pos_valid(hole_pos: Option<u32>) -> bool {
    match hole_pos {
        None => true,
        Some(pos) => pos <= HOLE_POS_MAX,
    }
}

/// Returns the mask of the hole bits, or `0` without a hole.
#[must_use]
pub const fn hole_mask(hole_pos: Option<u32>) -> u32 {
    match hole_pos {
        Some(pos) if pos <= HOLE_POS_MAX => HOLE_FIELD_MASK << pos,
        _ => 0,
    }
}

/// Returns the hole-field value of `vpn`, or `None` without a hole.
#[must_use]
pub const fn hole_field(vpn: u32, hole_pos: Option<u32>) -> Option<u32> {
    match hole_pos {
        Some(pos) if pos <= HOLE_POS_MAX => Some((vpn >> pos) & HOLE_FIELD_MASK),
        _ => None,
    }
}

/// Moves the hole field of `vpn` down to bit 0, shifting the bits below it up.
const fn rotate_hole_down(vpn: u32, pos: u32) -> u32 {
    let low_width = pos + HOLE_BITS;
    let high = (vpn >> low_width) << low_width;
    let field = (vpn >> pos) & HOLE_FIELD_MASK;
    let below = vpn & ((1 << pos) - 1);
    high | (below << HOLE_BITS) | field
}

/// Inverse of [`rotate_hole_down`].
const fn rotate_hole_up(rotated: u32, pos: u32) -> u32 {
    let low_width = pos + HOLE_BITS;
    let high = (rotated >> low_width) << low_width;
    let field = rotated & HOLE_FIELD_MASK;
    let below = (rotated >> HOLE_BITS) & ((1 << pos) - 1);
    high | (field << pos) | below
}

/// Returns the position of `vpn` in counting order with its hole field dropped.
///
/// Two VPNs in the same group differ only in their hole field.
#[must_use]
pub const fn holevpn_group(vpn: u32, hole_pos: Option<u32>) -> u32 {
    match hole_pos {
        Some(pos) if pos <= HOLE_POS_MAX => rotate_hole_down(vpn & VPN_MASK, pos) >> HOLE_BITS,
        _ => vpn & VPN_MASK,
    }
}

/// Validates a VPN range.
///
/// Without a hole the range must be ordered and fit the VPN width. With a
/// hole, `min <= max` is compared after zeroing both hole fields, and the
/// hole field of `max` must not be [`HOLE_AVOID`].
#[must_use]
pub const fn holevpn_check(min: u32, max: u32, hole_pos: Option<u32>) -> bool {
    if max > VPN_MASK || min > VPN_MASK || !hole_pos_valid(hole_pos) {
        return false;
    }
    match hole_pos {
        None => min <= max,
        Some(pos) => {
            let holes = HOLE_FIELD_MASK << pos;
            (min & !holes) <= (max & !holes) && (max >> pos) & HOLE_FIELD_MASK != HOLE_AVOID
        }
    }
}

/// Returns the first VPN of the sweep starting at `val`: its hole field zeroed.
#[must_use]
pub const fn holevpn_init_min(val: u32, hole_pos: Option<u32>) -> u32 {
    (val & VPN_MASK) & !hole_mask(hole_pos)
}

/// Returns the VPN after `val` in holed counting order, wrapping at the VPN width.
#[must_use]
pub const fn holevpn_incr(val: u32, hole_pos: Option<u32>) -> u32 {
    match hole_pos {
        Some(pos) if pos <= HOLE_POS_MAX => {
            let mut rotated = rotate_hole_down(val & VPN_MASK, pos) + 1;
            if rotated & HOLE_FIELD_MASK == HOLE_AVOID {
                rotated += 1;
            }
            rotate_hole_up(rotated & VPN_MASK, pos)
        }
        _ => (val + 1) & VPN_MASK,
    }
}

/// Number of VPNs a validated range sweeps.
#[must_use]
pub const fn holevpn_count(min: u32, max: u32, hole_pos: Option<u32>) -> usize {
    match hole_field(max, hole_pos) {
        Some(field) => {
            let groups = holevpn_group(max, hole_pos) - holevpn_group(min, hole_pos);
            (groups * GROUP_SIZE + field + 1) as usize
        }
        None => (max - min + 1) as usize,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        holevpn_check, holevpn_count, holevpn_incr, holevpn_init_min, HOLE_AVOID, HOLE_POS_MAX,
        VPN_MASK,
    };

    #[test]
    fn hole_at_one_counts_hole_field_first() {
        let mut seq = vec![holevpn_init_min(0, Some(1))];
        while *seq.last().unwrap() != 5 {
            seq.push(holevpn_incr(*seq.last().unwrap(), Some(1)));
        }
        assert_eq!(seq, vec![0, 2, 4, 1, 3, 5]);
        assert_eq!(holevpn_count(0, 5, Some(1)), 6);
    }

    #[test]
    fn avoid_pattern_in_max_is_rejected() {
        assert!(!holevpn_check(0, 0b110, Some(1)));
        assert!(holevpn_check(0, 0b100, Some(1)));
    }

    #[test]
    fn min_hole_bits_are_ignored_by_check() {
        assert!(holevpn_check(0b0110, 0b1000, Some(1)));
        assert!(!holevpn_check(0b1000, 0b0100, Some(1)));
    }

    #[test]
    fn range_outside_vpn_width_is_rejected() {
        assert!(!holevpn_check(0, VPN_MASK + 1, None));
        assert!(!holevpn_check(0, 4, Some(HOLE_POS_MAX + 1)));
        assert!(!holevpn_check(5, 4, None));
    }

    #[test]
    fn no_hole_counts_plainly_and_wraps() {
        assert_eq!(holevpn_incr(7, None), 8);
        assert_eq!(holevpn_incr(VPN_MASK, None), 0);
        assert_eq!(holevpn_count(3, 9, None), 7);
    }

    #[test]
    fn top_hole_wraps_to_zero_after_last_valid_vpn() {
        let pos = Some(HOLE_POS_MAX);
        let last = (0b10 << HOLE_POS_MAX) | 0b1111;
        assert_eq!(holevpn_incr(last, pos), 0);
        let mut vpn = 0;
        for _ in 0..48 {
            assert_ne!((vpn >> HOLE_POS_MAX) & 0b11, HOLE_AVOID);
            vpn = holevpn_incr(vpn, pos);
        }
        assert_eq!(vpn, 0);
    }
}
