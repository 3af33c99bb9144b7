//! End-to-end coverage of header, EOP and TEOP address distribution.
//!
//! Each test drives a `MauAddrDist` the way a stage driver would: configure
//! registers, distribute, read back per row, consume, and audit.

#![allow(
    clippy::pedantic,
    clippy::nursery,
    clippy::cast_possible_truncation,
    clippy::too_many_lines
)]

use mau_addr_dist::{
    AddrDistFault, AddrDistRegs, AddrKind, AddrType, ColorWriteEntry, DeferredRamCtl,
    DeferredRamRewriteInfo, HazardClass, Leftover, Location, MapramArena, MapramId, MauAddrDist,
    OverflowBus, Phase, VerificationPolicy, INVALID_ADDR, LOGICAL_ROWS, STATS_ALU_LOGICAL_ROWS,
};
use proptest::prelude::*;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

fn stage(policy: VerificationPolicy, configure: impl FnOnce(&mut AddrDistRegs)) -> MauAddrDist {
    init_tracing();
    let mut regs = AddrDistRegs::default();
    configure(&mut regs);
    MauAddrDist::new(policy, regs)
}

#[derive(Default)]
struct ColorLog {
    writes: Vec<ColorWriteEntry>,
}

impl MapramArena for ColorLog {
    fn words(&self, _id: MapramId) -> usize {
        0
    }

    fn idle_sweep(&mut self, _id: MapramId, _now: u64) -> u32 {
        0
    }

    fn idle_hit(&mut self, _id: MapramId, _word: usize) {}

    fn idle_dump_word(&mut self, _id: MapramId, _word: usize, _clear: bool) -> u64 {
        0
    }

    fn meter_sweep(&mut self, _id: MapramId, _now: u64) {}

    fn stats_dump_word(&mut self, _id: MapramId, _word: usize, _clear: bool) -> u64 {
        0
    }

    fn write_color(&mut self, entry: &ColorWriteEntry) {
        self.writes.push(*entry);
    }
}

#[test]
fn stats_address_reaches_exactly_its_home_rows() {
    let mut dist = stage(VerificationPolicy::STRICT, |regs| {
        regs.set_home_rows(AddrKind::Stats, 3, (1 << 0) | (1 << 4));
    });
    dist.distrib_stats_addresses(3, true, 0x1234).unwrap();

    for row in 0..LOGICAL_ROWS {
        let expected = if row == 0 || row == 4 { 0x1234 } else { INVALID_ADDR };
        assert_eq!(dist.stats_addr(row, true), expected, "row {row}");
    }
    assert_eq!(dist.stats_addr(0, false), INVALID_ADDR);
    assert_eq!(dist.action_addr(0, true), INVALID_ADDR);

    dist.stats_addr_consume(0, 0x1234).unwrap();
    dist.stats_addr_consume(4, 0x1234).unwrap();
    assert!(dist.all_addrs_consumed());
    dist.check_addrs_consumed().unwrap();
    assert_eq!(dist.diagnostics().distributed(AddrKind::Stats), 2);
}

#[test]
fn disjoint_tables_share_a_cycle_without_faults() {
    let mut dist = stage(VerificationPolicy::STRICT, |regs| {
        regs.set_home_rows(AddrKind::Action, 1, 1 << 0);
        regs.set_home_rows(AddrKind::Action, 2, 1 << 1);
    });
    dist.distrib_action_addresses(1, true, 0x11).unwrap();
    dist.distrib_action_addresses(2, true, 0x22).unwrap();
    assert_eq!(dist.action_addr(0, true), 0x11);
    assert_eq!(dist.action_addr(1, true), 0x22);
    assert_eq!(dist.diagnostics().hazard_count(HazardClass::MultiWrite), 0);
}

#[test]
fn identical_writes_to_one_row_are_not_a_conflict() {
    let mut dist = stage(VerificationPolicy::STRICT, |regs| {
        regs.set_home_rows(AddrKind::Action, 1, 1 << 0);
        regs.set_home_rows(AddrKind::Action, 2, 1 << 0);
    });
    dist.distrib_action_addresses(1, true, 0x11).unwrap();
    dist.distrib_action_addresses(2, true, 0x11).unwrap();
    assert_eq!(dist.action_addr(0, true), 0x11);
}

proptest! {
    #[test]
    fn disjoint_home_rows_never_conflict(
        rows in 1_u16..=u16::MAX,
        split in any::<u16>(),
        addr in 1_u32..0x0100_0000,
        other_addr in 1_u32..0x0100_0000,
    ) {
        let first = rows & split;
        let second = rows & !split;
        prop_assume!(first != 0 && second != 0);
        let mut dist = stage(VerificationPolicy::STRICT, |regs| {
            regs.set_home_rows(AddrKind::Action, 1, first);
            regs.set_home_rows(AddrKind::Action, 2, second);
        });

        prop_assert!(dist.distrib_action_addresses(1, true, addr).is_ok());
        prop_assert!(dist.distrib_action_addresses(2, true, other_addr).is_ok());
        prop_assert_eq!(dist.diagnostics().hazard_count(HazardClass::MultiWrite), 0);
        for row in 0..LOGICAL_ROWS {
            let expected = if first & (1 << row) != 0 {
                addr
            } else if second & (1 << row) != 0 {
                other_addr
            } else {
                INVALID_ADDR
            };
            prop_assert_eq!(dist.action_addr(row, true), expected);
        }
    }

    #[test]
    fn different_addresses_on_overlapping_home_rows_always_conflict(
        first in 1_u16..=u16::MAX,
        second in 1_u16..=u16::MAX,
        addr in 1_u32..0x0100_0000,
        other_addr in 1_u32..0x0100_0000,
    ) {
        prop_assume!(first & second != 0 && addr != other_addr);
        let mut dist = stage(VerificationPolicy::STRICT, |regs| {
            regs.set_home_rows(AddrKind::Action, 1, first);
            regs.set_home_rows(AddrKind::Action, 2, second);
        });

        prop_assert!(dist.distrib_action_addresses(1, true, addr).is_ok());
        let err = dist.distrib_action_addresses(2, true, other_addr);
        prop_assert!(
            matches!(err, Err(AddrDistFault::ConflictingRowWrite { table: 2, .. })),
            "expected a row conflict, got {:?}",
            err
        );
        prop_assert!(dist.diagnostics().hazard_count(HazardClass::MultiWrite) >= 1);
    }
}

#[rstest]
#[case::strict(VerificationPolicy::STRICT)]
#[case::relaxed(VerificationPolicy::RELAXED)]
fn overlapping_tables_conflict_on_a_row(#[case] policy: VerificationPolicy) {
    let mut dist = stage(policy, |regs| {
        regs.set_home_rows(AddrKind::Action, 1, 1 << 0);
        regs.set_home_rows(AddrKind::Action, 2, 1 << 0);
    });
    dist.distrib_action_addresses(1, true, 0x11).unwrap();
    let second = dist.distrib_action_addresses(2, true, 0x22);

    let expected = AddrDistFault::ConflictingRowWrite {
        kind: AddrKind::Action,
        phase: Phase::Header,
        row: 0,
        table: 2,
        addr: 0x22,
        other_table: 1,
        other_addr: 0x11,
    };
    if policy.is_relaxed(HazardClass::MultiWrite) {
        second.unwrap();
        assert_eq!(dist.action_addr(0, true), 0x22);
    } else {
        assert_eq!(second.unwrap_err(), expected);
        assert_eq!(dist.action_addr(0, true), 0x11);
    }
    assert_eq!(dist.diagnostics().last_fault(), Some(&expected));
    assert_eq!(dist.diagnostics().hazard_count(HazardClass::MultiWrite), 1);
}

#[test]
fn leftover_address_names_its_row() {
    let mut dist = stage(VerificationPolicy::STRICT, |regs| {
        regs.set_home_rows(AddrKind::Action, 0, (1 << 2) | (1 << 5));
    });
    dist.distrib_action_addresses(0, true, 0x99).unwrap();
    dist.action_addr_consume(2, 0x99).unwrap();

    assert!(!dist.all_addrs_consumed());
    assert_eq!(
        dist.unconsumed_addrs(),
        vec![Leftover {
            kind: AddrKind::Action,
            phase: Phase::Header,
            location: Location::Row(5),
            addr: 0x99,
        }]
    );
    let err = dist.check_addrs_consumed().unwrap_err();
    assert_eq!(err.to_string(), "action Header address 0x99 on row 5 never consumed");
}

#[rstest]
#[case::strict(VerificationPolicy::STRICT)]
#[case::relaxed(VerificationPolicy::RELAXED)]
fn disabled_table_goes_to_the_shadow_only(#[case] policy: VerificationPolicy) {
    let mut dist = stage(policy, |regs| {
        regs.set_home_rows(AddrKind::Meter, 3, 1 << 6);
    });
    dist.set_pred_enabled(!(1 << 3));
    let result = dist.distrib_meter_addresses(3, true, 0x42);

    assert_eq!(result.is_ok(), policy.is_relaxed(HazardClass::Predication));
    assert_eq!(dist.not_enabled_addr(AddrKind::Meter, 3), 0x42);
    assert_eq!(dist.meter_addr(6, true), INVALID_ADDR);
    assert!(dist.all_addrs_consumed());
    assert_eq!(dist.diagnostics().hazard_count(HazardClass::Predication), 1);

    dist.reset();
    assert_eq!(dist.not_enabled_addr(AddrKind::Meter, 3), INVALID_ADDR);
    dist.distrib_meter_addresses(3, true, 0x42).unwrap();
    assert_eq!(dist.meter_addr(6, true), 0x42);
}

#[test]
fn multiple_alus_is_fatal_when_strict() {
    let mut dist = stage(VerificationPolicy::STRICT, |regs| {
        regs.stats_alu_select[2] = 0b0101;
    });
    let err = dist.distrib_stats_addresses(2, true, 0x10).unwrap_err();
    assert_eq!(
        err,
        AddrDistFault::MultipleAlusSelected {
            kind: AddrKind::Stats,
            table: 2,
            alu_mask: 0b0101,
        }
    );
    assert_eq!(err.class(), HazardClass::Config);
}

#[test]
fn multiple_alus_pick_the_highest_when_relaxed() {
    let mut dist = stage(VerificationPolicy::RELAXED, |regs| {
        regs.stats_alu_select[2] = 0b0101;
    });
    dist.distrib_stats_addresses(2, true, 0x10).unwrap();
    assert_eq!(dist.stats_addr(STATS_ALU_LOGICAL_ROWS[2], true), 0x10);
    assert_eq!(dist.stats_addr(STATS_ALU_LOGICAL_ROWS[0], true), INVALID_ADDR);
}

#[test]
fn overflow_bus_ors_and_keeps_provenance() {
    let mut dist = stage(VerificationPolicy::RELAXED, |regs| {
        regs.set_overflow(AddrKind::Stats, 1, OverflowBus::Primary, true);
        regs.set_overflow(AddrKind::Action, 4, OverflowBus::Primary, true);
    });
    dist.distrib_stats_addresses(1, true, 0x10).unwrap();
    dist.distrib_action_addresses(4, true, 0x03).unwrap();

    let slot = *dist.bus_slot(Phase::Header, OverflowBus::Primary);
    assert_eq!(slot.addr, 0x13);
    assert_eq!(slot.srctab, Some(1));
    assert_eq!(slot.tag, Some(AddrType::Action));
    assert_eq!(dist.diagnostics().hazard_count(HazardClass::MultiWrite), 1);

    let action = dist
        .overflow_addr(OverflowBus::Primary, AddrKind::Action, Phase::Header, true)
        .unwrap();
    let stats = dist
        .overflow_addr(OverflowBus::Primary, AddrKind::Stats, Phase::Header, true)
        .unwrap();
    assert_eq!((action, stats), (0x13, INVALID_ADDR));

    dist.overflow_addr_consume(OverflowBus::Primary, Phase::Header, 0x13)
        .unwrap();
    assert!(dist.all_addrs_consumed());
}

#[test]
fn conflicting_bus_write_is_fatal_when_strict() {
    let mut dist = stage(VerificationPolicy::STRICT, |regs| {
        regs.set_overflow(AddrKind::Action, 1, OverflowBus::SecondaryUp, true);
        regs.set_overflow(AddrKind::Action, 2, OverflowBus::SecondaryUp, true);
    });
    dist.distrib_action_addresses(1, true, 0x10).unwrap();
    let err = dist.distrib_action_addresses(2, true, 0x20).unwrap_err();
    assert!(matches!(
        err,
        AddrDistFault::ConflictingBusWrite {
            bus: OverflowBus::SecondaryUp,
            table: 2,
            other_addr: 0x10,
            ..
        }
    ));
}

#[test]
fn unconsumed_bus_is_reported_by_bus() {
    let mut dist = stage(VerificationPolicy::STRICT, |regs| {
        regs.set_overflow(AddrKind::Idletime, 0, OverflowBus::SecondaryDown, true);
    });
    dist.distrib_idletime_addresses(0, true, 0x5).unwrap();
    assert_eq!(
        dist.unconsumed_addrs(),
        vec![Leftover {
            kind: AddrKind::Idletime,
            phase: Phase::Header,
            location: Location::Bus(OverflowBus::SecondaryDown),
            addr: 0x5,
        }]
    );
}

#[test]
fn meter_tags_follow_the_type_field() {
    let mut dist = stage(VerificationPolicy::STRICT, |regs| {
        regs.set_home_rows(AddrKind::Meter, 0, 1 << 2);
    });
    dist.distrib_meter_addresses(0, true, 0x0300_0010).unwrap();
    let slot = dist.row_slot(AddrKind::Meter, Phase::Header, 2).copied().unwrap();
    assert_eq!(slot.tag, Some(AddrType::Selector));
    assert_eq!(dist.meter_addr(2, true), 0x0300_0010);
}

const DEFER_TABLE: usize = 5;
const DEFER_ALU: usize = 1;

fn deferring_regs(regs: &mut AddrDistRegs) {
    regs.set_home_rows(AddrKind::Stats, DEFER_TABLE, 1);
    regs.stats_alu_select[DEFER_TABLE] = 1 << DEFER_ALU;
    regs.stats_deferred[DEFER_ALU] = DeferredRamCtl {
        eop_enabled: true,
        teop_enabled: true,
        egress_thread: false,
        suppress_on_error: true,
        rewrite: DeferredRamRewriteInfo::passthrough(),
    };
}

#[rstest]
#[case::header_ingress(Phase::Header, true, false, 0b1)]
#[case::header_egress(Phase::Header, false, false, 0b1 | 1 << 5)]
#[case::eop(Phase::Eop, true, false, 1 << 5)]
#[case::eop_errored(Phase::Eop, true, true, 0)]
#[case::eop_egress(Phase::Eop, false, false, 0)]
#[case::teop(Phase::Teop, true, false, 1 << 5)]
fn stats_rows_per_phase(
    #[case] phase: Phase,
    #[case] ingress: bool,
    #[case] error: bool,
    #[case] expected: u16,
) {
    let mut dist = stage(VerificationPolicy::STRICT, deferring_regs);
    let rows = dist
        .calculate_stats_rows(DEFER_TABLE, ingress, phase, error)
        .unwrap();
    assert_eq!(rows, expected);
}

#[test]
fn deferred_stats_flow_through_eop_and_teop() {
    let mut dist = stage(VerificationPolicy::STRICT, |regs| {
        deferring_regs(regs);
        regs.stats_deferred[DEFER_ALU].rewrite = DeferredRamRewriteInfo::new(0x100, 0x200, 0xf00);
    });
    let alu_row = STATS_ALU_LOGICAL_ROWS[DEFER_ALU];

    dist.set_eop_num(true, Some(9));
    dist.distrib_stats_addresses(DEFER_TABLE, true, 0x123).unwrap();
    assert_eq!(dist.stats_addr(0, true), 0x123);
    assert_eq!(dist.stats_addr(alu_row, true), INVALID_ADDR);
    dist.finalize_stats_addresses().unwrap();
    dist.stats_addr_consume(0, 0x123).unwrap();
    dist.check_addrs_consumed().unwrap();

    dist.reset();
    dist.distrib_stats_addresses_eop(9, true, false).unwrap();
    assert_eq!(dist.addr(AddrKind::Stats, Phase::Eop, alu_row, true), 0x223);
    dist.consume(AddrKind::Stats, Phase::Eop, alu_row, 0x223).unwrap();

    dist.reset();
    dist.teop_output_stats_addr(9, true, false).unwrap();
    assert_eq!(dist.addr(AddrKind::Stats, Phase::Teop, alu_row, true), 0x223);
    dist.consume(AddrKind::Stats, Phase::Teop, alu_row, 0x223).unwrap();
    dist.check_addrs_consumed().unwrap();
    assert_eq!(dist.deferred_addrs().count(), 0);
}

#[rstest]
#[case::strict(VerificationPolicy::STRICT)]
#[case::relaxed(VerificationPolicy::RELAXED)]
fn deferring_to_a_non_deferring_alu_is_never_silent(#[case] policy: VerificationPolicy) {
    let mut dist = stage(policy, |regs| {
        regs.stats_alu_select[3] = 0b0001;
    });
    let result = dist.defer_stats_addresses(3, true, 0x44, 7);
    let expected = AddrDistFault::AluNotDeferring {
        kind: AddrKind::Stats,
        table: 3,
        alu: 0,
        ingress: true,
    };
    if policy.is_relaxed(HazardClass::Config) {
        result.unwrap();
    } else {
        assert_eq!(result.unwrap_err(), expected);
    }
    assert_eq!(dist.diagnostics().hazard_count(HazardClass::Config), 1);
    assert_eq!(dist.deferred_addrs().count(), 0);

    dist.finalize_stats_addresses().unwrap();
    dist.distrib_stats_addresses_eop(7, true, false).unwrap();
    dist.teop_output_stats_addr(7, true, false).unwrap();
    assert_eq!(dist.diagnostics().hazard_count(HazardClass::Config), 1);
}

#[test]
fn two_tables_on_one_deferred_slot_conflict() {
    let mut dist = stage(VerificationPolicy::RELAXED, |regs| {
        deferring_regs(regs);
        regs.stats_alu_select[6] = 1 << DEFER_ALU;
    });
    dist.defer_stats_addresses(DEFER_TABLE, true, 0x10, 2).unwrap();
    dist.defer_stats_addresses(6, true, 0x20, 2).unwrap();
    dist.finalize_stats_addresses().unwrap();

    assert_eq!(dist.diagnostics().hazard_count(HazardClass::MultiWrite), 1);
    assert!(dist.deferred_addr(AddrKind::Stats, DEFER_TABLE, 2).is_none());
    assert_eq!(
        dist.deferred_addr(AddrKind::Stats, 6, 2).map(|entry| entry.addr),
        Some(0x20)
    );
}

fn claimed_meter_stage(latency: u64) -> MauAddrDist {
    let mut dist = stage(VerificationPolicy::STRICT, |regs| {
        regs.color_write_latency_ps[0] = latency;
    });
    assert!(dist.meter_alu_claim(0, 3, 2, 1));
    dist
}

#[rstest]
#[case(9, 0)]
#[case(10, 1)]
#[case(19, 1)]
#[case(24, 2)]
#[case(29, 2)]
#[case(30, 3)]
fn colour_writes_land_after_their_latency(#[case] now: u64, #[case] expected: usize) {
    let mut dist = claimed_meter_stage(5);
    let mut log = ColorLog::default();
    for (issue_time, color) in [(10_u64, 1_u8), (20, 2), (30, 3)] {
        dist.queue_color_write(0, issue_time, 0x40 + u32::from(color), color)
            .unwrap();
    }

    assert_eq!(dist.dequeue_color_writes(0, now, &mut log), expected);
    let applied: Vec<u64> = log.writes.iter().map(|entry| entry.issue_time).collect();
    assert_eq!(applied, [10_u64, 20, 30][..expected].to_vec());
    assert_eq!(dist.queued_color_writes(0).count(), 3 - expected);
}

#[test]
fn colour_queue_is_fifo_even_when_a_later_entry_is_due() {
    let mut dist = claimed_meter_stage(5);
    let mut log = ColorLog::default();
    dist.queue_color_write(0, 30, 0x1, 1).unwrap();
    dist.queue_color_write(0, 10, 0x2, 2).unwrap();
    assert_eq!(dist.dequeue_color_writes(0, 20, &mut log), 0);
    assert_eq!(dist.dequeue_color_writes(0, 35, &mut log), 2);
    assert_eq!(log.writes[0].addr, 0x1);
}

#[test]
fn moveregs_retargets_queued_colour_writes() {
    let mut dist = claimed_meter_stage(5);
    let mut log = ColorLog::default();
    dist.queue_color_write(0, 0, 0x0001_0040, 1).unwrap();
    dist.queue_color_write(0, 0, 0x0002_0040, 1).unwrap();

    let rewrite = DeferredRamRewriteInfo::new(0x1_0000, 0x3_0000, 0xf_0000);
    let moved = dist.update_queued_addr(0, &rewrite);
    assert_eq!(moved, 1);
    dist.flush_queued_color_writes(0, &mut log);
    let addrs: Vec<u32> = log.writes.iter().map(|entry| entry.addr).collect();
    assert_eq!(addrs, vec![0x0003_0040, 0x0002_0040]);
}

#[test]
fn losing_claim_does_not_change_the_colour_target() {
    let mut dist = claimed_meter_stage(5);
    assert!(!dist.meter_alu_claim(0, 9, 9, 4));
    assert!(dist.meter_alu_claim(0, 11, 0, 0));
    dist.queue_color_write(0, 0, 0x10, 1).unwrap();
    let entry = dist.queued_color_writes(0).next().copied().unwrap();
    assert_eq!((entry.mapram_row, entry.mapram_col), (11, 0));
}
