//! Integration tests for the threshold table and the boost window.
//!
//! These tests exercise tier lookup through the public API the way the
//! scan coordinator uses it.

use herakles_lowmem_killer::thresholds::{oom_adj_to_score_adj, STOCK_FORK_BOOST};
use herakles_lowmem_killer::tunables::ThresholdTunables;
use herakles_lowmem_killer::{BoostWindow, ConfigError, ThresholdTable};
use std::time::Duration;

/// Helper function to create the stock four-tier table without boost.
fn stock_table() -> ThresholdTable {
    ThresholdTable::from_lists(&[0, 1, 6, 12], &[1536, 2048, 4096, 16384], &[]).unwrap()
}

// -------------------------------------------------------------------------
// Lookup
// -------------------------------------------------------------------------

#[test]
fn test_both_counters_must_be_below_threshold() {
    let table = stock_table();

    // free 1800 is not below 1536, so the first tier is skipped even though
    // file 500 is; the second tier has both below 2048.
    let tier = table.lookup(1800, 500, 0, false).unwrap();
    assert_eq!(tier.priority_cutoff, 1);
    assert_eq!(tier.threshold, 2048);
}

#[test]
fn test_no_pressure_when_either_counter_is_high() {
    let table = stock_table();
    assert!(table.lookup(100, 20_000, 0, false).is_none());
    assert!(table.lookup(20_000, 100, 0, false).is_none());
}

#[test]
fn test_exact_threshold_is_not_crossed() {
    let table = stock_table();
    let tier = table.lookup(1536, 1536, 0, false).unwrap();
    assert_eq!(tier.priority_cutoff, 1);

    assert!(table.lookup(16384, 0, 0, false).is_none());
    assert_eq!(table.lookup(16383, 0, 0, false).unwrap().priority_cutoff, 12);
}

#[test]
fn test_reserve_larger_than_free_is_a_deficit() {
    let table = stock_table();
    // free - reserved goes negative, which is below every tier.
    let tier = table.lookup(100, 1000, 5000, false).unwrap();
    assert_eq!(tier.priority_cutoff, 0);
}

#[test]
fn test_empty_table_never_matches() {
    let table = ThresholdTable::from_lists(&[], &[], &[]).unwrap();
    assert!(table.is_empty());
    assert!(table.lookup(0, 0, 0, true).is_none());
}

#[test]
fn test_boost_only_counts_when_requested() {
    let table = ThresholdTable::from_lists(&[0, 1000], &[1024, 2048], &[0, 4096]).unwrap();

    assert!(table.lookup(3000, 3000, 0, false).is_none());
    let tier = table.lookup(3000, 3000, 0, true).unwrap();
    assert_eq!(tier.priority_cutoff, 1000);
    assert_eq!(tier.threshold, 2048 + 4096);
    assert_eq!(tier.boost_pages, 4096);
}

// -------------------------------------------------------------------------
// Construction
// -------------------------------------------------------------------------

#[test]
fn test_rejects_malformed_lists() {
    assert!(matches!(
        ThresholdTable::from_lists(&[0, 1], &[100], &[]),
        Err(ConfigError::LengthMismatch { adj: 2, minfree: 1 })
    ));
    assert!(matches!(
        ThresholdTable::from_lists(&[0; 7], &[1; 7], &[]),
        Err(ConfigError::TooManyTiers { len: 7, max: 6 })
    ));
    assert!(matches!(
        ThresholdTable::from_lists(&[0, 1], &[200, 100], &[]),
        Err(ConfigError::Unsorted { list: "minfree", index: 1 })
    ));
}

#[test]
fn test_boost_list_is_padded_and_truncated() {
    let table = stock_table().with_boost(&STOCK_FORK_BOOST).unwrap();
    assert_eq!(table.boosts(), vec![0, 0, 0, 5120]);

    let table = stock_table().with_boost(&[7]).unwrap();
    assert_eq!(table.boosts(), vec![7, 0, 0, 0]);
}

#[test]
fn test_default_tunables_convert_legacy_cutoffs() {
    let table = ThresholdTunables::default().build().unwrap();
    assert_eq!(table.cutoffs(), vec![0, 58, 352, 705]);
    assert_eq!(oom_adj_to_score_adj(15), 1000);
    assert_eq!(oom_adj_to_score_adj(-17), -1000);
}

#[test]
fn test_score_adj_cutoffs_are_left_alone() {
    let tunables = ThresholdTunables {
        adj: vec![0, 200, 900],
        minfree: vec![1000, 2000, 3000],
        fork_boost_minfree: Vec::new(),
        autodetect_oom_adj: true,
    };
    assert_eq!(tunables.build().unwrap().cutoffs(), vec![0, 200, 900]);
}

// -------------------------------------------------------------------------
// Boost window
// -------------------------------------------------------------------------

#[test]
fn test_boost_window_expires_exactly_at_deadline() {
    let window = BoostWindow::new(true, Duration::from_millis(2000));
    let t = Duration::from_secs(10);
    assert!(!window.is_active(t));

    window.note_fork_burst(t);
    assert!(window.is_active(t + Duration::from_millis(1999)));
    assert!(!window.is_active(t + Duration::from_millis(2000)));
}

#[test]
fn test_disabled_boost_window_never_activates() {
    let window = BoostWindow::new(false, Duration::from_millis(2000));
    window.note_fork_burst(Duration::from_secs(1));
    assert!(!window.is_active(Duration::from_secs(1)));

    window.set_enabled(true);
    assert!(window.is_active(Duration::from_secs(1)));
}
