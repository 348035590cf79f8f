//! Overtime-monitor acceptance tests.
//!
//! Each test isolates one threshold by parking the other two far out of
//! reach, then induces real overtime with busy work inside the paced loop.
//! The monitor never latches: verdicts recover once the ratios fall back
//! under their caps.

use super::common::busy_wait;
use pace_common::config::OvertimeConfig;
use pace_runtime::LoopPacer;
use std::time::Duration;

fn monitored_pacer(frequency_hz: f64, config: OvertimeConfig) -> LoopPacer {
    let mut pacer = LoopPacer::new(frequency_hz).unwrap();
    pacer.enable_overtime_monitoring(&config);
    pacer
}

#[test]
fn test_single_cycle_threshold_trips_and_recovers() {
    let mut pacer = monitored_pacer(
        100.0,
        OvertimeConfig {
            max_single: Duration::from_millis(5),
            max_average: Duration::from_secs(1),
            max_late_percentage: 100.0,
            print_warning: false,
        },
    );

    assert!(pacer.wait_for_next_tick());

    // Entry lands ~18 ms past the next 10 ms deadline.
    busy_wait(Duration::from_millis(28));
    assert!(!pacer.wait_for_next_tick());

    // Catch-up cycles drain the backlog; with the other thresholds parked,
    // the verdict recovers as soon as entries are back on schedule.
    let mut recovered = false;
    for _ in 0..10 {
        if pacer.wait_for_next_tick() {
            recovered = true;
            break;
        }
    }
    assert!(recovered, "verdict never recovered after the late cycle");

    let snapshot = pacer.overtime().unwrap();
    assert!(snapshot.late_cycles >= 1);
    assert!(
        snapshot.max_overtime_ns >= 15_000_000,
        "max overtime {} ns",
        snapshot.max_overtime_ns
    );
}

#[test]
fn test_average_threshold_crosses_and_decays() {
    let mut pacer = monitored_pacer(
        100.0,
        OvertimeConfig {
            max_single: Duration::from_secs(1),
            max_average: Duration::from_millis(1),
            max_late_percentage: 100.0,
            print_warning: false,
        },
    );

    // 20 on-time cycles keep the cumulative average at zero.
    for _ in 0..20 {
        assert!(pacer.wait_for_next_tick());
    }

    // One ~30 ms overtime spread over 21 cycles is still above the 1 ms
    // average cap.
    busy_wait(Duration::from_millis(40));
    assert!(!pacer.wait_for_next_tick());

    // The average is a cumulative mean, so it stays over the cap for a
    // while even though entries are back on schedule.
    for _ in 0..10 {
        assert!(!pacer.wait_for_next_tick());
    }

    // Enough on-time cycles dilute it back under the cap.
    let mut recovered = false;
    for _ in 0..100 {
        if pacer.wait_for_next_tick() {
            recovered = true;
            break;
        }
    }
    assert!(recovered, "average verdict never recovered");

    let snapshot = pacer.overtime().unwrap();
    assert!(
        snapshot.average_overtime_ns <= 1_000_000,
        "average {} ns at recovery",
        snapshot.average_overtime_ns
    );
    assert!(snapshot.max_overtime_ns >= 25_000_000);
}

#[test]
fn test_late_share_threshold_at_cap_and_over() {
    // 50 Hz so a ~10 ms overtime stays well under the 20 ms interval and
    // produces exactly one late cycle per stall.
    let mut pacer = monitored_pacer(
        50.0,
        OvertimeConfig {
            max_single: Duration::from_secs(1),
            max_average: Duration::from_secs(1),
            max_late_percentage: 20.0,
            print_warning: false,
        },
    );

    for _ in 0..4 {
        assert!(pacer.wait_for_next_tick());
    }

    // One late of five sits exactly at the 20 % cap; breach is strict, so
    // the verdict holds.
    busy_wait(Duration::from_millis(30));
    assert!(pacer.wait_for_next_tick(), "at-cap late share must pass");

    // A second late cycle pushes the share to 2 of 6.
    busy_wait(Duration::from_millis(25));
    assert!(!pacer.wait_for_next_tick());

    // On-time cycles dilute the share; 2 of 10 reaches the cap again.
    let mut recovered = false;
    for _ in 0..20 {
        if pacer.wait_for_next_tick() {
            recovered = true;
            break;
        }
    }
    assert!(recovered, "late share never diluted back to the cap");

    let snapshot = pacer.overtime().unwrap();
    assert!(
        snapshot.late_percentage <= 20.0,
        "share {} % at recovery",
        snapshot.late_percentage
    );
    assert!(snapshot.late_cycles >= 2);
}

#[test]
fn test_reinitialize_clears_monitor_state() {
    let mut pacer = monitored_pacer(
        100.0,
        OvertimeConfig {
            max_single: Duration::from_millis(2),
            max_average: Duration::from_secs(1),
            max_late_percentage: 100.0,
            print_warning: false,
        },
    );

    assert!(pacer.wait_for_next_tick());
    busy_wait(Duration::from_millis(25));
    assert!(!pacer.wait_for_next_tick());
    assert!(pacer.overtime().unwrap().late_cycles >= 1);

    pacer.reinitialize(pacer.interval());
    let snapshot = pacer.overtime().unwrap();
    assert_eq!(snapshot.total_cycles, 0);
    assert_eq!(snapshot.late_cycles, 0);
    assert_eq!(snapshot.max_overtime_ns, 0);

    assert!(pacer.wait_for_next_tick());
}
