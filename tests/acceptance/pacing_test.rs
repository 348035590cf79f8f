//! Pacing accuracy acceptance tests.
//!
//! Runs real paced loops against the host clock and checks the additive
//! schedule: N ticks span N/frequency seconds, stalled cycles never push
//! later deadlines out, and frequency changes apply from the next advance
//! on. Upper bounds are generous for loaded machines; lower bounds are
//! hard, since a deadline can never be early.

use super::common::{assert_between, busy_wait};
use pace_runtime::LoopPacer;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_n_ticks_span_n_over_f() {
    let mut pacer = LoopPacer::new(200.0).unwrap();

    let start = Instant::now();
    for _ in 0..40 {
        pacer.wait_for_next_tick();
    }
    let elapsed = start.elapsed();

    // 40 ticks at 200 Hz: 200 ms ideal.
    assert_between(
        elapsed,
        Duration::from_millis(200),
        Duration::from_millis(260),
        "40 ticks at 200 Hz",
    );
    assert_eq!(pacer.elapsed_cycles(), 40);
    assert_eq!(pacer.elapsed_sim_time(), Duration::from_millis(200));
}

#[test]
fn test_stalled_cycle_does_not_stretch_the_schedule() {
    // 50 Hz, with one cycle stalled by almost three intervals. Later
    // deadlines stay at k * 20 ms, so the loop catches up instead of
    // shifting everything out by the stall.
    let mut pacer = LoopPacer::new(50.0).unwrap();

    let start = Instant::now();
    assert!(pacer.wait_for_next_tick());

    busy_wait(Duration::from_millis(55));
    assert!(!pacer.wait_for_next_tick());
    assert!(!pacer.wait_for_next_tick());

    for _ in 0..7 {
        pacer.wait_for_next_tick();
    }
    let elapsed = start.elapsed();

    assert_eq!(pacer.elapsed_cycles(), 10);
    // 10 ticks at 50 Hz: 200 ms ideal, stall or no stall.
    assert_between(
        elapsed,
        Duration::from_millis(200),
        Duration::from_millis(270),
        "10 ticks at 50 Hz with a stalled cycle",
    );
    assert_eq!(pacer.elapsed_sim_time(), Duration::from_millis(200));
}

#[test]
fn test_reset_frequency_applies_from_next_advance() {
    let mut pacer = LoopPacer::new(100.0).unwrap();

    let start = Instant::now();
    for _ in 0..5 {
        pacer.wait_for_next_tick();
    }
    pacer.reset_frequency(500.0).unwrap();
    for _ in 0..25 {
        pacer.wait_for_next_tick();
    }
    let elapsed = start.elapsed();

    // 5 ticks at 100 Hz, the already-pending 10 ms deadline, then 24 ticks
    // at 500 Hz: 108 ms ideal.
    assert_between(
        elapsed,
        Duration::from_millis(105),
        Duration::from_millis(170),
        "rate change mid-run",
    );
    assert_eq!(pacer.elapsed_cycles(), 30);
}

#[test]
fn test_reinitialize_restarts_the_schedule() {
    let mut pacer = LoopPacer::new(100.0).unwrap();
    for _ in 0..5 {
        pacer.wait_for_next_tick();
    }
    assert_eq!(pacer.elapsed_cycles(), 5);

    // A long pause would make the pending deadline ancient; reinitialize
    // plants a fresh one instead of catching up.
    thread::sleep(Duration::from_millis(50));
    pacer.reinitialize(pacer.interval());

    let start = Instant::now();
    for _ in 0..5 {
        assert!(pacer.wait_for_next_tick());
    }
    assert_between(
        start.elapsed(),
        Duration::from_millis(45),
        Duration::from_millis(90),
        "5 ticks after reinitialize",
    );
    assert_eq!(pacer.elapsed_cycles(), 5);
}

#[test]
fn test_stop_handle_halts_runner_from_another_thread() {
    let mut pacer = LoopPacer::new(250.0).unwrap();
    let handle = pacer.stop_handle();

    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(120));
        handle.stop();
    });

    let mut ticks = 0u64;
    pacer.run(|| ticks += 1);
    stopper.join().unwrap();

    assert!(!pacer.is_running());
    // ~30 ticks in 120 ms at 250 Hz; the runner may observe the flag one
    // tick late.
    assert!((20..=60).contains(&ticks), "saw {ticks} ticks");
}
