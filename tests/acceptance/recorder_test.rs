//! Recorder acceptance test: a live paced producer with a background
//! recording, checked end to end against the file on disk.

use super::common::read_rows;
use pace_runtime::{ChannelSlot, LoopPacer, SignalRecorder};
use std::time::Duration;

#[test]
fn test_live_recording_of_a_paced_loop() {
    // Producer state, declared before the recorder so the registered
    // addresses outlive its worker thread.
    let mut position = 0.0f64;
    let mut velocity = [0.0f64, 0.0];
    let mut ticks = 0i64;
    let mut homed = false;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.csv");
    let mut recorder = SignalRecorder::new(&path);

    // SAFETY: the variables above are still alive when the recorder stops.
    unsafe {
        assert!(recorder.add_channel(ChannelSlot::vector(&velocity), "velocity"));
        assert!(recorder.add_channel(ChannelSlot::real(&position), "position"));
        assert!(recorder.add_channel(ChannelSlot::int(&ticks), "ticks"));
        assert!(recorder.add_channel(ChannelSlot::boolean(&homed), "homed"));
    }
    assert!(recorder.start(100.0).unwrap());

    // 80 cycles at 200 Hz: a 400 ms run, sampled at 100 Hz.
    let mut pacer = LoopPacer::new(200.0).unwrap();
    for _ in 0..80 {
        pacer.wait_for_next_tick();
        let t = pacer.elapsed_sim_time().as_secs_f64();
        position = t;
        velocity[0] = 1.0;
        velocity[1] = (10.0 * t).sin();
        ticks += 1;
        homed = ticks > 40;
    }
    recorder.stop();
    pacer.stop();

    let (header, rows) = read_rows(&path);
    assert_eq!(header, "time, velocity_0, velocity_1, position, ticks, homed");
    assert!(
        rows.len() >= 20 && rows.len() <= 60,
        "expected ~40 rows, got {}",
        rows.len()
    );

    let mut last_time = -1.0f64;
    for row in &rows {
        assert_eq!(row.len(), 6, "malformed row {row:?}");
        let time: f64 = row[0].parse().unwrap();
        assert!(time > last_time, "time column not increasing");
        last_time = time;
    }

    // Rows must reflect the producer's live state: position ramps with the
    // producer clock, which tracks the recorder clock to within scheduling
    // noise.
    let mid = &rows[rows.len() / 2];
    let t_mid: f64 = mid[0].parse().unwrap();
    let position_mid: f64 = mid[3].parse().unwrap();
    assert!(position_mid > 0.0, "position never moved");
    assert!(
        (position_mid - t_mid).abs() < 0.15,
        "position {position_mid} at t {t_mid}"
    );

    let last = rows.last().unwrap();
    let ticks_last: i64 = last[4].parse().unwrap();
    assert!(ticks_last > 40, "final row saw {ticks_last} producer ticks");
    assert_eq!(last[5], "1", "homing flag never recorded as set");

    // The producer kept pace while the recorder ran.
    assert_eq!(pacer.elapsed_cycles(), 80);
    assert!(pacer.elapsed_time() >= Duration::from_millis(400));
}
