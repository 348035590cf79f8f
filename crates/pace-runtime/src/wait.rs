//! Precision deadline waits on the monotonic clock.
//!
//! Kernel sleeps alone wake a scheduler quantum or more past the requested
//! time. [`sleep_until`] therefore sleeps coarsely until `spin_margin` before
//! the deadline and spins out the remainder, trading a bounded slice of CPU
//! for sub-millisecond wakeup accuracy.

use std::time::{Duration, Instant};

/// Spin window used when the caller does not configure one.
pub const DEFAULT_SPIN_MARGIN: Duration = Duration::from_micros(150);

/// Blocks the calling thread until `deadline` has passed.
///
/// Returns immediately if the deadline is already in the past. The coarse
/// phase re-checks the clock after every kernel sleep, so an early wakeup
/// (signal delivery) lengthens the sleep, not the spin.
pub fn sleep_until(deadline: Instant, spin_margin: Duration) {
    loop {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        let remaining = deadline - now;
        if remaining <= spin_margin {
            break;
        }
        coarse_sleep(remaining - spin_margin);
    }

    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

#[cfg(target_os = "linux")]
fn coarse_sleep(duration: Duration) {
    let ts = libc::timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: i64::from(duration.subsec_nanos()) as libc::c_long,
    };

    // SAFETY: clock_nanosleep with a valid timespec is safe
    unsafe {
        libc::clock_nanosleep(libc::CLOCK_MONOTONIC, 0, &ts, std::ptr::null_mut());
    }
}

#[cfg(not(target_os = "linux"))]
fn coarse_sleep(duration: Duration) {
    std::thread::sleep(duration);
}
