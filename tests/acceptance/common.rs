//! Common utilities for acceptance tests.

#![allow(dead_code)] // Some helpers are only used by the ignored soak tests

use std::path::Path;
use std::time::{Duration, Instant};

/// Check if running as root. Real-time scheduling degrades to a warning
/// without privileges, but soak results are better with them.
pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions.
    unsafe { libc::geteuid() == 0 }
}

/// Burn CPU for `duration` without sleeping, like a work chunk inside a
/// paced cycle.
pub fn busy_wait(duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        std::hint::spin_loop();
    }
}

/// Assert `actual` lies in `[min, max]`, with a readable failure message.
pub fn assert_between(actual: Duration, min: Duration, max: Duration, what: &str) {
    assert!(
        actual >= min && actual <= max,
        "{what}: {actual:?} outside [{min:?}, {max:?}]"
    );
}

/// Split a recorded file into its header line and `", "`-separated rows.
pub fn read_rows(path: &Path) -> (String, Vec<Vec<String>>) {
    let content = std::fs::read_to_string(path).unwrap();
    let mut lines = content.lines();
    let header = lines.next().unwrap_or_default().to_string();
    let rows = lines
        .map(|line| line.split(", ").map(str::to_string).collect())
        .collect();
    (header, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_wait_reaches_duration() {
        let start = Instant::now();
        busy_wait(Duration::from_millis(5));
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_assert_between_accepts_bounds() {
        assert_between(
            Duration::from_millis(10),
            Duration::from_millis(10),
            Duration::from_millis(10),
            "exact bound",
        );
    }
}
