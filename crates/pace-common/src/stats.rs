//! Overtime accounting and end-of-run summaries.
//!
//! [`OvertimeStats`] keeps running counters of how late a paced loop is
//! against its deadlines. The pacer records one observation per tick; the
//! counters are cheap enough to update from a real-time loop. Snapshots are
//! serializable so they can be logged or dumped at shutdown.

use std::time::Duration;

use serde::Serialize;

/// Running overtime counters for a paced loop.
///
/// An observation of `Duration::ZERO` means the cycle met its deadline;
/// anything greater counts the cycle as late. Counters accumulate until
/// [`OvertimeStats::reset`].
#[derive(Debug, Clone, Default)]
pub struct OvertimeStats {
    total_cycles: u64,
    late_cycles: u64,
    total_overtime: Duration,
    max_overtime: Duration,
}

impl OvertimeStats {
    /// Creates empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the overtime of one completed cycle.
    #[inline]
    pub fn record(&mut self, overtime: Duration) {
        self.total_cycles += 1;
        if overtime > Duration::ZERO {
            self.late_cycles += 1;
        }
        self.total_overtime += overtime;
        if overtime > self.max_overtime {
            self.max_overtime = overtime;
        }
    }

    /// Number of cycles observed so far.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Number of observed cycles that missed their deadline.
    #[must_use]
    pub fn late_cycles(&self) -> u64 {
        self.late_cycles
    }

    /// Mean overtime across all observed cycles, on-time cycles included.
    #[must_use]
    pub fn average(&self) -> Duration {
        if self.total_cycles == 0 {
            return Duration::ZERO;
        }
        self.total_overtime / u32::try_from(self.total_cycles).unwrap_or(u32::MAX)
    }

    /// Largest single-cycle overtime observed.
    #[must_use]
    pub fn max_overtime(&self) -> Duration {
        self.max_overtime
    }

    /// Share of observed cycles that were late, in percent (0.0 to 100.0).
    #[must_use]
    pub fn late_percentage(&self) -> f64 {
        if self.total_cycles == 0 {
            return 0.0;
        }
        self.late_cycles as f64 / self.total_cycles as f64 * 100.0
    }

    /// Clears all counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns a serializable snapshot of the current counters.
    #[must_use]
    pub fn snapshot(&self) -> OvertimeSnapshot {
        OvertimeSnapshot {
            total_cycles: self.total_cycles,
            late_cycles: self.late_cycles,
            late_percentage: self.late_percentage(),
            average_overtime_ns: duration_to_ns(self.average()),
            max_overtime_ns: duration_to_ns(self.max_overtime),
        }
    }
}

/// Point-in-time copy of [`OvertimeStats`], suitable for logging.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OvertimeSnapshot {
    /// Cycles observed while monitoring was active.
    pub total_cycles: u64,
    /// Observed cycles that missed their deadline.
    pub late_cycles: u64,
    /// Late share in percent.
    pub late_percentage: f64,
    /// Mean per-cycle overtime in nanoseconds.
    pub average_overtime_ns: u64,
    /// Worst single-cycle overtime in nanoseconds.
    pub max_overtime_ns: u64,
}

/// End-of-run report for a paced loop.
///
/// Produced by the pacer after (or during) a run; `achieved_hz` is derived
/// from wall-clock elapsed time and will differ from `requested_hz` when the
/// loop body overran its interval.
#[derive(Debug, Clone, Serialize)]
pub struct PacingSummary {
    /// Completed wait cycles.
    pub cycles: u64,
    /// Wall-clock time since the schedule was (re)armed, in nanoseconds.
    pub elapsed_ns: u64,
    /// Frequency the loop was configured for, in Hertz.
    pub requested_hz: f64,
    /// Frequency actually achieved over the run, in Hertz.
    pub achieved_hz: f64,
    /// Overtime counters, present when monitoring was enabled.
    pub overtime: Option<OvertimeSnapshot>,
}

impl PacingSummary {
    /// Wall-clock elapsed time as a [`Duration`].
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns)
    }
}

fn duration_to_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
