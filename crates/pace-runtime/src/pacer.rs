//! Fixed-frequency loop pacing on the monotonic clock.
//!
//! A [`LoopPacer`] keeps a loop on an absolute deadline lattice:
//!
//! ```text
//! deadline_k = run_start + initial_wait + k * interval
//! ```
//!
//! Every wait advances the lattice by exactly one interval. When a cycle
//! overruns, the following waits return immediately until the wall clock is
//! back behind the lattice; deadlines are never re-based to "now", so a
//! transient stall neither shifts the long-term schedule nor skips ticks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;
use tracing::warn;

use pace_common::{
    OvertimeConfig, OvertimeSnapshot, OvertimeStats, PaceError, PaceResult, PacerConfig,
    PacingSummary,
};

use crate::wait;

/// Absolute schedule of an active run.
#[derive(Debug, Clone, Copy)]
struct Schedule {
    /// When the run was (re)armed.
    start: Instant,
    /// Next tick deadline.
    deadline: Instant,
}

/// Paces a loop at a fixed frequency without long-term drift.
///
/// The schedule is armed lazily on the first [`wait_for_next_tick`] call (or
/// explicitly via [`reinitialize`]); construction alone does not start the
/// clock. The pacer is single-controller: all schedule mutation goes through
/// `&mut self`, while [`StopHandle`] offers a cloneable cross-thread stop
/// request.
///
/// [`wait_for_next_tick`]: LoopPacer::wait_for_next_tick
/// [`reinitialize`]: LoopPacer::reinitialize
#[derive(Debug)]
pub struct LoopPacer {
    interval: Duration,
    initial_wait: Duration,
    spin_margin: Duration,
    schedule: Option<Schedule>,
    cycles: u64,
    running: Arc<CachePadded<AtomicBool>>,
    monitor: Option<OvertimeMonitor>,
}

impl LoopPacer {
    /// Creates a pacer for `frequency_hz` ticks per second.
    ///
    /// The first tick is due one full interval after the clock starts, so N
    /// ticks span N/frequency seconds. Use [`LoopPacer::with_initial_wait`]
    /// to control the lead-in explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`PaceError::InvalidFrequency`] unless `frequency_hz` is
    /// positive, finite, and representable as a non-zero interval.
    pub fn new(frequency_hz: f64) -> PaceResult<Self> {
        let interval = interval_for(frequency_hz)?;
        Ok(Self::with_interval(interval, interval))
    }

    /// Creates a pacer whose first tick is due `initial_wait` after the
    /// clock starts. A zero wait makes the first tick due immediately.
    ///
    /// # Errors
    ///
    /// Returns [`PaceError::InvalidFrequency`] for a non-positive or
    /// non-finite frequency.
    pub fn with_initial_wait(frequency_hz: f64, initial_wait: Duration) -> PaceResult<Self> {
        let interval = interval_for(frequency_hz)?;
        Ok(Self::with_interval(interval, initial_wait))
    }

    /// Builds a pacer from configuration, including the optional overtime
    /// monitor and spin margin.
    ///
    /// # Errors
    ///
    /// Returns [`PaceError::InvalidFrequency`] for an unusable frequency.
    pub fn from_config(config: &PacerConfig) -> PaceResult<Self> {
        let mut pacer = match config.initial_wait {
            Some(wait) => Self::with_initial_wait(config.frequency_hz, wait)?,
            None => Self::new(config.frequency_hz)?,
        };
        pacer.spin_margin = config.spin_margin;
        if let Some(overtime) = &config.overtime {
            pacer.enable_overtime_monitoring(overtime);
        }
        Ok(pacer)
    }

    fn with_interval(interval: Duration, initial_wait: Duration) -> Self {
        Self {
            interval,
            initial_wait,
            spin_margin: wait::DEFAULT_SPIN_MARGIN,
            schedule: None,
            cycles: 0,
            running: Arc::new(CachePadded::new(AtomicBool::new(true))),
            monitor: None,
        }
    }

    /// Blocks until the current tick deadline, then advances the schedule by
    /// exactly one interval.
    ///
    /// A call that enters past its deadline returns immediately; the missed
    /// time is reported as that cycle's overtime and later deadlines stay
    /// where they were.
    ///
    /// With monitoring disabled the return value reports whether the call
    /// was on schedule (entered at or before its deadline). With monitoring
    /// enabled it reports whether all overtime thresholds still hold.
    pub fn wait_for_next_tick(&mut self) -> bool {
        let now = Instant::now();
        let schedule = match self.schedule {
            Some(schedule) => schedule,
            None => {
                let schedule = Schedule {
                    start: now,
                    deadline: now + self.initial_wait,
                };
                self.schedule = Some(schedule);
                schedule
            }
        };

        let deadline = schedule.deadline;
        let on_schedule = now <= deadline;
        if now < deadline {
            wait::sleep_until(deadline, self.spin_margin);
        }

        // Overtime is sampled at entry; a cycle that arrived in time has
        // zero overtime regardless of wakeup jitter.
        let overtime = now.saturating_duration_since(deadline);

        self.schedule = Some(Schedule {
            start: schedule.start,
            deadline: deadline + self.interval,
        });
        self.cycles += 1;

        match self.monitor.as_mut() {
            Some(monitor) => monitor.observe(self.cycles, overtime),
            None => on_schedule,
        }
    }

    /// Restarts the schedule: the clock starts now, the first tick is due
    /// after `initial_wait`, and cycle and overtime counters are cleared.
    ///
    /// The running flag is left alone: a stop request issued before the
    /// restart still holds afterwards.
    pub fn reinitialize(&mut self, initial_wait: Duration) {
        let now = Instant::now();
        self.schedule = Some(Schedule {
            start: now,
            deadline: now + initial_wait,
        });
        self.cycles = 0;
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.reset();
        }
    }

    /// Changes the tick frequency for subsequent deadlines. The pending
    /// deadline and all counters are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`PaceError::InvalidFrequency`] for an unusable frequency;
    /// the current interval is kept in that case.
    pub fn reset_frequency(&mut self, frequency_hz: f64) -> PaceResult<()> {
        self.interval = interval_for(frequency_hz)?;
        Ok(())
    }

    /// Enables overtime monitoring with the given thresholds.
    ///
    /// Counters start from this call; enabling mid-run does not account for
    /// earlier cycles. On an already-monitored pacer the thresholds are
    /// replaced and counters cleared.
    pub fn enable_overtime_monitoring(&mut self, config: &OvertimeConfig) {
        self.monitor = Some(OvertimeMonitor::new(config));
    }

    /// Runs `callback` once per tick until [`stop`](LoopPacer::stop) is
    /// observed. Arms the running flag and re-arms the schedule with the
    /// construction-time initial wait before the first tick.
    pub fn run<F>(&mut self, mut callback: F)
    where
        F: FnMut(),
    {
        self.reinitialize(self.initial_wait);
        self.running.store(true, Ordering::Release);
        while self.is_running() {
            self.wait_for_next_tick();
            callback();
        }
    }

    /// Requests termination of a [`run`](LoopPacer::run) loop (or any loop
    /// polling [`is_running`](LoopPacer::is_running)). A wait already in
    /// progress completes its sleep before the flag is observed.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Whether the running flag is set. Armed at construction and on entry
    /// to [`run`](LoopPacer::run); cleared by `stop`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns a cloneable handle that can stop this pacer from another
    /// thread.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// Completed wait cycles since the last reinitialize.
    #[must_use]
    pub fn elapsed_cycles(&self) -> u64 {
        self.cycles
    }

    /// Wall-clock time since the schedule was armed, or zero before the
    /// first tick.
    #[must_use]
    pub fn elapsed_time(&self) -> Duration {
        self.schedule
            .map_or(Duration::ZERO, |schedule| schedule.start.elapsed())
    }

    /// Ideal elapsed time: completed cycles times the current interval.
    #[must_use]
    pub fn elapsed_sim_time(&self) -> Duration {
        Duration::from_secs_f64(self.cycles as f64 * self.interval.as_secs_f64())
    }

    /// Current tick interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Current tick frequency in Hertz.
    #[must_use]
    pub fn frequency_hz(&self) -> f64 {
        1.0 / self.interval.as_secs_f64()
    }

    /// How close to a deadline the wait switches from sleeping to spinning.
    pub fn set_spin_margin(&mut self, margin: Duration) {
        self.spin_margin = margin;
    }

    /// Overtime counters, present when monitoring is enabled.
    #[must_use]
    pub fn overtime(&self) -> Option<OvertimeSnapshot> {
        self.monitor.as_ref().map(OvertimeMonitor::snapshot)
    }

    /// Produces an end-of-run report for the current schedule.
    #[must_use]
    pub fn summary(&self) -> PacingSummary {
        let elapsed = self.elapsed_time();
        let achieved_hz = if elapsed.is_zero() {
            0.0
        } else {
            self.cycles as f64 / elapsed.as_secs_f64()
        };
        PacingSummary {
            cycles: self.cycles,
            elapsed_ns: u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
            requested_hz: self.frequency_hz(),
            achieved_hz,
            overtime: self.overtime(),
        }
    }
}

/// Cloneable cross-thread stop request for a [`LoopPacer`].
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<CachePadded<AtomicBool>>,
}

impl StopHandle {
    /// Clears the running flag of the pacer this handle was taken from.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Whether the pacer's running flag is still set.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Per-tick threshold evaluation for deadline misses.
///
/// Thresholds are re-evaluated on every observation: once the running
/// average or the late share falls back within limits, verdicts recover on
/// their own. Nothing latches.
#[derive(Debug)]
struct OvertimeMonitor {
    max_single: Duration,
    max_average: Duration,
    max_late_percentage: f64,
    print_warning: bool,
    stats: OvertimeStats,
}

impl OvertimeMonitor {
    fn new(config: &OvertimeConfig) -> Self {
        Self {
            max_single: config.max_single,
            max_average: config.max_average,
            max_late_percentage: config.max_late_percentage,
            print_warning: config.print_warning,
            stats: OvertimeStats::new(),
        }
    }

    /// Records one cycle and returns whether all thresholds still hold.
    fn observe(&mut self, cycle: u64, overtime: Duration) -> bool {
        self.stats.record(overtime);

        let average = self.stats.average();
        let late_percentage = self.stats.late_percentage();
        let within_limits = overtime <= self.max_single
            && average <= self.max_average
            && late_percentage <= self.max_late_percentage;

        if !within_limits && self.print_warning {
            warn!(
                cycle,
                overtime_us = overtime.as_micros() as u64,
                average_us = average.as_micros() as u64,
                late_percentage,
                "Loop overtime threshold exceeded"
            );
        }
        within_limits
    }

    fn reset(&mut self) {
        self.stats.reset();
    }

    fn snapshot(&self) -> OvertimeSnapshot {
        self.stats.snapshot()
    }
}

pub(crate) fn interval_for(frequency_hz: f64) -> PaceResult<Duration> {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
        return Err(PaceError::InvalidFrequency { hz: frequency_hz });
    }
    let interval = Duration::try_from_secs_f64(1.0 / frequency_hz)
        .map_err(|_| PaceError::InvalidFrequency { hz: frequency_hz })?;
    if interval.is_zero() {
        return Err(PaceError::InvalidFrequency { hz: frequency_hz });
    }
    Ok(interval)
}
