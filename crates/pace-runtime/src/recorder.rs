//! Asynchronous signal recording.
//!
//! A [`SignalRecorder`] samples registered channels from a dedicated worker
//! thread, paced by its own [`LoopPacer`], and appends one CSV-style row per
//! tick to a destination file. Recording is bounded: the byte budget and the
//! estimated row width give a maximum run duration, after which the worker
//! stops itself and flushes.
//!
//! Lifecycle sequencing violations (start while running, registration
//! mid-run, rotation to the currently-open name) are refusals reported as
//! `false`, not errors.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use pace_common::{PaceError, PaceResult, RecorderConfig};

use crate::channel::{ChannelSet, ChannelSlot};
use crate::pacer::{interval_for, LoopPacer, StopHandle};

/// Run-time cap applied when no channels are registered.
const EMPTY_REGISTRY_CAP: Duration = Duration::from_secs(3600);

/// Records registered application variables to a CSV-style file from a
/// background thread.
///
/// The recorder never owns the sampled data. Channels are registered by
/// address while idle; a run freezes the registry, writes the header row,
/// and samples at the requested cadence until [`stop`](SignalRecorder::stop),
/// a write error, or the byte-budget time limit.
#[derive(Debug)]
pub struct SignalRecorder {
    destination: PathBuf,
    byte_budget: u64,
    timestamp_files: bool,
    channels: ChannelSet,
    active: Option<ActiveRun>,
}

#[derive(Debug)]
struct ActiveRun {
    stop: StopHandle,
    handle: JoinHandle<()>,
    path: PathBuf,
}

impl SignalRecorder {
    /// Creates an idle recorder bound to `destination`, with the default
    /// byte budget and no timestamp suffixing.
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        let defaults = RecorderConfig::default();
        Self {
            destination: destination.into(),
            byte_budget: defaults.byte_budget,
            timestamp_files: defaults.timestamp_files,
            channels: ChannelSet::default(),
            active: None,
        }
    }

    /// Creates an idle recorder from configuration.
    #[must_use]
    pub fn with_config(config: &RecorderConfig) -> Self {
        Self {
            destination: config.destination.clone(),
            byte_budget: config.byte_budget,
            timestamp_files: config.timestamp_files,
            channels: ChannelSet::default(),
            active: None,
        }
    }

    /// Registers one channel for sampling. Returns `false`, leaving the
    /// registry unchanged, if a run is active or the slot is a zero-width
    /// vector.
    ///
    /// An empty `name` is replaced with `var<k>`, k being the 1-based
    /// registration index.
    ///
    /// # Safety
    ///
    /// The memory `slot` points to must stay valid at its registered
    /// address, for reads of the slot's full width, until this recorder is
    /// dropped or stopped for the last time. The worker thread reads it
    /// without synchronization; concurrent producer writes are expected, and
    /// a torn value may be recorded.
    pub unsafe fn add_channel(&mut self, slot: ChannelSlot, name: &str) -> bool {
        self.reap_finished();
        if self.active.is_some() {
            warn!(name, "Channel registration refused while recording");
            return false;
        }
        self.channels.push(slot, name)
    }

    /// Starts a recording run at `cadence_hz` rows per second.
    ///
    /// Opens the destination (suffixing a timestamp when configured), writes
    /// the header row, and spawns the worker thread. Returns `Ok(false)`
    /// without touching the active run if one is already in progress.
    ///
    /// # Errors
    ///
    /// Returns [`PaceError::InvalidFrequency`] for an unusable cadence
    /// (checked before any file is touched), [`PaceError::Io`] if the
    /// destination cannot be created or the header written, and
    /// [`PaceError::Thread`] if the worker cannot be spawned.
    pub fn start(&mut self, cadence_hz: f64) -> PaceResult<bool> {
        self.reap_finished();
        if self.active.is_some() {
            warn!("Recorder already running, start request ignored");
            return Ok(false);
        }

        let mut pacer = LoopPacer::new(cadence_hz)?;
        pacer.set_spin_margin(Duration::ZERO);

        let path = self.resolve_destination();
        let file = File::create(&path)
            .map_err(|e| PaceError::Io(format!("failed to create {}: {e}", path.display())))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", self.channels.header()).map_err(|e| {
            PaceError::Io(format!("failed to write header to {}: {e}", path.display()))
        })?;

        let max_run_time = self.max_run_time(cadence_hz);
        let channels = self.channels.clone();
        let stop = pacer.stop_handle();

        info!(
            destination = %path.display(),
            cadence_hz,
            columns = self.channels.column_count(),
            max_run_secs = max_run_time.as_secs_f64(),
            "Signal recorder started"
        );

        let handle = thread::Builder::new()
            .name("pace-recorder".into())
            .spawn(move || record_loop(pacer, channels, writer, max_run_time))
            .map_err(|e| PaceError::Thread(format!("failed to spawn recorder worker: {e}")))?;

        self.active = Some(ActiveRun { stop, handle, path });
        Ok(true)
    }

    /// Rotates to a new destination: stops the current run (if any) and
    /// starts a fresh one at `cadence_hz`.
    ///
    /// Returns `Ok(false)` without side effects when `destination` equals
    /// the configured one and timestamp suffixing is off; the earlier file
    /// would be overwritten otherwise.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`start`](SignalRecorder::start); an unusable
    /// cadence is rejected before the active run or the destination is
    /// touched.
    pub fn new_destination(
        &mut self,
        destination: impl Into<PathBuf>,
        cadence_hz: f64,
    ) -> PaceResult<bool> {
        self.reap_finished();
        // Validate before tearing down the active run.
        interval_for(cadence_hz)?;
        let destination = destination.into();
        if destination == self.destination && !self.timestamp_files {
            warn!(
                destination = %destination.display(),
                "Rotation refused: destination matches the current file"
            );
            return Ok(false);
        }
        if self.active.is_some() {
            self.stop();
        }
        self.destination = destination;
        self.start(cadence_hz)
    }

    /// Stops the active run, if any, and blocks until the worker has
    /// exited and the destination is flushed and closed.
    pub fn stop(&mut self) {
        if let Some(run) = self.active.take() {
            run.stop.stop();
            if run.handle.join().is_err() {
                warn!("Recorder worker panicked");
            }
            info!(destination = %run.path.display(), "Signal recorder stopped");
        }
    }

    /// Whether a recording run is in progress. A worker that stopped itself
    /// (budget limit, write error) reports `false` here immediately; its
    /// thread is reaped on the next lifecycle call.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|run| run.stop.is_running())
    }

    /// The configured destination (without any timestamp suffix).
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// The file actually opened by the active or last-started run.
    #[must_use]
    pub fn active_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|run| run.path.as_path())
    }

    /// Number of registered channels (a vector counts once).
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.channel_count()
    }

    /// Number of value columns per row, time excluded.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.channels.column_count()
    }

    /// Joins a worker that ended on its own, so later lifecycle calls see
    /// an idle recorder.
    fn reap_finished(&mut self) {
        let finished = self
            .active
            .as_ref()
            .is_some_and(|run| !run.stop.is_running());
        if finished {
            if let Some(run) = self.active.take() {
                if run.handle.join().is_err() {
                    warn!("Recorder worker panicked");
                }
                debug!(destination = %run.path.display(), "Reaped finished recorder run");
            }
        }
    }

    fn resolve_destination(&self) -> PathBuf {
        if !self.timestamp_files {
            return self.destination.clone();
        }
        // Colons are unfriendly in filenames; keep the rest of RFC 3339.
        let stamp = humantime::format_rfc3339_millis(SystemTime::now())
            .to_string()
            .replace(':', "-");
        let stem = self
            .destination
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("record");
        let name = match self.destination.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}_{stamp}.{ext}"),
            None => format!("{stem}_{stamp}"),
        };
        self.destination.with_file_name(name)
    }

    /// Maximum run duration before the worker stops itself, derived from
    /// the byte budget and the estimated row width at `cadence_hz`.
    fn max_run_time(&self, cadence_hz: f64) -> Duration {
        if self.channels.is_empty() {
            return EMPTY_REGISTRY_CAP;
        }
        let bytes_per_second = cadence_hz * self.channels.row_bytes_estimate() as f64;
        Duration::try_from_secs_f64(self.byte_budget as f64 / bytes_per_second)
            .unwrap_or(Duration::MAX)
    }
}

impl Drop for SignalRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker loop: one sampled row per tick until stopped or out of budget.
fn record_loop(
    mut pacer: LoopPacer,
    channels: ChannelSet,
    mut writer: BufWriter<File>,
    max_run_time: Duration,
) {
    let mut row = String::with_capacity(channels.row_bytes_estimate() as usize + 16);
    let mut rows = 0u64;

    // First row one interval in, so N rows span N cadence periods.
    pacer.reinitialize(pacer.interval());
    debug!("Recorder worker running");

    while pacer.is_running() {
        pacer.wait_for_next_tick();
        if !pacer.is_running() {
            break;
        }

        let elapsed = pacer.elapsed_time();
        row.clear();
        // SAFETY: the registration contract keeps every sampled pointer
        // valid while the recorder runs.
        unsafe { channels.render_row(elapsed, &mut row) };
        row.push('\n');

        if let Err(e) = writer.write_all(row.as_bytes()) {
            warn!(error = %e, "Recorder write failed, stopping");
            break;
        }
        rows += 1;

        if elapsed > max_run_time {
            info!(
                elapsed_secs = elapsed.as_secs_f64(),
                limit_secs = max_run_time.as_secs_f64(),
                "Recording stopped: byte-budget time limit reached"
            );
            break;
        }
    }

    pacer.stop();
    if let Err(e) = writer.flush() {
        warn!(error = %e, "Recorder flush failed");
    }
    debug!(rows, "Recorder worker exited");
}
