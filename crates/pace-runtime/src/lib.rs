//! Drift-free loop pacing and asynchronous signal recording.
//!
//! The runtime provides two cooperating pieces:
//!
//! - [`LoopPacer`](pacer::LoopPacer): holds a loop at a fixed frequency on
//!   the monotonic clock. Deadlines form an absolute lattice
//!   (`start + initial_wait + k * interval`), so a late cycle never shifts
//!   the schedule of the cycles after it.
//! - [`SignalRecorder`](recorder::SignalRecorder): samples registered
//!   application variables from a background thread at its own cadence and
//!   appends them to a CSV-style destination, bounded by a byte budget.
//!
//! [`realtime`] contains the optional thread setup (memory locking,
//! scheduler policy, CPU affinity) used when pacing must hold sub-millisecond
//! jitter under load.

pub mod channel;
pub mod pacer;
pub mod realtime;
pub mod recorder;
pub mod wait;

pub use channel::*;
pub use pacer::*;
pub use realtime::*;
pub use recorder::*;
pub use wait::*;
