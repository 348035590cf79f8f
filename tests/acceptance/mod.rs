//! Integration tests for looppace acceptance testing.
//!
//! These exercise the public pacing and recording surfaces end to end on
//! the host clock:
//! - Pacing accuracy and catch-up after stalls
//! - Threshold verdicts from the overtime monitor
//! - Live recording and on-disk layout
//! - Long-duration stability (soak, ignored by default)

mod common;
mod monitor_test;
mod pacing_test;
mod recorder_test;
