//! Common types shared across the looppace workspace.
//!
//! This crate defines the error taxonomy, the layered configuration model,
//! and the overtime/run statistics used by the pacing runtime and the demo
//! binary. It contains no scheduling logic of its own.

pub mod config;
pub mod error;
pub mod stats;

pub use config::*;
pub use error::*;
pub use stats::*;
