//! Non-owning telemetry channels.
//!
//! A channel names one application variable (a vector of reals, a scalar
//! real, an integer, or a boolean) by address. The recorder samples
//! channels from its worker thread with volatile reads and renders them as
//! CSV columns in a fixed category order: vectors, then reals, then
//! integers, then booleans, matching the header derived when a run starts.
//!
//! Values are read without synchronization. A row may interleave values
//! from adjacent producer cycles; recorded data is best-effort telemetry,
//! not a transactional snapshot.

use std::fmt::Write as _;
use std::time::Duration;

/// Estimated on-disk bytes of the leading time column, separator included.
const TIME_COLUMN_BYTES: u64 = 10;

/// Column category order used for headers and rows.
const CATEGORY_ORDER: [ChannelKind; 4] = [
    ChannelKind::Vector,
    ChannelKind::Real,
    ChannelKind::Int,
    ChannelKind::Bool,
];

/// Category of a registered channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Fixed-width vector of `f64` values.
    Vector,
    /// Scalar `f64`.
    Real,
    /// Scalar `i64`.
    Int,
    /// Scalar `bool`, rendered as `0` or `1`.
    Bool,
}

impl ChannelKind {
    /// Estimated on-disk bytes per column of this category, separator
    /// included. Used to derive the byte-budget run limit.
    fn column_bytes(self) -> u64 {
        match self {
            ChannelKind::Vector | ChannelKind::Real => 10,
            ChannelKind::Int => 7,
            ChannelKind::Bool => 3,
        }
    }
}

/// Address and shape of one application variable to sample.
///
/// A slot is plain data (pointer, width, category); constructing one is
/// safe. The validity contract is taken on at registration: see
/// [`SignalRecorder::add_channel`](crate::recorder::SignalRecorder::add_channel).
#[derive(Debug, Clone, Copy)]
pub enum ChannelSlot {
    /// Contiguous `f64` values of fixed width.
    Vector {
        /// Address of the first element.
        ptr: *const f64,
        /// Number of elements; must be at least 1.
        len: usize,
    },
    /// Scalar `f64`.
    Real(*const f64),
    /// Scalar `i64`.
    Int(*const i64),
    /// Scalar `bool`.
    Bool(*const bool),
}

impl ChannelSlot {
    /// Slot covering every element of `values`.
    #[must_use]
    pub fn vector(values: &[f64]) -> Self {
        Self::Vector {
            ptr: values.as_ptr(),
            len: values.len(),
        }
    }

    /// Slot for a scalar real.
    #[must_use]
    pub fn real(value: &f64) -> Self {
        Self::Real(std::ptr::from_ref(value))
    }

    /// Slot for a scalar integer.
    #[must_use]
    pub fn int(value: &i64) -> Self {
        Self::Int(std::ptr::from_ref(value))
    }

    /// Slot for a boolean flag.
    #[must_use]
    pub fn boolean(value: &bool) -> Self {
        Self::Bool(std::ptr::from_ref(value))
    }

    /// Category of this slot.
    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelSlot::Vector { .. } => ChannelKind::Vector,
            ChannelSlot::Real(_) => ChannelKind::Real,
            ChannelSlot::Int(_) => ChannelKind::Int,
            ChannelSlot::Bool(_) => ChannelKind::Bool,
        }
    }

    /// Number of columns this slot contributes to a row.
    #[must_use]
    pub fn width(&self) -> usize {
        match self {
            ChannelSlot::Vector { len, .. } => *len,
            _ => 1,
        }
    }

    /// Reads the current value(s) and appends them as `, value` fragments.
    ///
    /// # Safety
    ///
    /// The pointer must be valid for reads of the slot's full width. Torn
    /// values from concurrent writes are accepted and rendered as read.
    unsafe fn render(&self, out: &mut String) {
        match *self {
            ChannelSlot::Vector { ptr, len } => {
                for i in 0..len {
                    let value = ptr.add(i).read_volatile();
                    let _ = write!(out, ", {value:.6}");
                }
            }
            ChannelSlot::Real(ptr) => {
                let value = ptr.read_volatile();
                let _ = write!(out, ", {value:.6}");
            }
            ChannelSlot::Int(ptr) => {
                let value = ptr.read_volatile();
                let _ = write!(out, ", {value}");
            }
            ChannelSlot::Bool(ptr) => {
                let value = u8::from(ptr.read_volatile());
                let _ = write!(out, ", {value}");
            }
        }
    }
}

/// One registered channel: a slot plus its display name.
#[derive(Debug, Clone)]
struct Channel {
    slot: ChannelSlot,
    name: String,
}

/// Append-only registry of channels for one recorder.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChannelSet {
    channels: Vec<Channel>,
}

impl ChannelSet {
    /// Registers a channel. An empty name becomes `var<k>` with k the
    /// 1-based registration index. Refuses zero-width vectors.
    pub(crate) fn push(&mut self, slot: ChannelSlot, name: &str) -> bool {
        if slot.width() == 0 {
            return false;
        }
        let name = if name.is_empty() {
            format!("var{}", self.channels.len() + 1)
        } else {
            name.to_string()
        };
        self.channels.push(Channel { slot, name });
        true
    }

    /// Number of registered channels (a vector counts once).
    pub(crate) fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of value columns per row, time excluded.
    pub(crate) fn column_count(&self) -> usize {
        self.channels.iter().map(|c| c.slot.width()).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Derives the header row: `time` first, then every column name in
    /// category order. Vector channels expand to `<name>_<index>`.
    pub(crate) fn header(&self) -> String {
        let mut header = String::from("time");
        for kind in CATEGORY_ORDER {
            for channel in self.channels.iter().filter(|c| c.slot.kind() == kind) {
                match channel.slot {
                    ChannelSlot::Vector { len, .. } => {
                        for i in 0..len {
                            let _ = write!(header, ", {}_{i}", channel.name);
                        }
                    }
                    _ => {
                        let _ = write!(header, ", {}", channel.name);
                    }
                }
            }
        }
        header
    }

    /// Estimated on-disk bytes of one rendered row, time column included.
    pub(crate) fn row_bytes_estimate(&self) -> u64 {
        TIME_COLUMN_BYTES
            + self
                .channels
                .iter()
                .map(|c| c.slot.width() as u64 * c.slot.kind().column_bytes())
                .sum::<u64>()
    }

    /// Samples every channel and appends one full row (no trailing newline)
    /// to `out`, leading with `elapsed` in seconds.
    ///
    /// # Safety
    ///
    /// Every registered pointer must still be valid for reads, per the
    /// registration contract.
    pub(crate) unsafe fn render_row(&self, elapsed: Duration, out: &mut String) {
        let secs = elapsed.as_secs_f64();
        let _ = write!(out, "{secs:.6}");
        for kind in CATEGORY_ORDER {
            for channel in self.channels.iter().filter(|c| c.slot.kind() == kind) {
                channel.slot.render(out);
            }
        }
    }
}

// SAFETY: ChannelSet moves into the recorder worker thread. It holds raw
// pointers registered through `SignalRecorder::add_channel`, whose contract
// requires the pointed-to memory to stay valid for the whole recording run.
// The set never writes through the pointers, and sampling accepts torn
// values from concurrent producer writes.
unsafe impl Send for ChannelSet {}
