//! Duty-cycle scheduling and retained-state core for battery-powered
//! deep-sleep sensor nodes.
//!
//! A node running this crate spends almost all of its life in deep sleep,
//! waking every so often to take a sample, occasionally aggregate a
//! window of samples into a measurement, and more occasionally still
//! power its radio and transmit. Deep sleep wipes RAM, so the node's
//! position in that multi-level cycle is reconstructed on every wake from
//! a single 16-bit counter in a small checksummed retained-memory image.
//! Sleep requests are also corrected for on-air time already spent and
//! scaled by a calibration factor learned from external time references,
//! so cheap, drifty sleep timers still hit the schedule.
//!
//! Design constraints:
//!
//! - only the retained image survives between wakes
//! - `no_std` without the default `std` feature; no heap allocation
//! - nothing is fatal: a corrupt image falls back to in-memory defaults,
//!   malformed patches are ignored field by field
//!
//! ```no_run
//! use cadence_core::{Callbacks, RamRetention, Sampler, Store, SystemClock};
//!
//! let mut store = Store::new();
//! store.set_parameters(180_000, 5_000, 5, 1);
//! let mut memory = RamRetention::new();
//! let clock = SystemClock::new();
//! let mut sampler = Sampler::new(&mut store);
//!
//! let directive = sampler.wake(&mut store, &mut memory, &clock, Callbacks::none());
//! // The host now enters deep sleep for directive.duration_us, powering
//! // the radio on the next wake when directive.wake_with_radio is set.
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crc;
pub mod patch;
pub mod retention;
pub mod sampler;
pub mod store;
pub mod time;
pub mod traits;

pub use retention::{RamRetention, RetainedMemory, RetentionError, RETAINED_REGION_BYTES};
pub use sampler::{Calibrator, Sampler, SleepDirective, MAX_SLEEP_MS};
pub use store::{Parameters, Store, Synchronisation, IMAGE_BYTES, IMAGE_OFFSET, MAX_DATA_SLOTS};
#[cfg(feature = "std")]
pub use time::SystemClock;
pub use time::{Clock, ManualClock, Timestamp};
pub use traits::{Aggregator, Callbacks, SampleSource, Transmitter};

/// Crate version, from Cargo metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
