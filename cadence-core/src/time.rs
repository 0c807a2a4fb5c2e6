//! Clock seam for the wake protocol.
//!
//! The scheduler needs exactly one thing from its host: monotonic
//! milliseconds since the current wake's process started. On the target
//! hardware that is the SoC millisecond tick, which restarts at zero on
//! every deep-sleep wake; absolute wall time is unknown until a transmit
//! exchange supplies a reference.

use core::cell::Cell;

/// Milliseconds since an arbitrary per-process origin.
pub type Timestamp = u64;

/// Source of monotonic process-relative time.
pub trait Clock {
    /// Current time in milliseconds.
    fn now_ms(&self) -> Timestamp;
}

/// Manually driven clock for tests and simulators.
///
/// Interior mutability lets a harness and in-wake collaborators share one
/// instance by plain reference: a transmitter can advance it to model time
/// spent on the air while the scheduler reads it through the same handle.
#[derive(Debug, Default)]
pub struct ManualClock {
    ms: Cell<Timestamp>,
}

impl ManualClock {
    /// Clock starting at `start_ms`.
    pub const fn new(start_ms: Timestamp) -> Self {
        Self {
            ms: Cell::new(start_ms),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, ms: Timestamp) {
        self.ms.set(ms);
    }

    /// Move forward by `delta_ms`.
    pub fn advance(&self, delta_ms: u64) {
        self.ms.set(self.ms.get().wrapping_add(delta_ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Timestamp {
        self.ms.get()
    }
}

/// Wall-clock source counting from its own construction.
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl SystemClock {
    /// Clock whose zero is the moment of this call.
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn now_ms(&self) -> Timestamp {
        self.origin.elapsed().as_millis() as Timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_set_and_advance() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_ms(), 100);
        clock.advance(50);
        assert_eq!(clock.now_ms(), 150);
        clock.set(7);
        assert_eq!(clock.now_ms(), 7);
    }

    #[test]
    fn manual_clock_shared_by_reference() {
        let clock = ManualClock::default();
        let reader: &dyn Clock = &clock;
        clock.advance(42);
        assert_eq!(reader.now_ms(), 42);
    }

    #[cfg(feature = "std")]
    #[test]
    fn system_clock_does_not_go_backwards() {
        let clock = SystemClock::new();
        let first = clock.now_ms();
        let second = clock.now_ms();
        assert!(second >= first);
    }
}
