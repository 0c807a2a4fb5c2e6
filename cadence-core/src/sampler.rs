//! Duty-cycle scheduler: wake-counter interpretation, sleep planning, and
//! clock-drift calibration.
//!
//! The node's whole schedule is a pure function of one persisted 16-bit
//! wake counter. Three derived tick counts shape it:
//!
//! - `d`: wakes spanning one measurement interval (hardware cannot sleep
//!   longer than [`MAX_SLEEP_MS`] in one go, so long intervals are sliced)
//! - `y = nSamples + d - 1`: wakes per measurement cycle
//! - `x = transmitFrequency * y`: wakes per transmit cycle
//!
//! Within one measurement cycle the counter walks a fixed pattern:
//!
//! ```text
//! tick    1 .. n-1   sample, short sleep (sampleInterval)
//! tick    n          sample, aggregate the window, start the long sleep
//! tick    n+1 .. y   filler wakes while the long interval burns down
//! ```
//!
//! A transmit falls on the aggregation tick of the last cycle in its
//! window, right after the measurement lands. All of it is recomputed
//! from the counter at every wake, so losing RAM during deep sleep costs
//! nothing.
//!
//! Sleep requests are corrected twice before they reach the hardware:
//! time already burned during the wake is subtracted, and the result is
//! scaled by the calibration factor learned from external time references
//! (see [`Calibrator`]).

use crate::retention::RetainedMemory;
use crate::store::{Parameters, Store, Synchronisation, MAX_DATA_SLOTS};
use crate::time::{Clock, Timestamp};
use crate::traits::Callbacks;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "log")]
macro_rules! log_info {
    ($($arg:tt)*) => { log::info!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_info {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "log")]
macro_rules! log_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {};
}

/// Longest single hardware sleep, in milliseconds (one hour).
pub const MAX_SLEEP_MS: u32 = 3_600_000;

/// What the host should do once a wake completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SleepDirective {
    /// Requested deep-sleep duration in microseconds. Zero means re-enter
    /// the wake path immediately.
    pub duration_us: u64,
    /// Power the radio on the next wake (a transmission is due then).
    pub wake_with_radio: bool,
}

/// Mid-wake calibration handle, lent to the transmitter.
///
/// A transmit exchange often carries a server timestamp back to the node.
/// Applying it *during* the wake, before the sleep request is computed,
/// means the request already includes the newly learned offset.
pub struct Calibrator<'a> {
    store: &'a mut Store,
    sync: &'a mut Synchronisation,
    offset_seconds: &'a mut f32,
    wake_started_ms: Timestamp,
    clock: &'a dyn Clock,
}

impl Calibrator<'_> {
    /// Calibrate against an external reference time, in seconds.
    pub fn synchronise(&mut self, reference_seconds: u32) {
        let processing = processing_seconds(self.clock.now_ms(), self.wake_started_ms);
        calibrate(
            self.store,
            self.sync,
            self.offset_seconds,
            processing,
            reference_seconds,
        );
    }

    /// Apply a configuration patch carried in the transmit response.
    ///
    /// The patched parameters are persisted before this wake's sleep and
    /// take effect from the next wake; the wake counter restarts at 1 so
    /// the new schedule begins on a cycle boundary.
    pub fn apply_patch(&mut self, text: &str) {
        self.store.apply_patch(text);
    }
}

/// The duty-cycle scheduler.
///
/// Lifecycle: construct with [`Sampler::new`], arm with [`Sampler::boot`]
/// once the retained memory is available, then run [`Sampler::wake`] for
/// each wake. `wake` re-arms the sampler before returning, so a host that
/// stays resident just keeps calling it; a host that genuinely power
/// cycles calls `boot` again after reconstruction.
///
/// All durable state lives in the [`Store`]; the sampler itself only
/// caches derived values for the current process lifetime.
pub struct Sampler {
    params: Parameters,
    sync: Synchronisation,
    /// d: wakes spanning one measurement interval.
    slices: u32,
    /// y: wakes per measurement cycle.
    cycle_ticks: u32,
    /// x: wakes per transmit cycle.
    transmit_ticks: u32,
    /// Correction learned from the latest calibration, in seconds.
    /// Consumed by the next sleep computation, then cleared.
    offset_seconds: f32,
    wake_started_ms: Timestamp,
}

impl Sampler {
    /// Scheduler for a fresh boot.
    ///
    /// A fresh boot means any previous calibration epoch is meaningless
    /// (the reference point assumed sleep, not a cold start), so the
    /// store's synchronisation state is reset to "never calibrated".
    pub fn new(store: &mut Store) -> Self {
        store.reset_synchronisation(0, 1.0);
        let mut sampler = Self {
            params: store.parameters(),
            sync: store.synchronisation(),
            slices: 1,
            cycle_ticks: 1,
            transmit_ticks: 1,
            offset_seconds: 0.0,
            wake_started_ms: 0,
        };
        sampler.recompute_cycle();
        sampler
    }

    /// Arm the scheduler from retained memory.
    ///
    /// Reloads the persisted image when it passes its checksum, otherwise
    /// keeps the in-memory configuration and zeroes the data buffer, then
    /// refreshes the cached parameters and derived tick counts. The wake
    /// clock restarts here: processing time is measured from the latest
    /// `boot`.
    pub fn boot<M, C>(&mut self, store: &mut Store, memory: &mut M, clock: &C)
    where
        M: RetainedMemory,
        C: Clock,
    {
        self.wake_started_ms = clock.now_ms();
        if store.check_integrity(memory) {
            store.load(memory);
        } else {
            store.data_mut().fill(0);
            log_warn!("retained image rejected, keeping in-memory configuration");
        }
        self.params = store.parameters();
        self.sync = store.synchronisation();
        self.recompute_cycle();
        self.offset_seconds = 0.0;
    }

    /// Run one full wake and return the sleep request for the host.
    ///
    /// In order: advance the counter, run whichever of the collaborators
    /// are due, account the intended sleep, persist, compute the
    /// corrected, calibrated sleep request, and finally re-arm via
    /// [`Sampler::boot`] so references applied between wakes see the
    /// freshly persisted state.
    pub fn wake<M, C>(
        &mut self,
        store: &mut Store,
        memory: &mut M,
        clock: &C,
        callbacks: Callbacks<'_>,
    ) -> SleepDirective
    where
        M: RetainedMemory,
        C: Clock,
    {
        let counter = store.counter();
        let c = i64::from(counter);

        if u32::from(counter) % self.transmit_ticks == 0
            && u32::from(counter) > (u32::from(u16::MAX)).wrapping_sub(self.transmit_ticks)
        {
            // Realign before the u16 wrap would tear a transmit window.
            log_info!("wake counter realigned from {} to 1", counter);
            store.reset_counter();
        } else {
            store.increment_counter();
        }

        if let Some(source) = callbacks.sample {
            if self.sample_due(c) {
                let slot = ((c - 1) % i64::from(self.cycle_ticks)) as usize;
                let value = source.take_sample();
                if let Some(entry) = store.data_mut().get_mut(slot) {
                    *entry = value;
                }
            }
        }

        if let Some(aggregator) = callbacks.aggregate {
            if self.measurement_due(c) {
                let n = usize::from(self.params.n_samples).min(MAX_DATA_SLOTS);
                let slot = self.measurement_slot(counter);
                let value = aggregator.aggregate(&store.data()[..n]);
                if let Some(entry) = store.data_mut().get_mut(slot) {
                    *entry = value;
                }
            }
        }

        if let Some(transmitter) = callbacks.transmit {
            if self.transmit_due(c) {
                let n = usize::from(self.params.n_samples).min(MAX_DATA_SLOTS);
                let end = (n + usize::from(self.params.transmit_frequency)).min(MAX_DATA_SLOTS);
                let mut measurements: heapless::Vec<u16, MAX_DATA_SLOTS> = heapless::Vec::new();
                let _ = measurements.extend_from_slice(&store.data()[n..end]);
                let mut calibrator = Calibrator {
                    store: &mut *store,
                    sync: &mut self.sync,
                    offset_seconds: &mut self.offset_seconds,
                    wake_started_ms: self.wake_started_ms,
                    clock,
                };
                transmitter.transmit(&measurements, &mut calibrator);
            }
        }

        let nominal_ms = self.nominal_sleep_ms(counter);
        let correction_ms = (self.offset_seconds * 1000.0) as i64;

        // The carried correction repays drift the nominal account has
        // already counted, so only the shortened intent is accounted.
        let accounted_ms = if correction_ms > i64::from(nominal_ms) {
            0
        } else {
            (i64::from(nominal_ms) - correction_ms) as u32
        };
        store.increment_elapsed(accounted_ms);
        if !store.save(memory) {
            log_warn!("failed to persist retained state before sleep");
        }

        let processing_ms = clock.now_ms().saturating_sub(self.wake_started_ms);
        let total_correction_ms = correction_ms + processing_ms as i64;
        let sleep_ms = if total_correction_ms > i64::from(nominal_ms) {
            0
        } else {
            (i64::from(nominal_ms) - total_correction_ms) as u64
        };
        let scaled_ms = libm::roundf(sleep_ms as f32 * self.sync.calibration_factor) as u64;
        let wake_with_radio = self.transmit_due(c + 1);

        self.boot(store, memory, clock);
        SleepDirective {
            duration_us: scaled_ms * 1000,
            wake_with_radio,
        }
    }

    /// Calibrate against an external reference time, in seconds.
    ///
    /// Public equivalent of [`Calibrator::synchronise`] for hosts that
    /// learn the reference outside a transmit exchange.
    pub fn synchronise<C: Clock>(&mut self, store: &mut Store, clock: &C, reference_seconds: u32) {
        let processing = processing_seconds(clock.now_ms(), self.wake_started_ms);
        calibrate(
            store,
            &mut self.sync,
            &mut self.offset_seconds,
            processing,
            reference_seconds,
        );
    }

    fn recompute_cycle(&mut self) {
        let d = self.params.measurement_interval_ms.saturating_sub(1) / MAX_SLEEP_MS + 1;
        let y = (u32::from(self.params.n_samples) + d - 1).max(1);
        self.slices = d;
        self.cycle_ticks = y;
        self.transmit_ticks = u32::from(self.params.transmit_frequency)
            .saturating_mul(y)
            .max(1);
    }

    fn sample_due(&self, c: i64) -> bool {
        (c - 1) % i64::from(self.cycle_ticks) < i64::from(self.params.n_samples)
    }

    fn measurement_due(&self, c: i64) -> bool {
        (c - i64::from(self.params.n_samples)) % i64::from(self.cycle_ticks) == 0
    }

    fn transmit_due(&self, c: i64) -> bool {
        if self.params.transmit_frequency == 0 {
            return false;
        }
        let x = i64::from(self.transmit_ticks);
        (c - (x - (i64::from(self.slices) - 1))) % x == 0
    }

    /// Buffer slot for the measurement due at `counter`: the measurement
    /// region starts after the sample window and rotates through
    /// `transmitFrequency` slots across one transmit cycle.
    fn measurement_slot(&self, counter: u16) -> usize {
        let t = u32::from(self.params.transmit_frequency).max(1);
        let rotations =
            (u32::from(counter) + (self.slices - 1) + (self.transmit_ticks - self.cycle_ticks))
                / self.cycle_ticks;
        (u32::from(self.params.n_samples) + rotations % t) as usize
    }

    /// Intended sleep span for the wake at `counter`, before corrections.
    fn nominal_sleep_ms(&self, counter: u16) -> u32 {
        let n = u32::from(self.params.n_samples);
        let cycle_pos = u32::from(counter).wrapping_sub(1) % self.cycle_ticks;
        if n > 0 && cycle_pos < n - 1 {
            self.params.sample_interval_ms
        } else if n > 0 && cycle_pos == n - 1 {
            let sampled = (n - 1).saturating_mul(self.params.sample_interval_ms);
            if self.slices > 1 {
                MAX_SLEEP_MS.saturating_sub(sampled)
            } else {
                self.params.measurement_interval_ms.saturating_sub(sampled)
            }
        } else if u32::from(counter) % self.cycle_ticks == 0 {
            // Last slice of the interval: sleep whatever remains short of
            // a full hour.
            match self.params.measurement_interval_ms % MAX_SLEEP_MS {
                0 => MAX_SLEEP_MS,
                remainder => remainder,
            }
        } else {
            MAX_SLEEP_MS
        }
    }
}

fn processing_seconds(now_ms: Timestamp, started_ms: Timestamp) -> u32 {
    (now_ms.saturating_sub(started_ms) / 1000) as u32
}

/// Shared calibration body for [`Sampler::synchronise`] and
/// [`Calibrator::synchronise`].
///
/// The first reference of an epoch only anchors `syncTime` (compensated
/// for time already spent in this wake). Later references measure the
/// drift: `offset = actual - nominal` elapsed seconds, and the factor is
/// scaled by `1 - offset / actual` so future sleep requests land on the
/// reference clock's grid.
fn calibrate(
    store: &mut Store,
    sync: &mut Synchronisation,
    offset_seconds: &mut f32,
    processing_seconds: u32,
    reference_seconds: u32,
) {
    if sync.sync_time_seconds != 0 {
        let actual_elapsed = reference_seconds
            .wrapping_sub(sync.sync_time_seconds.wrapping_add(processing_seconds))
            as f32;
        if sync.nominal_elapsed_seconds > 0 && actual_elapsed != 0.0 {
            *offset_seconds = actual_elapsed - sync.nominal_elapsed_seconds as f32;
            let ratio = *offset_seconds / actual_elapsed;
            sync.calibration_factor =
                (f64::from(sync.calibration_factor) * (1.0 - f64::from(ratio))) as f32;
            log_info!(
                "calibrated: offset {}s over {}s, factor now {}",
                *offset_seconds,
                actual_elapsed,
                sync.calibration_factor
            );
        }
        store.reset_synchronisation(
            reference_seconds.wrapping_sub(processing_seconds),
            sync.calibration_factor,
        );
    } else {
        store.reset_synchronisation(reference_seconds.wrapping_sub(processing_seconds), 1.0);
    }
}
