//! Desktop simulator for the cadence scheduling core.
//!
//! Drives the full wake protocol against an in-memory retained region and
//! a node timer with a configurable skew. Every "deep sleep" is
//! instantaneous: the harness advances a simulated true clock by the span
//! the skewed hardware timer would really have slept, resets the node's
//! millisecond tick to zero, and re-arms the scheduler from retained
//! memory, exactly as a real node re-enters its firmware after a wake.
//!
//! Each transmission publishes a JSON payload in the legacy telemetry
//! shape and receives the true time back from the base station, so the
//! calibration factor can be watched converging on the inverse of the
//! timer skew:
//!
//! ```text
//! RUST_LOG=debug cargo run -p cadence-sim
//! ```

use std::cell::Cell;

use log::{debug, info};

use cadence_core::{
    Aggregator, Calibrator, Callbacks, ManualClock, RamRetention, SampleSource, Sampler, Store,
    Synchronisation, Transmitter,
};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Firmware version stamped into the store on first boot.
const FIRMWARE_VERSION: u16 = 16;

/// Default schedule on a blank node: one measurement every three minutes
/// from five samples taken 5 s apart, transmitted every measurement.
const DEFAULT_MEASUREMENT_INTERVAL_MS: u32 = 180_000;
const DEFAULT_SAMPLE_INTERVAL_MS: u32 = 5_000;
const DEFAULT_N_SAMPLES: u16 = 5;
const DEFAULT_TRANSMIT_FREQUENCY: u16 = 1;

/// How many wakes to simulate.
const WAKES: u32 = 200;

/// Ratio of true time to node-timer time: 1.1 models a sleep timer that
/// runs 10% slow, so every requested sleep really lasts 10% longer.
const CLOCK_SKEW: f64 = 1.1;

/// Simulated true time at power-on, seconds since the Unix epoch.
const TRUE_TIME_AT_BOOT: u32 = 1_755_993_600;

/// Milliseconds one transmit exchange spends on the air.
const TRANSMIT_AIR_TIME_MS: u64 = 1_500;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Generates synthetic raw sensor counts that vary over time.
struct SyntheticSensor {
    tick: f64,
}

impl SyntheticSensor {
    fn new() -> Self {
        Self { tick: 0.0 }
    }
}

impl SampleSource for SyntheticSensor {
    fn take_sample(&mut self) -> u16 {
        self.tick += 1.0;
        let t = self.tick;
        // ADC-style counts: a slow swell plus sample-to-sample ripple.
        let value = 2048.0 + 600.0 * (t / 40.0).sin() + 25.0 * (t / 3.0).cos();
        value as u16
    }
}

/// Reduces a sample window to its arithmetic mean.
struct MeanAggregator;

impl Aggregator for MeanAggregator {
    fn aggregate(&mut self, samples: &[u16]) -> u16 {
        if samples.is_empty() {
            return 0;
        }
        let sum: u32 = samples.iter().map(|&s| u32::from(s)).sum();
        (sum / samples.len() as u32) as u16
    }
}

/// Stand-in for the radio link to the base station.
///
/// Publishing costs air time on both clocks, and the response carries the
/// base station's notion of true time, which feeds straight into the
/// calibrator. The counter and synchronisation snapshot for the payload
/// are refreshed by the harness before each wake.
struct BaseStationLink<'a> {
    clock: &'a ManualClock,
    true_ms: &'a Cell<u64>,
    firmware: u16,
    counter: u16,
    sync: Synchronisation,
    transmissions: u32,
}

impl Transmitter for BaseStationLink<'_> {
    fn transmit(&mut self, measurements: &[u16], calibrator: &mut Calibrator<'_>) {
        self.clock.advance(TRANSMIT_AIR_TIME_MS);
        self.true_ms.set(self.true_ms.get() + TRANSMIT_AIR_TIME_MS);

        let payload = serde_json::json!({
            "firmware": self.firmware,
            "values": measurements,
            "voltage": 3.268,
            "counter": self.counter,
            "syncTime": self.sync.sync_time_seconds,
            "nominal": self.sync.nominal_elapsed_seconds,
            "factor": self.sync.calibration_factor,
        });
        info!("publish: {payload}");

        calibrator.synchronise((self.true_ms.get() / 1000) as u32);
        self.transmissions += 1;
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("cadence simulator: {WAKES} wakes, sleep-timer skew {CLOCK_SKEW}");

    let clock = ManualClock::new(0);
    let mut memory = RamRetention::new();
    let true_ms = Cell::new(u64::from(TRUE_TIME_AT_BOOT) * 1000);
    let boot_true_ms = true_ms.get();

    // First boot on a blank node: retained memory holds nothing valid, so
    // the configured defaults stand and the first wake persists them.
    let mut store = Store::new();
    store.set_parameters(
        DEFAULT_MEASUREMENT_INTERVAL_MS,
        DEFAULT_SAMPLE_INTERVAL_MS,
        DEFAULT_N_SAMPLES,
        DEFAULT_TRANSMIT_FREQUENCY,
    );
    store.set_version(FIRMWARE_VERSION);
    let mut sampler = Sampler::new(&mut store);

    let mut sensor = SyntheticSensor::new();
    let mut aggregator = MeanAggregator;
    let mut link = BaseStationLink {
        clock: &clock,
        true_ms: &true_ms,
        firmware: FIRMWARE_VERSION,
        counter: store.counter(),
        sync: store.synchronisation(),
        transmissions: 0,
    };

    for wake in 1..=WAKES {
        // Deep sleep wiped the process; the node tick restarts at zero and
        // the scheduler re-arms from retained memory.
        clock.set(0);
        sampler.boot(&mut store, &mut memory, &clock);

        link.counter = store.counter();
        link.sync = store.synchronisation();

        let directive = sampler.wake(
            &mut store,
            &mut memory,
            &clock,
            Callbacks {
                sample: Some(&mut sensor),
                aggregate: Some(&mut aggregator),
                transmit: Some(&mut link),
            },
        );

        debug!(
            "wake {wake}: sleep {} ms, radio {}, {}",
            directive.duration_us / 1000,
            directive.wake_with_radio,
            store.status()
        );

        // Suspend. The skewed timer stretches the requested span; true
        // time records the stretched one.
        let requested_ms = directive.duration_us / 1000;
        let real_ms = (requested_ms as f64 * CLOCK_SKEW).round() as u64;
        true_ms.set(true_ms.get() + real_ms);
    }

    let sync = store.synchronisation();
    let true_elapsed_s = (true_ms.get() - boot_true_ms) / 1000;
    let intended_s = u64::from(WAKES / u32::from(DEFAULT_N_SAMPLES))
        * u64::from(DEFAULT_MEASUREMENT_INTERVAL_MS / 1000);
    info!("{} transmissions over {WAKES} wakes", link.transmissions);
    info!(
        "calibration factor {:.6}, ideal for this skew {:.6}",
        sync.calibration_factor,
        1.0 / CLOCK_SKEW
    );
    info!("true elapsed {true_elapsed_s} s against an intended schedule of {intended_s} s");
    info!("final status: {}", store.status());
}
