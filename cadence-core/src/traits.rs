//! Collaborator seams for the wake protocol.
//!
//! The scheduler decides *when* to sample, aggregate, and transmit; these
//! traits supply the *how*. Each collaborator is optional per wake, and an
//! absent one simply skips its action while the schedule and counters
//! advance as normal. Blanket impls let bare closures stand in for the
//! single-method traits, which keeps tests and simulators short.

use crate::sampler::Calibrator;

/// Acquires one raw sensor reading.
pub trait SampleSource {
    /// Take a single reading.
    fn take_sample(&mut self) -> u16;
}

impl<F> SampleSource for F
where
    F: FnMut() -> u16,
{
    fn take_sample(&mut self) -> u16 {
        self()
    }
}

/// Reduces a window of raw samples to one measurement.
pub trait Aggregator {
    /// Aggregate the sample window into a single value.
    fn aggregate(&mut self, samples: &[u16]) -> u16;
}

impl<F> Aggregator for F
where
    F: FnMut(&[u16]) -> u16,
{
    fn aggregate(&mut self, samples: &[u16]) -> u16 {
        self(samples)
    }
}

/// Ships accumulated measurements off the node.
///
/// The exchange is handed a [`Calibrator`] so a transmitter that learns
/// the true time from its peer (a server timestamp in the response) can
/// apply clock calibration before the wake's sleep request is computed.
pub trait Transmitter {
    /// Transmit the measurements accumulated since the last transmission.
    fn transmit(&mut self, measurements: &[u16], calibrator: &mut Calibrator<'_>);
}

impl<F> Transmitter for F
where
    F: FnMut(&[u16], &mut Calibrator<'_>),
{
    fn transmit(&mut self, measurements: &[u16], calibrator: &mut Calibrator<'_>) {
        self(measurements, calibrator)
    }
}

/// The collaborators offered to one wake.
#[derive(Default)]
pub struct Callbacks<'a> {
    /// Sample acquisition. Absent: due sampling ticks store nothing.
    pub sample: Option<&'a mut dyn SampleSource>,
    /// Sample-window aggregation. Absent: due measurements store nothing.
    pub aggregate: Option<&'a mut dyn Aggregator>,
    /// Measurement transmission. Absent: due transmissions do nothing.
    pub transmit: Option<&'a mut dyn Transmitter>,
}

impl Callbacks<'_> {
    /// No collaborators; every due action is skipped.
    pub fn none() -> Self {
        Self::default()
    }
}
