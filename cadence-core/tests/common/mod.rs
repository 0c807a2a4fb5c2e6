//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::collections::VecDeque;

use cadence_core::{
    Aggregator, Calibrator, ManualClock, RetainedMemory, RetentionError, SampleSource, Transmitter,
};

/// Assert two f32 values are within calibration-test tolerance.
pub fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-5,
        "expected {expected}, got {actual}"
    );
}

/// Sample source that replays a fixed sequence, repeating from the start
/// when it runs out.
pub struct SequenceSource {
    values: Vec<u16>,
    next: usize,
}

impl SequenceSource {
    pub fn new(values: Vec<u16>) -> Self {
        Self { values, next: 0 }
    }
}

impl SampleSource for SequenceSource {
    fn take_sample(&mut self) -> u16 {
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        value
    }
}

/// Aggregator that records every window it sees and returns a canned
/// value, settable between wakes.
pub struct RecordingAggregator {
    pub windows: Vec<Vec<u16>>,
    pub value: u16,
}

impl RecordingAggregator {
    pub fn returning(value: u16) -> Self {
        Self {
            windows: Vec::new(),
            value,
        }
    }
}

impl Aggregator for RecordingAggregator {
    fn aggregate(&mut self, samples: &[u16]) -> u16 {
        self.windows.push(samples.to_vec());
        self.value
    }
}

/// Transmitter that records every payload it is handed.
pub struct RecordingTransmitter {
    pub payloads: Vec<Vec<u16>>,
}

impl RecordingTransmitter {
    pub fn new() -> Self {
        Self {
            payloads: Vec::new(),
        }
    }
}

impl Transmitter for RecordingTransmitter {
    fn transmit(&mut self, measurements: &[u16], _calibrator: &mut Calibrator<'_>) {
        self.payloads.push(measurements.to_vec());
    }
}

/// Transmitter that models time spent on the air by advancing the shared
/// clock, and optionally applies one queued reference timestamp per
/// exchange.
pub struct SyncingTransmitter<'c> {
    pub clock: &'c ManualClock,
    pub advance_ms: u64,
    pub references: VecDeque<Option<u32>>,
    pub payloads: Vec<Vec<u16>>,
}

impl<'c> SyncingTransmitter<'c> {
    pub fn new(clock: &'c ManualClock, advance_ms: u64) -> Self {
        Self {
            clock,
            advance_ms,
            references: VecDeque::new(),
            payloads: Vec::new(),
        }
    }
}

impl Transmitter for SyncingTransmitter<'_> {
    fn transmit(&mut self, measurements: &[u16], calibrator: &mut Calibrator<'_>) {
        self.clock.advance(self.advance_ms);
        if let Some(Some(reference)) = self.references.pop_front() {
            calibrator.synchronise(reference);
        }
        self.payloads.push(measurements.to_vec());
    }
}

/// Retained-memory wrapper that can be told to fail reads or writes.
pub struct FlakyRetention<M> {
    pub inner: M,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

impl<M> FlakyRetention<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            fail_reads: false,
            fail_writes: false,
        }
    }
}

impl<M: RetainedMemory> RetainedMemory for FlakyRetention<M> {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), RetentionError> {
        if self.fail_reads {
            return Err(RetentionError::ReadFailed { offset });
        }
        self.inner.read(offset, buf)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), RetentionError> {
        if self.fail_writes {
            return Err(RetentionError::WriteFailed { offset });
        }
        self.inner.write(offset, data)
    }
}
