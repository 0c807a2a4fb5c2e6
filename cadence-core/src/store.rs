//! Persistent store for schedule parameters, calibration state, and the
//! sample/measurement buffer.
//!
//! One [`Store`] image lives in retained memory and is reloaded at every
//! wake. Its layout is fixed and little-endian:
//!
//! ```text
//! offset  size  field
//! ------  ----  -----------------------------------------
//!      0     4  CRC-32 over the parameter block below
//!      4    16  Parameters (version, counter, intervals, counts)
//!     20    12  Synchronisation (sync time, nominal elapsed, factor)
//!     32   320  data buffer, 160 slots of u16
//! ```
//!
//! The image sits at byte offset [`IMAGE_OFFSET`] inside the retained
//! region; the prefix below it belongs to the platform (boot bookkeeping
//! on the original hardware). Only the parameter block is checksummed:
//! parameters decide the node's entire schedule, while a corrupt buffer
//! slot costs at most one bad reading and the calibration fields converge
//! again on their own.

use core::fmt::Write as _;

use crate::crc;
use crate::patch;
use crate::retention::RetainedMemory;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Capacity of the persisted data buffer in 16-bit slots.
pub const MAX_DATA_SLOTS: usize = 160;

/// Byte offset of the persisted image inside the retained region.
pub const IMAGE_OFFSET: usize = 128;

const CHECKSUM_BYTES: usize = 4;
const PARAMS_BYTES: usize = 16;
const SYNC_BYTES: usize = 12;
const DATA_BYTES: usize = MAX_DATA_SLOTS * 2;

/// Total size of the persisted image in bytes.
pub const IMAGE_BYTES: usize = CHECKSUM_BYTES + PARAMS_BYTES + SYNC_BYTES + DATA_BYTES;

/// Capacity of the [`Store::status`] summary line.
pub const STATUS_CAPACITY: usize = 256;

/// User-configurable schedule parameters. Persisted and checksummed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Parameters {
    /// Configuration version stamp. Patched explicitly, never implied.
    pub version: u16,
    /// 1-based position in the wake sequence.
    pub counter: u16,
    /// Milliseconds between measurements.
    pub measurement_interval_ms: u32,
    /// Milliseconds between the samples feeding one measurement.
    pub sample_interval_ms: u32,
    /// Samples aggregated into one measurement.
    pub n_samples: u16,
    /// Measurement cycles per transmission.
    pub transmit_frequency: u16,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            version: 0,
            counter: 1,
            measurement_interval_ms: 0,
            sample_interval_ms: 0,
            n_samples: 0,
            transmit_frequency: 0,
        }
    }
}

impl Parameters {
    fn to_bytes(self) -> [u8; PARAMS_BYTES] {
        let mut out = [0u8; PARAMS_BYTES];
        out[0..2].copy_from_slice(&self.version.to_le_bytes());
        out[2..4].copy_from_slice(&self.counter.to_le_bytes());
        out[4..8].copy_from_slice(&self.measurement_interval_ms.to_le_bytes());
        out[8..12].copy_from_slice(&self.sample_interval_ms.to_le_bytes());
        out[12..14].copy_from_slice(&self.n_samples.to_le_bytes());
        out[14..16].copy_from_slice(&self.transmit_frequency.to_le_bytes());
        out
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            version: read_u16(bytes, 0),
            counter: read_u16(bytes, 2),
            measurement_interval_ms: read_u32(bytes, 4),
            sample_interval_ms: read_u32(bytes, 8),
            n_samples: read_u16(bytes, 12),
            transmit_frequency: read_u16(bytes, 14),
        }
    }
}

/// Clock-drift calibration state. Persisted, not checksummed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Synchronisation {
    /// External reference time at the last calibration, in seconds.
    /// Zero means "never calibrated".
    pub sync_time_seconds: u32,
    /// Whole seconds of intended sleep accumulated since the last
    /// calibration.
    pub nominal_elapsed_seconds: u32,
    /// Multiplicative correction applied to every sleep request.
    pub calibration_factor: f32,
}

impl Default for Synchronisation {
    fn default() -> Self {
        Self {
            sync_time_seconds: 0,
            nominal_elapsed_seconds: 0,
            calibration_factor: 1.0,
        }
    }
}

impl Synchronisation {
    fn to_bytes(self) -> [u8; SYNC_BYTES] {
        let mut out = [0u8; SYNC_BYTES];
        out[0..4].copy_from_slice(&self.sync_time_seconds.to_le_bytes());
        out[4..8].copy_from_slice(&self.nominal_elapsed_seconds.to_le_bytes());
        out[8..12].copy_from_slice(&self.calibration_factor.to_bits().to_le_bytes());
        out
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            sync_time_seconds: read_u32(bytes, 0),
            nominal_elapsed_seconds: read_u32(bytes, 4),
            calibration_factor: f32::from_bits(read_u32(bytes, 8)),
        }
    }
}

/// Owner of all state that must survive deep sleep.
///
/// The store never fails outward: persistence operations report success as
/// a `bool` and leave the in-memory state usable either way, and patch
/// application silently skips anything it cannot use.
pub struct Store {
    params: Parameters,
    sync: Synchronisation,
    data: [u16; MAX_DATA_SLOTS],
}

impl Store {
    /// Fresh store: default parameters, counter 1, factor 1.0, zeroed
    /// buffer.
    pub const fn new() -> Self {
        Self {
            params: Parameters {
                version: 0,
                counter: 1,
                measurement_interval_ms: 0,
                sample_interval_ms: 0,
                n_samples: 0,
                transmit_frequency: 0,
            },
            sync: Synchronisation {
                sync_time_seconds: 0,
                nominal_elapsed_seconds: 0,
                calibration_factor: 1.0,
            },
            data: [0; MAX_DATA_SLOTS],
        }
    }

    /// Replace the schedule parameters and restart the wake sequence.
    ///
    /// The version stamp is left alone; it tracks configuration
    /// provenance, not schedule shape.
    pub fn set_parameters(
        &mut self,
        measurement_interval_ms: u32,
        sample_interval_ms: u32,
        n_samples: u16,
        transmit_frequency: u16,
    ) {
        self.params.measurement_interval_ms = measurement_interval_ms;
        self.params.sample_interval_ms = sample_interval_ms;
        self.params.n_samples = n_samples;
        self.params.transmit_frequency = transmit_frequency;
        self.params.counter = 1;
    }

    /// Stamp a configuration version.
    pub fn set_version(&mut self, version: u16) {
        self.params.version = version;
    }

    /// Current configuration version.
    pub fn version(&self) -> u16 {
        self.params.version
    }

    /// Advance the wake counter by one, wrapping at the numeric limit.
    pub fn increment_counter(&mut self) {
        self.params.counter = self.params.counter.wrapping_add(1);
    }

    /// Restart the wake sequence at 1.
    pub fn reset_counter(&mut self) {
        self.params.counter = 1;
    }

    /// Current wake counter.
    pub fn counter(&self) -> u16 {
        self.params.counter
    }

    /// Copy of the current parameters.
    pub fn parameters(&self) -> Parameters {
        self.params
    }

    /// Copy of the current calibration state.
    pub fn synchronisation(&self) -> Synchronisation {
        self.sync
    }

    /// Start a new calibration epoch at `sync_time_seconds` with the given
    /// factor, clearing the accumulated nominal elapsed time.
    pub fn reset_synchronisation(&mut self, sync_time_seconds: u32, calibration_factor: f32) {
        self.sync.sync_time_seconds = sync_time_seconds;
        self.sync.nominal_elapsed_seconds = 0;
        self.sync.calibration_factor = calibration_factor;
    }

    /// Account a span of intended sleep, truncated to whole seconds.
    pub fn increment_elapsed(&mut self, milliseconds: u32) {
        self.sync.nominal_elapsed_seconds = self
            .sync
            .nominal_elapsed_seconds
            .wrapping_add(milliseconds / 1000);
    }

    /// The sample/measurement buffer.
    pub fn data(&self) -> &[u16; MAX_DATA_SLOTS] {
        &self.data
    }

    /// Mutable view of the sample/measurement buffer.
    pub fn data_mut(&mut self) -> &mut [u16; MAX_DATA_SLOTS] {
        &mut self.data
    }

    /// One-line status summary in the legacy telemetry field order.
    pub fn status(&self) -> heapless::String<STATUS_CAPACITY> {
        let mut line = heapless::String::new();
        let _ = write!(
            line,
            "Version: {}, counter: {}, measurementInterval: {}, sampleInterval: {}, nSamples: {}, transmitFrequency: {}, calibration: {:.6}",
            self.params.version,
            self.params.counter,
            self.params.measurement_interval_ms,
            self.params.sample_interval_ms,
            self.params.n_samples,
            self.params.transmit_frequency,
            self.sync.calibration_factor,
        );
        line
    }

    /// Apply a configuration patch.
    ///
    /// Recognized keys: `sampleInterval`, `nSamples`, `measurementInterval`,
    /// `transmitFrequency`, `version` (case-sensitive). Unknown keys and
    /// unparsable values are ignored field by field. The wake counter is
    /// not patchable and restarts at 1 after every patch, even an empty
    /// one.
    pub fn apply_patch(&mut self, text: &str) {
        for entry in patch::entries(text) {
            self.apply_entry(entry.key, entry.value);
        }
        self.params.counter = 1;
    }

    fn apply_entry(&mut self, key: &str, value: &str) {
        match key {
            "sampleInterval" => {
                if let Ok(v) = value.parse::<u32>() {
                    self.params.sample_interval_ms = v;
                }
            }
            "nSamples" => {
                if let Ok(v) = value.parse::<u16>() {
                    self.params.n_samples = v;
                }
            }
            "measurementInterval" => {
                if let Ok(v) = value.parse::<u32>() {
                    self.params.measurement_interval_ms = v;
                }
            }
            "transmitFrequency" => {
                if let Ok(v) = value.parse::<u16>() {
                    self.params.transmit_frequency = v;
                }
            }
            "version" => {
                if let Ok(v) = value.parse::<u16>() {
                    self.params.version = v;
                }
            }
            _ => {}
        }
    }

    /// Whether `other` carries the same configuration.
    ///
    /// Compares the version stamp and the four schedule parameters. The
    /// counter is schedule position, not configuration: a live mid-cycle
    /// store must compare equal to a freshly patched scratch copy whose
    /// counter is 1, otherwise patch deduplication could never hold.
    pub fn equivalent_to(&self, other: &Store) -> bool {
        self.params.version == other.params.version
            && self.params.measurement_interval_ms == other.params.measurement_interval_ms
            && self.params.sample_interval_ms == other.params.sample_interval_ms
            && self.params.n_samples == other.params.n_samples
            && self.params.transmit_frequency == other.params.transmit_frequency
    }

    /// Whether retained memory holds an image whose checksum matches its
    /// parameter block.
    ///
    /// Reads only the checksum and parameter block. Returns `false` on
    /// backend errors.
    pub fn check_integrity<M: RetainedMemory>(&self, memory: &M) -> bool {
        let mut head = [0u8; CHECKSUM_BYTES + PARAMS_BYTES];
        if memory.read(IMAGE_OFFSET, &mut head).is_err() {
            return false;
        }
        let stored = read_u32(&head, 0);
        crc::verify(&head[CHECKSUM_BYTES..], stored)
    }

    /// Load the full image from retained memory, replacing this store's
    /// state.
    ///
    /// Returns the checksum verdict. On a backend error nothing is
    /// touched; on a checksum mismatch the decoded state is kept anyway
    /// and `false` is returned, so callers gate on [`Store::check_integrity`]
    /// first when they want to keep their in-memory state instead.
    pub fn load<M: RetainedMemory>(&mut self, memory: &M) -> bool {
        let mut image = [0u8; IMAGE_BYTES];
        if memory.read(IMAGE_OFFSET, &mut image).is_err() {
            return false;
        }
        let stored = read_u32(&image, 0);
        let params_end = CHECKSUM_BYTES + PARAMS_BYTES;
        let sync_end = params_end + SYNC_BYTES;
        self.params = Parameters::from_bytes(&image[CHECKSUM_BYTES..params_end]);
        self.sync = Synchronisation::from_bytes(&image[params_end..sync_end]);
        for (slot, chunk) in self.data.iter_mut().zip(image[sync_end..].chunks_exact(2)) {
            *slot = u16::from_le_bytes([chunk[0], chunk[1]]);
        }
        crc::verify(&image[CHECKSUM_BYTES..params_end], stored)
    }

    /// Write the full image, with a freshly computed checksum, to retained
    /// memory. Returns `false` if the backend refused the write.
    pub fn save<M: RetainedMemory>(&self, memory: &mut M) -> bool {
        let mut image = [0u8; IMAGE_BYTES];
        let params = self.params.to_bytes();
        let checksum = crc::crc32(&params);
        let params_end = CHECKSUM_BYTES + PARAMS_BYTES;
        let sync_end = params_end + SYNC_BYTES;
        image[0..CHECKSUM_BYTES].copy_from_slice(&checksum.to_le_bytes());
        image[CHECKSUM_BYTES..params_end].copy_from_slice(&params);
        image[params_end..sync_end].copy_from_slice(&self.sync.to_bytes());
        for (chunk, slot) in image[sync_end..].chunks_exact_mut(2).zip(self.data.iter()) {
            chunk.copy_from_slice(&slot.to_le_bytes());
        }
        memory.write(IMAGE_OFFSET, &image).is_ok()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
