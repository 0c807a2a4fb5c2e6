//! Retained-memory seam.
//!
//! Deep sleep wipes RAM; the only state that survives is a small
//! battery-backed region (RTC memory on the original hardware). The store
//! persists its image through this trait so the scheduling core stays
//! independent of any one platform's retention mechanism.

use thiserror_no_std::Error;

/// Errors a retained-memory backend can report.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionError {
    /// Access touches bytes outside the retained region.
    #[error("access outside retained region: offset {offset}, len {len}")]
    OutOfRange {
        /// Byte offset of the rejected access.
        offset: usize,
        /// Length of the rejected access.
        len: usize,
    },
    /// The backing hardware reported a read failure.
    #[error("retained-memory read failed at offset {offset}")]
    ReadFailed {
        /// Byte offset of the failed read.
        offset: usize,
    },
    /// The backing hardware reported a write failure.
    #[error("retained-memory write failed at offset {offset}")]
    WriteFailed {
        /// Byte offset of the failed write.
        offset: usize,
    },
}

#[cfg(feature = "defmt")]
impl defmt::Format for RetentionError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::OutOfRange { offset, len } => {
                defmt::write!(f, "access outside retained region: offset {}, len {}", offset, len)
            }
            Self::ReadFailed { offset } => {
                defmt::write!(f, "retained-memory read failed at offset {}", offset)
            }
            Self::WriteFailed { offset } => {
                defmt::write!(f, "retained-memory write failed at offset {}", offset)
            }
        }
    }
}

/// Block access to the memory region that survives deep sleep.
///
/// Offsets are absolute within the region. Implementations must either
/// complete the full transfer or return an error; partial transfers are
/// not part of the contract.
pub trait RetainedMemory {
    /// Fill `buf` from the region starting at `offset`.
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), RetentionError>;

    /// Write `data` into the region starting at `offset`.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), RetentionError>;
}

/// Size of the reference retained region in bytes.
///
/// Matches the RTC user memory available on the original hardware.
pub const RETAINED_REGION_BYTES: usize = 512;

/// In-memory reference backend.
///
/// Used by tests and simulators, and by hosts whose platform keeps the
/// process alive between wakes anyway.
#[derive(Clone)]
pub struct RamRetention {
    bytes: [u8; RETAINED_REGION_BYTES],
}

impl RamRetention {
    /// Zero-filled region, as hardware presents it after power loss.
    pub const fn new() -> Self {
        Self {
            bytes: [0; RETAINED_REGION_BYTES],
        }
    }

    /// Raw view of the region, for inspection.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Raw mutable view of the region, for seeding or corrupting state.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn span(&self, offset: usize, len: usize) -> Result<core::ops::Range<usize>, RetentionError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(offset..end),
            _ => Err(RetentionError::OutOfRange { offset, len }),
        }
    }
}

impl Default for RamRetention {
    fn default() -> Self {
        Self::new()
    }
}

impl RetainedMemory for RamRetention {
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), RetentionError> {
        let span = self.span(offset, buf.len())?;
        buf.copy_from_slice(&self.bytes[span]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), RetentionError> {
        let span = self.span(offset, data.len())?;
        self.bytes[span].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bytes() {
        let mut memory = RamRetention::new();
        memory.write(128, &[1, 2, 3, 4]).unwrap();
        let mut back = [0u8; 4];
        memory.read(128, &mut back).unwrap();
        assert_eq!(back, [1, 2, 3, 4]);
    }

    #[test]
    fn rejects_out_of_range_access() {
        let mut memory = RamRetention::new();
        let err = memory.write(RETAINED_REGION_BYTES - 2, &[0; 4]).unwrap_err();
        assert_eq!(
            err,
            RetentionError::OutOfRange {
                offset: RETAINED_REGION_BYTES - 2,
                len: 4
            }
        );

        let mut buf = [0u8; 1];
        assert!(memory.read(RETAINED_REGION_BYTES, &mut buf).is_err());
    }

    #[test]
    fn starts_zeroed() {
        let memory = RamRetention::new();
        assert!(memory.bytes().iter().all(|&b| b == 0));
    }
}
