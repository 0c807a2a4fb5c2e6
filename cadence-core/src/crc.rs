//! CRC-32 integrity checksum for the persisted image.
//!
//! Bit-by-bit CRC-32 with polynomial `0x04C11DB7`, seed `0xFFFFFFFF`,
//! MSB-first bit order, and no reflection or output XOR — the
//! CRC-32/MPEG-2 parameterization. The bitwise form needs no lookup table,
//! which matters more here than throughput: the image is checksummed once
//! per wake over a handful of bytes.
//!
//! This detects corruption of retained memory (e.g. after full power
//! loss); it is not an authentication mechanism.

/// Generator polynomial, applied MSB-first without reflection.
const POLYNOMIAL: u32 = 0x04C1_1DB7;

/// Initial shift-register value.
const SEED: u32 = 0xFFFF_FFFF;

/// Compute the checksum of `bytes`.
///
/// Deterministic and pure. The empty slice hashes to the seed itself.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = SEED;
    for &byte in bytes {
        let mut mask = 0x80u8;
        while mask != 0 {
            let mut invert = crc & 0x8000_0000 != 0;
            if byte & mask != 0 {
                invert = !invert;
            }
            crc <<= 1;
            if invert {
                crc ^= POLYNOMIAL;
            }
            mask >>= 1;
        }
    }
    crc
}

/// Check `bytes` against a previously stored checksum.
pub fn verify(bytes: &[u8], expected: u32) -> bool {
    crc32(bytes) == expected
}
