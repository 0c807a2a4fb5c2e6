//! Persistence of the configuration image through retained memory:
//! checksum validation, full-image restore into a fresh store, and
//! behaviour against corrupted or failing backends.

mod common;

use cadence_core::{RamRetention, Store, IMAGE_OFFSET, MAX_DATA_SLOTS};

use common::FlakyRetention;

#[test]
fn save_marks_the_image_valid() {
    let mut store = Store::new();
    store.set_parameters(3_600_000, 1_000, 5, 3);
    let mut memory = RamRetention::new();

    assert!(!store.check_integrity(&memory));
    assert!(store.save(&mut memory));
    assert!(store.check_integrity(&memory));
}

#[test]
fn loading_replaces_parameters_and_version() {
    let mut memory = RamRetention::new();
    let mut saved = Store::new();
    saved.set_parameters(3_600_000, 1_000, 5, 3);
    saved.set_version(1);
    saved.increment_counter();
    assert!(saved.save(&mut memory));

    let mut restored = Store::new();
    restored.set_parameters(0, 0, 0, 0);
    assert_eq!(
        restored.status().as_str(),
        "Version: 0, counter: 1, measurementInterval: 0, sampleInterval: 0, \
         nSamples: 0, transmitFrequency: 0, calibration: 1.000000"
    );

    assert!(restored.load(&memory));
    assert_eq!(
        restored.status().as_str(),
        "Version: 1, counter: 2, measurementInterval: 3600000, sampleInterval: 1000, \
         nSamples: 5, transmitFrequency: 3, calibration: 1.000000"
    );
}

#[test]
fn loading_restores_the_data_buffer() {
    let mut memory = RamRetention::new();
    let mut saved = Store::new();
    saved.set_parameters(3_600_000, 1_000, 5, 3);
    for (i, slot) in saved.data_mut().iter_mut().enumerate() {
        *slot = i as u16 + 1;
    }
    assert!(saved.save(&mut memory));

    let mut restored = Store::new();
    assert_eq!(restored.data()[42], 0);
    assert!(restored.load(&memory));
    for (i, &slot) in restored.data().iter().enumerate() {
        assert_eq!(slot, i as u16 + 1, "slot {i}");
    }
}

#[test]
fn loading_restores_synchronisation() {
    let mut memory = RamRetention::new();
    let mut saved = Store::new();
    saved.reset_synchronisation(121_343_565, 1.0005);
    saved.increment_elapsed(1_200_000);
    assert!(saved.save(&mut memory));

    let mut restored = Store::new();
    restored.reset_synchronisation(0, 0.0);
    assert!(restored.load(&memory));
    let sync = restored.synchronisation();
    assert_eq!(sync.sync_time_seconds, 121_343_565);
    assert_eq!(sync.nominal_elapsed_seconds, 1_200);
    assert_eq!(sync.calibration_factor, 1.0005);
}

#[test]
fn garbage_in_memory_fails_both_checks() {
    let mut memory = RamRetention::new();
    memory.bytes_mut()[IMAGE_OFFSET..IMAGE_OFFSET + 4]
        .copy_from_slice(&0xDEAD_DEADu32.to_le_bytes());

    let mut store = Store::new();
    assert!(!store.check_integrity(&memory));
    assert!(!store.load(&memory));
}

#[test]
fn a_corrupted_parameter_byte_invalidates_the_image() {
    let mut memory = RamRetention::new();
    let mut saved = Store::new();
    saved.set_parameters(3_600_000, 1_000, 5, 3);
    saved.set_version(9);
    assert!(saved.save(&mut memory));

    // Byte 4 of the image is the low byte of the version field, the
    // first checksummed byte.
    memory.bytes_mut()[IMAGE_OFFSET + 4] = 0xAA;

    let mut restored = Store::new();
    assert!(!restored.check_integrity(&memory));
    // The load still decodes what it read; only the verdict says the
    // image cannot be trusted.
    assert!(!restored.load(&memory));
    assert_eq!(restored.version(), 0xAA);
}

#[test]
fn corruption_outside_the_checksummed_region_goes_unnoticed() {
    let mut memory = RamRetention::new();
    let mut saved = Store::new();
    saved.set_parameters(3_600_000, 1_000, 5, 3);
    saved.reset_synchronisation(1_612_100_000, 1.0);
    assert!(saved.save(&mut memory));

    // The checksum covers the parameters only; a flipped bit in the
    // synchronisation or data region sails through.
    memory.bytes_mut()[IMAGE_OFFSET + 20] ^= 0x01;
    memory.bytes_mut()[IMAGE_OFFSET + 32] ^= 0x80;

    let mut restored = Store::new();
    assert!(restored.check_integrity(&memory));
    assert!(restored.load(&memory));
    assert_ne!(restored.synchronisation().sync_time_seconds, 1_612_100_000);
}

#[test]
fn read_failures_invalidate_the_image() {
    let mut inner = RamRetention::new();
    let mut store = Store::new();
    store.set_parameters(3_600_000, 1_000, 5, 3);
    assert!(store.save(&mut inner));

    let mut flaky = FlakyRetention::new(inner);
    flaky.fail_reads = true;
    assert!(!store.check_integrity(&flaky));
    assert!(!store.load(&flaky));
}

#[test]
fn write_failures_fail_the_save() {
    let mut flaky = FlakyRetention::new(RamRetention::new());
    flaky.fail_writes = true;

    let mut store = Store::new();
    store.set_parameters(3_600_000, 1_000, 5, 3);
    assert!(!store.save(&mut flaky));
    assert!(!store.check_integrity(&flaky.inner));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn any_saved_store_roundtrips(
            version in proptest::num::u16::ANY,
            counter in 1..=300u16,
            measurement_interval_ms in proptest::num::u32::ANY,
            sample_interval_ms in proptest::num::u32::ANY,
            n_samples in proptest::num::u16::ANY,
            transmit_frequency in proptest::num::u16::ANY,
            sync_time in proptest::num::u32::ANY,
            elapsed_ms in proptest::num::u32::ANY,
            factor in 0.5f32..2.0,
            data in proptest::collection::vec(proptest::num::u16::ANY, MAX_DATA_SLOTS),
        ) {
            let mut memory = RamRetention::new();
            let mut saved = Store::new();
            saved.set_parameters(
                measurement_interval_ms,
                sample_interval_ms,
                n_samples,
                transmit_frequency,
            );
            saved.set_version(version);
            for _ in 1..counter {
                saved.increment_counter();
            }
            saved.reset_synchronisation(sync_time, factor);
            saved.increment_elapsed(elapsed_ms);
            saved.data_mut().copy_from_slice(&data);
            prop_assert!(saved.save(&mut memory));

            let mut restored = Store::new();
            prop_assert!(restored.check_integrity(&memory));
            prop_assert!(restored.load(&memory));
            let params = restored.parameters();
            prop_assert_eq!(restored.version(), version);
            prop_assert_eq!(restored.counter(), counter);
            prop_assert_eq!(params.measurement_interval_ms, measurement_interval_ms);
            prop_assert_eq!(params.sample_interval_ms, sample_interval_ms);
            prop_assert_eq!(params.n_samples, n_samples);
            prop_assert_eq!(params.transmit_frequency, transmit_frequency);
            let sync = restored.synchronisation();
            prop_assert_eq!(sync.sync_time_seconds, sync_time);
            prop_assert_eq!(sync.nominal_elapsed_seconds, elapsed_ms / 1000);
            prop_assert_eq!(sync.calibration_factor.to_bits(), factor.to_bits());
            prop_assert_eq!(restored.data().as_slice(), data.as_slice());
        }

        #[test]
        fn arbitrary_patch_text_always_leaves_a_fresh_counter(text in ".{0,200}") {
            let mut store = Store::new();
            store.set_parameters(3_600_000, 1_000, 5, 3);
            store.increment_counter();
            store.apply_patch(&text);
            prop_assert_eq!(store.counter(), 1);
        }
    }
}
