//! Shared volume multiplier cell
//!
//! One writer (the controller) and one reader (the uplink loop). The loop
//! snapshots the value once per iteration; staleness by one iteration is
//! acceptable, so a relaxed atomic is enough.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::constants::{DEFAULT_VOLUME, MAX_VOLUME};

/// Cloneable handle to the volume multiplier, stored as f32 bits.
///
/// Values are clamped to `[0.0, MAX_VOLUME]` on write, so readers never
/// observe an out-of-range multiplier.
#[derive(Clone)]
pub struct VolumeControl {
    bits: Arc<AtomicU32>,
}

impl VolumeControl {
    pub fn new(initial: f32) -> Self {
        let control = Self {
            bits: Arc::new(AtomicU32::new(0)),
        };
        control.set(initial);
        control
    }

    /// Update the multiplier, clamping it into range
    pub fn set(&self, multiplier: f32) {
        let mut clamped = multiplier;
        if !(clamped >= 0.0) {
            // Also catches NaN
            clamped = 0.0;
        }
        if clamped > MAX_VOLUME {
            clamped = MAX_VOLUME;
        }
        self.bits.store(clamped.to_bits(), Ordering::Relaxed);
    }

    /// Snapshot the current multiplier
    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

impl Default for VolumeControl {
    fn default() -> Self {
        Self::new(DEFAULT_VOLUME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_volume() {
        assert_eq!(VolumeControl::default().get(), DEFAULT_VOLUME);
    }

    #[test]
    fn test_set_and_get() {
        let volume = VolumeControl::new(1.0);
        volume.set(2.5);
        assert_eq!(volume.get(), 2.5);
    }

    #[test]
    fn test_clamps_above_max() {
        let volume = VolumeControl::new(1.0);
        volume.set(25.0);
        assert_eq!(volume.get(), MAX_VOLUME);
    }

    #[test]
    fn test_clamps_below_zero() {
        let volume = VolumeControl::new(1.0);
        volume.set(-3.0);
        assert_eq!(volume.get(), 0.0);
    }

    #[test]
    fn test_nan_becomes_zero() {
        let volume = VolumeControl::new(1.0);
        volume.set(f32::NAN);
        assert_eq!(volume.get(), 0.0);
    }

    #[test]
    fn test_shared_between_clones() {
        let writer = VolumeControl::new(1.0);
        let reader = writer.clone();
        writer.set(4.0);
        assert_eq!(reader.get(), 4.0);
    }
}
