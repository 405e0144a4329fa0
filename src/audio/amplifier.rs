//! In-place volume amplification for PCM16 buffers
//!
//! This is the per-sample hot path: it runs once per captured buffer, every
//! 20 ms or so, and must not allocate.

/// Multiply every sample of an interleaved little-endian PCM16 buffer by
/// `multiplier`, in place.
///
/// Each sample is decoded as a signed 16-bit value, scaled, floored, and
/// re-encoded from the low 16 bits of the result. Overflow wraps instead of
/// saturating: this matches the reference sender, and the receiver end
/// expects it. Buffer length must be even.
pub fn amplify(buf: &mut [u8], multiplier: f32) {
    debug_assert!(buf.len() % 2 == 0, "PCM16 buffer must hold whole samples");

    for sample in buf.chunks_exact_mut(2) {
        let s = i16::from_le_bytes([sample[0], sample[1]]);
        let scaled = (f32::from(s) * multiplier).floor() as i64;
        // Truncate to the low 16 bits (wrap-around, not saturation)
        sample.copy_from_slice(&(scaled as i16).to_le_bytes());
    }
}
