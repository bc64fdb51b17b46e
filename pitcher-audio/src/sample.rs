//! PCM byte conversion between the device format and `f64` samples.
//!
//! Channels are interleaved in the byte stream: channel `c` of an
//! `n`-channel stream starts at byte offset `c * bytes_per_sample` and
//! repeats every `n * bytes_per_sample` bytes.

use crate::config::SampleFormat;

/// Extract channel `channel` from interleaved `bytes` into `out`.
///
/// `out.len()` determines how many samples are read; `bytes` must hold
/// at least that many interleaved frames.
pub fn decode_channel(
    bytes: &[u8],
    format: SampleFormat,
    channels: usize,
    channel: usize,
    out: &mut [f64],
) {
    debug_assert!(channel < channels);
    let stride = channels * format.bytes_per_sample();
    let mut offset = channel * format.bytes_per_sample();

    match format {
        SampleFormat::S16Le => {
            for sample in out.iter_mut() {
                let raw = i16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
                *sample = f64::from(raw) / 32768.0;
                offset += stride;
            }
        }
        SampleFormat::F32Le => {
            for sample in out.iter_mut() {
                let raw = f32::from_le_bytes([
                    bytes[offset],
                    bytes[offset + 1],
                    bytes[offset + 2],
                    bytes[offset + 3],
                ]);
                *sample = f64::from(raw);
                offset += stride;
            }
        }
    }
}

/// Write `samples`, scaled by `gain`, into channel `channel` of the
/// interleaved byte block `out`.
pub fn encode_channel(
    samples: &[f64],
    gain: f64,
    format: SampleFormat,
    channels: usize,
    channel: usize,
    out: &mut [u8],
) {
    debug_assert!(channel < channels);
    let stride = channels * format.bytes_per_sample();
    let mut offset = channel * format.bytes_per_sample();

    match format {
        SampleFormat::S16Le => {
            for &sample in samples {
                // `as` saturates at the i16 range, clipping out-of-range peaks
                let raw = (sample * gain * 32768.0) as i16;
                out[offset..offset + 2].copy_from_slice(&raw.to_le_bytes());
                offset += stride;
            }
        }
        SampleFormat::F32Le => {
            for &sample in samples {
                let raw = (sample * gain) as f32;
                out[offset..offset + 4].copy_from_slice(&raw.to_le_bytes());
                offset += stride;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_roundtrip_stereo() {
        let left: Vec<f64> = (0..64).map(|i| (i as f64 - 32.0) / 40.0).collect();
        let right: Vec<f64> = left.iter().map(|s| -s).collect();

        let mut bytes = vec![0u8; 64 * 2 * 4];
        encode_channel(&left, 1.0, SampleFormat::F32Le, 2, 0, &mut bytes);
        encode_channel(&right, 1.0, SampleFormat::F32Le, 2, 1, &mut bytes);

        let mut left_out = vec![0.0; 64];
        let mut right_out = vec![0.0; 64];
        decode_channel(&bytes, SampleFormat::F32Le, 2, 0, &mut left_out);
        decode_channel(&bytes, SampleFormat::F32Le, 2, 1, &mut right_out);

        for i in 0..64 {
            assert!((left_out[i] - left[i]).abs() < 1e-7);
            assert!((right_out[i] - right[i]).abs() < 1e-7);
        }
    }

    #[test]
    fn test_s16_roundtrip() {
        let samples: Vec<f64> = (0..32).map(|i| (i as f64 - 16.0) / 20.0).collect();
        let mut bytes = vec![0u8; 32 * 2];
        encode_channel(&samples, 1.0, SampleFormat::S16Le, 1, 0, &mut bytes);

        let mut out = vec![0.0; 32];
        decode_channel(&bytes, SampleFormat::S16Le, 1, 0, &mut out);

        for i in 0..32 {
            assert!((out[i] - samples[i]).abs() < 1.0 / 32768.0);
        }
    }

    #[test]
    fn test_s16_encode_saturates() {
        let mut bytes = vec![0u8; 4];
        encode_channel(&[2.0, -2.0], 1.0, SampleFormat::S16Le, 1, 0, &mut bytes);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MIN);
    }

    #[test]
    fn test_gain_applied_on_encode() {
        let mut bytes = vec![0u8; 4];
        encode_channel(&[0.8], 0.25, SampleFormat::F32Le, 1, 0, &mut bytes);
        let raw = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert!((f64::from(raw) - 0.2).abs() < 1e-7);
    }

    #[test]
    fn test_channel_byte_offsets() {
        // Second of three channels starts bytes_per_sample into the frame
        let mut bytes = vec![0u8; 3 * 4];
        encode_channel(&[0.5], 1.0, SampleFormat::F32Le, 3, 1, &mut bytes);
        assert_eq!(&bytes[0..4], &[0; 4]);
        assert_ne!(&bytes[4..8], &[0; 4]);
        assert_eq!(&bytes[8..12], &[0; 4]);
    }
}
