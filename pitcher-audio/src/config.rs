//! Stream configuration - frame geometry and PCM format

use std::f64::consts::PI;
use thiserror::Error;

/// Errors raised when validating a [`ShiftConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("frame size must be a power of two, got {0}")]
    FrameSize(usize),
    #[error("oversampling must be a power of two, got {0}")]
    Oversampling(usize),
    #[error("oversampling ({oversampling}) must not exceed the frame size ({frame_size})")]
    OversamplingExceedsFrame {
        oversampling: usize,
        frame_size: usize,
    },
    #[error("sample rate must be positive, got {0}")]
    SampleRate(f64),
    #[error("channel count must be at least 1")]
    Channels,
}

/// PCM encodings the converter understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian
    S16Le,
    /// IEEE-754 32-bit float little-endian
    F32Le,
}

impl SampleFormat {
    #[inline]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
            SampleFormat::F32Le => 4,
        }
    }
}

/// Immutable stream parameters, fixed for the lifetime of the engine.
///
/// The frame size and oversampling factor determine the hop size
/// (`step`) and the algorithmic latency of the overlap-add vocoder
/// (`frame_size - step` samples).
#[derive(Debug, Clone, Copy)]
pub struct ShiftConfig {
    pub frame_size: usize,
    pub oversampling: usize,
    pub sample_rate: f64,
    pub sample_format: SampleFormat,
    pub channels: usize,
}

impl ShiftConfig {
    pub fn new(
        frame_size: usize,
        oversampling: usize,
        sample_rate: f64,
        sample_format: SampleFormat,
        channels: usize,
    ) -> Result<Self, ConfigError> {
        if frame_size == 0 || !frame_size.is_power_of_two() {
            return Err(ConfigError::FrameSize(frame_size));
        }
        if oversampling == 0 || !oversampling.is_power_of_two() {
            return Err(ConfigError::Oversampling(oversampling));
        }
        if oversampling > frame_size {
            return Err(ConfigError::OversamplingExceedsFrame {
                oversampling,
                frame_size,
            });
        }
        if !(sample_rate > 0.0) {
            return Err(ConfigError::SampleRate(sample_rate));
        }
        if channels == 0 {
            return Err(ConfigError::Channels);
        }
        Ok(Self {
            frame_size,
            oversampling,
            sample_rate,
            sample_format,
            channels,
        })
    }

    /// Hop size between successive overlapping frames
    #[inline]
    pub fn step(&self) -> usize {
        self.frame_size / self.oversampling
    }

    /// Algorithmic latency in samples
    #[inline]
    pub fn latency(&self) -> usize {
        self.frame_size - self.step()
    }

    /// Expected phase advance per hop at bin k is `k * expected_phase()`
    #[inline]
    pub fn expected_phase(&self) -> f64 {
        2.0 * PI * self.step() as f64 / self.frame_size as f64
    }

    /// Hz spacing between adjacent FFT bins
    #[inline]
    pub fn freq_per_bin(&self) -> f64 {
        self.sample_rate / self.frame_size as f64
    }

    /// Size in bytes of one interleaved PCM frame across all channels
    #[inline]
    pub fn bytes_per_frame(&self) -> usize {
        self.frame_size * self.channels * self.sample_format.bytes_per_sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(frame_size: usize, oversampling: usize) -> Result<ShiftConfig, ConfigError> {
        ShiftConfig::new(frame_size, oversampling, 44100.0, SampleFormat::F32Le, 1)
    }

    #[test]
    fn test_step_times_oversampling_is_frame_size() {
        for p in 1..=13 {
            for q in 1..=p {
                let config = mono(1 << p, 1 << q).unwrap();
                assert_eq!(config.step() * config.oversampling, config.frame_size);
                assert_eq!(config.latency() + config.step(), config.frame_size);
            }
        }
    }

    #[test]
    fn test_derived_values() {
        let config = ShiftConfig::new(1024, 32, 44100.0, SampleFormat::F32Le, 2).unwrap();
        assert_eq!(config.step(), 32);
        assert_eq!(config.latency(), 992);
        assert!((config.freq_per_bin() - 43.06640625).abs() < 1e-12);
        assert!((config.expected_phase() - 2.0 * PI / 32.0).abs() < 1e-15);
        assert_eq!(config.bytes_per_frame(), 1024 * 2 * 4);
    }

    #[test]
    fn test_bytes_per_frame_s16() {
        let config = ShiftConfig::new(2048, 4, 48000.0, SampleFormat::S16Le, 2).unwrap();
        assert_eq!(config.bytes_per_frame(), 2048 * 2 * 2);
    }

    #[test]
    fn test_rejects_non_power_of_two_frame_size() {
        assert!(matches!(mono(1000, 4), Err(ConfigError::FrameSize(1000))));
        assert!(matches!(mono(0, 4), Err(ConfigError::FrameSize(0))));
    }

    #[test]
    fn test_rejects_non_power_of_two_oversampling() {
        assert!(matches!(mono(1024, 3), Err(ConfigError::Oversampling(3))));
        assert!(matches!(mono(1024, 0), Err(ConfigError::Oversampling(0))));
    }

    #[test]
    fn test_rejects_oversampling_above_frame_size() {
        assert!(matches!(
            mono(256, 512),
            Err(ConfigError::OversamplingExceedsFrame { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_rate_and_channels() {
        assert!(matches!(
            ShiftConfig::new(1024, 4, 0.0, SampleFormat::F32Le, 1),
            Err(ConfigError::SampleRate(_))
        ));
        assert!(matches!(
            ShiftConfig::new(1024, 4, 44100.0, SampleFormat::F32Le, 0),
            Err(ConfigError::Channels)
        ));
    }
}
