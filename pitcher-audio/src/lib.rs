//! Realtime pitch shifting engine
//!
//! This crate provides the processing core of Pitcher:
//! - Config: stream geometry, PCM format, derived hop/latency values
//! - Fft: in-place radix-2 kernel used on the vocoder hot path
//! - Shifter: the phase vocoder (analysis, bin remap, synthesis)
//! - Params: pitch/volume cells shared with controllers
//! - Pipeline: lock-free byte transport around the worker thread
//!
//! The device callbacks interact only with the pipeline ports; a single
//! worker thread owns all vocoder state.

mod config;
mod fft;
mod params;
mod pipeline;
mod sample;
mod shifter;

pub use config::{ConfigError, SampleFormat, ShiftConfig};
pub use fft::{Complex, Direction, Fft};
pub use params::{FrameParams, ShiftParams, PITCH_RANGE};
pub use pipeline::{CapturePort, Pipeline, PipelineHandle, PipelineStats, PlaybackPort, Worker};
pub use shifter::PitchShifter;
