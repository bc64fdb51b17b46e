//! Phase vocoder pitch shifter.
//!
//! Each input frame is streamed through a sliding window; every hop the
//! windowed frame goes through analysis (instantaneous frequency per bin
//! from the inter-frame phase increment), a bin remap by the pitch
//! ratio, and synthesis (phase re-accumulation at the shifted
//! frequencies), then overlap-add back to the time domain. All buffers
//! are allocated once at construction; the per-frame path is
//! allocation-free.

use std::f64::consts::PI;
use std::sync::Arc;

use crate::config::ShiftConfig;
use crate::fft::{Complex, Direction, Fft};
use crate::params::ShiftParams;
use crate::sample;

/// Per-channel vocoder state. Channels are fully independent lanes:
/// nothing here is shared, so stereo content keeps its phase relations
/// only through the common pitch ratio.
struct ChannelState {
    /// Sliding input window; `[0, latency)` holds the overlap carried
    /// between frames, `[latency, frame_size)` receives new samples
    frame: Vec<f64>,
    /// Output block ready to be emitted; first `step` entries valid
    stack: Vec<f64>,
    /// Overlap-add accumulator, `2 * frame_size`
    out_acc: Vec<f64>,
    /// Analysis results per bin
    magnitudes: Vec<f64>,
    frequencies: Vec<f64>,
    /// Synthesis inputs per bin after the remap
    synth_magnitudes: Vec<f64>,
    synth_frequencies: Vec<f64>,
    /// Previous analysis phase per bin, `frame_size/2 + 1`
    last_phase: Vec<f64>,
    /// Accumulated synthesis phase per bin
    sum_phase: Vec<f64>,
    /// FFT scratch
    work: Vec<Complex>,
}

impl ChannelState {
    fn new(frame_size: usize) -> Self {
        Self {
            frame: vec![0.0; frame_size],
            stack: vec![0.0; frame_size],
            out_acc: vec![0.0; 2 * frame_size],
            magnitudes: vec![0.0; frame_size],
            frequencies: vec![0.0; frame_size],
            synth_magnitudes: vec![0.0; frame_size],
            synth_frequencies: vec![0.0; frame_size],
            last_phase: vec![0.0; frame_size / 2 + 1],
            sum_phase: vec![0.0; frame_size / 2 + 1],
            work: vec![Complex::default(); frame_size],
        }
    }

    /// One full analysis / remap / synthesis cycle over the current
    /// window. Updates `stack[0..step)` and slides `frame` and
    /// `out_acc` back by `step`.
    fn run_cycle(
        &mut self,
        fft: &Fft,
        window: &[f64],
        window_factors: &[f64],
        ratio: f64,
        config: &ShiftConfig,
    ) {
        let n = config.frame_size;
        let half = n / 2;
        let step = config.step();
        let expected = config.expected_phase();
        let freq_per_bin = config.freq_per_bin();
        let oversampling = config.oversampling as f64;

        // Window and forward transform
        for k in 0..n {
            self.work[k] = Complex::new(self.frame[k] * window[k], 0.0);
        }
        fft.process(&mut self.work, Direction::Forward);

        // Analysis: true frequency per bin from the phase increment
        for k in 0..=half {
            let magn = 2.0 * self.work[k].magnitude();
            let phase = self.work[k].phase();

            let mut diff = phase - self.last_phase[k];
            self.last_phase[k] = phase;

            // Subtract the expected advance, then wrap the remainder to
            // +/- pi by snapping the pi-multiple to the nearest even
            diff -= k as f64 * expected;
            let mut wraps = (diff / PI) as i64;
            if wraps >= 0 {
                wraps += wraps & 1;
            } else {
                wraps -= wraps & 1;
            }
            diff -= PI * wraps as f64;

            // Deviation from the bin center in fractional bins
            diff *= oversampling / (2.0 * PI);

            self.magnitudes[k] = magn;
            self.frequencies[k] = (k as f64 + diff) * freq_per_bin;
        }

        // Remap bins by the pitch ratio. Magnitudes accumulate on
        // collision; the frequency slot keeps the latest source bin.
        self.synth_magnitudes.fill(0.0);
        self.synth_frequencies.fill(0.0);
        for k in 0..half {
            let l = (k as f64 * ratio) as usize;
            if l < half {
                self.synth_magnitudes[l] += self.magnitudes[k];
                self.synth_frequencies[l] = self.frequencies[k] * ratio;
            }
        }

        // Synthesis: accumulate phase at the shifted frequencies
        for k in 0..=half {
            let magn = self.synth_magnitudes[k];
            let mut t = self.synth_frequencies[k];
            t -= k as f64 * freq_per_bin;
            t /= freq_per_bin;
            t *= 2.0 * PI / oversampling;
            t += k as f64 * expected;
            self.sum_phase[k] += t;
            self.work[k] = Complex::from_polar(magn, self.sum_phase[k]);
        }
        // Discard everything above Nyquist; the Nyquist bin itself stays
        for k in half + 1..n {
            self.work[k] = Complex::default();
        }

        fft.process(&mut self.work, Direction::Inverse);

        // Overlap-add, emit one hop, slide window and accumulator
        for k in 0..n {
            self.out_acc[k] += window_factors[k] * self.work[k].re;
        }
        self.stack[..step].copy_from_slice(&self.out_acc[..step]);
        self.out_acc.copy_within(step..n + step, 0);
        self.frame.copy_within(step.., 0);
    }
}

/// Streaming phase-vocoder pitch shifter over interleaved PCM frames.
///
/// [`process_frame`](Self::process_frame) consumes exactly one frame of
/// `bytes_per_frame` input bytes and produces one frame of output, with
/// a fixed algorithmic delay of `latency` samples. Pitch and volume are
/// re-read from the shared [`ShiftParams`] once per frame.
pub struct PitchShifter {
    config: ShiftConfig,
    params: Arc<ShiftParams>,
    fft: Fft,
    /// Periodic Hann analysis window
    window: Vec<f64>,
    /// Synthesis overlap-add factors; folds in the inverse FFT's
    /// missing `1/n` and exact-unity window closure at hop `n/o`
    window_factors: Vec<f64>,
    channels: Vec<ChannelState>,
    input_samples: Vec<f64>,
    output_samples: Vec<f64>,
}

impl PitchShifter {
    pub fn new(config: ShiftConfig, params: Arc<ShiftParams>) -> Self {
        let n = config.frame_size;

        let mut window = Vec::with_capacity(n);
        let mut window_factors = Vec::with_capacity(n);
        // Periodic Hann; its square summed across overlaps at hop n/o is
        // exactly 3o/8, so 8/(3*n*o) closes the overlap-add to unity
        // through the unnormalized inverse transform
        let norm = 8.0 / (3.0 * (n * config.oversampling) as f64);
        let mut t = 0.0;
        for _ in 0..n {
            let w = -0.5 * f64::cos(t) + 0.5;
            window.push(w);
            window_factors.push(w * norm);
            t += 2.0 * PI / n as f64;
        }

        Self {
            config,
            params,
            fft: Fft::new(n),
            window,
            window_factors,
            channels: (0..config.channels).map(|_| ChannelState::new(n)).collect(),
            input_samples: vec![0.0; n],
            output_samples: vec![0.0; n],
        }
    }

    pub fn config(&self) -> &ShiftConfig {
        &self.config
    }

    /// Transpose one interleaved PCM frame.
    ///
    /// `input` and `output` must both be exactly
    /// [`ShiftConfig::bytes_per_frame`] long.
    pub fn process_frame(&mut self, input: &[u8], output: &mut [u8]) {
        let cfg = self.config;
        debug_assert_eq!(input.len(), cfg.bytes_per_frame());
        debug_assert_eq!(output.len(), input.len());

        let frame_params = self.params.snapshot();
        let ratio = frame_params.ratio();
        let latency = cfg.latency();

        for (c, state) in self.channels.iter_mut().enumerate() {
            sample::decode_channel(
                input,
                cfg.sample_format,
                cfg.channels,
                c,
                &mut self.input_samples,
            );

            // Stream through the sliding window; every `step` samples a
            // full window is ready and one cycle runs. The stack read
            // always sees a value produced by the previous cycle.
            let mut frame_index = latency;
            for i in 0..cfg.frame_size {
                state.frame[frame_index] = self.input_samples[i];
                self.output_samples[i] = state.stack[frame_index - latency];
                frame_index += 1;

                if frame_index == cfg.frame_size {
                    frame_index = latency;
                    state.run_cycle(&self.fft, &self.window, &self.window_factors, ratio, &cfg);
                }
            }

            sample::encode_channel(
                &self.output_samples,
                frame_params.volume,
                cfg.sample_format,
                cfg.channels,
                c,
                output,
            );
        }
    }
}
