//! Pitcher - realtime pitch shifter
//!
//! Captures audio from the default input device, transposes it by a
//! runtime-adjustable number of semitones through a phase vocoder, and
//! plays it back on the default output device.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{info, warn};

use pitcher_audio::{
    CapturePort, Pipeline, PitchShifter, PlaybackPort, SampleFormat, ShiftConfig, ShiftParams,
};

/// Device channel count; both streams are opened stereo
const CHANNELS: usize = 2;

/// Per-callback conversion scratch, sized well above any realistic
/// callback buffer so the chunked copy loop rarely iterates twice
const SCRATCH_BYTES: usize = 1 << 15;

#[derive(Parser, Debug)]
#[command(name = "pitcher", about = "Realtime pitch shifter")]
struct Cli {
    /// Display the slider GUI
    #[arg(long, default_value_t = false)]
    gui: bool,

    /// Semitones to pitch-shift. Must be between -12 and +12
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    shift: i32,

    /// STFT frame size in samples (power of two)
    #[arg(long, default_value_t = 2048)]
    framesize: usize,

    /// Overlap factor (power of two)
    #[arg(long, default_value_t = 32)]
    oversampling: usize,

    /// Sample rate in Hz to open the devices at
    #[arg(long, default_value_t = 44100)]
    samplerate: u32,

    /// Periods per frame; the device buffer is framesize/periods frames
    #[arg(long, default_value_t = 3)]
    periods: u32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    if cli.shift < -12 || cli.shift > 12 {
        bail!("--shift must be between -12 and 12 inclusive");
    }
    if cli.periods == 0 {
        bail!("--periods must be at least 1");
    }
    let config = ShiftConfig::new(
        cli.framesize,
        cli.oversampling,
        f64::from(cli.samplerate),
        SampleFormat::F32Le,
        CHANNELS,
    )
    .context("invalid stream configuration")?;

    let params = Arc::new(ShiftParams::new(f64::from(cli.shift), 1.0));
    let shifter = PitchShifter::new(config, params.clone());
    let Pipeline {
        capture,
        playback,
        worker,
        handle,
    } = Pipeline::new(shifter);

    let worker_thread = thread::spawn(move || worker.run());

    let streams = start_streams(&config, cli.periods, capture, playback)?;

    if cli.gui {
        // Window lifetime is process lifetime
        pitcher_gui::run(params).map_err(|e| anyhow!("gui error: {e}"))?;
    } else {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        ctrlc::set_handler(move || {
            let _ = stop_tx.try_send(());
        })
        .context("failed to install the Ctrl-C handler")?;
        println!("Press Ctrl-C to exit");
        let _ = stop_rx.recv();
        println!("Exiting...");
    }

    // Stop the device first so the callbacks go quiet, then the worker
    drop(streams);
    if !handle.shutdown(Duration::from_secs(1)) {
        warn!("worker did not acknowledge shutdown");
    }
    let _ = worker_thread.join();

    info!(
        discarded_frames = handle.stats().discarded_frames(),
        underruns = handle.stats().underruns(),
        "session finished"
    );
    Ok(())
}

/// Open, wire and start the duplex pair on the default devices. The
/// returned streams keep the callbacks alive; dropping them stops the
/// device.
fn start_streams(
    config: &ShiftConfig,
    periods: u32,
    mut capture: CapturePort,
    mut playback: PlaybackPort,
) -> Result<(cpal::Stream, cpal::Stream)> {
    let host = cpal::default_host();
    let input_device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("no input device available"))?;
    let output_device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("no output device available"))?;
    info!(
        host = ?host.id(),
        input = %input_device.name().unwrap_or_else(|_| "unknown".into()),
        output = %output_device.name().unwrap_or_else(|_| "unknown".into()),
        "using default duplex devices"
    );

    let buffer_frames = (config.frame_size / periods as usize).max(1) as u32;
    let stream_config = cpal::StreamConfig {
        channels: config.channels as u16,
        sample_rate: cpal::SampleRate(config.sample_rate as u32),
        buffer_size: cpal::BufferSize::Fixed(buffer_frames),
    };

    let mut in_scratch = vec![0u8; SCRATCH_BYTES];
    let input_stream = input_device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let samples_per_chunk = in_scratch.len() / 4;
                for block in data.chunks(samples_per_chunk) {
                    for (src, dst) in block.iter().zip(in_scratch.chunks_exact_mut(4)) {
                        dst.copy_from_slice(&src.to_le_bytes());
                    }
                    capture.push(&in_scratch[..block.len() * 4]);
                }
            },
            |err| tracing::error!("input stream error: {err}"),
            None,
        )
        .context("failed to open the capture stream")?;

    let mut out_scratch = vec![0u8; SCRATCH_BYTES];
    let output_stream = output_device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let samples_per_chunk = out_scratch.len() / 4;
                for block in data.chunks_mut(samples_per_chunk) {
                    let bytes = &mut out_scratch[..block.len() * 4];
                    playback.fill(bytes);
                    for (dst, src) in block.iter_mut().zip(bytes.chunks_exact(4)) {
                        *dst = f32::from_le_bytes([src[0], src[1], src[2], src[3]]);
                    }
                }
            },
            |err| tracing::error!("output stream error: {err}"),
            None,
        )
        .context("failed to open the playback stream")?;

    input_stream
        .play()
        .context("failed to start the capture stream")?;
    output_stream
        .play()
        .context("failed to start the playback stream")?;
    info!(
        rate = config.sample_rate,
        buffer_frames, "audio streams running"
    );

    Ok((input_stream, output_stream))
}
