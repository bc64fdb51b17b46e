//! Byte transport between the device callbacks and the worker thread.
//!
//! Two wait-free SPSC byte rings connect the realtime callbacks to the
//! worker: the capture callback appends into `record`, the worker drains
//! `record` a frame at a time, processes it, and appends into `play`,
//! which the playback callback drains. A bounded(1) wake channel tells
//! the worker a full frame is waiting; a signal that does not fit is
//! dropped because the worker is already awake.
//!
//! The callback paths never allocate, lock, or wait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, Sender};
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use tracing::warn;

use crate::shifter::PitchShifter;

/// Ring capacity per direction, in frames. Headroom beyond the
/// documented one-frame overflow policy so a stalled worker discards
/// old audio instead of the callback dropping new audio.
const RING_FRAMES: usize = 16;

/// Overrun/underrun accounting, shared by the ports and the handle.
#[derive(Default)]
pub struct PipelineStats {
    discarded_frames: AtomicU64,
    underruns: AtomicU64,
    dropped_bytes: AtomicU64,
}

impl PipelineStats {
    /// Whole input frames discarded because the worker ran late
    pub fn discarded_frames(&self) -> u64 {
        self.discarded_frames.load(Ordering::Relaxed)
    }

    /// Playback callbacks that had to emit silence
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Bytes lost to full rings (beyond the frame discard policy)
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes.load(Ordering::Relaxed)
    }
}

/// Capture side of the pipeline, owned by the input device callback.
pub struct CapturePort {
    record: HeapProducer<u8>,
    wake_tx: Sender<()>,
    bytes_per_frame: usize,
    stats: Arc<PipelineStats>,
}

impl CapturePort {
    /// Append captured interleaved PCM bytes and wake the worker once a
    /// full frame is available. Wait-free.
    pub fn push(&mut self, bytes: &[u8]) {
        let written = self.record.push_slice(bytes);
        if written < bytes.len() {
            self.stats
                .dropped_bytes
                .fetch_add((bytes.len() - written) as u64, Ordering::Relaxed);
        }
        if self.record.len() >= self.bytes_per_frame {
            let _ = self.wake_tx.try_send(());
        }
    }
}

/// Playback side of the pipeline, owned by the output device callback.
pub struct PlaybackPort {
    play: HeapConsumer<u8>,
    stats: Arc<PipelineStats>,
}

impl PlaybackPort {
    /// Fill `out` from processed audio, or with silence if not enough
    /// has been produced yet. Wait-free.
    pub fn fill(&mut self, out: &mut [u8]) {
        if self.play.len() >= out.len() {
            self.play.pop_slice(out);
        } else {
            out.fill(0);
            self.stats.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Bytes of processed audio currently queued
    pub fn available(&self) -> usize {
        self.play.len()
    }
}

/// The processing loop: owns the shifter and both inner ring ends.
pub struct Worker {
    shifter: PitchShifter,
    record: HeapConsumer<u8>,
    play: HeapProducer<u8>,
    wake_rx: Receiver<()>,
    quit_rx: Receiver<()>,
    ended_tx: Sender<()>,
    input_block: Vec<u8>,
    output_block: Vec<u8>,
    bytes_per_frame: usize,
    stats: Arc<PipelineStats>,
}

impl Worker {
    /// Block on wake/quit until shutdown. Intended for a dedicated
    /// thread; consumes the worker.
    pub fn run(mut self) {
        loop {
            select! {
                recv(self.quit_rx) -> _ => break,
                recv(self.wake_rx) -> msg => {
                    if msg.is_err() {
                        // Capture side is gone; nothing will wake us again
                        break;
                    }
                    self.drain_ready();
                }
            }
        }
        // Frames signalled before the quit still get processed
        self.drain_ready();
        let _ = self.ended_tx.send(());
    }

    /// Process every complete frame currently queued in `record`.
    ///
    /// If more than one frame has accumulated the oldest excess bytes
    /// are discarded so processing resumes on the freshest audio; each
    /// whole discarded frame is counted. This is the documented overrun
    /// glitch.
    pub fn drain_ready(&mut self) {
        while self.record.len() >= self.bytes_per_frame {
            let excess = self.record.len() - self.bytes_per_frame;
            if excess > 0 {
                self.record.skip(excess);
                let frames = (excess / self.bytes_per_frame) as u64;
                if frames > 0 {
                    self.stats
                        .discarded_frames
                        .fetch_add(frames, Ordering::Relaxed);
                }
                warn!(bytes = excess, "input overrun, discarding oldest audio");
            }

            let got = self.record.pop_slice(&mut self.input_block);
            debug_assert_eq!(got, self.bytes_per_frame);

            self.shifter
                .process_frame(&self.input_block, &mut self.output_block);

            let written = self.play.push_slice(&self.output_block);
            if written < self.output_block.len() {
                let lost = (self.output_block.len() - written) as u64;
                self.stats.dropped_bytes.fetch_add(lost, Ordering::Relaxed);
                warn!(bytes = lost, "output ring full, dropping processed audio");
            }
        }
    }
}

/// Shutdown control and counters, kept by the owner of the pipeline.
pub struct PipelineHandle {
    quit_tx: Sender<()>,
    ended_rx: Receiver<()>,
    stats: Arc<PipelineStats>,
}

impl PipelineHandle {
    /// Ask the worker to stop and wait for its acknowledgement.
    /// Returns false if the worker did not confirm within `timeout`.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let _ = self.quit_tx.try_send(());
        self.ended_rx.recv_timeout(timeout).is_ok()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }
}

/// A fully wired pipeline, ready to be split across threads: the ports
/// move into the device callbacks, the worker onto its own thread, and
/// the handle stays with the owner.
pub struct Pipeline {
    pub capture: CapturePort,
    pub playback: PlaybackPort,
    pub worker: Worker,
    pub handle: PipelineHandle,
}

impl Pipeline {
    pub fn new(shifter: PitchShifter) -> Self {
        let bytes_per_frame = shifter.config().bytes_per_frame();
        let (record_prod, record_cons) = HeapRb::<u8>::new(RING_FRAMES * bytes_per_frame).split();
        let (play_prod, play_cons) = HeapRb::<u8>::new(RING_FRAMES * bytes_per_frame).split();
        let (wake_tx, wake_rx) = bounded(1);
        let (quit_tx, quit_rx) = bounded(1);
        let (ended_tx, ended_rx) = bounded(1);
        let stats = Arc::new(PipelineStats::default());

        Self {
            capture: CapturePort {
                record: record_prod,
                wake_tx,
                bytes_per_frame,
                stats: stats.clone(),
            },
            playback: PlaybackPort {
                play: play_cons,
                stats: stats.clone(),
            },
            worker: Worker {
                shifter,
                record: record_cons,
                play: play_prod,
                wake_rx,
                quit_rx,
                ended_tx,
                input_block: vec![0u8; bytes_per_frame],
                output_block: vec![0u8; bytes_per_frame],
                bytes_per_frame,
                stats: stats.clone(),
            },
            handle: PipelineHandle {
                quit_tx,
                ended_rx,
                stats,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SampleFormat, ShiftConfig};
    use crate::params::ShiftParams;
    use std::thread;

    fn test_pipeline() -> Pipeline {
        let config = ShiftConfig::new(256, 4, 44100.0, SampleFormat::F32Le, 1).unwrap();
        let shifter = PitchShifter::new(config, Arc::new(ShiftParams::default()));
        Pipeline::new(shifter)
    }

    fn tone_frame(bytes_per_frame: usize, seed: u8) -> Vec<u8> {
        (0..bytes_per_frame).map(|i| (i as u8).wrapping_mul(seed)).collect()
    }

    #[test]
    fn test_one_output_frame_per_input_frame() {
        let Pipeline {
            mut capture,
            playback,
            mut worker,
            handle,
        } = test_pipeline();
        let bpf = capture.bytes_per_frame;

        for n in 1..=4u64 {
            capture.push(&vec![0u8; bpf]);
            worker.drain_ready();
            assert_eq!(playback.available(), n as usize * bpf);
        }
        assert_eq!(handle.stats().discarded_frames(), 0);
    }

    #[test]
    fn test_overrun_discards_all_but_newest_frame() {
        let Pipeline {
            mut capture,
            playback,
            mut worker,
            handle,
        } = test_pipeline();
        let bpf = capture.bytes_per_frame;

        // Worker stalled while four frames of distinct tones arrive
        for seed in 1..=4 {
            capture.push(&tone_frame(bpf, seed));
        }
        worker.drain_ready();

        assert_eq!(handle.stats().discarded_frames(), 3);
        assert_eq!(playback.available(), bpf);
    }

    #[test]
    fn test_partial_frame_is_not_processed() {
        let Pipeline {
            mut capture,
            playback,
            mut worker,
            ..
        } = test_pipeline();
        let bpf = capture.bytes_per_frame;

        capture.push(&vec![0u8; bpf / 2]);
        worker.drain_ready();
        assert_eq!(playback.available(), 0);

        capture.push(&vec![0u8; bpf / 2]);
        worker.drain_ready();
        assert_eq!(playback.available(), bpf);
    }

    #[test]
    fn test_underrun_fills_silence_and_counts() {
        let Pipeline {
            mut playback,
            handle,
            ..
        } = test_pipeline();

        let mut out = vec![0xffu8; 512];
        playback.fill(&mut out);
        assert!(out.iter().all(|&b| b == 0));
        assert_eq!(handle.stats().underruns(), 1);
    }

    #[test]
    fn test_silence_roundtrip_through_worker() {
        let Pipeline {
            mut capture,
            mut playback,
            mut worker,
            ..
        } = test_pipeline();
        let bpf = capture.bytes_per_frame;

        for _ in 0..4 {
            capture.push(&vec![0u8; bpf]);
        }
        // Frames pushed one batch: three discarded, then three more clean
        worker.drain_ready();
        for _ in 0..3 {
            capture.push(&vec![0u8; bpf]);
            worker.drain_ready();
        }

        let mut out = vec![0xffu8; 4 * bpf];
        playback.fill(&mut out);
        // Silence in, silence out (f32 zero bit pattern is all zeroes)
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_threaded_run_and_quit() {
        let Pipeline {
            mut capture,
            mut playback,
            worker,
            handle,
        } = test_pipeline();
        let bpf = capture.bytes_per_frame;

        let join = thread::spawn(move || worker.run());

        capture.push(&tone_frame(bpf, 3));
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while playback.available() < bpf {
            assert!(std::time::Instant::now() < deadline, "worker never produced");
            thread::sleep(Duration::from_millis(1));
        }

        assert!(handle.shutdown(Duration::from_secs(5)));
        join.join().unwrap();
    }

    #[test]
    fn test_worker_exits_when_capture_side_drops() {
        let Pipeline {
            capture,
            worker,
            handle,
            ..
        } = test_pipeline();

        let join = thread::spawn(move || worker.run());
        // Dropping the capture port disconnects the wake channel
        drop(capture);

        assert!(handle.shutdown(Duration::from_secs(5)));
        join.join().unwrap();
    }
}
