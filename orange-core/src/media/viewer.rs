//! Receive loop for a remote screen.
//!
//! Reads the session's binary frames, depacketizes them, feeds the
//! decode controller, and publishes statistics on a `watch` channel so a
//! display layer can poll them without blocking the loop.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::media::decoder::{DecodeSession, VideoDecoder};
use crate::media::depacketizer::Depacketizer;
use crate::session::{Session, StreamSignal};

// ── FrameStats ───────────────────────────────────────────────────

/// Running statistics for one viewer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Smoothed pictures per second.
    pub fps: f64,
    /// Pictures handed to the decoder.
    pub total_frames: u64,
    /// Packet bytes received.
    pub total_bytes: u64,
    /// Packets dropped as malformed.
    pub dropped_packets: u64,
    /// Buffer resets after an overflow.
    pub resyncs: u64,
    /// Whether the decoder has a configuration.
    pub configured: bool,
}

// ── StreamViewer ─────────────────────────────────────────────────

pub struct StreamViewer<D: VideoDecoder> {
    frames: broadcast::Receiver<Bytes>,
    signals: broadcast::Receiver<StreamSignal>,
    depacketizer: Depacketizer,
    decode: DecodeSession<D>,
    stop: CancellationToken,
    stats_tx: watch::Sender<FrameStats>,
    stats_rx: watch::Receiver<FrameStats>,
}

impl<D: VideoDecoder> StreamViewer<D> {
    /// Subscribe to `session`'s binary frames and stream signals.
    pub fn new(session: &Session, decoder: D, max_pending: usize) -> Self {
        Self::from_channels(
            session.binary_frames(),
            session.stream_signals(),
            decoder,
            max_pending,
        )
    }

    /// Build from raw channels; the loop ends when `frames` closes.
    pub fn from_channels(
        frames: broadcast::Receiver<Bytes>,
        signals: broadcast::Receiver<StreamSignal>,
        decoder: D,
        max_pending: usize,
    ) -> Self {
        let (stats_tx, stats_rx) = watch::channel(FrameStats::default());
        Self {
            frames,
            signals,
            depacketizer: Depacketizer::with_max_pending(max_pending),
            decode: DecodeSession::new(decoder),
            stop: CancellationToken::new(),
            stats_tx,
            stats_rx,
        }
    }

    pub fn stats_receiver(&self) -> watch::Receiver<FrameStats> {
        self.stats_rx.clone()
    }

    /// Cancelling this token ends [`run`](Self::run).
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Run until stopped or the session goes away. Returns the decode
    /// controller so the caller can inspect or reuse the decoder.
    pub async fn run(mut self) -> DecodeSession<D> {
        let mut fps = FpsMeter::new();
        let mut stats = FrameStats::default();
        let mut signals_open = true;

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                frame = self.frames.recv() => match frame {
                    Ok(packet) => {
                        stats.total_bytes += packet.len() as u64;
                        let before = self.decode.stats().submitted;
                        for unit in self.depacketizer.ingest(&packet) {
                            self.decode.handle(unit);
                        }
                        let submitted = self.decode.stats().submitted;
                        for _ in before..submitted {
                            fps.tick();
                        }
                        stats.total_frames = submitted;
                        stats.fps = fps.fps();
                        stats.dropped_packets = self.depacketizer.dropped_packets();
                        stats.resyncs = self.depacketizer.resyncs();
                        stats.configured = self.decode.is_configured();
                        self.stats_tx.send_replace(stats.clone());
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "viewer fell behind, packets skipped");
                    }
                    Err(RecvError::Closed) => break,
                },
                signal = self.signals.recv(), if signals_open => match signal {
                    Ok(StreamSignal::Stop) => {
                        info!("stream stopped, decoder reset");
                        self.depacketizer.reset();
                        self.decode.reset();
                        stats.configured = false;
                        self.stats_tx.send_replace(stats.clone());
                    }
                    Ok(StreamSignal::Start { .. }) => {}
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => signals_open = false,
                },
            }
        }

        debug!(frames = stats.total_frames, "viewer loop ended");
        self.decode
    }
}

// ── FpsMeter ─────────────────────────────────────────────────────

/// Average over the last 60 picture intervals.
struct FpsMeter {
    samples: VecDeque<Duration>,
    last: Option<Instant>,
}

impl FpsMeter {
    const WINDOW: usize = 60;

    fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(Self::WINDOW),
            last: None,
        }
    }

    fn tick(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last {
            if self.samples.len() == Self::WINDOW {
                self.samples.pop_front();
            }
            self.samples.push_back(now.duration_since(last));
        }
        self.last = Some(now);
    }

    fn fps(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let avg = self.samples.iter().map(Duration::as_secs_f64).sum::<f64>()
            / self.samples.len() as f64;
        if avg > 0.0 { 1.0 / avg } else { 0.0 }
    }
}

// ── Tests ────────────────────────────────────────────────────────
