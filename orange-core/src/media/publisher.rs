//! Send direction: encoder output → packets for the current viewer.

use bytes::Bytes;
use tracing::trace;

use crate::error::EncodingError;
use crate::media::header::{PacketType, packetize};
use crate::media::nal::{START_CODE, avcc_to_annexb};
use crate::session::Session;

/// Where published packets go.
pub trait PacketSink {
    /// Identity of the device currently watching, if any.
    fn current_viewer(&self) -> Option<String>;
    /// Queue one packet; `false` when it was dropped.
    fn send_packet(&self, packet: Bytes) -> bool;
}

impl PacketSink for Session {
    fn current_viewer(&self) -> Option<String> {
        Session::current_viewer(self)
    }

    fn send_packet(&self, packet: Bytes) -> bool {
        self.send_binary(packet)
    }
}

/// Packetizes encoded access units for whoever asked to watch.
pub struct StreamPublisher<S: PacketSink> {
    sink: S,
    packets_sent: u64,
}

impl<S: PacketSink> StreamPublisher<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            packets_sent: 0,
        }
    }

    /// Publish one AVCC access unit (4-byte big-endian lengths).
    ///
    /// Each contained unit becomes one packet with a start code. Returns
    /// how many packets were queued; zero when nobody is watching.
    pub fn publish_avcc(&mut self, access_unit: &[u8]) -> Result<usize, EncodingError> {
        let Some(viewer) = self.sink.current_viewer() else {
            trace!("no viewer, access unit skipped");
            return Ok(0);
        };
        let mut sent = 0;
        for unit in avcc_to_annexb(access_unit) {
            if self.send(&viewer, &unit)? {
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Publish parameter sets ahead of a key frame, each as its own packet.
    pub fn publish_parameter_sets(&mut self, sets: &[&[u8]]) -> Result<usize, EncodingError> {
        let Some(viewer) = self.sink.current_viewer() else {
            return Ok(0);
        };
        let mut sent = 0;
        for set in sets {
            let mut unit = Vec::with_capacity(START_CODE.len() + set.len());
            unit.extend_from_slice(&START_CODE);
            unit.extend_from_slice(set);
            if self.send(&viewer, &unit)? {
                sent += 1;
            }
        }
        Ok(sent)
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn send(&mut self, viewer: &str, unit: &[u8]) -> Result<bool, EncodingError> {
        let packet = packetize(viewer, PacketType::Video, unit)?;
        let queued = self.sink.send_packet(packet);
        if queued {
            self.packets_sent += 1;
        }
        Ok(queued)
    }
}

// ── Tests ────────────────────────────────────────────────────────
