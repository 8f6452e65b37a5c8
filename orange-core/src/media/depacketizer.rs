//! Receive direction: binary media packets → classified NAL units.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::media::codec::{DEFAULT_MAX_PENDING, NaluSplitter};
use crate::media::header::FrameHeader;
use crate::media::nal::NalUnit;

/// Strips packet headers and reassembles the Annex B stream they carry.
///
/// Malformed packets are dropped silently; units of a type the client
/// does not act on are dropped after splitting.
#[derive(Debug)]
pub struct Depacketizer {
    accumulator: BytesMut,
    splitter: NaluSplitter,
    dropped_packets: u64,
}

impl Depacketizer {
    pub fn new() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING)
    }

    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            accumulator: BytesMut::new(),
            splitter: NaluSplitter::with_max_pending(max_pending),
            dropped_packets: 0,
        }
    }

    /// Feed one inbound packet; returns every unit it completed.
    pub fn ingest(&mut self, packet: &[u8]) -> Vec<NalUnit> {
        let Some((header, payload)) = FrameHeader::decode(packet) else {
            self.dropped_packets += 1;
            debug!(len = packet.len(), "dropping malformed media packet");
            return Vec::new();
        };
        trace!(identity = %header.identity, len = payload.len(), "media packet");
        self.push_stream(payload)
    }

    /// Feed raw Annex B bytes that arrived without a packet header.
    pub fn push_stream(&mut self, bytes: &[u8]) -> Vec<NalUnit> {
        self.accumulator.extend_from_slice(bytes);

        let mut units = Vec::new();
        // The splitter never fails; an error here would be a bug in it.
        while let Ok(Some(raw)) = self.splitter.decode(&mut self.accumulator) {
            match NalUnit::classify(raw) {
                Some(unit) => units.push(unit),
                None => trace!("dropping unhandled NAL unit"),
            }
        }
        units
    }

    /// Bytes currently held waiting for the next boundary.
    pub fn pending(&self) -> usize {
        self.accumulator.len()
    }

    pub fn dropped_packets(&self) -> u64 {
        self.dropped_packets
    }

    pub fn resyncs(&self) -> u64 {
        self.splitter.resyncs()
    }

    /// Drop all buffered bytes, e.g. when a stream stops.
    pub fn reset(&mut self) {
        self.accumulator.clear();
        self.splitter.reset();
    }
}

impl Default for Depacketizer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::header::{PacketType, packetize};
    use crate::media::nal::NalKind;

    /// SPS, PPS, IDR, P, P, followed by an AUD so the final P is closed.
    fn sample_stream() -> Vec<u8> {
        let mut s = Vec::new();
        s.extend_from_slice(&[0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1F]);
        s.extend_from_slice(&[0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80]);
        s.extend_from_slice(&[0, 0, 1, 0x65, 0x88, 0x84, 0x00, 0x00, 0x03, 0x01]);
        s.extend_from_slice(&[0, 0, 0, 1, 0x41, 0x9A, 0x00]);
        s.extend_from_slice(&[0, 0, 1, 0x41, 0x9B, 0x02]);
        s.extend_from_slice(&[0, 0, 0, 1, 0x09, 0xF0]);
        s
    }

    #[test]
    fn round_trip_through_packet() {
        let payload = [0, 0, 0, 1, 0x65, 0xAA, 0xBB, 0, 0, 0, 1, 0x09];
        let pkt = packetize("dev-1", PacketType::Video, &payload).unwrap();

        let (header, body) = FrameHeader::decode(&pkt).unwrap();
        assert_eq!(header.identity, "dev-1");
        assert_eq!(body, &payload);

        let mut depack = Depacketizer::new();
        let units = depack.ingest(&pkt);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].kind, NalKind::Key);
        assert_eq!(&units[0].data[..], &[0x65, 0xAA, 0xBB]);
    }

    #[test]
    fn classifies_full_sequence() {
        let mut depack = Depacketizer::new();
        let kinds: Vec<NalKind> = depack
            .push_stream(&sample_stream())
            .into_iter()
            .map(|u| u.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                NalKind::PrimaryParameter,
                NalKind::SecondaryParameter,
                NalKind::Key,
                NalKind::Delta,
                NalKind::Delta,
            ]
        );
    }

    #[test]
    fn chunking_does_not_change_output() {
        let stream = sample_stream();

        let mut whole = Depacketizer::new();
        let expected = whole.push_stream(&stream);

        for chunk_size in 1..=stream.len() {
            let mut depack = Depacketizer::new();
            let mut got = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                got.extend(depack.push_stream(chunk));
            }
            assert_eq!(got, expected, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn chunking_survives_overflow_discard() {
        let mut stream = vec![0x55; 1_000];
        stream.extend_from_slice(&[0, 0, 1, 0x65, 7, 0, 0, 1, 0x41]);

        let mut whole = Depacketizer::with_max_pending(1_000);
        let expected = whole.push_stream(&stream);
        assert_eq!(expected.len(), 1);
        assert_eq!(expected[0].kind, NalKind::Key);

        for split in 1..stream.len() {
            let mut depack = Depacketizer::with_max_pending(1_000);
            let mut got = depack.push_stream(&stream[..split]);
            got.extend(depack.push_stream(&stream[split..]));
            assert_eq!(got, expected, "split at {split}");
        }
    }

    #[test]
    fn chunking_across_packets() {
        let stream = sample_stream();
        let mut whole = Depacketizer::new();
        let expected = whole.push_stream(&stream);

        let mut depack = Depacketizer::new();
        let mut got = Vec::new();
        for byte in &stream {
            let pkt = packetize("viewer", PacketType::Video, std::slice::from_ref(byte)).unwrap();
            got.extend(depack.ingest(&pkt));
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn malformed_packets_dropped() {
        let mut depack = Depacketizer::new();
        assert!(depack.ingest(&[0xAA, 0x02]).is_empty());
        assert!(depack.ingest(&[0x00, 0x02, 0, 0, 0, 1, 0x65]).is_empty());
        assert_eq!(depack.dropped_packets(), 2);
        assert_eq!(depack.pending(), 0);
    }

    #[test]
    fn unknown_units_dropped() {
        let mut depack = Depacketizer::new();
        let units = depack.push_stream(&[0, 0, 1, 0x06, 5, 0, 0, 1, 0x41, 1, 0, 0, 1, 0x09]);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].kind, NalKind::Delta);
    }

    #[test]
    fn overflow_clears_accumulator() {
        let mut depack = Depacketizer::with_max_pending(1_000);
        for _ in 0..11 {
            depack.push_stream(&[0x55; 100]);
        }
        assert_eq!(depack.pending(), 0);
        assert_eq!(depack.resyncs(), 1);

        // A fresh stream decodes normally after the reset.
        let units = depack.push_stream(&[0, 0, 1, 0x65, 1, 0, 0, 1, 0x09]);
        assert_eq!(units.len(), 1);
    }

    #[test]
    fn overflow_after_start_code_is_bounded() {
        let mut depack = Depacketizer::with_max_pending(1_000);
        assert!(depack.push_stream(&[0, 0, 1, 0x65]).is_empty());
        for _ in 0..100 {
            assert!(depack.push_stream(&[0x55; 100]).is_empty());
            assert!(depack.pending() <= 1_100);
        }
        assert!(depack.resyncs() >= 1);

        // The oversized key unit is gone; the next stream starts clean.
        let units = depack.push_stream(&[0, 0, 1, 0x41, 1, 0, 0, 1, 0x09]);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].kind, NalKind::Delta);
        assert_eq!(&units[0].data[..], &[0x41, 1]);
    }

    #[test]
    fn retains_only_from_last_boundary() {
        let mut depack = Depacketizer::new();
        depack.push_stream(&[7, 7, 0, 0, 1, 0x41, 1, 2, 0, 0, 1, 0x41, 3]);
        assert_eq!(depack.pending(), 5);
    }
}
