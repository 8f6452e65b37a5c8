//! H.264 NAL unit helpers: start-code search, classification, and
//! conversion between Annex B (start codes) and AVCC (length prefixes).

use bytes::{BufMut, Bytes, BytesMut};

/// 4-byte Annex B start code.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Width of the AVCC length prefix used by both directions.
pub const LENGTH_PREFIX_SIZE: usize = 4;

// ── NalKind ──────────────────────────────────────────────────────

/// The unit types this client acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalKind {
    /// Sequence parameter set (type 7).
    PrimaryParameter,
    /// Picture parameter set (type 8).
    SecondaryParameter,
    /// IDR slice (type 5).
    Key,
    /// Non-IDR slice (type 1).
    Delta,
}

impl NalKind {
    /// Classify by the `nal_unit_type` in the low five bits of the first
    /// byte. Unrecognized types yield `None`.
    pub fn classify(first_byte: u8) -> Option<Self> {
        match first_byte & 0x1F {
            7 => Some(NalKind::PrimaryParameter),
            8 => Some(NalKind::SecondaryParameter),
            5 => Some(NalKind::Key),
            1 => Some(NalKind::Delta),
            _ => None,
        }
    }

    pub fn is_picture(self) -> bool {
        matches!(self, NalKind::Key | NalKind::Delta)
    }
}

// ── NalUnit ──────────────────────────────────────────────────────

/// One classified NAL unit, without its start code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    pub kind: NalKind,
    pub data: Bytes,
}

impl NalUnit {
    /// Classify raw unit bytes. Empty or unrecognized units yield `None`.
    pub fn classify(data: Bytes) -> Option<Self> {
        let kind = NalKind::classify(*data.first()?)?;
        Some(Self { kind, data })
    }

    /// The unit wrapped with a 4-byte big-endian length, the framing the
    /// codec collaborator consumes.
    pub fn length_prefixed(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + self.data.len());
        buf.put_u32(self.data.len() as u32);
        buf.put_slice(&self.data);
        buf.freeze()
    }
}

// ── Start codes ──────────────────────────────────────────────────

/// Find the next start code at or after `from`.
///
/// Returns `(position, code_len)`. Only positions `p` with `p + 3 < len`
/// are examined, so a start code straddling the end of `buf` is left for
/// a later search once more bytes have arrived.
pub fn find_start_code(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut p = from;
    while p + 3 < buf.len() {
        if buf[p] == 0 && buf[p + 1] == 0 {
            if buf[p + 2] == 1 {
                return Some((p, 3));
            }
            if buf[p + 2] == 0 && buf[p + 3] == 1 {
                return Some((p, 4));
            }
        }
        p += 1;
    }
    None
}

// ── AVCC → Annex B ───────────────────────────────────────────────

/// Split an AVCC access unit (repeated `u32` length + unit) into Annex B
/// units, each prefixed with a 4-byte start code.
///
/// A truncated trailing length or unit ends the split.
pub fn avcc_to_annexb(sample: &[u8]) -> Vec<Bytes> {
    let mut units = Vec::new();
    let mut offset = 0;
    while offset + LENGTH_PREFIX_SIZE <= sample.len() {
        let len = u32::from_be_bytes([
            sample[offset],
            sample[offset + 1],
            sample[offset + 2],
            sample[offset + 3],
        ]) as usize;
        let start = offset + LENGTH_PREFIX_SIZE;
        let Some(end) = start.checked_add(len).filter(|&end| end <= sample.len()) else {
            break;
        };
        let mut unit = BytesMut::with_capacity(START_CODE.len() + len);
        unit.put_slice(&START_CODE);
        unit.put_slice(&sample[start..end]);
        units.push(unit.freeze());
        offset = end;
    }
    units
}

// ── Tests ────────────────────────────────────────────────────────
