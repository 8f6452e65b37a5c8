//! Binary media packet framing.
//!
//! Every binary websocket message carrying video is prefixed with a
//! small header that names the recipient device.
//!
//! ## Wire format
//!
//! ```text
//! magic:        u8   (1)   always 0xAA
//! packet_type:  u8   (1)
//! identity_len: u8   (1)
//! identity:     [u8] (identity_len, UTF-8)
//! payload:      [u8] (remainder of the message)
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::EncodingError;

// ── Constants ────────────────────────────────────────────────────

/// Marker byte opening every media packet.
pub const MAGIC: u8 = 0xAA;

/// Longest identity the one-byte length field can describe.
pub const MAX_IDENTITY_LEN: usize = u8::MAX as usize;

// ── PacketType ───────────────────────────────────────────────────

/// Type tag carried in the second header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Annex B H.264 elementary stream bytes.
    Video,
    /// Any tag this client does not produce itself.
    Other(u8),
}

impl From<u8> for PacketType {
    fn from(value: u8) -> Self {
        match value {
            0x02 => PacketType::Video,
            other => PacketType::Other(other),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(value: PacketType) -> Self {
        match value {
            PacketType::Video => 0x02,
            PacketType::Other(tag) => tag,
        }
    }
}

// ── FrameHeader ──────────────────────────────────────────────────

/// Header prefixed to every binary media packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub packet_type: PacketType,
    pub identity: String,
}

impl FrameHeader {
    /// Fixed portion of the header: magic, type, identity length.
    pub const FIXED_SIZE: usize = 3;

    /// Build a header, validating the identity length.
    pub fn new(identity: impl Into<String>, packet_type: PacketType) -> Result<Self, EncodingError> {
        let identity = identity.into();
        if identity.len() > MAX_IDENTITY_LEN {
            return Err(EncodingError::IdentityTooLong {
                len: identity.len(),
                max: MAX_IDENTITY_LEN,
            });
        }
        Ok(Self {
            packet_type,
            identity,
        })
    }

    /// Encoded size on the wire.
    pub fn encoded_len(&self) -> usize {
        Self::FIXED_SIZE + self.identity.len()
    }

    /// Append the encoded header to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_u8(MAGIC);
        dst.put_u8(self.packet_type.into());
        // Length checked in `new`; fields are public so clamp anyway.
        let len = self.identity.len().min(MAX_IDENTITY_LEN);
        dst.put_u8(len as u8);
        dst.put_slice(&self.identity.as_bytes()[..len]);
    }

    /// Split a packet into header and payload.
    ///
    /// Returns `None` for anything that is not a well-formed media
    /// packet: too short, wrong magic, or no payload after the identity.
    pub fn decode(packet: &[u8]) -> Option<(Self, &[u8])> {
        if packet.len() <= Self::FIXED_SIZE || packet[0] != MAGIC {
            return None;
        }
        let identity_len = packet[2] as usize;
        let header_len = Self::FIXED_SIZE + identity_len;
        if packet.len() <= header_len {
            return None;
        }
        let identity = String::from_utf8_lossy(&packet[Self::FIXED_SIZE..header_len]).into_owned();
        let header = Self {
            packet_type: PacketType::from(packet[1]),
            identity,
        };
        Some((header, &packet[header_len..]))
    }
}

// ── Packetizer ───────────────────────────────────────────────────

/// Wrap one compressed unit for transmission to `recipient_id`.
///
/// One call produces exactly one wire packet.
pub fn packetize(
    recipient_id: &str,
    packet_type: PacketType,
    payload: &[u8],
) -> Result<Bytes, EncodingError> {
    let header = FrameHeader::new(recipient_id, packet_type)?;
    let mut buf = BytesMut::with_capacity(header.encoded_len() + payload.len());
    header.encode(&mut buf);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

// ── Tests ────────────────────────────────────────────────────────
