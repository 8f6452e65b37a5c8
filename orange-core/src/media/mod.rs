//! H.264 stream framing.
//!
//! Send side: [`publisher`] turns encoder output into packets. Receive
//! side: [`depacketizer`] strips packet headers and splits the Annex B
//! stream with the [`codec`] splitter, [`decoder`] drives the platform
//! codec, and [`viewer`] runs the whole pipeline off a session.

pub mod codec;
pub mod decoder;
pub mod depacketizer;
pub mod header;
pub mod nal;
pub mod publisher;
pub mod viewer;

pub use codec::{DEFAULT_MAX_PENDING, NaluSplitter};
pub use decoder::{DecodeSession, DecodeStats, ParameterSetCache, Sample, VideoDecoder};
pub use depacketizer::Depacketizer;
pub use header::{FrameHeader, MAGIC, MAX_IDENTITY_LEN, PacketType, packetize};
pub use nal::{NalKind, NalUnit, avcc_to_annexb};
pub use publisher::{PacketSink, StreamPublisher};
pub use viewer::{FrameStats, StreamViewer};
