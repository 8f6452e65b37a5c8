//! # orange-core
//!
//! Transport and media-framing core for the orange remote-control client.
//!
//! This crate contains:
//! - **Network**: candidate racing (`Prober`), address normalization, the
//!   websocket `Link`, and one-shot device provisioning
//! - **Session**: `Session`, the long-lived relay connection with
//!   registration, heartbeat, automatic reconnect and soft-offline handling
//! - **State**: the `ConnectionState` machine with validated transitions
//! - **Protocol**: inbound `ControlMessage` decoding and outbound envelope
//!   builders, including remote input commands
//! - **Media**: 0xAA packet framing, Annex B splitting, the decode
//!   controller around a `VideoDecoder`, and the publisher/viewer loops
//! - **Task**: `TaskGroup` for loops sharing a cancellation token
//! - **Error**: `OrangeError`, typed and `thiserror`-based

pub mod error;
pub mod media;
pub mod network;
pub mod protocol;
pub mod session;
pub mod state;
pub mod task;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use error::{EncodingError, OrangeError};
pub use media::{
    DecodeSession, Depacketizer, FrameHeader, FrameStats, NalKind, NalUnit, PacketType, Sample,
    StreamPublisher, StreamViewer, VideoDecoder, packetize,
};
pub use network::{HttpProbe, Probe, Prober, provision};
pub use protocol::{ClientIdentity, ControlMessage, Device, RemoteCommand, RemoteScreen, SystemKey, WorkflowItem};
pub use session::{Session, SessionConfig, SessionInfo, StreamSignal};
pub use state::{ConnectionState, StateChange};
pub use task::TaskGroup;
