//! Control-plane wire shapes.
//!
//! # Wire Protocol
//!
//! All control traffic is JSON text frames on the session websocket.
//!
//! ## Session
//! ```text
//! Client ──[register]────────────────────────► Server
//! Server ──[register, code 200]──────────────► Client   (ack)
//! Client ──[heartbeat]───────────────────────► Server   (every 3 s)
//! Server ──[code 503]────────────────────────► Client   (evicted)
//! ```
//!
//! ## Devices and streaming
//! ```text
//! Client ──[get_device_list]─────────────────► Server
//! Server ──[device_list]─────────────────────► Client
//! Client ──[start_stream {device_sn, viewer_sn}]► Server
//! Server ──[start_stream {viewer_sn}]────────► Device
//! Device ──[binary 0xAA packets]─────────────► Viewer
//! ```

pub mod envelope;
pub mod outbound;

pub use envelope::{CODE_EVICTED, CODE_OK, ControlMessage, Device, Inbound, WorkflowItem};
pub use outbound::{ClientIdentity, RemoteCommand, RemoteScreen, SystemKey};
