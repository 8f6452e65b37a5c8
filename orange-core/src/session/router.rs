//! Inbound control dispatch.
//!
//! Each decoded message lands on a typed channel. Observers subscribe to
//! the channels they care about; dispatch never waits on them.

use bytes::Bytes;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace};

use crate::protocol::envelope::{CODE_EVICTED, ControlMessage, Device, Inbound, WorkflowItem};

/// Start/stop requests for the local screen stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    Start { viewer_sn: String },
    Stop,
}

/// Observer channels fed by the session's reader.
pub struct Router {
    soft_offline: watch::Sender<bool>,
    devices: watch::Sender<Vec<Device>>,
    workflows: watch::Sender<Vec<WorkflowItem>>,
    password: watch::Sender<Option<String>>,
    viewer: watch::Sender<Option<String>>,
    stream: broadcast::Sender<StreamSignal>,
    binary: broadcast::Sender<Bytes>,
}

impl Router {
    pub fn new(binary_capacity: usize) -> Self {
        let (stream, _) = broadcast::channel(16);
        let (binary, _) = broadcast::channel(binary_capacity.max(1));
        Self {
            soft_offline: watch::channel(false).0,
            devices: watch::channel(Vec::new()).0,
            workflows: watch::channel(Vec::new()).0,
            password: watch::channel(None).0,
            viewer: watch::channel(None).0,
            stream,
            binary,
        }
    }

    /// Decode and dispatch one text frame.
    ///
    /// An eviction code sets the soft-offline flag and stops there; the
    /// registration acknowledgment clears it. Unparseable frames are dropped.
    pub fn dispatch_text(&self, text: &str) {
        let inbound = match Inbound::parse(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                debug!("dropping control frame: {e}");
                return;
            }
        };

        if inbound.code == Some(CODE_EVICTED) {
            info!("evicted by server, marking soft offline");
            self.soft_offline.send_replace(true);
            return;
        }
        if inbound.is_registration_ack() && self.soft_offline.send_replace(false) {
            info!("registration acknowledged, back online");
        }

        let Some(message) = inbound.message else {
            debug!("dropping control frame without action");
            return;
        };
        self.dispatch(message);
    }

    /// Route an already decoded message.
    pub fn dispatch(&self, message: ControlMessage) {
        match message {
            ControlMessage::Workflows(items) => {
                debug!(count = items.len(), "workflow list updated");
                self.workflows.send_replace(items);
            }
            ControlMessage::Devices(devices) => {
                debug!(count = devices.len(), "device list updated");
                self.devices.send_replace(devices);
            }
            ControlMessage::DevicePassword(password) => {
                self.password.send_replace(Some(password));
            }
            ControlMessage::StartStream { viewer_sn } => {
                info!(viewer_sn, "stream requested");
                self.viewer.send_replace(Some(viewer_sn.clone()));
                let _ = self.stream.send(StreamSignal::Start { viewer_sn });
            }
            ControlMessage::StopStream => {
                info!("stream stopped");
                self.viewer.send_replace(None);
                let _ = self.stream.send(StreamSignal::Stop);
            }
            ControlMessage::Registered => {}
            ControlMessage::Unknown(action) => debug!(action, "unhandled action"),
        }
    }

    /// Fan a binary frame out to media subscribers.
    pub fn dispatch_binary(&self, data: Bytes) {
        if self.binary.send(data).is_err() {
            trace!("binary frame with no subscribers");
        }
    }

    /// Empty the device and workflow lists and reset the soft-offline flag.
    pub fn clear(&self) {
        self.devices.send_replace(Vec::new());
        self.workflows.send_replace(Vec::new());
        self.soft_offline.send_replace(false);
    }

    pub fn is_soft_offline(&self) -> bool {
        *self.soft_offline.borrow()
    }

    /// Viewer named by the latest `start_stream`, until `stop_stream`.
    pub fn current_viewer(&self) -> Option<String> {
        self.viewer.borrow().clone()
    }

    // ── Subscriptions ────────────────────────────────────────────

    pub fn soft_offline(&self) -> watch::Receiver<bool> {
        self.soft_offline.subscribe()
    }

    pub fn devices(&self) -> watch::Receiver<Vec<Device>> {
        self.devices.subscribe()
    }

    pub fn workflows(&self) -> watch::Receiver<Vec<WorkflowItem>> {
        self.workflows.subscribe()
    }

    pub fn password(&self) -> watch::Receiver<Option<String>> {
        self.password.subscribe()
    }

    pub fn stream_signals(&self) -> broadcast::Receiver<StreamSignal> {
        self.stream.subscribe()
    }

    pub fn binary_frames(&self) -> broadcast::Receiver<Bytes> {
        self.binary.subscribe()
    }
}

// ── Tests ────────────────────────────────────────────────────────
