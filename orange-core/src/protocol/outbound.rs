//! Outbound control envelopes.
//!
//! Every message the client sends is built here so the wire shapes live
//! in one place. Builders return `serde_json::Value`; the session
//! serializes them onto the socket.

use serde_json::{Value, json};
use uuid::Uuid;

// ── ClientIdentity ───────────────────────────────────────────────

/// Who this client is, as announced to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Stable device serial number.
    pub sn: String,
    /// User token, also carried as the `token` query parameter.
    pub token: String,
    /// Human-readable device model.
    pub model: String,
    /// Client platform tag.
    pub client_type: String,
    /// Declared role in the cluster.
    pub role: String,
}

impl ClientIdentity {
    pub fn new(sn: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            sn: sn.into(),
            token: token.into(),
            model: "orange-client".into(),
            client_type: "desktop".into(),
            role: "client".into(),
        }
    }

    /// Fresh random identity: hyphenated serial, compact token.
    pub fn generate() -> Self {
        Self::new(
            Uuid::new_v4().to_string().to_uppercase(),
            Uuid::new_v4().simple().to_string(),
        )
    }
}

// ── Session envelopes ────────────────────────────────────────────

/// Registration sent immediately after the socket opens.
pub fn register(identity: &ClientIdentity) -> Value {
    json!({
        "action": "register",
        "req_id": Uuid::new_v4().to_string(),
        "data": {
            "sn": identity.sn,
            "type": identity.client_type,
            "role": identity.role,
            "model": identity.model,
            "token": identity.token,
        }
    })
}

/// Application-level keepalive.
pub fn heartbeat(identity: &ClientIdentity) -> Value {
    json!({
        "action": "heartbeat",
        "data": { "sn": identity.sn }
    })
}

/// One-shot command that points a fresh device at its cluster.
pub fn join_cluster(token: &str, master_url: &str) -> Value {
    json!({
        "action": "join_cluster",
        "req": Uuid::new_v4().to_string(),
        "data": {
            "token": token,
            "target_urls": [master_url],
        }
    })
}

// ── Device management ────────────────────────────────────────────

pub fn get_device_list() -> Value {
    json!({ "action": "get_device_list" })
}

pub fn get_device_password(sn: &str) -> Value {
    json!({ "action": "get_device_password", "data": { "sn": sn } })
}

pub fn set_device_password(sn: &str, password: &str) -> Value {
    json!({
        "action": "set_device_password",
        "data": { "sn": sn, "password": password }
    })
}

/// Ask `device_sn` to stream its screen to `viewer_sn`.
pub fn start_stream(device_sn: &str, viewer_sn: &str) -> Value {
    json!({
        "action": "start_stream",
        "data": { "device_sn": device_sn, "viewer_sn": viewer_sn }
    })
}

pub fn stop_stream() -> Value {
    json!({ "action": "stop_stream" })
}

// ── Remote control ───────────────────────────────────────────────

/// Swipe duration the device side expects, in milliseconds.
pub const SWIPE_DURATION_MS: u32 = 300;

/// Pixel size of the controlled screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteScreen {
    pub width: f64,
    pub height: f64,
}

impl Default for RemoteScreen {
    fn default() -> Self {
        Self {
            width: 1080.0,
            height: 2400.0,
        }
    }
}

impl RemoteScreen {
    /// Map a normalized point (0..=1 on each axis) to device pixels.
    pub fn to_absolute(&self, x: f64, y: f64) -> (i64, i64) {
        ((x * self.width) as i64, (y * self.height) as i64)
    }
}

/// System keys the device understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemKey {
    Home,
    Back,
    AppSwitch,
}

impl SystemKey {
    pub fn as_str(self) -> &'static str {
        match self {
            SystemKey::Home => "home",
            SystemKey::Back => "back",
            SystemKey::AppSwitch => "app_switch",
        }
    }
}

/// An input event aimed at a remote device. Coordinates are normalized.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCommand {
    Tap { x: f64, y: f64 },
    Swipe { from: (f64, f64), to: (f64, f64) },
    Text(String),
    Key(SystemKey),
}

impl RemoteCommand {
    /// Build the `device/control` envelope for `device_sn`.
    pub fn to_envelope(&self, device_sn: &str, screen: &RemoteScreen) -> Value {
        let mut inner = match self {
            RemoteCommand::Tap { x, y } => {
                let (x, y) = screen.to_absolute(*x, *y);
                json!({ "action": "click", "x": x, "y": y })
            }
            RemoteCommand::Swipe { from, to } => {
                let (x1, y1) = screen.to_absolute(from.0, from.1);
                let (x2, y2) = screen.to_absolute(to.0, to.1);
                json!({
                    "action": "swipe",
                    "x1": x1, "y1": y1,
                    "x2": x2, "y2": y2,
                    "duration": SWIPE_DURATION_MS,
                })
            }
            RemoteCommand::Text(text) => json!({ "action": "text", "text": text }),
            RemoteCommand::Key(key) => json!({ "action": "keyevent", "keyevent": key.as_str() }),
        };
        inner["target_sn"] = json!(device_sn);

        json!({
            "action": "device/control",
            "device_sn": device_sn,
            "data": {
                "target_sn": device_sn,
                "data": inner,
            }
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
