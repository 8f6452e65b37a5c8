//! Inbound control envelopes.
//!
//! Server messages are JSON objects shaped like
//! `{"action": "...", "code": 200, "data": ...}`. They are decoded once
//! into [`Inbound`]: the optional status code plus a [`ControlMessage`]
//! whose variants cover every action this client reacts to.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OrangeError;

/// Status code the server sends when it has evicted this client.
pub const CODE_EVICTED: i64 = 503;

/// Status code acknowledging a successful request.
pub const CODE_OK: i64 = 200;

// ── Payload types ────────────────────────────────────────────────

/// A device known to the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub sn: String,
    pub model: String,
    #[serde(default = "Device::default_status")]
    pub status: String,
}

impl Device {
    fn default_status() -> String {
        "offline".into()
    }

    pub fn is_online(&self) -> bool {
        self.status == "online"
    }
}

/// A dashboard workflow entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowItem {
    pub id: String,
    pub name: String,
    pub icon: String,
    #[serde(default)]
    pub color: Option<String>,
}

// ── ControlMessage ───────────────────────────────────────────────

/// Every inbound action, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// `app_graph/list`
    Workflows(Vec<WorkflowItem>),
    /// `device_list` or `get_device_list`
    Devices(Vec<Device>),
    /// `get_device_password`
    DevicePassword(String),
    /// `start_stream`: begin sending video to `viewer_sn`.
    StartStream { viewer_sn: String },
    /// `stop_stream`
    StopStream,
    /// `register` (acknowledgment of our registration)
    Registered,
    /// An action this client does not handle, or one whose payload was
    /// missing required fields.
    Unknown(String),
}

impl ControlMessage {
    /// Map an action and its `data` onto a variant.
    pub fn from_parts(action: &str, data: Value) -> Self {
        match action {
            "app_graph/list" => ControlMessage::Workflows(lenient_list(data)),
            "device_list" | "get_device_list" => ControlMessage::Devices(lenient_list(data)),
            "get_device_password" => match string_field(&data, "password") {
                Some(password) => ControlMessage::DevicePassword(password),
                None => ControlMessage::Unknown(action.to_string()),
            },
            "start_stream" => match string_field(&data, "viewer_sn") {
                Some(viewer_sn) => ControlMessage::StartStream { viewer_sn },
                None => ControlMessage::Unknown(action.to_string()),
            },
            "stop_stream" => ControlMessage::StopStream,
            "register" => ControlMessage::Registered,
            other => ControlMessage::Unknown(other.to_string()),
        }
    }
}

// ── Inbound ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    action: Value,
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    data: Value,
}

/// A decoded server message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Numeric status code, if the server sent one.
    pub code: Option<i64>,
    /// `None` when the envelope carried no usable `action`.
    pub message: Option<ControlMessage>,
}

impl Inbound {
    /// Decode a text frame. Fails only when the text is not a JSON object.
    pub fn parse(text: &str) -> Result<Self, OrangeError> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(OrangeError::MalformedEnvelope("not a JSON object"));
        }
        let raw: RawEnvelope = serde_json::from_value(value)?;
        let code = raw.code.as_ref().and_then(Value::as_i64);
        let message = raw
            .action
            .as_str()
            .map(|action| ControlMessage::from_parts(action, raw.data));
        Ok(Self { code, message })
    }

    /// Whether this is the registration acknowledgment.
    pub fn is_registration_ack(&self) -> bool {
        self.code == Some(CODE_OK) && matches!(self.message, Some(ControlMessage::Registered))
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Decode a JSON array, skipping entries that do not fit `T`.
fn lenient_list<T: for<'de> Deserialize<'de>>(data: Value) -> Vec<T> {
    match data {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    }
}

fn string_field(data: &Value, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_owned)
}

// ── Tests ────────────────────────────────────────────────────────
