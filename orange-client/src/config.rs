//! Client configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use orange_core::{ClientIdentity, RemoteScreen, SessionConfig};

/// Top-level configuration for the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay candidates.
    pub server: ServerConfig,
    /// Who this client announces itself as.
    pub identity: IdentityConfig,
    /// Session timings.
    pub session: SessionTimings,
    /// Stream reassembly.
    pub media: MediaConfig,
    /// Controlled screen geometry.
    pub remote: RemoteConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Relay candidates, raced on startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Addresses of the same relay. Bare `host:port` gets `ws://`.
    pub candidates: Vec<String>,
}

/// Identity settings. Empty `sn` or `token` are generated at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub sn: String,
    pub token: String,
    pub model: String,
    pub client_type: String,
}

/// Session timings, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTimings {
    pub heartbeat_ms: u64,
    pub reconnect_ms: u64,
    pub connect_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub provision_settle_ms: u64,
    /// Frames queued for the socket writer before sends are dropped.
    pub outbound_queue: usize,
    /// Binary frames buffered per media subscriber.
    pub binary_capacity: usize,
}

/// Stream reassembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Bytes held without a start code before the buffer is discarded.
    pub max_pending_bytes: usize,
}

/// Remote screen size used to scale normalized input coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub width: u32,
    pub height: u32,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; `RUST_LOG` takes precedence.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            candidates: vec!["ws://127.0.0.1:8080/ws".into()],
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            sn: String::new(),
            token: String::new(),
            model: "orange-client".into(),
            client_type: "desktop".into(),
        }
    }
}

impl Default for SessionTimings {
    fn default() -> Self {
        let core = SessionConfig::default();
        Self {
            heartbeat_ms: core.heartbeat_interval.as_millis() as u64,
            reconnect_ms: core.reconnect_delay.as_millis() as u64,
            connect_timeout_ms: core.connect_timeout.as_millis() as u64,
            probe_timeout_ms: core.probe_timeout.as_millis() as u64,
            provision_settle_ms: core.provision_settle.as_millis() as u64,
            outbound_queue: core.outbound_queue,
            binary_capacity: core.binary_capacity,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_pending_bytes: orange_core::media::DEFAULT_MAX_PENDING,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        let screen = RemoteScreen::default();
        Self {
            width: screen.width as u32,
            height: screen.height as u32,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Core session settings.
    pub fn session_config(&self) -> SessionConfig {
        let t = &self.session;
        SessionConfig {
            heartbeat_interval: Duration::from_millis(t.heartbeat_ms),
            reconnect_delay: Duration::from_millis(t.reconnect_ms),
            connect_timeout: Duration::from_millis(t.connect_timeout_ms),
            probe_timeout: Duration::from_millis(t.probe_timeout_ms),
            provision_settle: Duration::from_millis(t.provision_settle_ms),
            outbound_queue: t.outbound_queue,
            binary_capacity: t.binary_capacity,
        }
    }

    /// Identity from config, generating whatever is left empty.
    pub fn identity(&self) -> ClientIdentity {
        let generated = ClientIdentity::generate();
        let pick = |configured: &str, fallback: String| {
            if configured.is_empty() {
                fallback
            } else {
                configured.to_string()
            }
        };
        let mut identity = ClientIdentity::new(
            pick(&self.identity.sn, generated.sn),
            pick(&self.identity.token, generated.token),
        );
        identity.model = self.identity.model.clone();
        identity.client_type = self.identity.client_type.clone();
        identity
    }

    pub fn remote_screen(&self) -> RemoteScreen {
        RemoteScreen {
            width: f64::from(self.remote.width),
            height: f64::from(self.remote.height),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&ClientConfig::default()).unwrap();
        assert!(text.contains("candidates"));
        assert!(text.contains("heartbeat_ms"));
        assert!(text.contains("max_pending_bytes"));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&ClientConfig::default()).unwrap();
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.candidates, vec!["ws://127.0.0.1:8080/ws"]);
        assert_eq!(parsed.session.heartbeat_ms, 3000);
        assert_eq!(parsed.remote.height, 2400);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: ClientConfig = toml::from_str(
            r#"
            [server]
            candidates = ["10.0.0.5:8080/ws", "wss://relay.example.com/ws"]

            [session]
            reconnect_ms = 1500
            "#,
        )
        .unwrap();
        assert_eq!(parsed.server.candidates.len(), 2);
        assert_eq!(parsed.session.reconnect_ms, 1500);
        assert_eq!(parsed.session.heartbeat_ms, 3000);
        assert_eq!(parsed.logging.level, "info");

        let session = parsed.session_config();
        assert_eq!(session.reconnect_delay, Duration::from_millis(1500));
        assert_eq!(session.probe_timeout, Duration::from_secs(2));
    }

    #[test]
    fn empty_identity_is_generated() {
        let mut cfg = ClientConfig::default();
        let generated = cfg.identity();
        assert!(!generated.sn.is_empty());
        assert!(!generated.token.is_empty());

        cfg.identity.sn = "FIXED".into();
        let identity = cfg.identity();
        assert_eq!(identity.sn, "FIXED");
        assert_eq!(identity.model, "orange-client");
    }

    #[test]
    fn written_default_loads_back() {
        let path = std::env::temp_dir().join(format!("orange-client-{}.toml", std::process::id()));
        ClientConfig::write_default(&path).unwrap();
        let cfg = ClientConfig::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cfg.server.candidates, vec!["ws://127.0.0.1:8080/ws"]);
        assert_eq!(cfg.remote_screen(), RemoteScreen::default());
    }

    #[test]
    fn remote_screen_from_config() {
        let mut cfg = ClientConfig::default();
        cfg.remote.width = 720;
        cfg.remote.height = 1600;
        assert_eq!(cfg.remote_screen().to_absolute(0.5, 0.5), (360, 800));
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = ClientConfig::load(Path::new("/nonexistent/orange-client.toml"));
        assert_eq!(cfg.media.max_pending_bytes, 500_000);
    }
}
