//! Session connection state machine.
//!
//! Provides a `ConnectionState` enum that models the full lifecycle of
//! the session socket, with validated transitions that return `Result`
//! instead of panicking.

use std::time::{Duration, Instant};

use crate::error::OrangeError;

// ── ConnectionState ──────────────────────────────────────────────

/// The current state of the session socket.
///
/// ```text
///  Idle ──► Connecting ──► Connected
///               ▲  │           │
///               │  ▼           ▼
///     Reconnecting ◄──── Disconnected
///               │            ▲
///               └────────────┘ (cancelled)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Never connected. Initial state.
    #[default]
    Idle,

    /// Dial in progress; no usable socket.
    Connecting,

    /// Socket open; registration sent; heartbeat running.
    Connected {
        /// When the socket opened.
        since: Instant,
    },

    /// No socket. Either user-initiated or awaiting a reconnect schedule.
    Disconnected,

    /// A reconnect is scheduled after `delay`; no usable socket.
    Reconnecting {
        delay: Duration,
    },
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected { .. } => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Reconnecting { delay } => write!(f, "Reconnecting({delay:?})"),
        }
    }
}

impl ConnectionState {
    /// Returns `true` when a live socket exists.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Returns `true` while a dial is in progress.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    /// Returns `true` while a reconnect is pending.
    pub fn is_reconnecting(&self) -> bool {
        matches!(self, Self::Reconnecting { .. })
    }

    /// How long the socket has been open.
    ///
    /// Returns `None` for any other state.
    pub fn connected_duration(&self) -> Option<Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Idle`, `Disconnected`, `Reconnecting`.
    pub fn begin_connect(&mut self) -> Result<(), OrangeError> {
        match self {
            Self::Idle | Self::Disconnected | Self::Reconnecting { .. } => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(OrangeError::ProtocolViolation(
                "cannot connect: a socket is open or a dial is in progress",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_connect(&mut self) -> Result<(), OrangeError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(OrangeError::ProtocolViolation(
                "cannot complete connect: not in Connecting state",
            )),
        }
    }

    /// Transition to `Disconnected`.
    ///
    /// Valid from: `Connecting` (dial failed), `Connected` (link lost or
    /// closed), `Reconnecting` (schedule cancelled).
    pub fn lose_connection(&mut self) -> Result<(), OrangeError> {
        match self {
            Self::Connecting | Self::Connected { .. } | Self::Reconnecting { .. } => {
                *self = Self::Disconnected;
                Ok(())
            }
            _ => Err(OrangeError::ProtocolViolation(
                "cannot disconnect: no socket or dial to tear down",
            )),
        }
    }

    /// Transition to `Reconnecting`.
    ///
    /// Valid from: `Disconnected`.
    pub fn schedule_reconnect(&mut self, delay: Duration) -> Result<(), OrangeError> {
        match self {
            Self::Disconnected => {
                *self = Self::Reconnecting { delay };
                Ok(())
            }
            _ => Err(OrangeError::ProtocolViolation(
                "cannot schedule reconnect: not in Disconnected state",
            )),
        }
    }
}

// ── StateChange ──────────────────────────────────────────────────

/// One observed transition, published for observers that need the full
/// history rather than the latest value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

// ── Tests ────────────────────────────────────────────────────────
