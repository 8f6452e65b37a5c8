//! Decode session controller.
//!
//! Sits between the depacketizer and the platform video decoder. It
//! collects the parameter sets, builds the decoder configuration once per
//! stream, and hands every decodable picture to the decoder with a
//! presentation timestamp.

use std::time::SystemTime;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::OrangeError;
use crate::media::nal::{NalKind, NalUnit};

// ── Codec collaborator ───────────────────────────────────────────

/// One picture ready for the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// The unit with a 4-byte big-endian length prefix.
    pub data: Bytes,
    /// Whether this is an IDR picture.
    pub is_key: bool,
    /// Presentation time (wall clock at submission).
    pub pts: SystemTime,
    /// Render as soon as decoded instead of waiting for `pts`.
    pub display_immediately: bool,
}

/// The platform decoder this crate drives but does not implement.
pub trait VideoDecoder {
    /// Opaque configuration built from the parameter sets.
    type Config;

    /// Build a configuration from SPS and PPS bytes (no start codes).
    fn configure(&mut self, primary: &[u8], secondary: &[u8]) -> Result<Self::Config, OrangeError>;

    /// Decode one picture under `config`.
    fn submit(&mut self, config: &Self::Config, sample: Sample);
}

// ── ParameterSetCache ────────────────────────────────────────────

/// First-wins cache of the two parameter units.
#[derive(Debug, Default, Clone)]
pub struct ParameterSetCache {
    primary: Option<Bytes>,
    secondary: Option<Bytes>,
}

impl ParameterSetCache {
    /// Store a primary unit; ignored if one is already cached.
    pub fn set_primary(&mut self, unit: Bytes) -> bool {
        if self.primary.is_some() {
            return false;
        }
        self.primary = Some(unit);
        true
    }

    /// Store a secondary unit; ignored if one is already cached.
    pub fn set_secondary(&mut self, unit: Bytes) -> bool {
        if self.secondary.is_some() {
            return false;
        }
        self.secondary = Some(unit);
        true
    }

    pub fn primary(&self) -> Option<&Bytes> {
        self.primary.as_ref()
    }

    pub fn secondary(&self) -> Option<&Bytes> {
        self.secondary.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.primary.is_some() && self.secondary.is_some()
    }

    pub fn clear(&mut self) {
        self.primary = None;
        self.secondary = None;
    }
}

// ── DecodeStats ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Pictures handed to the decoder.
    pub submitted: u64,
    /// Pictures dropped because no configuration existed yet.
    pub dropped_unconfigured: u64,
    /// Configurations built (one per stream unless reset).
    pub configurations: u64,
}

// ── DecodeSession ────────────────────────────────────────────────

/// Per-stream decode state around a [`VideoDecoder`].
pub struct DecodeSession<D: VideoDecoder> {
    decoder: D,
    params: ParameterSetCache,
    config: Option<D::Config>,
    stats: DecodeStats,
}

impl<D: VideoDecoder> DecodeSession<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            params: ParameterSetCache::default(),
            config: None,
            stats: DecodeStats::default(),
        }
    }

    /// Route one classified unit.
    pub fn handle(&mut self, unit: NalUnit) {
        match unit.kind {
            NalKind::PrimaryParameter => {
                if !self.params.set_primary(unit.data) {
                    debug!("primary parameter set already cached, ignoring");
                }
            }
            NalKind::SecondaryParameter => {
                if !self.params.set_secondary(unit.data) {
                    debug!("secondary parameter set already cached, ignoring");
                }
                self.try_configure();
            }
            NalKind::Key => {
                // An IDR is where a late joiner resynchronizes.
                self.try_configure();
                self.enqueue(&unit);
            }
            NalKind::Delta => self.enqueue(&unit),
        }
    }

    /// Whether a decoder configuration exists.
    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut D {
        &mut self.decoder
    }

    /// Forget parameter sets and configuration; the next stream starts
    /// from scratch.
    pub fn reset(&mut self) {
        self.params.clear();
        self.config = None;
    }

    // ── Internal ─────────────────────────────────────────────────

    fn try_configure(&mut self) {
        if self.config.is_some() {
            return;
        }
        let (Some(primary), Some(secondary)) = (self.params.primary(), self.params.secondary()) else {
            return;
        };
        match self.decoder.configure(primary, secondary) {
            Ok(config) => {
                info!(
                    sps_len = primary.len(),
                    pps_len = secondary.len(),
                    "decoder configuration created"
                );
                self.config = Some(config);
                self.stats.configurations += 1;
            }
            Err(e) => warn!("decoder configuration failed: {e}"),
        }
    }

    fn enqueue(&mut self, unit: &NalUnit) {
        let Some(config) = self.config.as_ref() else {
            self.stats.dropped_unconfigured += 1;
            return;
        };
        let sample = Sample {
            data: unit.length_prefixed(),
            is_key: unit.kind == NalKind::Key,
            pts: SystemTime::now(),
            display_immediately: true,
        };
        self.decoder.submit(config, sample);
        self.stats.submitted += 1;
    }
}

// ── Tests ────────────────────────────────────────────────────────
