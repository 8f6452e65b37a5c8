//! Headless stand-in for a platform video decoder.
//!
//! The desktop client has no display surface. It accepts the decoder
//! configuration and counts what it would have decoded, which is enough
//! to watch a stream's health from the logs.

use tracing::{debug, info};

use orange_core::{OrangeError, Sample, VideoDecoder};

/// Parameter-set sizes of the active configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sps_len: usize,
    pub pps_len: usize,
}

#[derive(Debug, Default)]
pub struct LoggingDecoder {
    key_frames: u64,
    delta_frames: u64,
    bytes: u64,
}

impl LoggingDecoder {
    pub fn key_frames(&self) -> u64 {
        self.key_frames
    }

    pub fn delta_frames(&self) -> u64 {
        self.delta_frames
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl VideoDecoder for LoggingDecoder {
    type Config = StreamFormat;

    fn configure(&mut self, primary: &[u8], secondary: &[u8]) -> Result<StreamFormat, OrangeError> {
        if primary.is_empty() || secondary.is_empty() {
            return Err(OrangeError::Codec("empty parameter set".into()));
        }
        let format = StreamFormat {
            sps_len: primary.len(),
            pps_len: secondary.len(),
        };
        info!(?format, "stream format received");
        Ok(format)
    }

    fn submit(&mut self, _config: &StreamFormat, sample: Sample) {
        if sample.is_key {
            self.key_frames += 1;
            debug!(len = sample.data.len(), "key frame");
        } else {
            self.delta_frames += 1;
        }
        self.bytes += sample.data.len() as u64;
    }
}
