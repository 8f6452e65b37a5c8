//! Annex B splitter for `tokio_util::codec`.
//!
//! [`NaluSplitter`] turns an unbounded byte stream into the NAL units
//! delimited by its start codes. It can drive a `FramedRead` directly or
//! be fed by hand, which is what the depacketizer does.

use bytes::{Buf, Bytes, BytesMut};
use tracing::debug;

use crate::error::OrangeError;
use crate::media::nal::{START_CODE, find_start_code};

/// Default ceiling for bytes held while no further boundary has been seen.
pub const DEFAULT_MAX_PENDING: usize = 500_000;

/// Splits an Annex B byte stream at start codes.
///
/// The accumulator always begins at the most recent start code once one
/// has been seen, so after each pass only the final, possibly incomplete
/// unit is retained. Bytes that precede the first start code are junk and
/// are dropped when that start code shows up. When the held bytes pass
/// `max_pending` without another boundary they are discarded, partial
/// unit included, and the splitter waits for a fresh start code.
#[derive(Debug)]
pub struct NaluSplitter {
    /// Length of the start code sitting at the front of the buffer.
    lead: Option<usize>,
    /// Next position to examine; everything before it has been scanned.
    cursor: usize,
    max_pending: usize,
    resyncs: u64,
}

impl NaluSplitter {
    pub fn new() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING)
    }

    /// Use a custom ceiling for bytes held without a following boundary.
    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            lead: None,
            cursor: 0,
            max_pending,
            resyncs: 0,
        }
    }

    /// How many times the buffer was discarded for lack of a boundary.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Forget all boundary state. The caller owns the buffer and is
    /// expected to clear it alongside.
    pub fn reset(&mut self) {
        self.lead = None;
        self.cursor = 0;
    }
}

impl Default for NaluSplitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of the longest tail of `buf` that could be the front of a start
/// code still waiting for its last bytes.
fn start_code_prefix_len(buf: &[u8]) -> usize {
    const SHORT: [u8; 3] = [0, 0, 1];
    (1..=buf.len().min(3))
        .rev()
        .find(|&n| {
            let tail = &buf[buf.len() - n..];
            tail == &SHORT[..n] || tail == &START_CODE[..n]
        })
        .unwrap_or(0)
}

impl tokio_util::codec::Decoder for NaluSplitter {
    type Item = Bytes;
    type Error = OrangeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some((pos, code_len)) = find_start_code(src, self.cursor) else {
                self.cursor = self.cursor.max(src.len().saturating_sub(3));
                if src.len() > self.max_pending {
                    let keep = start_code_prefix_len(src);
                    debug!(
                        pending = src.len(),
                        max = self.max_pending,
                        partial_unit = self.lead.is_some(),
                        "no boundary within limit, discarding buffer"
                    );
                    src.advance(src.len() - keep);
                    self.lead = None;
                    self.cursor = 0;
                    self.resyncs += 1;
                }
                return Ok(None);
            };

            match self.lead {
                None => {
                    src.advance(pos);
                    self.lead = Some(code_len);
                    self.cursor = code_len;
                }
                Some(lead) => {
                    let mut unit = src.split_to(pos);
                    unit.advance(lead);
                    self.lead = Some(code_len);
                    self.cursor = code_len;
                    return Ok(Some(unit.freeze()));
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(unit) = self.decode(src)? {
            return Ok(Some(unit));
        }
        // The stream is finished, so the trailing unit is complete.
        match self.lead.take() {
            Some(lead) if src.len() > lead => {
                let mut unit = src.split();
                unit.advance(lead);
                self.cursor = 0;
                Ok(Some(unit.freeze()))
            }
            _ => {
                src.clear();
                self.cursor = 0;
                Ok(None)
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
