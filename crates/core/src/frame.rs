//! Length-prefix framing of facts into segments.
//!
//! A segment is the concatenation of one frame per fact, in batch order:
//!
//! ```text
//! +----------------+------------------+----------------+-----
//! | len: u16 (BE)  | payload (len B)  | len: u16 (BE)  | ...
//! +----------------+------------------+----------------+-----
//! ```
//!
//! The prefix is fixed-width, so the largest fact payload a frame can carry
//! is [`MAX_FACT_SIZE`] bytes.

use tracing::error;

use crate::{Fact, OriginsError, Result};

/// Width of the length prefix in bytes.
pub const PREFIX_SIZE: usize = 2;

/// Largest encoded fact a single frame can carry.
pub const MAX_FACT_SIZE: usize = u16::MAX as usize;

/// Append one framed fact to `out` and return its payload size.
///
/// `out` is left untouched when the fact is oversized.
pub fn encode_frame(fact: &Fact, out: &mut Vec<u8>) -> Result<usize> {
    let payload = fact.to_bytes()?;
    let size = payload.len();

    if size > MAX_FACT_SIZE {
        let err = OriginsError::OversizedFact {
            size,
            max: MAX_FACT_SIZE,
        };
        error!("{err}");
        return Err(err);
    }

    out.extend_from_slice(&(size as u16).to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(size)
}

/// Frame every fact into one segment.
///
/// Returns the segment bytes and the total payload size (prefix bytes are not
/// counted). Fails on the first oversized fact without returning a partial
/// segment.
pub fn encode_segment(facts: &[Fact]) -> Result<(Vec<u8>, usize)> {
    let mut segment = Vec::new();
    let mut total = 0;

    for fact in facts {
        total += encode_frame(fact, &mut segment)?;
    }

    Ok((segment, total))
}

/// Decode a whole segment, failing on the first corrupt frame.
pub fn decode_segment(segment: &[u8]) -> Result<Vec<Fact>> {
    SegmentDecoder::new(segment.to_vec()).collect()
}

/// Streams facts out of one segment.
///
/// Yields an error at the first frame that cannot be read in full or whose
/// payload does not decode, then stops.
#[derive(Debug)]
pub struct SegmentDecoder {
    segment: Vec<u8>,
    pos: usize,
    done: bool,
}

impl SegmentDecoder {
    pub fn new(segment: Vec<u8>) -> Self {
        Self {
            segment,
            pos: 0,
            done: false,
        }
    }

    fn corrupt(&mut self, reason: String) -> OriginsError {
        self.done = true;
        OriginsError::CorruptSegment {
            offset: self.pos,
            reason,
        }
    }

    fn next_frame(&mut self) -> Result<Fact> {
        let remaining = self.segment.len() - self.pos;
        if remaining < PREFIX_SIZE {
            return Err(self.corrupt(format!(
                "{remaining} trailing byte(s) cannot hold a length prefix"
            )));
        }

        let prefix = [self.segment[self.pos], self.segment[self.pos + 1]];
        let size = u16::from_be_bytes(prefix) as usize;
        let start = self.pos + PREFIX_SIZE;
        let end = start + size;

        if end > self.segment.len() {
            return Err(self.corrupt(format!(
                "frame declares {size} bytes but only {} remain",
                self.segment.len() - start
            )));
        }

        match Fact::from_bytes(&self.segment[start..end]) {
            Ok(fact) => {
                self.pos = end;
                Ok(fact)
            }
            Err(e) => Err(self.corrupt(format!("undecodable fact payload: {e}"))),
        }
    }
}

impl Iterator for SegmentDecoder {
    type Item = Result<Fact>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.segment.len() {
            return None;
        }
        Some(self.next_frame())
    }
}
