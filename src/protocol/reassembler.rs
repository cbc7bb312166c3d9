//! Stream reassembler for framed target data
//!
//! Turns an arbitrary TCP byte stream back into frame bodies. The owner
//! pushes chunks with [`StreamReassembler::feed`] and drains frames with
//! [`StreamReassembler::try_extract_frame`] until it returns `Ok(None)`.
//!
//! # Resynchronization
//!
//! When the bytes at the front of the buffer do not start with the frame
//! header, exactly one byte is discarded and the scan restarts. Dropping a
//! single byte per miss guarantees a valid header that begins inside noise
//! is never skipped, so a single corrupted or missing byte costs at most the
//! frame it landed in.
//!
//! A declared body length above the configured maximum is reported as
//! [`Error::FrameTooLarge`]; the first byte of the offending preamble is
//! dropped so the next call resumes scanning.

use super::{FRAME_HEADER, ProtocolVariant};
use crate::error::{Error, Result};

/// Consumed bytes kept at the front before the buffer is compacted
const COMPACT_THRESHOLD: usize = 4096;

/// One delimited frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sender-assigned sequence number (indexed preamble only)
    pub frame_index: Option<u32>,
    /// Target count byte plus encoded records
    pub body: Vec<u8>,
}

/// What the reassembler is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblerState {
    /// Fewer bytes than one preamble are buffered
    AwaitHeader,
    /// Preamble is valid, `needed` more body bytes are required
    AwaitBody { needed: usize },
}

/// Push-based frame reassembler
///
/// Owns its accumulation buffer exclusively; not shared between threads.
pub struct StreamReassembler {
    variant: ProtocolVariant,
    max_body_len: usize,
    buffer: Vec<u8>,
    /// Read position: bytes before `head` are already consumed
    head: usize,
    frames_extracted: u64,
    bytes_discarded: u64,
    oversize_frames: u64,
}

impl StreamReassembler {
    /// Create a reassembler for `variant`
    ///
    /// The body length limit defaults to the largest valid body for the
    /// variant's record layout (255 records).
    pub fn new(variant: ProtocolVariant) -> Self {
        Self {
            variant,
            max_body_len: variant.max_body_len(),
            buffer: Vec::with_capacity(variant.preamble_size() + variant.max_body_len()),
            head: 0,
            frames_extracted: 0,
            bytes_discarded: 0,
            oversize_frames: 0,
        }
    }

    /// Override the maximum accepted body length
    pub fn with_max_body_len(mut self, max_body_len: usize) -> Self {
        self.max_body_len = max_body_len;
        self
    }

    #[inline]
    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    #[inline]
    pub fn max_body_len(&self) -> usize {
        self.max_body_len
    }

    /// Append received bytes; never blocks
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.head == self.buffer.len() {
            self.buffer.clear();
            self.head = 0;
        } else if self.head >= COMPACT_THRESHOLD {
            self.buffer.drain(..self.head);
            self.head = 0;
        }
        self.buffer.extend_from_slice(chunk);
    }

    /// Try to extract one frame from the buffered bytes
    ///
    /// Returns `Ok(None)` when more bytes are needed. Bad headers are
    /// skipped one byte at a time inside this call.
    pub fn try_extract_frame(&mut self) -> Result<Option<Frame>> {
        let preamble = self.variant.preamble_size();

        loop {
            let pending = &self.buffer[self.head..];
            if pending.len() < preamble {
                return Ok(None);
            }

            let header = u16::from_le_bytes([pending[0], pending[1]]);
            if header != FRAME_HEADER {
                self.discard(1);
                continue;
            }

            let offset = self.variant.length_offset();
            let body_len = u16::from_le_bytes([pending[offset], pending[offset + 1]]) as usize;
            if body_len > self.max_body_len {
                self.discard(1);
                self.oversize_frames += 1;
                return Err(Error::FrameTooLarge {
                    len: body_len,
                    max: self.max_body_len,
                });
            }

            let total = preamble + body_len;
            if pending.len() < total {
                return Ok(None);
            }

            let frame_index = self
                .variant
                .has_index()
                .then(|| u32::from_le_bytes([pending[2], pending[3], pending[4], pending[5]]));
            let body = pending[preamble..total].to_vec();

            self.head += total;
            self.frames_extracted += 1;
            return Ok(Some(Frame { frame_index, body }));
        }
    }

    /// Drain frames until more input is needed
    ///
    /// Errors are yielded in place; iteration continues past them.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { reassembler: self }
    }

    /// Current wait state for the unconsumed bytes
    ///
    /// A buffer that starts with a bad header reports `AwaitHeader`; the
    /// next extraction attempt discards it.
    pub fn state(&self) -> ReassemblerState {
        let pending = &self.buffer[self.head..];
        let preamble = self.variant.preamble_size();
        if pending.len() < preamble || u16::from_le_bytes([pending[0], pending[1]]) != FRAME_HEADER
        {
            return ReassemblerState::AwaitHeader;
        }
        let offset = self.variant.length_offset();
        let body_len = u16::from_le_bytes([pending[offset], pending[offset + 1]]) as usize;
        ReassemblerState::AwaitBody {
            needed: (preamble + body_len).saturating_sub(pending.len()),
        }
    }

    /// Unconsumed bytes in the buffer
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.head
    }

    /// Drop all buffered bytes (e.g. on connection reset)
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.head = 0;
    }

    #[inline]
    pub fn frames_extracted(&self) -> u64 {
        self.frames_extracted
    }

    /// Bytes skipped while searching for a header
    #[inline]
    pub fn bytes_discarded(&self) -> u64 {
        self.bytes_discarded
    }

    #[inline]
    pub fn oversize_frames(&self) -> u64 {
        self.oversize_frames
    }

    #[inline]
    fn discard(&mut self, n: usize) {
        let n = n.min(self.buffered());
        self.head += n;
        self.bytes_discarded += n as u64;
    }
}

/// Iterator returned by [`StreamReassembler::frames`]
pub struct Frames<'a> {
    reassembler: &'a mut StreamReassembler,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reassembler.try_extract_frame().transpose()
    }
}
