//! Frame demultiplexer
//!
//! One raw socket message carries any number of concatenated frames, each
//! laid out as:
//!
//! ```text
//! [4B LE length L1][L1 bytes UTF-8 identifier][4B LE kind][4B LE length L2][L2 bytes payload]
//! ```
//!
//! Payload length zero is valid (Death frames carry none), and the cursor
//! always advances by the declared length so a semantically void payload
//! cannot desynchronize the stream. Boundaries are length-prefixed, so a
//! malformed *payload* never costs more than its own frame; a malformed
//! *header* ends the batch, because every later boundary is unknowable.

use crate::error::FrameError;

/// What a frame announces about its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FrameKind {
    /// A data update (node or device metrics)
    Publish = 0,
    /// The publisher identified by the frame is gone; no payload
    Death = 1,
    /// A (re)initialization of the publisher's full metric-set
    Birth = 2,
}

impl FrameKind {
    fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(FrameKind::Publish),
            1 => Some(FrameKind::Death),
            2 => Some(FrameKind::Birth),
            _ => None,
        }
    }
}

/// One demultiplexed frame, borrowing from the raw message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Slash-delimited entity identifier, `group/node[/device]`
    pub id: &'a str,
    pub kind: FrameKind,
    /// Raw payload bytes; empty for Death frames
    pub payload: &'a [u8],
}

/// Lazy iterator over the frames of one raw message.
///
/// Yields frames in arrival order; after the first `Err` the iterator is
/// exhausted. Restart by constructing a new iterator over the next raw
/// message.
#[derive(Debug)]
pub struct FrameIter<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> FrameIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        FrameIter {
            data,
            offset: 0,
            failed: false,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], FrameError> {
        let available = self.data.len() - self.offset;
        if available < len {
            return Err(FrameError::Truncated {
                offset: self.offset,
                needed: len,
                available,
            });
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn read_u32_le(&mut self) -> Result<u32, FrameError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn next_frame(&mut self) -> Result<Frame<'a>, FrameError> {
        // The whole header and body are consumed before anything is
        // validated, so the cursor lands on the next frame boundary even
        // when this frame turns out to be bad. Only truncation loses the
        // boundary.
        let id_len = self.read_u32_le()? as usize;
        let id_offset = self.offset;
        let id_bytes = self.take(id_len)?;
        let kind_offset = self.offset;
        let kind_code = self.read_u32_le()?;
        let payload_len = self.read_u32_le()? as usize;
        let payload = self.take(payload_len)?;

        let id = std::str::from_utf8(id_bytes)
            .map_err(|_| FrameError::InvalidIdentifier { offset: id_offset })?;
        let kind = FrameKind::from_code(kind_code).ok_or(FrameError::UnknownKind {
            kind: kind_code,
            offset: kind_offset,
        })?;

        Ok(Frame { id, kind, payload })
    }
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = Result<Frame<'a>, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }
        match self.next_frame() {
            Ok(frame) => Some(Ok(frame)),
            Err(err) => {
                // A truncated stream has no recoverable boundary; anything
                // else only invalidates the frame it was found in.
                if matches!(err, FrameError::Truncated { .. }) {
                    self.failed = true;
                }
                Some(Err(err))
            }
        }
    }
}
