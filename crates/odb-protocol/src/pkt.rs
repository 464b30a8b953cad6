//! Length-prefixed framing.
//!
//! A frame starts with four ASCII hex digits giving the total frame length,
//! the digits included. Length `0000` is a flush packet. Lengths 1 to 3 can
//! never be valid and are rejected.

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProtocolError, ProtocolResult};

/// Size of the hex length prefix.
pub const LEN_SIZE: usize = 4;

/// The flush packet.
pub const FLUSH: &[u8; LEN_SIZE] = b"0000";

/// Largest frame length the four hex digits can express.
pub const MAX_FRAME_LEN: usize = 0xffff;

/// One frame read off a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// The stream ended cleanly before a new frame began.
    Eof,
    /// A `0000` flush packet.
    Flush,
    /// A data frame's payload, length prefix stripped.
    Data(Bytes),
}

/// Parse a four-digit hex length prefix.
pub fn parse_length(prefix: &[u8]) -> ProtocolResult<usize> {
    if prefix.len() != LEN_SIZE {
        return Err(ProtocolError::FramingError(format!(
            "length prefix is {} bytes, expected {LEN_SIZE}",
            prefix.len()
        )));
    }
    let mut len = 0usize;
    for &b in prefix {
        let digit = (b as char).to_digit(16).ok_or_else(|| {
            ProtocolError::FramingError(format!("non-hex length prefix {:?}", String::from_utf8_lossy(prefix)))
        })?;
        len = (len << 4) | digit as usize;
    }
    if len != 0 && len < LEN_SIZE {
        return Err(ProtocolError::FramingError(format!("invalid frame length {len}")));
    }
    Ok(len)
}

/// Split one frame off the front of `data`.
///
/// Returns the frame and the number of bytes it occupied. Empty input is
/// [`Frame::Eof`]; input that stops partway through a frame is a framing
/// error.
pub fn split_frame(data: &[u8]) -> ProtocolResult<(Frame, usize)> {
    if data.is_empty() {
        return Ok((Frame::Eof, 0));
    }
    if data.len() < LEN_SIZE {
        return Err(ProtocolError::FramingError(format!(
            "input ended after {} of {LEN_SIZE} length bytes",
            data.len()
        )));
    }
    let len = parse_length(&data[..LEN_SIZE])?;
    if len == 0 {
        return Ok((Frame::Flush, LEN_SIZE));
    }
    if data.len() < len {
        return Err(ProtocolError::FramingError(format!(
            "frame declares {len} bytes, only {} available",
            data.len()
        )));
    }
    Ok((Frame::Data(Bytes::copy_from_slice(&data[LEN_SIZE..len])), len))
}

/// Read one frame from `reader`.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> ProtocolResult<Frame> {
    let mut prefix = [0u8; LEN_SIZE];
    let mut filled = 0;
    while filled < LEN_SIZE {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(Frame::Eof);
            }
            return Err(ProtocolError::FramingError(format!(
                "stream ended after {filled} of {LEN_SIZE} length bytes"
            )));
        }
        filled += n;
    }

    let len = parse_length(&prefix)?;
    if len == 0 {
        return Ok(Frame::Flush);
    }
    let mut payload = vec![0u8; len - LEN_SIZE];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ProtocolError::FramingError(format!("stream ended inside a {len}-byte frame"))
        } else {
            ProtocolError::Io(e)
        }
    })?;
    Ok(Frame::Data(Bytes::from(payload)))
}

/// Append a data frame carrying `payload` to `out`.
pub fn put_frame(out: &mut Vec<u8>, payload: &[u8]) -> ProtocolResult<()> {
    let len = payload.len() + LEN_SIZE;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_LEN,
        });
    }
    out.reserve(len);
    out.extend_from_slice(format!("{len:04x}").as_bytes());
    out.extend_from_slice(payload);
    Ok(())
}
