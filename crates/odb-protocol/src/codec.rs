use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Request, Response};
use crate::pkt::{self, Frame, FLUSH};

/// Codec for daemon messages.
///
/// Every message is one data frame followed by a flush packet. A bare flush
/// packet is [`Request::Flush`]; a stream that ends between messages is
/// [`Request::StreamEnd`].
pub struct OdbCodec;

impl OdbCodec {
    /// Encode a request with framing. `StreamEnd` encodes to nothing.
    pub fn encode_request(request: &Request) -> ProtocolResult<Vec<u8>> {
        match request {
            Request::StreamEnd => Ok(Vec::new()),
            Request::Flush => Ok(FLUSH.to_vec()),
            _ => match request.payload() {
                Some(payload) => Self::encode_message(&payload),
                None => Ok(Vec::new()),
            },
        }
    }

    /// Decode a framed request. Returns (request, bytes_consumed).
    pub fn decode_request(data: &[u8]) -> ProtocolResult<(Request, usize)> {
        let (frame, used) = pkt::split_frame(data)?;
        match frame {
            Frame::Eof => Ok((Request::StreamEnd, 0)),
            Frame::Flush => Ok((Request::Flush, used)),
            Frame::Data(payload) => {
                let used = used + Self::split_terminator(&data[used..])?;
                Ok((Request::decode_payload(&payload)?, used))
            }
        }
    }

    /// Encode a response with framing.
    pub fn encode_response(response: &Response) -> ProtocolResult<Vec<u8>> {
        Self::encode_message(&response.payload())
    }

    /// Decode a framed response. Returns (response, bytes_consumed).
    pub fn decode_response(data: &[u8]) -> ProtocolResult<(Response, usize)> {
        let (frame, used) = pkt::split_frame(data)?;
        match frame {
            Frame::Data(payload) => {
                let used = used + Self::split_terminator(&data[used..])?;
                Ok((Response::decode_payload(&payload)?, used))
            }
            other => Err(Self::missing_response(&other)),
        }
    }

    /// Read one request from a stream.
    pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> ProtocolResult<Request> {
        match pkt::read_frame(reader).await? {
            Frame::Eof => Ok(Request::StreamEnd),
            Frame::Flush => Ok(Request::Flush),
            Frame::Data(payload) => {
                Self::read_terminator(reader).await?;
                trace!(len = payload.len(), "read request frame");
                Request::decode_payload(&payload)
            }
        }
    }

    /// Write one request and flush the stream.
    pub async fn write_request<W: AsyncWrite + Unpin>(
        writer: &mut W,
        request: &Request,
    ) -> ProtocolResult<()> {
        let bytes = Self::encode_request(request)?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one response from a stream.
    pub async fn read_response<R: AsyncRead + Unpin>(reader: &mut R) -> ProtocolResult<Response> {
        match pkt::read_frame(reader).await? {
            Frame::Data(payload) => {
                Self::read_terminator(reader).await?;
                trace!(len = payload.len(), "read response frame");
                Response::decode_payload(&payload)
            }
            other => Err(Self::missing_response(&other)),
        }
    }

    /// Write one response and flush the stream.
    pub async fn write_response<W: AsyncWrite + Unpin>(
        writer: &mut W,
        response: &Response,
    ) -> ProtocolResult<()> {
        let bytes = Self::encode_response(response)?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    fn encode_message(payload: &[u8]) -> ProtocolResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(pkt::LEN_SIZE * 2 + payload.len());
        pkt::put_frame(&mut buf, payload)?;
        buf.extend_from_slice(FLUSH);
        Ok(buf)
    }

    /// The terminator is exactly one 4-byte prefix; anything other than
    /// `0000` is rejected without reading further.
    fn split_terminator(data: &[u8]) -> ProtocolResult<usize> {
        match data.get(..pkt::LEN_SIZE) {
            Some(prefix) if prefix == FLUSH => Ok(pkt::LEN_SIZE),
            Some(_) => Err(Self::bad_terminator()),
            None => Err(Self::missing_terminator()),
        }
    }

    async fn read_terminator<R: AsyncRead + Unpin>(reader: &mut R) -> ProtocolResult<()> {
        let mut prefix = [0u8; pkt::LEN_SIZE];
        reader.read_exact(&mut prefix).await.map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Self::missing_terminator()
            } else {
                ProtocolError::Io(e)
            }
        })?;
        if &prefix != FLUSH {
            return Err(Self::bad_terminator());
        }
        Ok(())
    }

    fn bad_terminator() -> ProtocolError {
        ProtocolError::FramingError("message not followed by a flush packet".into())
    }

    fn missing_terminator() -> ProtocolError {
        ProtocolError::FramingError("stream ended before flush terminator".into())
    }

    fn missing_response(frame: &Frame) -> ProtocolError {
        match frame {
            Frame::Eof => ProtocolError::FramingError("stream ended before a response".into()),
            _ => ProtocolError::UnexpectedResponse("flush packet".into()),
        }
    }
}
