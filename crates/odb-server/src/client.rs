use std::path::Path;

use bytes::Bytes;
use odb_protocol::{
    ObjectInfo, OdbCodec, ProtocolError, ProtocolResult, Request, Response, HASH_OBJECT_WRITE,
};
use odb_types::{ObjectId, ObjectType};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::UnixStream;

/// Client side of the daemon protocol.
///
/// A daemon answers an error with the bare sentinel and then closes the
/// connection, so after any [`ProtocolError::RemoteError`] the client must
/// reconnect.
pub struct OdbClient<S = UnixStream> {
    stream: BufStream<S>,
}

impl OdbClient<UnixStream> {
    pub async fn connect(socket: &Path) -> ProtocolResult<Self> {
        Ok(Self::from_stream(UnixStream::connect(socket).await?))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> OdbClient<S> {
    pub fn from_stream(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
        }
    }

    /// Look up an object, optionally fetching its content.
    pub async fn get_object(
        &mut self,
        id: ObjectId,
        want_content: bool,
    ) -> ProtocolResult<(ObjectInfo, Bytes)> {
        let request = Request::GetObject {
            id,
            flags: 0,
            want_content: u8::from(want_content),
        };
        match self.call(&request).await? {
            Response::ObjectInfo { info, content } => {
                if want_content && content.len() as u64 != u64::from(info.size) {
                    return Err(ProtocolError::SizeMismatch {
                        declared: u64::from(info.size),
                        actual: content.len() as u64,
                    });
                }
                Ok((info, content))
            }
            other => Err(ProtocolError::UnexpectedResponse(other.name().into())),
        }
    }

    /// Hash `content` as `object_type`, storing it too when `write` is set.
    pub async fn hash_object(
        &mut self,
        object_type: ObjectType,
        content: Bytes,
        write: bool,
    ) -> ProtocolResult<ObjectId> {
        let request = Request::HashObject {
            object_type: object_type.code(),
            flags: if write { HASH_OBJECT_WRITE } else { 0 },
            size: content.len() as u64,
            content,
        };
        match self.call(&request).await? {
            Response::HashResult { id } => Ok(id),
            other => Err(ProtocolError::UnexpectedResponse(other.name().into())),
        }
    }

    /// Send a flush packet. The daemon does not answer it.
    pub async fn flush(&mut self) -> ProtocolResult<()> {
        OdbCodec::write_request(&mut self.stream, &Request::Flush).await
    }

    /// End the session cleanly.
    pub async fn close(mut self) -> ProtocolResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn call(&mut self, request: &Request) -> ProtocolResult<Response> {
        OdbCodec::write_request(&mut self.stream, request).await?;
        match OdbCodec::read_response(&mut self.stream).await? {
            Response::Error => Err(ProtocolError::RemoteError),
            response => Ok(response),
        }
    }
}
