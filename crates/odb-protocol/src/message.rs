//! Request and response messages and their fixed little-endian layouts.

use std::fmt;

use bytes::{Buf, BufMut, Bytes};
use odb_types::{HashAlgorithm, ObjectId, ObjectType, Whence, MAX_HASH_LEN};

use crate::error::{ProtocolError, ProtocolResult};

/// Width of the command key at the start of every payload.
pub const KEY_LEN: usize = 16;

/// Wire size of an [`ObjectId`]: hash buffer plus algorithm tag.
pub const OBJECT_ID_LEN: usize = MAX_HASH_LEN + 4;

/// Payload size of a GetObject request.
pub const GET_OBJECT_LEN: usize = KEY_LEN + OBJECT_ID_LEN + 4 + 1;

/// Payload size of a HashObject request before its content.
pub const HASH_OBJECT_HEADER_LEN: usize = KEY_LEN + 4 + 4 + 8;

/// Payload size of an ObjectInfo response before any content.
pub const OBJECT_INFO_LEN: usize = KEY_LEN + 2 * OBJECT_ID_LEN + 8 + 4 + 4 + 4 + 4;

/// Payload size of a HashResult response.
pub const HASH_RESULT_LEN: usize = KEY_LEN + OBJECT_ID_LEN;

/// Payload of the error sentinel.
pub const ERROR_SENTINEL: &[u8] = b"error";

/// HashObject flag bit: store the object as well as hashing it.
pub const HASH_OBJECT_WRITE: u32 = 1;

/// ASCII command name, NUL-padded to [`KEY_LEN`] bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandKey([u8; KEY_LEN]);

impl CommandKey {
    pub const OID: CommandKey = CommandKey::new("oid");
    pub const HASH_OBJECT: CommandKey = CommandKey::new("hash-object");

    /// Panics if `name` does not fit in [`KEY_LEN`] bytes.
    pub const fn new(name: &str) -> Self {
        let src = name.as_bytes();
        assert!(src.len() <= KEY_LEN, "command name too long");
        let mut buf = [0u8; KEY_LEN];
        let mut i = 0;
        while i < src.len() {
            buf[i] = src[i];
            i += 1;
        }
        Self(buf)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// The name with trailing NUL padding removed.
    pub fn name(&self) -> &[u8] {
        let end = self.0.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        &self.0[..end]
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.name()))
    }
}

impl fmt::Debug for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandKey({self})")
    }
}

/// A request sent by a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Flush packet; never dispatched.
    Flush,
    /// The client closed its side of the connection.
    StreamEnd,
    GetObject {
        id: ObjectId,
        flags: u32,
        want_content: u8,
    },
    /// `object_type` stays a raw code so the server can reject bad values
    /// itself.
    HashObject {
        object_type: i32,
        flags: u32,
        size: u64,
        content: Bytes,
    },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Flush => "flush",
            Self::StreamEnd => "stream-end",
            Self::GetObject { .. } => "get-object",
            Self::HashObject { .. } => "hash-object",
        }
    }

    /// Payload bytes for requests that carry one.
    pub(crate) fn payload(&self) -> Option<Vec<u8>> {
        match self {
            Self::Flush | Self::StreamEnd => None,
            Self::GetObject {
                id,
                flags,
                want_content,
            } => {
                let mut buf = Vec::with_capacity(GET_OBJECT_LEN);
                buf.put_slice(CommandKey::OID.as_bytes());
                put_object_id(&mut buf, id);
                buf.put_u32_le(*flags);
                buf.put_u8(*want_content);
                Some(buf)
            }
            Self::HashObject {
                object_type,
                flags,
                size,
                content,
            } => {
                let mut buf = Vec::with_capacity(HASH_OBJECT_HEADER_LEN + content.len());
                buf.put_slice(CommandKey::HASH_OBJECT.as_bytes());
                buf.put_i32_le(*object_type);
                buf.put_u32_le(*flags);
                buf.put_u64_le(*size);
                buf.put_slice(content);
                Some(buf)
            }
        }
    }

    /// Decode the payload of a data frame.
    pub(crate) fn decode_payload(payload: &[u8]) -> ProtocolResult<Self> {
        let (key, mut body) = split_key(payload)?;
        if key == CommandKey::OID {
            expect_len("get-object", payload.len(), GET_OBJECT_LEN)?;
            let id = get_object_id(&mut body)?;
            let flags = body.get_u32_le();
            let want_content = body.get_u8();
            Ok(Self::GetObject {
                id,
                flags,
                want_content,
            })
        } else if key == CommandKey::HASH_OBJECT {
            if payload.len() < HASH_OBJECT_HEADER_LEN {
                return Err(ProtocolError::InvalidPayload(format!(
                    "hash-object payload is {} bytes, need at least {HASH_OBJECT_HEADER_LEN}",
                    payload.len()
                )));
            }
            let object_type = body.get_i32_le();
            let flags = body.get_u32_le();
            let size = body.get_u64_le();
            Ok(Self::HashObject {
                object_type,
                flags,
                size,
                content: Bytes::copy_from_slice(body),
            })
        } else {
            Err(ProtocolError::UnknownCommand(key.to_string()))
        }
    }
}

/// Fixed part of an ObjectInfo response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub delta_base: ObjectId,
    pub disk_size: i64,
    pub size: u32,
    pub whence: Whence,
    pub object_type: ObjectType,
}

/// A response sent by the daemon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// The untyped error sentinel.
    Error,
    /// Object metadata; `content` is empty unless the client asked for it.
    ObjectInfo { info: ObjectInfo, content: Bytes },
    HashResult { id: ObjectId },
}

impl Response {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::ObjectInfo { .. } => "object-info",
            Self::HashResult { .. } => "hash-result",
        }
    }

    pub(crate) fn payload(&self) -> Vec<u8> {
        match self {
            Self::Error => ERROR_SENTINEL.to_vec(),
            Self::ObjectInfo { info, content } => {
                let mut buf = Vec::with_capacity(OBJECT_INFO_LEN + content.len());
                buf.put_slice(CommandKey::OID.as_bytes());
                put_object_id(&mut buf, &info.id);
                put_object_id(&mut buf, &info.delta_base);
                buf.put_i64_le(info.disk_size);
                buf.put_u32_le(info.size);
                buf.put_u32_le(0);
                buf.put_u32_le(info.whence.code());
                buf.put_i32_le(info.object_type.code());
                buf.put_slice(content);
                buf
            }
            Self::HashResult { id } => {
                let mut buf = Vec::with_capacity(HASH_RESULT_LEN);
                buf.put_slice(CommandKey::HASH_OBJECT.as_bytes());
                put_object_id(&mut buf, id);
                buf
            }
        }
    }

    pub(crate) fn decode_payload(payload: &[u8]) -> ProtocolResult<Self> {
        if payload == ERROR_SENTINEL {
            return Ok(Self::Error);
        }
        let (key, mut body) = split_key(payload)?;
        if key == CommandKey::OID {
            if payload.len() < OBJECT_INFO_LEN {
                return Err(ProtocolError::InvalidPayload(format!(
                    "object-info payload is {} bytes, need at least {OBJECT_INFO_LEN}",
                    payload.len()
                )));
            }
            let id = get_object_id(&mut body)?;
            let delta_base = get_object_id(&mut body)?;
            let disk_size = body.get_i64_le();
            let size = body.get_u32_le();
            body.advance(4);
            let whence_code = body.get_u32_le();
            let whence = Whence::from_code(whence_code).ok_or_else(|| {
                ProtocolError::InvalidPayload(format!("unknown whence {whence_code}"))
            })?;
            let object_type = ObjectType::from_code(body.get_i32_le())
                .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
            if !body.is_empty() && body.len() as u64 != u64::from(size) {
                return Err(ProtocolError::SizeMismatch {
                    declared: u64::from(size),
                    actual: body.len() as u64,
                });
            }
            Ok(Self::ObjectInfo {
                info: ObjectInfo {
                    id,
                    delta_base,
                    disk_size,
                    size,
                    whence,
                    object_type,
                },
                content: Bytes::copy_from_slice(body),
            })
        } else if key == CommandKey::HASH_OBJECT {
            expect_len("hash-result", payload.len(), HASH_RESULT_LEN)?;
            Ok(Self::HashResult {
                id: get_object_id(&mut body)?,
            })
        } else {
            Err(ProtocolError::UnknownCommand(key.to_string()))
        }
    }
}

fn split_key(payload: &[u8]) -> ProtocolResult<(CommandKey, &[u8])> {
    if payload.len() < KEY_LEN {
        return Err(ProtocolError::InvalidPayload(format!(
            "payload is {} bytes, shorter than the command key",
            payload.len()
        )));
    }
    let (key, body) = payload.split_at(KEY_LEN);
    let mut raw = [0u8; KEY_LEN];
    raw.copy_from_slice(key);
    Ok((CommandKey::from_bytes(raw), body))
}

fn expect_len(what: &str, actual: usize, expected: usize) -> ProtocolResult<()> {
    if actual != expected {
        return Err(ProtocolError::InvalidPayload(format!(
            "{what} payload is {actual} bytes, expected {expected}"
        )));
    }
    Ok(())
}

/// Write `id` as its 32-byte buffer followed by the algorithm tag.
pub fn put_object_id(buf: &mut impl BufMut, id: &ObjectId) {
    buf.put_slice(id.raw());
    buf.put_i32_le(id.algorithm().tag());
}

/// Read an id written by [`put_object_id`]. The caller guarantees
/// [`OBJECT_ID_LEN`] bytes remain.
pub fn get_object_id(buf: &mut impl Buf) -> ProtocolResult<ObjectId> {
    let mut raw = [0u8; MAX_HASH_LEN];
    buf.copy_to_slice(&mut raw);
    let algorithm = HashAlgorithm::from_tag(buf.get_i32_le())
        .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
    Ok(ObjectId::from_raw(algorithm, raw))
}
