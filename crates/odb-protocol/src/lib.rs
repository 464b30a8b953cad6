//! Wire protocol for the object database daemon.
//!
//! Messages travel as length-prefixed frames (see [`pkt`]), each followed by
//! a flush packet. Payloads begin with a 16-byte command key and continue
//! with a fixed little-endian struct; see [`message`] for the layouts.

pub mod codec;
pub mod error;
pub mod message;
pub mod pkt;

pub use codec::OdbCodec;
pub use error::{ProtocolError, ProtocolResult};
pub use message::{CommandKey, ObjectInfo, Request, Response, HASH_OBJECT_WRITE};
pub use pkt::{Frame, FLUSH, MAX_FRAME_LEN};
