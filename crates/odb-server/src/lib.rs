//! Object database daemon.
//!
//! Serves a content-addressed object store to local clients over a Unix
//! domain socket at `<repo_dir>/odb-over-ipc`.
//!
//! ```text
//! OdbServer (listener)
//!   └── Connection (one task per client)
//!         └── Dispatcher ── Arc<dyn ObjectStore>
//! ```
//!
//! Every per-connection failure is answered with the error sentinel and
//! ends that connection; other connections are unaffected.

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod server;

#[cfg(test)]
mod testing;

pub use client::OdbClient;
pub use config::{DaemonConfig, DEFAULT_SOCKET_NAME};
pub use connection::{CloseReason, Connection, ConnectionState};
pub use dispatcher::{Action, Dispatcher};
pub use error::{ServerError, ServerResult};
pub use server::OdbServer;
