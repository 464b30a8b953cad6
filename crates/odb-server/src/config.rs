use std::path::{Path, PathBuf};
use std::time::Duration;

use odb_store::BackendKind;
use odb_types::HashAlgorithm;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Socket file name used when none is configured.
pub const DEFAULT_SOCKET_NAME: &str = "odb-over-ipc";

/// Daemon settings, usually read from a TOML file and then overridden from
/// the command line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub repo_dir: PathBuf,
    pub socket_name: String,
    pub backend: BackendKind,
    /// Database file for the SQLite backend; `<repo_dir>/objects/odb.sqlite3`
    /// when unset.
    pub sqlite_path: Option<PathBuf>,
    pub hash_algorithm: HashAlgorithm,
    pub max_connections: usize,
    pub shutdown_grace_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("."),
            socket_name: DEFAULT_SOCKET_NAME.to_string(),
            backend: BackendKind::default(),
            sqlite_path: None,
            hash_algorithm: HashAlgorithm::default(),
            max_connections: 256,
            shutdown_grace_ms: 500,
        }
    }
}

impl DaemonConfig {
    pub fn for_repo(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            ..Self::default()
        }
    }

    /// Read a TOML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> ServerResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.socket_name.is_empty() || self.socket_name.contains('/') {
            return Err(ServerError::Config(format!(
                "socket_name must be a plain file name, got {:?}",
                self.socket_name
            )));
        }
        if self.max_connections == 0 {
            return Err(ServerError::Config("max_connections must be at least 1".into()));
        }
        Ok(())
    }

    pub fn socket_path(&self) -> PathBuf {
        self.repo_dir.join(&self.socket_name)
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| self.repo_dir.join("objects").join("odb.sqlite3"))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
