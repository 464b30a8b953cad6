use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use odb_store::BackendKind;
use odb_types::{HashAlgorithm, ObjectId, ObjectType};

#[derive(Parser)]
#[command(
    name = "git-odb-daemon",
    about = "Serve a repository's object database over a local socket",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the daemon until interrupted
    Serve(ServeArgs),
    /// Look up an object through a running daemon
    Get(GetArgs),
    /// Hash a file through a running daemon, optionally storing it
    Hash(HashArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Repository directory; the socket is created inside it
    pub repo_dir: PathBuf,
    /// Storage backend (filesystem, memory, sqlite)
    #[arg(long)]
    pub backend: Option<BackendKind>,
    /// TOML config file; flags given here override it
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub socket_name: Option<String>,
    /// Object id hash (sha1, sha256)
    #[arg(long)]
    pub hash: Option<HashAlgorithm>,
}

#[derive(Args)]
pub struct GetArgs {
    pub repo_dir: PathBuf,
    pub oid: ObjectId,
    /// Write the object's content to stdout instead of its summary
    #[arg(long)]
    pub content: bool,
    #[arg(long, default_value = odb_server::DEFAULT_SOCKET_NAME)]
    pub socket_name: String,
}

#[derive(Args)]
pub struct HashArgs {
    pub repo_dir: PathBuf,
    pub file: PathBuf,
    #[arg(long = "type", default_value = "blob")]
    pub object_type: ObjectType,
    /// Store the object as well as hashing it
    #[arg(long)]
    pub write: bool,
    #[arg(long, default_value = odb_server::DEFAULT_SOCKET_NAME)]
    pub socket_name: String,
}
