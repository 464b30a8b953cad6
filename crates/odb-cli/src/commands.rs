use std::io::Write;
use std::path::Path;

use anyhow::Context;
use bytes::Bytes;
use colored::Colorize;
use odb_server::{DaemonConfig, OdbClient, OdbServer};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Get(args) => cmd_get(args).await,
        Command::Hash(args) => cmd_hash(args).await,
    }
}

fn build_config(args: &ServeArgs) -> anyhow::Result<DaemonConfig> {
    let mut config = match &args.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    config.repo_dir = std::fs::canonicalize(&args.repo_dir)
        .with_context(|| format!("repository {} not accessible", args.repo_dir.display()))?;
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(name) = &args.socket_name {
        config.socket_name = name.clone();
    }
    if let Some(hash) = args.hash {
        config.hash_algorithm = hash;
    }
    config.validate()?;
    Ok(config)
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = build_config(&args)?;
    let server = OdbServer::open(config).context("failed to open object store")?;
    server.serve(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

async fn connect(repo_dir: &Path, socket_name: &str) -> anyhow::Result<OdbClient> {
    let socket = repo_dir.join(socket_name);
    OdbClient::connect(&socket)
        .await
        .with_context(|| format!("no daemon answering on {}", socket.display()))
}

async fn cmd_get(args: GetArgs) -> anyhow::Result<()> {
    let mut client = connect(&args.repo_dir, &args.socket_name).await?;
    let (info, content) = client
        .get_object(args.oid, args.content)
        .await
        .with_context(|| format!("object {} not available", args.oid))?;
    client.close().await?;

    if args.content {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&content)?;
        stdout.flush()?;
    } else {
        println!(
            "{} {} {}",
            info.id.to_string().yellow(),
            info.object_type.to_string().cyan(),
            info.size
        );
        println!("  whence: {:?}, disk size: {}", info.whence, info.disk_size);
    }
    Ok(())
}

async fn cmd_hash(args: HashArgs) -> anyhow::Result<()> {
    let data = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("cannot read {}", args.file.display()))?;
    let mut client = connect(&args.repo_dir, &args.socket_name).await?;
    let id = client
        .hash_object(args.object_type, Bytes::from(data), args.write)
        .await?;
    client.close().await?;
    println!("{id}");
    Ok(())
}
