//! mysqlmock server entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mysqlmock::{MemoryBackend, Server, ServerConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind (overrides the config file)
    #[arg(short, long)]
    bind: Option<String>,

    /// Password every user authenticates with (overrides the config file)
    #[arg(long)]
    password: Option<String>,

    /// Log level, used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// JSON snapshot for the in-memory backend, loaded at start and
    /// rewritten after every change
    #[arg(short, long)]
    data: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = build_config(&args)?;
    config.validate().context("invalid configuration")?;
    info!(
        addr = %config.socket_addr(),
        version = %config.server_version,
        plugin = config.auth_plugin.name(),
        "starting mysqlmock"
    );

    let backend = match &args.data {
        Some(path) => open_backend(path)?,
        None => MemoryBackend::new(),
    };

    let server = Server::bind(config, Arc::new(backend)).context("failed to bind listener")?;
    server.serve().context("server stopped")?;
    Ok(())
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .init();
}

/// File values first, then command-line overrides.
fn build_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config = config.port(port);
    }
    if let Some(bind) = &args.bind {
        config = config.bind_address(bind.clone());
    }
    if let Some(password) = &args.password {
        config = config.password(password.clone());
    }
    Ok(config)
}

fn open_backend(path: &Path) -> anyhow::Result<MemoryBackend> {
    MemoryBackend::open(path)
        .with_context(|| format!("failed to open snapshot {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from(["mysqlmock", "--port", "3307", "--password", "pw"]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.port, 3307);
        assert_eq!(config.password, "pw");
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(args.log_level, "info");
        assert!(args.data.is_none());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args = Args::parse_from(["mysqlmock", "--config", "/nonexistent/mysqlmock.json"]);
        let err = build_config(&args).unwrap_err();
        assert!(err.to_string().contains("failed to load config"));
    }
}
