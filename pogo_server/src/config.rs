//! Server configuration (§6.2): defaults, overridden by an optional TOML
//! file, overridden by `POGO_`-prefixed environment variables, in the
//! manner of `cmdlib`'s layered `clap`-based argument parsing over a
//! config file. Flags win over the file, which wins over the defaults
//! baked into `Cli`'s `#[arg(default_value_t = ...)]` annotations.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

/// Matches the client's own upload concurrency cap (§6.2) so neither side
/// is structurally the bottleneck.
const DEFAULT_UPLOAD_CONCURRENCY: usize = 8;
const DEFAULT_GC_INTERVAL_SECS: u64 = 3600;

#[derive(Parser, Debug)]
#[command(name = "pogo_server", about = "Centralized change-graph server")]
struct Cli {
    /// Optional TOML file layered between the built-in defaults and
    /// environment overrides.
    #[arg(long)]
    config_file: Option<PathBuf>,

    #[arg(long, env = "POGO_LISTEN_ADDR")]
    listen_addr: Option<SocketAddr>,

    #[arg(long, env = "POGO_BLOB_HTTP_ADDR")]
    blob_http_addr: Option<SocketAddr>,

    #[arg(long, env = "POGO_OBJECT_STORE_ROOT")]
    object_store_root: Option<PathBuf>,

    #[arg(long, env = "POGO_DATABASE_PATH")]
    database_path: Option<PathBuf>,

    #[arg(long, env = "POGO_GC_INTERVAL_SECS")]
    gc_interval_secs: Option<u64>,

    #[arg(long, env = "POGO_UPLOAD_CONCURRENCY")]
    upload_concurrency: Option<usize>,

    #[arg(long, env = "POGO_LOG_LEVEL")]
    log_level: Option<String>,
}

/// On-disk shape of the optional TOML config file; every field is
/// optional so a file only needs to mention what it overrides.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    listen_addr: Option<SocketAddr>,
    blob_http_addr: Option<SocketAddr>,
    object_store_root: Option<PathBuf>,
    database_path: Option<PathBuf>,
    gc_interval_secs: Option<u64>,
    upload_concurrency: Option<usize>,
    log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub blob_http_addr: SocketAddr,
    pub object_store_root: PathBuf,
    pub database_path: PathBuf,
    pub gc_interval: std::time::Duration,
    pub upload_concurrency: usize,
    pub log_level: slog::Level,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7420".parse().unwrap(),
            blob_http_addr: "127.0.0.1:7421".parse().unwrap(),
            object_store_root: PathBuf::from("./pogo-data/objects"),
            database_path: PathBuf::from("./pogo-data/pogo.sqlite3"),
            gc_interval: std::time::Duration::from_secs(DEFAULT_GC_INTERVAL_SECS),
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            log_level: slog::Level::Info,
        }
    }
}

/// Parses `argv`, then layers defaults → TOML file → environment/flags
/// (`clap`'s `env` attribute already folds environment variables into the
/// parsed flags, so by the time we get `Cli` back, only the file layer
/// needs to be applied underneath it).
pub fn load() -> Result<ServerConfig> {
    let cli = Cli::parse();
    load_from(cli)
}

fn load_from(cli: Cli) -> Result<ServerConfig> {
    let mut config = ServerConfig::default();

    if let Some(path) = &cli.config_file {
        apply_file(&mut config, path)?;
    }

    if let Some(v) = cli.listen_addr {
        config.listen_addr = v;
    }
    if let Some(v) = cli.blob_http_addr {
        config.blob_http_addr = v;
    }
    if let Some(v) = cli.object_store_root {
        config.object_store_root = v;
    }
    if let Some(v) = cli.database_path {
        config.database_path = v;
    }
    if let Some(v) = cli.gc_interval_secs {
        config.gc_interval = std::time::Duration::from_secs(v);
    }
    if let Some(v) = cli.upload_concurrency {
        config.upload_concurrency = v;
    }
    if let Some(v) = cli.log_level {
        config.log_level = parse_level(&v)?;
    }

    Ok(config)
}

fn apply_file(config: &mut ServerConfig, path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    let file: FileConfig = toml::from_str(&raw)
        .with_context(|| format!("parse config file {}", path.display()))?;

    if let Some(v) = file.listen_addr {
        config.listen_addr = v;
    }
    if let Some(v) = file.blob_http_addr {
        config.blob_http_addr = v;
    }
    if let Some(v) = file.object_store_root {
        config.object_store_root = v;
    }
    if let Some(v) = file.database_path {
        config.database_path = v;
    }
    if let Some(v) = file.gc_interval_secs {
        config.gc_interval = std::time::Duration::from_secs(v);
    }
    if let Some(v) = file.upload_concurrency {
        config.upload_concurrency = v;
    }
    if let Some(v) = file.log_level {
        config.log_level = parse_level(&v)?;
    }
    Ok(())
}

fn parse_level(raw: &str) -> Result<slog::Level> {
    raw.parse()
        .map_err(|_| anyhow::anyhow!("unrecognized log level '{raw}'"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_overrides_them() {
        let config = ServerConfig::default();
        assert_eq!(config.upload_concurrency, DEFAULT_UPLOAD_CONCURRENCY);
    }

    #[test]
    fn file_layer_overrides_defaults_and_flags_override_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pogo.toml");
        std::fs::write(&path, "upload_concurrency = 4\nlog_level = \"debug\"\n").unwrap();

        let cli = Cli {
            config_file: Some(path),
            listen_addr: None,
            blob_http_addr: None,
            object_store_root: None,
            database_path: None,
            gc_interval_secs: None,
            upload_concurrency: Some(16),
            log_level: None,
        };
        let config = load_from(cli).unwrap();
        assert_eq!(config.upload_concurrency, 16);
        assert_eq!(config.log_level, slog::Level::Debug);
    }
}
