use crate::calibrate::CalibrationCache;
use crate::error::RpcError;
use crate::protocol::Command;
use crate::stats::DEFAULT_OUTPUT_FILE;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 9876;
pub const DEFAULT_DELAY_MS: i32 = 10;

/// Measure request latency against a wk-rpc command server.
#[derive(Debug, Parser)]
#[command(name = "wkrpc", version, about)]
pub struct Cli {
    /// Server address
    #[arg(long)]
    pub server: Option<String>,

    /// Server port [default: 9876]
    #[arg(long)]
    pub port: Option<u16>,

    /// Server side operation delay (ms) [default: 10]
    #[arg(long)]
    pub delay: Option<i32>,

    /// Amount of asynchronous processing per request (ms)
    #[arg(long = "async")]
    pub async_ms: Option<u64>,

    /// Command to execute on the server [default: hog]
    #[arg(long, value_enum)]
    pub command: Option<Command>,

    /// Poll timeout before each read (ms, 0 disables polling)
    #[arg(long = "poll")]
    pub poll_ms: Option<u64>,

    /// Give up after this many empty poll rounds
    #[arg(long)]
    pub poll_limit: Option<u32>,

    /// Number of requests to send [default: 1]
    #[arg(long)]
    pub repeat: Option<u32>,

    /// Be more verbose
    #[arg(long, short)]
    pub verbose: bool,

    /// TOML file with default values for any of these options
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Where to write the inter-request deltas [default: rpc-stats.out]
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Calibration cache file [default: $HOME/.wk-calibrate]
    #[arg(long)]
    pub calibration_file: Option<PathBuf>,
}

/// Optional values read from a TOML file; the CLI overrides each of them.
#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub delay: Option<i32>,
    #[serde(rename = "async")]
    pub async_ms: Option<u64>,
    pub command: Option<Command>,
    #[serde(rename = "poll")]
    pub poll_ms: Option<u64>,
    pub poll_limit: Option<u32>,
    pub repeat: Option<u32>,
    pub verbose: Option<bool>,
    pub output: Option<PathBuf>,
    pub calibration_file: Option<PathBuf>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FileConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Immutable parameters of one measurement run.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: String,
    pub port: u16,
    pub command: Command,
    pub delay_ms: i32,
    pub async_ms: u64,
    pub repeat: u32,
    pub poll: Option<Duration>,
    pub poll_limit: Option<u32>,
    pub verbose: bool,
    pub output: PathBuf,
    pub calibration_file: Option<PathBuf>,
}

impl Config {
    /// Layers CLI arguments over `file` and fills in the defaults.
    pub fn resolve(cli: Cli, file: FileConfig) -> Result<Self, RpcError> {
        let server = cli
            .server
            .or(file.server)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RpcError::Usage("server address must be specified".to_string()))?;

        let repeat = cli.repeat.or(file.repeat).unwrap_or(1);
        if repeat == 0 {
            return Err(RpcError::Usage("repeat must be at least 1".to_string()));
        }

        let poll = cli
            .poll_ms
            .or(file.poll_ms)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Ok(Self {
            server,
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
            command: cli.command.or(file.command).unwrap_or(Command::Hog),
            delay_ms: cli.delay.or(file.delay).unwrap_or(DEFAULT_DELAY_MS),
            async_ms: cli.async_ms.or(file.async_ms).unwrap_or(0),
            repeat,
            poll,
            poll_limit: cli.poll_limit.or(file.poll_limit),
            verbose: cli.verbose || file.verbose.unwrap_or(false),
            output: cli
                .output
                .or(file.output)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_FILE)),
            calibration_file: cli
                .calibration_file
                .or(file.calibration_file)
                .or_else(CalibrationCache::default_path),
        })
    }
}
