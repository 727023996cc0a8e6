use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::process::ExitCode;
use tracing::info;
use wkrpc::RpcError;
use wkrpc::calibrate::CalibrationCache;
use wkrpc::config::{Cli, Config, FileConfig};
use wkrpc::connection;
use wkrpc::driver::Driver;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let file = match cli.config.as_deref() {
        Some(path) => match FileConfig::from_file(path) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("error: loading config {}: {:#}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => FileConfig::default(),
    };

    let config = match Config::resolve(cli, file) {
        Ok(config) => config,
        Err(e @ RpcError::Usage(_)) => {
            eprintln!("error: {}", e);
            let _ = Cli::command().write_help(&mut std::io::stderr());
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let filter = if config.verbose {
        "wkrpc=debug,info"
    } else {
        "wkrpc=info,warn"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let units_per_ms = CalibrationCache::new(config.calibration_file.clone()).load_or_compute();
    info!("count={}", units_per_ms);

    let mut conn = connection::connect(&config.server, config.port)
        .await
        .with_context(|| format!("connecting to {}:{}", config.server, config.port))?;

    let report = Driver::new(&mut conn, &config, units_per_ms)
        .run()
        .await
        .context("request loop")?;

    conn.close().await.context("closing connection")?;

    let lines = report
        .samples
        .save(&config.output)
        .with_context(|| format!("writing {}", config.output.display()))?;
    if lines > 0 {
        info!("Wrote {} deltas to {}", lines, config.output.display());
    }
    if report.failed > 0 {
        info!("{} of {} requests reported an error status", report.failed, config.repeat);
    }

    Ok(())
}
