use anyhow::Result;
use std::net::SocketAddr;
use tracing::info;
use wkrpc::calibrate::CalibrationCache;
use wkrpc::config::DEFAULT_PORT;
use wkrpc::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("wkrpc=debug,info")
        .init();

    let listen_addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("0.0.0.0:{}", DEFAULT_PORT))
        .parse()?;

    let units_per_ms = CalibrationCache::new(CalibrationCache::default_path()).load_or_compute();
    info!("count={}", units_per_ms);

    Server::new(listen_addr, units_per_ms).run().await
}
