use crate::calibrate::hog;
use crate::error::RpcError;
use crate::protocol::{Command, Message, read_message, write_message};
use anyhow::Result;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Minimal command server speaking the fixed-record protocol.
pub struct Server {
    listen_addr: SocketAddr,
    units_per_ms: u64,
}

impl Server {
    pub fn new(listen_addr: SocketAddr, units_per_ms: u64) -> Self {
        Self {
            listen_addr,
            units_per_ms,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        info!("Listening on {}", self.listen_addr);
        serve(listener, self.units_per_ms).await
    }
}

/// Accepts connections forever, one task per client.
pub async fn serve(listener: TcpListener, units_per_ms: u64) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((socket, client_addr)) => {
                debug!("New connection from {}", client_addr);
                tokio::spawn(async move {
                    if let Err(e) = handle_client(socket, units_per_ms).await {
                        error!("Error handling client {}: {}", client_addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(mut socket: TcpStream, units_per_ms: u64) -> Result<(), RpcError> {
    socket.set_nodelay(true).map_err(RpcError::io("setsockopt"))?;
    let mut served = 0u64;

    loop {
        let request = match read_message(&mut socket).await {
            Ok(request) => request,
            Err(RpcError::Io { source, .. }) if source.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        };

        execute(&request, units_per_ms).await;
        let response = Message {
            status: 0,
            ..request
        };
        write_message(&mut socket, &response).await?;
        served += 1;
    }

    debug!("Client done after {} requests", served);
    Ok(())
}

async fn execute(request: &Message, units_per_ms: u64) {
    let ms = request.argument.max(0) as u64;
    match request.command {
        Command::Ping => {}
        Command::Sleep => tokio::time::sleep(Duration::from_millis(ms)).await,
        Command::Hog => {
            let units = ms.saturating_mul(units_per_ms);
            if let Err(e) = tokio::task::spawn_blocking(move || hog(units)).await {
                error!("Hog task failed: {}", e);
            }
        }
    }
}
