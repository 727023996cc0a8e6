use crate::error::{Result, RpcError};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, lookup_host};
use tokio::time;
use tracing::{debug, info};

/// One connected stream socket to the command server.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
}

/// Resolves `host`, opens a stream socket and connects it.
///
/// Resolution happens before any socket is allocated, so an unknown host
/// never costs a descriptor.
pub async fn connect(host: &str, port: u16) -> Result<Connection> {
    let addr = resolve(host, port).await?;
    debug!("Resolved {} to {}", host, addr);

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(RpcError::Socket)?;

    // socket2 only offers a blocking connect
    let socket = tokio::task::spawn_blocking(move || {
        socket.connect(&addr.into()).map(|_| socket)
    })
    .await
    .map_err(|e| RpcError::Connect {
        addr,
        source: std::io::Error::other(e),
    })?
    .map_err(|source| RpcError::Connect { addr, source })?;

    let stream = into_tokio(socket).map_err(RpcError::io("configure"))?;
    info!("Connected to {}", addr);

    Ok(Connection { stream, peer: addr })
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|e| RpcError::Resolution {
            host: host.to_string(),
            reason: e.to_string(),
        })?;

    addrs.next().ok_or_else(|| RpcError::Resolution {
        host: host.to_string(),
        reason: "no addresses returned".to_string(),
    })
}

fn into_tokio(socket: Socket) -> std::io::Result<TcpStream> {
    socket.set_nonblocking(true)?;
    let stream = TcpStream::from_std(socket.into())?;

    // disable Nagle so each fixed-size record leaves immediately
    stream.set_nodelay(true)?;
    Ok(stream)
}

impl Connection {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    /// Waits until the socket has bytes (or EOF) to read, re-arming the wait
    /// each time `timeout` elapses without an event. `limit` caps the number
    /// of rounds; `None` waits for as long as it takes.
    ///
    /// Readiness is confirmed with a peek on the socket itself; cached
    /// readiness left over from the previous response does not count.
    pub async fn wait_readable(&self, timeout: Duration, limit: Option<u32>) -> Result<u32> {
        let mut peeked = [0u8; 1];
        let mut rounds = 0u32;
        loop {
            rounds += 1;
            match time::timeout(timeout, self.stream.peek(&mut peeked)).await {
                Ok(ready) => {
                    ready.map_err(RpcError::io("poll"))?;
                    return Ok(rounds);
                }
                Err(_) => {
                    if limit.is_some_and(|limit| rounds >= limit) {
                        return Err(RpcError::PollExhausted { rounds });
                    }
                }
            }
        }
    }

    /// Shuts the socket down and releases it. Consumes the connection, so it
    /// can only happen once.
    pub async fn close(mut self) -> Result<()> {
        debug!("Closing connection to {}", self.peer);
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(RpcError::io("close")(e)),
        }
    }
}
