use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Failures that abort a measurement run.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("{0}")]
    Usage(String),

    #[error("failed to resolve {host}: {reason}")]
    Resolution { host: String, reason: String },

    #[error("socket() failed: {0}")]
    Socket(#[source] io::Error),

    #[error("connect() to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("{op}() failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("malformed record: {0}")]
    Codec(#[from] bincode::Error),

    #[error("server not readable after {rounds} poll rounds")]
    PollExhausted { rounds: u32 },
}

impl RpcError {
    pub(crate) fn io(op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| RpcError::Io { op, source }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
