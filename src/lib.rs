//! Latency harness for the wk-rpc fixed-record request/response protocol.
//!
//! A run calibrates local busy-work, connects once, drives `repeat`
//! synchronous requests and writes the gaps between consecutive sends.

pub mod calibrate;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod server;
pub mod stats;

pub use error::{Result, RpcError};
