use crate::error::{Result, RpcError};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of one record on the wire: a 32-bit command tag and three 32-bit fields.
pub const RECORD_SIZE: usize = 16;

/// Server-side behavior selected by a request. The declaration order is the
/// wire tag, so new variants go at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Ping,
    Hog,
    Sleep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub command: Command,
    pub argument: i32,
    pub remaining: i32,
    pub status: i32,
}

impl Message {
    pub fn request(command: Command, argument: i32, remaining: i32) -> Self {
        Self {
            command,
            argument,
            remaining,
            status: 0,
        }
    }

    pub fn encode(&self) -> Result<[u8; RECORD_SIZE]> {
        let bytes = bincode::serialize(self)?;
        bytes.try_into().map_err(|bytes: Vec<u8>| {
            RpcError::Codec(Box::new(bincode::ErrorKind::Custom(format!(
                "encoded record is {} bytes, expected {}",
                bytes.len(),
                RECORD_SIZE
            ))))
        })
    }

    pub fn decode(bytes: &[u8; RECORD_SIZE]) -> Result<Self> {
        let message = bincode::deserialize(bytes)?;
        Ok(message)
    }
}

/// Writes one whole record.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = message.encode()?;
    writer.write_all(&bytes).await.map_err(RpcError::io("write"))?;
    Ok(())
}

/// Reads one whole record. A stream that ends mid-record is an I/O error.
pub async fn read_message<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; RECORD_SIZE];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(RpcError::io("read"))?;
    Message::decode(&buf)
}
