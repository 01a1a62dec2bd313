//! Individual client connection handling

use anyhow::Result;
use dispatch_shared::codec::{self, CodecError, FrameDecoder};
use dispatch_shared::{RequestEnvelope, ResponseEnvelope};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Uploads arrive in frames of several MiB
const READ_BUF_SIZE: usize = 64 * 1024;

/// Active client connection
pub struct ClientSession {
    addr: SocketAddr,
    reader: ReadHalf<TcpStream>,
    writer: WriteHalf<TcpStream>,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
    connected_at: Instant,
}

impl ClientSession {
    /// Create a new client session from a TCP stream
    pub fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        let (reader, writer) = tokio::io::split(stream);

        Self {
            addr,
            reader,
            writer,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; READ_BUF_SIZE],
            connected_at: Instant::now(),
        }
    }

    /// Read the next request from this session.
    ///
    /// Returns `None` once the connection is closed. Decode errors come back
    /// as `Some(Err(..))`; the stream is only usable afterwards if
    /// `CodecError::is_recoverable` says so.
    pub async fn recv(&mut self) -> Option<Result<RequestEnvelope, CodecError>> {
        loop {
            // First try to decode from existing buffer
            match self.decoder.decode_next::<RequestEnvelope>() {
                Ok(Some(envelope)) => {
                    debug!(
                        "[{}] Request {} ({} bytes still buffered)",
                        self.addr,
                        envelope.header.request_id,
                        self.decoder.buffer_len()
                    );
                    return Some(Ok(envelope));
                }
                Ok(None) => {
                    // Need more data
                }
                Err(e) => return Some(Err(e)),
            }

            // Read more data
            match self.reader.read(&mut self.read_buf).await {
                Ok(0) => return None, // Connection closed
                Ok(n) => {
                    self.decoder.extend(&self.read_buf[..n]);
                }
                Err(e) => {
                    warn!("Read error from {}: {}", self.addr, e);
                    return None;
                }
            }
        }
    }

    /// Send a response to this client
    pub async fn send(&mut self, envelope: &ResponseEnvelope) -> Result<()> {
        let encoded = codec::encode(envelope)?;
        self.writer.write_all(&encoded).await?;
        Ok(())
    }

    /// Get the remote address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn connected_for(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}
