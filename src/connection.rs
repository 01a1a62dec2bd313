//! Request/response connection to a dispatch server

use anyhow::{bail, Context, Result};
use dispatch_shared::codec::{self, FrameDecoder};
use dispatch_shared::{Request, RequestEnvelope, Response, ResponseEnvelope};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

pub struct DispatchConnection {
    stream: TcpStream,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
    next_request_id: u64,
    request_timeout: Duration,
}

impl DispatchConnection {
    /// Connect to the server, giving up after `connect_timeout`
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e).with_context(|| format!("connecting to {}", addr)),
            Err(_) => bail!("connecting to {} timed out after {:?}", addr, connect_timeout),
        };
        debug!("Connected to {}", addr);

        Ok(Self {
            stream,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; 8192],
            next_request_id: 1,
            request_timeout,
        })
    }

    /// Send one request and wait for its response
    pub async fn call(&mut self, request: Request) -> Result<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let frame = codec::encode(&RequestEnvelope::new(request_id, request))
            .with_context(|| format!("encoding request {}", request_id))?;
        debug!("Sending request {} ({} bytes)", request_id, frame.len());
        self.stream.write_all(&frame).await?;

        let reply = match timeout(self.request_timeout, self.recv()).await {
            Ok(reply) => reply?,
            Err(_) => bail!(
                "no response to request {} within {:?}",
                request_id,
                self.request_timeout
            ),
        };

        // Id 0 answers a request the server could not read at all
        if reply.header.request_id != request_id && reply.header.request_id != 0 {
            bail!(
                "response for request {} while waiting for {}",
                reply.header.request_id,
                request_id
            );
        }
        Ok(reply.response)
    }

    async fn recv(&mut self) -> Result<ResponseEnvelope> {
        loop {
            if let Some(envelope) = self.decoder.decode_next()? {
                return Ok(envelope);
            }

            let n = self.stream.read(&mut self.read_buf).await?;
            if n == 0 {
                bail!("server closed the connection");
            }
            self.decoder.extend(&self.read_buf[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_shared::protocol::{DroneLookup, ErrorBody};
    use dispatch_shared::ErrorKind;
    use tokio::net::TcpListener;

    /// Answers every request with a `NotFound` error, using `id_of` for the reply id
    async fn fake_server(id_of: fn(u64) -> u64) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut decoder = FrameDecoder::new();
            let mut buf = vec![0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                decoder.extend(&buf[..n]);
                while let Some(request) = decoder.decode_next::<RequestEnvelope>().unwrap() {
                    let reply = ResponseEnvelope::reply(
                        id_of(request.header.request_id),
                        Response::Error(ErrorBody {
                            kind: ErrorKind::NotFound,
                            message: "Drone not found".into(),
                        }),
                    );
                    socket.write_all(&codec::encode(&reply).unwrap()).await.unwrap();
                }
            }
        });

        addr
    }

    fn lookup() -> Request {
        Request::GetDrone(DroneLookup {
            serial_number: "D1".into(),
        })
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let addr = fake_server(|id| id).await;
        let mut conn =
            DispatchConnection::connect(&addr, Duration::from_secs(1), Duration::from_secs(1))
                .await
                .unwrap();

        for _ in 0..2 {
            let response = conn.call(lookup()).await.unwrap();
            assert!(matches!(
                response,
                Response::Error(ErrorBody {
                    kind: ErrorKind::NotFound,
                    ..
                })
            ));
        }
    }

    #[tokio::test]
    async fn test_mismatched_request_id() {
        let addr = fake_server(|id| id + 100).await;
        let mut conn =
            DispatchConnection::connect(&addr, Duration::from_secs(1), Duration::from_secs(1))
                .await
                .unwrap();

        assert!(conn.call(lookup()).await.is_err());
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        // Accept but never answer
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let mut conn =
            DispatchConnection::connect(&addr, Duration::from_secs(1), Duration::from_millis(50))
                .await
                .unwrap();
        let err = conn.call(lookup()).await.unwrap_err();
        assert!(err.to_string().contains("no response"));
    }
}
