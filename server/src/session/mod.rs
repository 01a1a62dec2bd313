//! Client sessions
//!
//! This module handles:
//! - Accepting client connections
//! - Reading framed requests and writing framed responses
//! - Routing each request to the registry, loading or query side
//!
//! Requests on one connection are answered in order; connections are served
//! concurrently.

mod connection;
mod handler;

pub use connection::ClientSession;
pub use handler::RequestHandler;

use dispatch_shared::codec::CodecError;
use dispatch_shared::{DispatchError, Response, ResponseEnvelope};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Accept connections forever, serving each on its own task
pub async fn serve(listener: TcpListener, handler: Arc<RequestHandler>) -> anyhow::Result<()> {
    loop {
        let (socket, addr) = listener.accept().await?;
        info!("Connection from: {}", addr);

        let handler = handler.clone();
        tokio::spawn(async move {
            let session = ClientSession::new(socket, addr);
            run_session(session, handler).await;
        });
    }
}

/// Answer requests on one connection until the client goes away
pub async fn run_session(mut session: ClientSession, handler: Arc<RequestHandler>) {
    let mut handled = 0u64;

    while let Some(inbound) = session.recv().await {
        let (reply, keep_open) = match inbound {
            Ok(envelope) => {
                let request_id = envelope.header.request_id;
                let response = handler.handle(envelope.request).await;
                (ResponseEnvelope::reply(request_id, response), true)
            }
            Err(e) => {
                warn!("Bad frame from {}: {}", session.addr(), e);
                (frame_error_reply(&e), e.is_recoverable())
            }
        };

        if let Err(e) = session.send(&reply).await {
            error!("Failed to reply to {}: {}", session.addr(), e);
            break;
        }
        handled += 1;

        if !keep_open {
            warn!("Closing {}: stream lost its framing", session.addr());
            break;
        }
    }

    debug!(
        "Session {} handled {} requests in {:?}",
        session.addr(),
        handled,
        session.connected_for()
    );
    info!("Client disconnected: {}", session.addr());
}

/// Reply to a frame that could not be decoded.
///
/// The request id is part of the unread body, so the reply carries id 0.
fn frame_error_reply(e: &CodecError) -> ResponseEnvelope {
    let err = match e {
        CodecError::InvalidLength(_) | CodecError::MessageTooLarge(_) => {
            DispatchError::PayloadTooLarge(e.to_string())
        }
        CodecError::Json(_) => DispatchError::MalformedRequest(e.to_string()),
    };
    ResponseEnvelope::reply(0, Response::error(&err))
}
