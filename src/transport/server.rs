//! # Transport server: authenticated petition intake over TCP.
//!
//! One connection carries one request. After the shared-key handshake the
//! client sends a [`Request`]; submissions stream [`OutputFrame`]s back
//! until the final `Done`, cancellations are acknowledged with a single
//! `Done` once the target petition reaches its terminal state.
//!
//! ## Rules
//! - The handshake completes before any request frame is read; a failed
//!   digest check closes the connection.
//! - A dropped message (malformed extras, duplicate id) produces **no**
//!   error frame — the connection simply closes, which clients read as
//!   success with no output.
//! - A client disconnecting mid-stream only tears down its own connection
//!   task; the petition keeps running.

use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::Orchestrator;
use crate::error::TransportError;
use crate::events::EventKind;
use crate::petitions::{PetitionId, Reply};
use crate::transport::auth::{self, AuthKey, Frames};
use crate::transport::message::{OutputFrame, Request};

/// Authenticated TCP front end for an [`Orchestrator`].
pub struct Server {
    listener: TcpListener,
    orchestrator: Arc<Orchestrator>,
    key: AuthKey,
}

impl Server {
    /// Binds the listener.
    pub async fn bind(
        addr: impl ToSocketAddrs,
        orchestrator: Arc<Orchestrator>,
        key: AuthKey,
    ) -> std::io::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
            orchestrator,
            key,
        })
    }

    /// Returns the bound address (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until `token` fires; each connection is served by
    /// its own task, so a misbehaving client never blocks intake.
    pub async fn serve(self, token: CancellationToken) -> Result<(), TransportError> {
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    debug!(%peer, "client connected");
                    let orchestrator = self.orchestrator.clone();
                    let key = self.key.clone();
                    let conn_token = token.child_token();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, orchestrator, key, conn_token).await {
                            debug!(%peer, error = %err, "connection ended");
                        }
                    });
                }
            }
        }
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    orchestrator: Arc<Orchestrator>,
    key: AuthKey,
    token: CancellationToken,
) -> Result<(), TransportError> {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    auth::server_handshake(&mut framed, &key).await?;

    let frame = framed.next().await.ok_or(TransportError::Closed)??;
    let request: Request = serde_json::from_slice(&frame)?;

    match request {
        Request::Submit { message } => handle_submit(framed, orchestrator, message, token).await,
        Request::Cancel { id } => handle_cancel(framed, orchestrator, id, token).await,
    }
}

async fn handle_submit(
    mut framed: Frames,
    orchestrator: Arc<Orchestrator>,
    message: crate::transport::Message,
    token: CancellationToken,
) -> Result<(), TransportError> {
    let (reply, mut rx) = Reply::channel();
    if orchestrator.submit(message, reply).is_none() {
        // dropped silently; closing the stream reads as success/no output
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            frame = rx.recv() => {
                let Some(frame) = frame else {
                    // reply sender gone without Done; closure means success
                    return Ok(());
                };
                let is_done = matches!(frame, OutputFrame::Done { .. });
                let payload = serde_json::to_vec(&frame)?;
                if let Err(err) = framed.send(Bytes::from(payload)).await {
                    // client went away mid-stream; the petition keeps running
                    warn!(%err, "client disconnected mid-stream");
                    return Ok(());
                }
                if is_done {
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_cancel(
    mut framed: Frames,
    orchestrator: Arc<Orchestrator>,
    id: PetitionId,
    token: CancellationToken,
) -> Result<(), TransportError> {
    // subscribe before requesting so the finish event cannot be missed
    let mut events = orchestrator.bus().subscribe();
    orchestrator.cancel(id.clone());

    let id_str = id.to_string();
    if orchestrator.is_live(&id) {
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                ev = events.recv() => match ev {
                    Ok(ev) => {
                        if ev.kind == EventKind::PetitionFinished
                            && ev.petition.as_deref() == Some(id_str.as_str())
                        {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        // may have missed the finish event; re-check directly
                        if !orchestrator.is_live(&id) {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    let ack = serde_json::to_vec(&OutputFrame::Done { code: None })?;
    framed.send(Bytes::from(ack)).await?;
    Ok(())
}
