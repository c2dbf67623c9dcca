//! # Transport client.
//!
//! [`Client`] connects to an orchestrator service, authenticates with the
//! shared key and either submits a [`Message`] (returning a
//! [`PetitionStream`] of output lines plus a final exit code) or cancels a
//! live petition by id.
//!
//! ## Rules
//! - A stream that closes without a `Done` frame reads as success with
//!   exit code 0 — mid-stream disconnection is not an error for the
//!   consumer.
//! - `Done { code: None }` also maps to exit code 0.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::TransportError;
use crate::petitions::PetitionId;
use crate::transport::auth::{self, AuthKey, Frames};
use crate::transport::message::{Message, OutputFrame, Request};

/// Client for an orchid service.
///
/// ## Example
/// ```no_run
/// use orchid::{AuthKey, Client, Message};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::new("127.0.0.1:50000", AuthKey::new(b"secret".to_vec()));
///     let message = Message::new("a").with_extra("counter", 3);
///     let stream = client.submit(message).await?;
///     let code = stream.drain(|line| println!("{line}")).await?;
///     std::process::exit(code);
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    addr: String,
    key: AuthKey,
}

impl Client {
    /// Creates a client for `addr` using the given shared key.
    pub fn new(addr: impl Into<String>, key: AuthKey) -> Self {
        Self {
            addr: addr.into(),
            key,
        }
    }

    async fn connect(&self) -> Result<Frames, TransportError> {
        let stream = TcpStream::connect(&self.addr).await?;
        let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
        auth::client_handshake(&mut framed, &self.key).await?;
        Ok(framed)
    }

    /// Submits a message and returns the petition's output stream.
    pub async fn submit(&self, message: Message) -> Result<PetitionStream, TransportError> {
        let mut framed = self.connect().await?;
        let payload = serde_json::to_vec(&Request::Submit { message })?;
        framed.send(Bytes::from(payload)).await?;
        Ok(PetitionStream { framed })
    }

    /// Cancels a live petition.
    ///
    /// Resolves once the service confirms the petition reached its terminal
    /// state (or the connection closes, which is treated the same way).
    pub async fn cancel(&self, id: impl Into<PetitionId>) -> Result<(), TransportError> {
        let mut framed = self.connect().await?;
        let payload = serde_json::to_vec(&Request::Cancel { id: id.into() })?;
        framed.send(Bytes::from(payload)).await?;

        match framed.next().await {
            None => Ok(()),
            Some(Ok(frame)) => {
                let _: OutputFrame = serde_json::from_slice(&frame)?;
                Ok(())
            }
            Some(Err(err)) => Err(err.into()),
        }
    }
}

/// Streaming view of one submitted petition.
#[derive(Debug)]
pub struct PetitionStream {
    framed: Frames,
}

impl PetitionStream {
    /// Receives the next frame, or `None` when the service closed the
    /// stream without a final frame.
    pub async fn recv(&mut self) -> Result<Option<OutputFrame>, TransportError> {
        match self.framed.next().await {
            None => Ok(None),
            Some(Ok(bytes)) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Some(Err(err)) => Err(err.into()),
        }
    }

    /// Consumes the stream, invoking `on_line` per output line, and returns
    /// the exit code. Channel closure and `Done { code: None }` both map to
    /// 0.
    pub async fn drain(mut self, mut on_line: impl FnMut(&str)) -> Result<i32, TransportError> {
        loop {
            match self.recv().await? {
                Some(OutputFrame::Line { text }) => on_line(&text),
                Some(OutputFrame::Done { code }) => return Ok(code.unwrap_or(0)),
                None => return Ok(0),
            }
        }
    }
}
