//! # Shared-key connection authentication.
//!
//! Challenge/response handshake performed before any request frame:
//!
//! ```text
//! Server                                Client
//!   |  -- challenge (16 random bytes) -->  |
//!   |  <-- HMAC-SHA256(key, challenge) --  |
//!   |  -- "OK" / "NO" ------------------>  |
//! ```
//!
//! The digest comparison is constant-time; a failed check refuses the
//! connection before any request is read.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

use crate::error::TransportError;

type HmacSha256 = Hmac<Sha256>;

/// Length of the server challenge in bytes.
pub const CHALLENGE_LEN: usize = 16;

const ACCEPT: &[u8] = b"OK";
const REJECT: &[u8] = b"NO";

/// Shared secret validated at connection time.
#[derive(Clone)]
pub struct AuthKey {
    secret: Vec<u8>,
}

impl AuthKey {
    /// Wraps raw key material.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Reads the key from `ORCHID_AUTH_KEY`.
    pub fn from_env() -> Option<Self> {
        std::env::var("ORCHID_AUTH_KEY")
            .ok()
            .map(|v| Self::new(v.into_bytes()))
    }

    /// Computes the response digest for a challenge.
    pub(crate) fn digest(&self, challenge: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("hmac accepts keys of any length");
        mac.update(challenge);
        mac.finalize().into_bytes().to_vec()
    }

    /// Constant-time verification of a peer's response digest.
    pub(crate) fn verify(&self, challenge: &[u8], response: &[u8]) -> bool {
        let expected = self.digest(challenge);
        expected.ct_eq(response).into()
    }
}

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print key material
        f.write_str("AuthKey(..)")
    }
}

pub(crate) type Frames = Framed<TcpStream, LengthDelimitedCodec>;

/// Server side of the handshake. Refuses unauthenticated peers.
pub(crate) async fn server_handshake(framed: &mut Frames, key: &AuthKey) -> Result<(), TransportError> {
    let mut challenge = [0u8; CHALLENGE_LEN];
    rand::thread_rng().fill_bytes(&mut challenge);
    framed.send(Bytes::copy_from_slice(&challenge)).await?;

    let response = framed.next().await.ok_or(TransportError::Closed)??;
    if key.verify(&challenge, &response) {
        framed.send(Bytes::from_static(ACCEPT)).await?;
        Ok(())
    } else {
        debug!("digest check failed; refusing connection");
        framed.send(Bytes::from_static(REJECT)).await?;
        Err(TransportError::Unauthorized)
    }
}

/// Client side of the handshake.
pub(crate) async fn client_handshake(framed: &mut Frames, key: &AuthKey) -> Result<(), TransportError> {
    let challenge = framed.next().await.ok_or(TransportError::Closed)??;
    let response = key.digest(&challenge);
    framed.send(Bytes::from(response)).await?;

    let verdict = framed.next().await.ok_or(TransportError::Closed)??;
    if verdict.as_ref() == ACCEPT {
        Ok(())
    } else {
        Err(TransportError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        let key = AuthKey::new(b"secret".to_vec());
        let challenge = [7u8; CHALLENGE_LEN];
        assert_eq!(key.digest(&challenge), key.digest(&challenge));
    }

    #[test]
    fn test_verify_accepts_matching_key() {
        let key = AuthKey::new(b"secret".to_vec());
        let challenge = [1u8; CHALLENGE_LEN];
        let response = key.digest(&challenge);
        assert!(key.verify(&challenge, &response));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let server = AuthKey::new(b"secret".to_vec());
        let client = AuthKey::new(b"guess".to_vec());
        let challenge = [1u8; CHALLENGE_LEN];
        let response = client.digest(&challenge);
        assert!(!server.verify(&challenge, &response));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let key = AuthKey::new(b"super-secret".to_vec());
        assert_eq!(format!("{key:?}"), "AuthKey(..)");
    }
}
