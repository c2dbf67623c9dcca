//! # Client/server transport: framing, authentication, request routing.
//!
//! Frames are 4-byte length-prefixed JSON. Every connection authenticates
//! with the shared-key challenge/response before its single [`Request`] is
//! read.
//!
//! Contents:
//! - [`Message`], [`Request`], [`OutputFrame`] — wire types
//! - [`AuthKey`] — shared secret + digest handshake
//! - [`Server`] — accept loop feeding an [`Orchestrator`](crate::Orchestrator)
//! - [`Client`], [`PetitionStream`] — submission and cancellation API

mod auth;
mod client;
mod message;
mod server;

pub use auth::{AuthKey, CHALLENGE_LEN};
pub use client::{Client, PetitionStream};
pub use message::{Message, OutputFrame, Request};
pub use server::Server;
