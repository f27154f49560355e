//! # Lobby Client Library
//!
//! Terminal client for the UDP lobby server. It speaks the same text wire
//! format and uses the same reliability machinery as the server, from the
//! `shared` crate.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Parses typed lines (`/ping`, `/w bob hi`, plain chat, ...) into protocol
//! messages and picks the delivery path for each:
//! - requests go through the reliable sender
//! - `/game` updates go best-effort
//!
//! ### Network Module (`network`)
//! Owns the socket and the background tasks (reader, writer, ACK flusher,
//! timeout scanner and retry loop), ACKs every reliable message the server
//! sends, and turns server messages into terminal output.
//!
//! Every outgoing message carries `[session, game, username]` as its
//! concealed parameters; the server identifies the sender by the last one.

pub mod input;
pub mod network;

pub use input::{parse_line, Command, Identity, InputError};
pub use network::{describe, Client, ClientError, Event};
