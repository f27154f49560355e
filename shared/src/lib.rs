//! # Shared Messaging Layer
//!
//! Protocol types and delivery mechanics used by both the server and the
//! client. Everything that touches the wire lives here so both sides agree on
//! the format and the reliability rules.
//!
//! ## Module Organization
//!
//! - `message`: the `Message` value object, its tagged parameter values and
//!   the `OutgoingMessage` (message + destination) pair
//! - `codec`: text encoding/decoding of messages
//! - `reliable`: sliding-window sender with ACK tracking and timeout scan
//! - `retry`: the retry policy consuming the sender's timeout reports
//! - `ack`: batched ACK generation for inbound reliable messages
//! - `transport`: the single reader and single writer task per socket
//! - `config`: tunables, loadable from TOML
//!
//! ## Delivery Paths
//!
//! Reliable messages go through `ReliableUdpSender::send`, which stamps an id
//! and a sequence number and keeps the message pending until the peer ACKs it.
//! Best-effort messages are pushed straight onto the socket's outbound queue.
//! Both paths end in the same writer task, so a socket only ever has one
//! writer.

pub mod ack;
pub mod codec;
pub mod config;
pub mod error;
pub mod message;
pub mod reliable;
pub mod retry;
pub mod transport;

pub use ack::AckProcessor;
pub use codec::{decode, decode_bytes, encode};
pub use config::MessagingConfig;
pub use error::{CodecError, ConfigError};
pub use message::{Message, MessageOption, OutgoingMessage, Value, ACK};
pub use reliable::{ReliableUdpSender, RetryReceiver, RetrySender, SendOutcome};
pub use retry::{spawn_retry_loop, RetryDecision, RetryPolicy};
pub use transport::{
    outbound_channel, spawn_socket_reader, spawn_socket_writer, Inbound, OutboundQueue,
    OutboundReceiver,
};

/// Well-known server port
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Username the server puts in the concealed parameters of its own messages
pub const SERVER_USERNAME: &str = "SERVER";
