//! # Lobby Server Library
//!
//! Server side of the UDP messaging substrate. It owns one socket, keeps a
//! registry of clients keyed by username, and routes every decoded message
//! to a command handler or a best-effort fan-out.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Username to address registry, upserted on every inbound message.
//!
//! ### Broadcast Module (`broadcast`)
//! One FIFO best-effort adapter per registered client, all feeding the
//! socket's single writer task.
//!
//! ### Context Module (`context`)
//! The state every handler sees: registry, broadcaster, reliable sender and
//! ACK processor, constructed once at startup.
//!
//! ### Commands Module (`commands`)
//! The handler table and the built-in handlers (ping, chat, whisper,
//! rename, list, logout).
//!
//! ### Network Module (`network`)
//! The receive loop, message classification and the dispatch worker pool.
//!
//! ## Message Routing
//!
//! - `ACK` clears the matching pending reliable send
//! - `{REQUEST}` runs the registered handler, or echoes the request back as a
//!   `{RESPONSE}` when no handler exists
//! - `{GAME}` and every other option are relayed to all clients except the
//!   sender
//!
//! Messages other than ACKs must carry the sender's username as their last
//! concealed parameter; anonymous messages are dropped.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::commands::CommandRegistry;
//! use server::network::Server;
//! use shared::MessagingConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let commands = CommandRegistry::with_builtin_handlers()?;
//!     let server = Server::bind("127.0.0.1:8080", MessagingConfig::default(), commands).await?;
//!
//!     let shutdown = server.shutdown_token();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.cancel();
//!     });
//!
//!     server.run().await
//! }
//! ```

pub mod broadcast;
pub mod client_manager;
pub mod commands;
pub mod context;
pub mod network;

pub use commands::{CommandHandler, CommandRegistry, RegistryError};
pub use context::ServerContext;
pub use network::{Server, ServerError};
