//! Command dispatch table
//!
//! Each supported message type maps to exactly one [`CommandHandler`]. The
//! table is filled once at startup through explicit `register` calls and then
//! frozen behind an `Arc`; dispatch workers only ever read it, so lookups need
//! no locking.
//!
//! A type with no handler is not an error here: the dispatch loop falls back
//! to echoing the request back to its sender.

mod chat;
mod ping;
mod session;

pub use chat::{ChatGlobalHandler, WhisperHandler};
pub use ping::PingHandler;
pub use session::{ChangeNameHandler, ListHandler, LogoutHandler};

use crate::context::ServerContext;
use shared::Message;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Server-side logic bound to one message type
///
/// Handlers produce their effects through the context (replies, broadcasts,
/// registry changes); they return nothing.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, context: &ServerContext, message: &Message, sender: &str);
}

impl<F> CommandHandler for F
where
    F: Fn(&ServerContext, &Message, &str) + Send + Sync,
{
    fn handle(&self, context: &ServerContext, message: &Message, sender: &str) {
        self(context, message, sender)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a handler is already registered for {0}")]
    DuplicateHandler(String),
}

/// Maps REQUEST message types to their handlers
///
/// Built once before the server starts and shared read-only by the dispatch
/// workers. Types are matched case-insensitively.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    /// Empty table: every request is echoed back
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every handler the server ships with
    pub fn with_builtin_handlers() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        registry.register("PING", PingHandler)?;
        registry.register("CHATGLB", ChatGlobalHandler)?;
        registry.register("WHISPER", WhisperHandler)?;
        registry.register("CHANGENAME", ChangeNameHandler)?;
        registry.register("LOGOUT", LogoutHandler)?;
        registry.register("EXIT", LogoutHandler)?;
        registry.register("LIST", ListHandler)?;
        Ok(registry)
    }

    /// Adds a handler for `kind`
    ///
    /// Fails if `kind` already has one; handlers are never replaced.
    pub fn register(
        &mut self,
        kind: &str,
        handler: impl CommandHandler + 'static,
    ) -> Result<(), RegistryError> {
        let key = kind.to_ascii_uppercase();
        if self.handlers.contains_key(&key) {
            return Err(RegistryError::DuplicateHandler(key));
        }
        self.handlers.insert(key, Arc::new(handler));
        Ok(())
    }

    /// Looks up the handler for `kind`, case-insensitively
    pub fn get(&self, kind: &str) -> Option<&Arc<dyn CommandHandler>> {
        self.handlers.get(&kind.to_ascii_uppercase())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.get(kind).is_some()
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
