//! Shared server state handed to every command handler
//!
//! One `ServerContext` is built at startup and shared behind an `Arc` by the
//! receive loop, the dispatch workers and the background tasks. It owns the
//! client registry, the best-effort broadcaster and the reliable sender, all
//! feeding the same outbound queue.

use crate::broadcast::BroadcastManager;
use crate::client_manager::{ClientRegistry, Upsert};
use log::{debug, warn};
use shared::{
    AckProcessor, ConfigError, Message, MessageOption, MessagingConfig, OutboundQueue,
    OutgoingMessage, ReliableUdpSender, SendOutcome, SERVER_USERNAME,
};
use std::net::SocketAddr;
use std::sync::Arc;

pub struct ServerContext {
    config: MessagingConfig,
    clients: ClientRegistry,
    broadcaster: BroadcastManager,
    reliable: Arc<ReliableUdpSender>,
    acks: Arc<AckProcessor>,
}

impl ServerContext {
    /// Wires every component to `outbound`
    ///
    /// Fails if the ACK processor cannot be bound, which only happens on a
    /// wiring mistake.
    pub fn new(config: MessagingConfig, outbound: OutboundQueue) -> Result<Self, ConfigError> {
        let acks = Arc::new(AckProcessor::new());
        acks.bind(outbound.clone())?;

        let reliable = Arc::new(ReliableUdpSender::new(
            config.window_size,
            config.ack_timeout(),
            outbound.clone(),
        ));

        Ok(Self {
            config,
            clients: ClientRegistry::new(),
            broadcaster: BroadcastManager::new(outbound),
            reliable,
            acks,
        })
    }

    pub fn config(&self) -> &MessagingConfig {
        &self.config
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn broadcaster(&self) -> &BroadcastManager {
        &self.broadcaster
    }

    pub fn reliable(&self) -> &Arc<ReliableUdpSender> {
        &self.reliable
    }

    pub fn acks(&self) -> &Arc<AckProcessor> {
        &self.acks
    }

    /// Upserts the registry and keeps the best-effort adapter in step
    ///
    /// The adapter is touched under the registry entry lock, so it always
    /// exists exactly when the registry entry does.
    pub fn register_client(&self, username: &str, addr: SocketAddr) -> Upsert {
        self.clients.upsert_with(username, addr, |upsert| {
            if upsert.address_changed() || !self.broadcaster.contains(username) {
                self.broadcaster.register_client(username, addr);
            }
        })
    }

    pub fn unregister_client(&self, username: &str) -> Option<SocketAddr> {
        self.clients.remove_with(username, |_| {
            self.broadcaster.unregister_client(username);
        })
    }

    pub fn rename_client(&self, old: &str, new: &str) -> bool {
        self.clients.rename_with(old, new, |addr| {
            self.broadcaster.unregister_client(old);
            self.broadcaster.register_client(new, addr);
        })
    }

    /// Reliable unicast to a registered client
    pub fn send_to(&self, username: &str, message: Message) -> SendOutcome {
        match self.clients.get(username) {
            Some(addr) => self.reply(addr, message),
            None => {
                warn!("Cannot send {} to unknown client {}", message.kind, username);
                SendOutcome::Dropped
            }
        }
    }

    /// Reliable unicast to an address
    pub fn reply(&self, addr: SocketAddr, message: Message) -> SendOutcome {
        self.reliable.send(OutgoingMessage::new(message, addr))
    }

    /// Best-effort copy to every registered client
    pub fn broadcast(&self, message: &Message) -> usize {
        self.broadcaster.broadcast(message)
    }

    /// Best-effort copy to every registered client but `excluded`
    pub fn broadcast_except(&self, message: &Message, excluded: &str) -> usize {
        self.broadcaster.broadcast_except(message, excluded)
    }

    pub fn send_best_effort(&self, username: &str, message: &Message) -> bool {
        self.broadcaster.send_to(username, message)
    }

    /// Stages an ACK for a reliable message received from `addr`
    pub fn acknowledge_inbound(&self, addr: SocketAddr, id: &str) {
        debug!("Staging ACK for {} to {}", id, addr);
        self.acks.enqueue(addr, id);
    }

    /// A response originated by the server itself
    pub fn response(kind: &str) -> Message {
        Message::new(kind)
            .with_option(MessageOption::Response)
            .with_concealed([SERVER_USERNAME])
    }
}
