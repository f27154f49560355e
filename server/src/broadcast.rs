//! Best-effort fan-out to registered clients
//!
//! Each registered client gets a [`ClientSender`] adapter. Adapters append to
//! the socket's shared outbound queue, so order is preserved per destination
//! while the writer task stays the only thing touching the socket. Nothing on
//! this path is tracked for acknowledgement.

use dashmap::DashMap;
use log::{debug, warn};
use shared::{Message, OutboundQueue, OutgoingMessage};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// FIFO best-effort sender bound to one client
#[derive(Debug)]
pub struct ClientSender {
    username: String,
    addr: SocketAddr,
    outbound: OutboundQueue,
    open: AtomicBool,
}

impl ClientSender {
    pub fn new(username: impl Into<String>, addr: SocketAddr, outbound: OutboundQueue) -> Self {
        Self {
            username: username.into(),
            addr,
            outbound,
            open: AtomicBool::new(true),
        }
    }

    /// Queues an independent copy of `message` for this client
    ///
    /// The copy carries no id, so the receiver never ACKs it.
    pub fn enqueue(&self, message: &Message) -> bool {
        if !self.is_open() {
            return false;
        }

        let outgoing = OutgoingMessage::new(message.clone_for_resend(), self.addr);
        match self.outbound.send(outgoing) {
            Ok(()) => true,
            Err(_) => {
                warn!("Outbound queue closed, dropping message for {}", self.username);
                false
            }
        }
    }

    pub fn shutdown(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Best-effort fan-out to every registered client
///
/// Holds one [`ClientSender`] per username. Copies carry no id and are never
/// retried; a failed enqueue only skips that client.
pub struct BroadcastManager {
    senders: DashMap<String, Arc<ClientSender>>,
    outbound: OutboundQueue,
}

impl BroadcastManager {
    /// Creates an empty manager whose adapters all write to `outbound`
    pub fn new(outbound: OutboundQueue) -> Self {
        Self {
            senders: DashMap::new(),
            outbound,
        }
    }

    /// Creates the adapter for `username`, shutting down any previous one
    pub fn register_client(&self, username: &str, addr: SocketAddr) {
        let sender = Arc::new(ClientSender::new(username, addr, self.outbound.clone()));
        if let Some(previous) = self.senders.insert(username.to_string(), sender) {
            previous.shutdown();
        }
        debug!("Best-effort sender registered for {} at {}", username, addr);
    }

    pub fn unregister_client(&self, username: &str) -> bool {
        match self.senders.remove(username) {
            Some((_, sender)) => {
                sender.shutdown();
                true
            }
            None => false,
        }
    }

    /// Sends a copy to every registered client, returning how many were queued
    pub fn broadcast(&self, message: &Message) -> usize {
        self.fan_out(message, None)
    }

    /// Sends a copy to every registered client except `excluded`
    pub fn broadcast_except(&self, message: &Message, excluded: &str) -> usize {
        self.fan_out(message, Some(excluded))
    }

    pub fn send_to(&self, username: &str, message: &Message) -> bool {
        let sender = self.senders.get(username).map(|e| Arc::clone(e.value()));
        match sender {
            Some(sender) => sender.enqueue(message),
            None => {
                debug!("No best-effort sender for {}", username);
                false
            }
        }
    }

    pub fn contains(&self, username: &str) -> bool {
        self.senders.contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    fn fan_out(&self, message: &Message, excluded: Option<&str>) -> usize {
        // Snapshot first so no shard lock is held while enqueuing
        let targets: Vec<Arc<ClientSender>> = self
            .senders
            .iter()
            .filter(|entry| Some(entry.key().as_str()) != excluded)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let delivered = targets
            .iter()
            .filter(|sender| sender.enqueue(message))
            .count();
        debug!(
            "Fan-out of {} to {} clients (excluding {:?})",
            message.kind, delivered, excluded
        );
        delivered
    }
}
