//! Sliding-window reliable delivery on top of raw UDP sends
//!
//! Every message accepted by [`ReliableUdpSender::send`] stays pending until
//! its id is acknowledged. A periodic scan hands overdue entries to a retry
//! channel instead of retransmitting them itself: how often to retry, and when
//! to give up, is decided by whoever consumes that channel (see
//! [`crate::retry`]).

use crate::message::OutgoingMessage;
use crate::transport::OutboundQueue;
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Channel receiving messages whose ACK did not arrive in time
pub type RetrySender = mpsc::UnboundedSender<OutgoingMessage>;
pub type RetryReceiver = mpsc::UnboundedReceiver<OutgoingMessage>;

/// Result of a [`ReliableUdpSender::send`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// New pending entry created and transmitted
    Sent { sequence: u64 },
    /// Id was already in flight; the packet went out again under the same entry
    Retransmitted { sequence: u64 },
    /// Window full or transport closed; nothing was recorded
    Dropped,
}

impl SendOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, SendOutcome::Dropped)
    }
}

/// One in-flight message
#[derive(Debug, Clone)]
struct PendingOutgoing {
    outgoing: OutgoingMessage,
    sequence: u64,
    last_sent: Instant,
}

/// At-least-once sender with a bounded number of unacknowledged messages
///
/// Shared behind an `Arc` by the code that sends, the receive loop that
/// applies ACKs, the timeout scanner and the retry loop. All state sits under
/// one mutex that is never held across an await.
pub struct ReliableUdpSender {
    window_size: usize,
    timeout: Duration,
    pending: Mutex<HashMap<String, PendingOutgoing>>,
    next_sequence: AtomicU64,
    outbound: OutboundQueue,
}

impl ReliableUdpSender {
    /// Creates a sender that allows `window_size` pending messages, each
    /// considered overdue `timeout` after its last transmission
    pub fn new(window_size: usize, timeout: Duration, outbound: OutboundQueue) -> Self {
        Self {
            window_size,
            timeout,
            pending: Mutex::new(HashMap::new()),
            next_sequence: AtomicU64::new(1),
            outbound,
        }
    }

    /// Records the message as pending and transmits it
    ///
    /// Messages without an id get a fresh one. A message whose id is already
    /// pending is transmitted again but keeps its entry and sequence number;
    /// only new ids count against the window.
    pub fn send(&self, outgoing: OutgoingMessage) -> SendOutcome {
        let id = outgoing
            .message()
            .ack_id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Instant::now();

        let (stamped, outcome) = {
            let mut pending = self.pending.lock();

            // Checked before the window: a pending id already holds its slot,
            // and retries from a full window must still go out.
            if let Some(entry) = pending.get_mut(&id) {
                entry.last_sent = now;
                (
                    entry.outgoing.clone(),
                    SendOutcome::Retransmitted {
                        sequence: entry.sequence,
                    },
                )
            } else {
                if pending.len() >= self.window_size {
                    warn!(
                        "Send window full ({} pending), dropping {} to {}",
                        pending.len(),
                        outgoing.message().kind,
                        outgoing.destination()
                    );
                    return SendOutcome::Dropped;
                }

                let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
                let stamped = outgoing.map_message(|mut message| {
                    message.id = Some(id.clone());
                    message.sequence = sequence;
                    message
                });

                pending.insert(
                    id.clone(),
                    PendingOutgoing {
                        outgoing: stamped.clone(),
                        sequence,
                        last_sent: now,
                    },
                );
                (stamped, SendOutcome::Sent { sequence })
            }
        };

        debug!(
            "Reliable send {} ({}) to {}: {:?}",
            stamped.message().kind,
            id,
            stamped.destination(),
            outcome
        );

        if let Err(e) = self.outbound.send(stamped) {
            error!("Outbound queue closed, dropping reliable message {}: {}", id, e);
            if matches!(outcome, SendOutcome::Sent { .. }) {
                self.pending.lock().remove(&id);
            }
            return SendOutcome::Dropped;
        }

        outcome
    }

    /// Removes the pending entry for `id`; unknown ids are ignored
    pub fn acknowledge(&self, id: &str) -> bool {
        let removed = self.pending.lock().remove(id).is_some();
        if removed {
            debug!("Acknowledged {}", id);
        } else {
            debug!("Ignoring ACK for unknown id {}", id);
        }
        removed
    }

    /// Gives up on `id`, returning the message that was in flight
    pub fn cancel(&self, id: &str) -> Option<OutgoingMessage> {
        self.pending.lock().remove(id).map(|entry| entry.outgoing)
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Collects entries older than the timeout, oldest sequence first
    ///
    /// Each returned entry has its timer reset to `now`, so it is offered again
    /// only after another full timeout elapses without an ACK.
    pub fn scan_timeouts(&self, now: Instant) -> Vec<OutgoingMessage> {
        let mut overdue: Vec<(u64, OutgoingMessage)> = {
            let mut pending = self.pending.lock();
            pending
                .values_mut()
                .filter(|entry| now.saturating_duration_since(entry.last_sent) > self.timeout)
                .map(|entry| {
                    entry.last_sent = now;
                    (entry.sequence, entry.outgoing.clone())
                })
                .collect()
        };

        overdue.sort_by_key(|(sequence, _)| *sequence);
        overdue.into_iter().map(|(_, outgoing)| outgoing).collect()
    }

    /// Spawns the periodic timeout scan feeding `retry_tx`
    pub fn spawn_timeout_scanner(
        self: &Arc<Self>,
        period: Duration,
        retry_tx: RetrySender,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let sender = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        for outgoing in sender.scan_timeouts(Instant::now()) {
                            if retry_tx.send(outgoing).is_err() {
                                error!("Retry channel closed, stopping timeout scanner");
                                return;
                            }
                        }
                    }
                }
            }
        })
    }
}
