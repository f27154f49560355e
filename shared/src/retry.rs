//! Retry policy for reliable messages that timed out
//!
//! [`ReliableUdpSender`] only reports timeouts. This module consumes its retry
//! channel, re-sends each overdue message under the same id and abandons it
//! once `max_retries` re-transmissions have gone unanswered.

use crate::message::OutgoingMessage;
use crate::reliable::{ReliableUdpSender, RetryReceiver};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What happened to a timed-out message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Resent { attempt: u32 },
    Abandoned,
    /// Already acknowledged or cancelled between the scan and now
    Stale,
}

pub struct RetryPolicy {
    max_retries: u32,
    attempts: HashMap<String, u32>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            attempts: HashMap::new(),
        }
    }

    pub fn on_timeout(
        &mut self,
        sender: &ReliableUdpSender,
        outgoing: OutgoingMessage,
    ) -> RetryDecision {
        let Some(id) = outgoing.message().ack_id().map(str::to_string) else {
            return RetryDecision::Stale;
        };

        if !sender.is_pending(&id) {
            self.attempts.remove(&id);
            return RetryDecision::Stale;
        }

        let attempt = self.attempts.entry(id.clone()).or_insert(0);
        if *attempt >= self.max_retries {
            warn!(
                "Giving up on {} to {} after {} retries",
                outgoing.message().kind,
                outgoing.destination(),
                self.max_retries
            );
            self.attempts.remove(&id);
            sender.cancel(&id);
            return RetryDecision::Abandoned;
        }

        *attempt += 1;
        let attempt = *attempt;
        debug!("Retry {} for {} ({})", attempt, outgoing.message().kind, id);
        sender.send(outgoing);
        RetryDecision::Resent { attempt }
    }

    /// Drops counters for ids that are no longer in flight
    pub fn prune(&mut self, sender: &ReliableUdpSender) {
        self.attempts.retain(|id, _| sender.is_pending(id));
    }

    pub fn tracked(&self) -> usize {
        self.attempts.len()
    }
}

/// Spawns the task that applies `RetryPolicy` to everything the scanner reports
pub fn spawn_retry_loop(
    sender: Arc<ReliableUdpSender>,
    mut retry_rx: RetryReceiver,
    max_retries: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut policy = RetryPolicy::new(max_retries);

        loop {
            let outgoing = tokio::select! {
                _ = cancel.cancelled() => break,
                next = retry_rx.recv() => match next {
                    Some(outgoing) => outgoing,
                    None => break,
                },
            };

            policy.on_timeout(&sender, outgoing);
            policy.prune(&sender);
        }
    })
}
