//! Batched acknowledgements
//!
//! Inbound handling only records that an id needs acknowledging. A periodic
//! flush turns the staged ids into ACK messages on the socket's send queue, so
//! a burst of inbound traffic produces one batch of ACKs per tick.

use crate::error::ConfigError;
use crate::message::{Message, OutgoingMessage};
use crate::transport::OutboundQueue;
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct AckProcessor {
    staging: Mutex<Vec<(SocketAddr, String)>>,
    queue: OnceLock<OutboundQueue>,
}

impl AckProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the processor to the send queue it flushes into
    ///
    /// Binding twice is a wiring mistake and fails with
    /// [`ConfigError::AlreadyBound`].
    pub fn bind(&self, queue: OutboundQueue) -> Result<(), ConfigError> {
        self.queue.set(queue).map_err(|_| ConfigError::AlreadyBound)
    }

    pub fn is_bound(&self) -> bool {
        self.queue.get().is_some()
    }

    /// Stages an ACK for `id` towards `destination`
    pub fn enqueue(&self, destination: SocketAddr, id: impl Into<String>) {
        self.staging.lock().push((destination, id.into()));
    }

    /// Number of staged ACKs not yet flushed
    pub fn size(&self) -> usize {
        self.staging.lock().len()
    }

    /// Drains the staging area onto the send queue, returning how many ACKs went out
    pub fn flush(&self) -> usize {
        let Some(queue) = self.queue.get() else {
            warn!(
                "ACK flush before the processor was bound, keeping {} staged",
                self.size()
            );
            return 0;
        };

        let drained = std::mem::take(&mut *self.staging.lock());
        if drained.is_empty() {
            return 0;
        }

        let mut flushed = 0;
        for (destination, id) in drained {
            let ack = OutgoingMessage::new(Message::ack(id), destination);
            if queue.send(ack).is_err() {
                error!("Send queue closed, discarding remaining ACKs");
                break;
            }
            flushed += 1;
        }
        debug!("Flushed {} ACKs", flushed);
        flushed
    }

    /// Spawns the periodic flush task
    pub fn spawn_flusher(
        self: &Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let processor = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        processor.flush();
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Value;
    use crate::transport::outbound_channel;
    use tokio_test::{assert_err, assert_ok};

    fn addr() -> SocketAddr {
        "127.0.0.1:7000".parse().unwrap()
    }

    #[test]
    fn test_bind_twice_is_fatal() {
        let processor = AckProcessor::new();
        let (tx1, _rx1) = outbound_channel();
        let (tx2, _rx2) = outbound_channel();

        assert_ok!(processor.bind(tx1));
        let err = assert_err!(processor.bind(tx2));
        assert!(matches!(err, ConfigError::AlreadyBound));
    }

    #[test]
    fn test_flush_builds_ack_messages() {
        let processor = AckProcessor::new();
        let (tx, mut rx) = outbound_channel();
        processor.bind(tx).unwrap();

        processor.enqueue(addr(), "id-1");
        processor.enqueue(addr(), "id-2");
        assert_eq!(processor.size(), 2);

        assert_eq!(processor.flush(), 2);
        assert_eq!(processor.size(), 0);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.destination(), addr());
        assert!(first.message().is_ack());
        assert_eq!(first.message().parameters, vec![Value::Text("id-1".into())]);
        assert!(first.message().id.is_none());

        let second = rx.try_recv().unwrap();
        assert_eq!(second.message().parameters, vec![Value::Text("id-2".into())]);
    }

    #[test]
    fn test_empty_flush_is_noop() {
        let processor = AckProcessor::new();
        let (tx, mut rx) = outbound_channel();
        processor.bind(tx).unwrap();

        assert_eq!(processor.flush(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unbound_flush_keeps_staged_entries() {
        let processor = AckProcessor::new();
        processor.enqueue(addr(), "id-1");

        assert_eq!(processor.flush(), 0);
        assert_eq!(processor.size(), 1);
    }

    #[tokio::test]
    async fn test_flusher_task() {
        let processor = Arc::new(AckProcessor::new());
        let (tx, mut rx) = outbound_channel();
        processor.bind(tx).unwrap();
        let cancel = CancellationToken::new();
        let handle = processor.spawn_flusher(Duration::from_millis(2), cancel.clone());

        processor.enqueue(addr(), "late");
        let ack = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ack.message().parameters, vec![Value::Text("late".into())]);

        cancel.cancel();
        handle.await.unwrap();
    }
}
