//! Socket reader and writer loops
//!
//! Each UDP socket gets exactly one reader task and one writer task. Every
//! producer (reliable sender, ACK processor, best-effort adapters) pushes
//! [`OutgoingMessage`]s onto the same unbounded queue, and the writer drains
//! it in FIFO order. That keeps a single writer per socket.

use crate::codec::{decode_bytes, encode};
use crate::message::{Message, OutgoingMessage};
use log::{debug, error, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Producer side of a socket's send queue
pub type OutboundQueue = mpsc::UnboundedSender<OutgoingMessage>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<OutgoingMessage>;

pub fn outbound_channel() -> (OutboundQueue, OutboundReceiver) {
    mpsc::unbounded_channel()
}

/// A decoded datagram and where it came from
#[derive(Debug, Clone)]
pub struct Inbound {
    pub message: Message,
    pub addr: SocketAddr,
}

/// Spawns the task that owns all writes to `socket`
///
/// On cancellation the writer sends what is already queued, then stops.
pub fn spawn_socket_writer(
    socket: Arc<UdpSocket>,
    mut outbound_rx: OutboundReceiver,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let outgoing = tokio::select! {
                _ = cancel.cancelled() => break,
                next = outbound_rx.recv() => match next {
                    Some(outgoing) => outgoing,
                    None => break,
                },
            };
            send_outgoing(&socket, &outgoing).await;
        }

        // Whatever was queued before cancellation still goes out
        let mut drained = 0;
        while let Ok(outgoing) = outbound_rx.try_recv() {
            send_outgoing(&socket, &outgoing).await;
            drained += 1;
        }
        debug!("Socket writer stopped, {} queued messages flushed", drained);
    })
}

async fn send_outgoing(socket: &UdpSocket, outgoing: &OutgoingMessage) {
    let payload = encode(outgoing.message());
    if let Err(e) = socket
        .send_to(payload.as_bytes(), outgoing.destination())
        .await
    {
        error!("Failed to send to {}: {}", outgoing.destination(), e);
    }
}

/// Spawns the task that owns all reads from `socket`
///
/// Datagrams that fail to decode are logged and dropped; they never stop the
/// loop.
pub fn spawn_socket_reader(
    socket: Arc<UdpSocket>,
    buffer_size: usize,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buffer = vec![0u8; buffer_size];

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = socket.recv_from(&mut buffer) => received,
            };

            match received {
                Ok((len, addr)) => match decode_bytes(&buffer[..len]) {
                    Ok(message) => {
                        if inbound_tx.send(Inbound { message, addr }).is_err() {
                            error!("Inbound channel closed, stopping socket reader");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Dropping malformed datagram from {}: {}", addr, e);
                    }
                },
                Err(e) => {
                    error!("Error receiving datagram: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
        debug!("Socket reader stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageOption;

    #[tokio::test]
    async fn test_writer_and_reader_over_loopback() {
        let a = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let b = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let b_addr = b.local_addr().unwrap();
        let cancel = CancellationToken::new();

        let (out_tx, out_rx) = outbound_channel();
        let (in_tx, mut in_rx) = mpsc::unbounded_channel();
        let writer = spawn_socket_writer(Arc::clone(&a), out_rx, cancel.clone());
        let reader = spawn_socket_reader(Arc::clone(&b), 2048, in_tx, cancel.clone());

        let msg = Message::new("PING")
            .with_option(MessageOption::Request)
            .with_concealed(["alice"]);
        out_tx.send(OutgoingMessage::new(msg, b_addr)).unwrap();

        let inbound = tokio::time::timeout(Duration::from_secs(1), in_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inbound.message.kind, "PING");
        assert_eq!(inbound.addr, a.local_addr().unwrap());

        cancel.cancel();
        writer.await.unwrap();
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_flushes_queue_after_cancel() {
        let a = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b_addr = b.local_addr().unwrap();
        let cancel = CancellationToken::new();

        let (out_tx, out_rx) = outbound_channel();
        out_tx
            .send(OutgoingMessage::new(Message::ack("last-1"), b_addr))
            .unwrap();
        cancel.cancel();

        let writer = spawn_socket_writer(a, out_rx, cancel);
        writer.await.unwrap();

        let mut buf = [0u8; 256];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), b.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], b"ACK [last-1]||");
    }

    #[tokio::test]
    async fn test_reader_survives_malformed_datagram() {
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let cancel = CancellationToken::new();

        let (in_tx, mut in_rx) = mpsc::unbounded_channel();
        let reader = spawn_socket_reader(socket, 2048, in_tx, cancel.clone());

        raw.send_to(b"garbage without pipes", addr).await.unwrap();
        raw.send_to(b"PING []|bob|", addr).await.unwrap();

        let inbound = tokio::time::timeout(Duration::from_secs(1), in_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inbound.message.kind, "PING");
        assert_eq!(inbound.message.sender_username(), Some("bob"));

        cancel.cancel();
        reader.await.unwrap();
    }
}
