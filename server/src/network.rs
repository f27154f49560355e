//! Server network layer: socket tasks, classification and the dispatch pool

use crate::commands::CommandRegistry;
use crate::context::ServerContext;
use log::{debug, error, info, warn};
use shared::{
    outbound_channel, spawn_retry_loop, spawn_socket_reader, spawn_socket_writer, Inbound,
    Message, MessageOption, MessagingConfig, OutboundReceiver,
};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub type ServerError = Box<dyn Error + Send + Sync>;

/// What the receive loop does with a decoded message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Clears the pending entry with this id
    Ack(String),
    /// Handler lookup, echo fallback
    Request,
    /// Best-effort fan-out to everyone but the sender
    Relay,
    /// Not actionable
    Discard,
}

pub fn classify(message: &Message) -> Route {
    if message.is_ack() {
        return match message.parameters.first() {
            Some(id) => Route::Ack(id.to_string()),
            None => Route::Discard,
        };
    }

    match message.option {
        Some(MessageOption::Request) => Route::Request,
        _ => Route::Relay,
    }
}

/// One classified message waiting for a dispatch worker
#[derive(Debug)]
struct Work {
    message: Message,
    addr: SocketAddr,
    sender: String,
}

/// Main server owning the socket and every background task
pub struct Server {
    socket: Arc<UdpSocket>,
    context: Arc<ServerContext>,
    commands: Arc<CommandRegistry>,
    outbound_rx: OutboundReceiver,
    cancel: CancellationToken,
}

impl Server {
    pub async fn bind(
        addr: &str,
        config: MessagingConfig,
        commands: CommandRegistry,
    ) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (outbound_tx, outbound_rx) = outbound_channel();
        let context = ServerContext::new(config, outbound_tx)?;

        Ok(Server {
            socket,
            context: Arc::new(context),
            commands: Arc::new(commands),
            outbound_rx,
            cancel: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Token that stops `run` and every task it spawned
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Main receive loop; returns once the shutdown token is cancelled
    pub async fn run(self) -> Result<(), ServerError> {
        let Server {
            socket,
            context,
            commands,
            outbound_rx,
            cancel,
        } = self;
        let config = context.config().clone();

        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        let (work_tx, work_rx) = async_channel::unbounded();

        let mut tasks = vec![
            spawn_socket_writer(Arc::clone(&socket), outbound_rx, cancel.clone()),
            spawn_socket_reader(
                Arc::clone(&socket),
                config.recv_buffer_size,
                inbound_tx,
                cancel.clone(),
            ),
            context
                .acks()
                .spawn_flusher(config.ack_flush_interval(), cancel.clone()),
            context.reliable().spawn_timeout_scanner(
                config.timeout_scan_interval(),
                retry_tx,
                cancel.clone(),
            ),
            spawn_retry_loop(
                Arc::clone(context.reliable()),
                retry_rx,
                config.max_retries,
                cancel.clone(),
            ),
        ];

        tasks.extend(spawn_workers(
            config.worker_count.max(1),
            &context,
            &commands,
            work_rx,
            &cancel,
        ));

        info!(
            "Server started with {} workers, window {}",
            config.worker_count.max(1),
            config.window_size
        );

        loop {
            let inbound = tokio::select! {
                _ = cancel.cancelled() => break,
                next = inbound_rx.recv() => match next {
                    Some(inbound) => inbound,
                    None => break,
                },
            };

            if let Some(work) = receive(&context, inbound) {
                if work_tx.send(work).await.is_err() {
                    error!("Work queue closed, stopping receive loop");
                    break;
                }
            }
        }

        info!("Server shutting down");
        cancel.cancel();
        work_tx.close();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }

        Ok(())
    }
}

/// Spawns `count` dispatch workers sharing one MPMC queue
fn spawn_workers(
    count: usize,
    context: &Arc<ServerContext>,
    commands: &Arc<CommandRegistry>,
    work_rx: async_channel::Receiver<Work>,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker| {
            let work_rx = work_rx.clone();
            let context = Arc::clone(context);
            let commands = Arc::clone(commands);
            let cancel = cancel.clone();

            tokio::spawn(async move {
                loop {
                    let work = tokio::select! {
                        _ = cancel.cancelled() => break,
                        next = work_rx.recv() => match next {
                            Ok(work) => work,
                            Err(_) => break,
                        },
                    };
                    dispatch(&context, &commands, work);
                }
                debug!("Dispatch worker {} stopped", worker);
            })
        })
        .collect()
}

/// Receive-side bookkeeping done before a message reaches the pool
///
/// ACKs are consumed here. Anything else must name its sender; the sender is
/// resolved through recent renames, upserted into the registry and an ACK is
/// staged when the message carries an id.
fn receive(context: &ServerContext, inbound: Inbound) -> Option<Work> {
    let Inbound { message, addr } = inbound;

    match classify(&message) {
        Route::Ack(id) => {
            if !context.reliable().acknowledge(&id) {
                debug!("ACK for unknown id {} from {}", id, addr);
            }
            None
        }
        Route::Discard => {
            warn!("Discarding {} from {}", message.kind, addr);
            None
        }
        Route::Request | Route::Relay => {
            let Some(claimed) = message.sender_username() else {
                warn!("Dropping {} from {}: no username", message.kind, addr);
                return None;
            };

            let sender = context.clients().resolve(claimed, addr);
            if sender != claimed {
                debug!("{} from {} was sent as {}", message.kind, sender, claimed);
            }
            context.register_client(&sender, addr);
            if let Some(id) = message.ack_id() {
                context.acknowledge_inbound(addr, id);
            }

            Some(Work {
                message,
                addr,
                sender,
            })
        }
    }
}

fn dispatch(context: &ServerContext, commands: &CommandRegistry, work: Work) {
    let Work {
        message,
        addr,
        sender,
    } = work;

    match classify(&message) {
        Route::Request => match commands.get(&message.kind) {
            Some(handler) => handler.handle(context, &message, &sender),
            None => {
                debug!("No handler for {}, echoing to {}", message.kind, sender);
                let echo =
                    ServerContext::response(&message.kind).with_params(message.parameters.clone());
                context.reply(addr, echo);
            }
        },
        Route::Relay => {
            let delivered = context.broadcast_except(&message, &sender);
            debug!("Relayed {} from {} to {} clients", message.kind, sender, delivered);
        }
        Route::Ack(_) | Route::Discard => {}
    }
}
