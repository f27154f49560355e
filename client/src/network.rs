use crate::input::{parse_line, Command, Identity, HELP};
use log::{debug, error, info, warn};
use shared::{
    encode, outbound_channel, spawn_retry_loop, spawn_socket_reader, spawn_socket_writer,
    AckProcessor, Inbound, Message, MessageOption, MessagingConfig, OutboundQueue,
    OutboundReceiver, OutgoingMessage, ReliableUdpSender, SendOutcome,
};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub type ClientError = Box<dyn Error + Send + Sync>;

/// What an inbound message means to the local user
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Text to show
    Display(String),
    /// The server accepted a new username
    Renamed(String),
    /// The server confirmed our logout
    LoggedOut,
    /// Nothing to show (ACKs)
    Silent,
}

pub struct Client {
    socket: Arc<UdpSocket>,
    server_addr: SocketAddr,
    identity: Identity,
    config: MessagingConfig,
    reliable: Arc<ReliableUdpSender>,
    acks: Arc<AckProcessor>,
    outbound: OutboundQueue,
    outbound_rx: OutboundReceiver,
    cancel: CancellationToken,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        identity: Identity,
        config: MessagingConfig,
    ) -> Result<Self, ClientError> {
        let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").await?);
        let server_addr = server_addr.parse()?;

        let (outbound, outbound_rx) = outbound_channel();
        let acks = Arc::new(AckProcessor::new());
        acks.bind(outbound.clone())?;
        let reliable = Arc::new(ReliableUdpSender::new(
            config.window_size,
            config.ack_timeout(),
            outbound.clone(),
        ));

        Ok(Client {
            socket,
            server_addr,
            identity,
            config,
            reliable,
            acks,
            outbound,
            outbound_rx,
            cancel: CancellationToken::new(),
        })
    }

    pub fn username(&self) -> &str {
        &self.identity.username
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.reliable.pending_count()
    }

    /// Stamps our identity on `message` and sends it reliably to the server
    pub fn send_reliable(&self, message: Message) -> SendOutcome {
        let message = self.identity.stamp(message);
        self.reliable
            .send(OutgoingMessage::new(message, self.server_addr))
    }

    /// Stamps our identity on `message` and queues it without tracking
    pub fn send_best_effort(&self, message: Message) -> bool {
        let message = self.identity.stamp(message);
        self.outbound
            .send(OutgoingMessage::new(message, self.server_addr))
            .is_ok()
    }

    /// Applies one inbound message to local state
    pub fn handle_inbound(&mut self, inbound: Inbound) -> Event {
        let Inbound { message, addr } = inbound;

        if addr != self.server_addr {
            debug!("Ignoring {} from unexpected peer {}", message.kind, addr);
            return Event::Silent;
        }

        if message.is_ack() {
            if let Some(id) = message.parameters.first() {
                self.reliable.acknowledge(&id.to_string());
            }
            return Event::Silent;
        }

        if let Some(id) = message.ack_id() {
            self.acks.enqueue(addr, id);
        }

        let event = describe(&message);
        if let Event::Renamed(name) = &event {
            info!("Username changed from {} to {}", self.identity.username, name);
            self.identity.username = name.clone();
        }
        event
    }

    /// Runs until `/quit` is confirmed, the line source closes or shutdown
    pub async fn run(
        mut self,
        mut lines: mpsc::UnboundedReceiver<String>,
    ) -> Result<(), ClientError> {
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        let outbound_rx = std::mem::replace(&mut self.outbound_rx, outbound_channel().1);
        let cancel = self.cancel.clone();

        let tasks = vec![
            spawn_socket_writer(Arc::clone(&self.socket), outbound_rx, cancel.clone()),
            spawn_socket_reader(
                Arc::clone(&self.socket),
                self.config.recv_buffer_size,
                inbound_tx,
                cancel.clone(),
            ),
            self.acks
                .spawn_flusher(self.config.ack_flush_interval(), cancel.clone()),
            self.reliable.spawn_timeout_scanner(
                self.config.timeout_scan_interval(),
                retry_tx,
                cancel.clone(),
            ),
            spawn_retry_loop(
                Arc::clone(&self.reliable),
                retry_rx,
                self.config.max_retries,
                cancel.clone(),
            ),
        ];

        info!(
            "Connected to {} as {}",
            self.server_addr, self.identity.username
        );
        let mut lines_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                inbound = inbound_rx.recv() => {
                    let Some(inbound) = inbound else { break };
                    match self.handle_inbound(inbound) {
                        Event::Display(text) => println!("{}", text),
                        Event::Renamed(name) => println!("* you are now {}", name),
                        Event::LoggedOut => {
                            println!("* logged out");
                            break;
                        }
                        Event::Silent => {}
                    }
                },

                line = lines.recv(), if lines_open => {
                    match line {
                        Some(line) => self.handle_line(&line),
                        None => {
                            lines_open = false;
                            self.send_reliable(Message::new("LOGOUT").with_option(MessageOption::Request));
                        }
                    }
                },
            }
        }

        // Staged ACKs (the server's BYE included) are queued before the
        // writer is told to stop; it sends what is queued on its way out.
        let flushed = self.acks.flush();
        debug!("Flushed {} ACKs before exit", flushed);
        cancel.cancel();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }

        Ok(())
    }

    fn handle_line(&self, line: &str) {
        match parse_line(line) {
            Ok(Some(Command::Reliable(message))) | Ok(Some(Command::Quit(message))) => {
                if self.send_reliable(message).is_dropped() {
                    println!("* too many messages in flight, try again");
                }
            }
            Ok(Some(Command::BestEffort(message))) => {
                if !self.send_best_effort(message) {
                    error!("Outbound queue closed");
                }
            }
            Ok(Some(Command::Help)) => println!("{}", HELP),
            Ok(None) => {}
            Err(e) => println!("* {}", e),
        }
    }
}

/// Renders a server message for the terminal
pub fn describe(message: &Message) -> Event {
    let responding = message.option == Some(MessageOption::Response);
    let first = message.parameters.first().map(ToString::to_string);

    match (message.kind.as_str(), responding, first.as_deref()) {
        ("PING", true, _) => Event::Display("* pong".to_string()),
        ("CHATGLB", true, Some(from)) => {
            Event::Display(format!("<{}> {}", from, message.text_from(1)))
        }
        ("WHISPER", true, Some("ERROR")) => {
            Event::Display(format!("* whisper failed: {}", message.text_from(1)))
        }
        ("WHISPER", true, Some(from)) => {
            Event::Display(format!("[{} whispers] {}", from, message.text_from(1)))
        }
        ("CHANGENAME", true, Some("OK")) => match message.parameters.get(1) {
            Some(name) => Event::Renamed(name.to_string()),
            None => Event::Silent,
        },
        ("CHANGENAME", true, Some("TAKEN")) => {
            Event::Display(format!("* {} is already taken", message.text_from(1)))
        }
        ("LIST", true, _) => Event::Display(format!("* online: {}", message.text_from(0))),
        ("LOGOUT" | "EXIT", true, _) => Event::LoggedOut,
        ("LEFT", _, Some(who)) => Event::Display(format!("* {} left", who)),
        _ => Event::Display(encode(message)),
    }
}
