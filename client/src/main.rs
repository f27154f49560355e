use clap::Parser;
use client::{Client, ClientError, Identity};
use log::{error, info};
use rand::Rng;
use shared::{MessagingConfig, DEFAULT_SERVER_PORT};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", DEFAULT_SERVER_PORT))]
    server: String,

    /// Username; a random one is picked when omitted
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Session identifier sent with every message
    #[arg(long, default_value = "lobby")]
    session: String,

    /// Game identifier sent with every message
    #[arg(long, default_value = "none")]
    game: String,

    /// TOML file with messaging settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the reliable send window
    #[arg(long)]
    window_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => MessagingConfig::from_toml_file(path)?,
        None => MessagingConfig::default(),
    };
    if let Some(window_size) = args.window_size {
        config.window_size = window_size;
    }
    let username = args
        .username
        .unwrap_or_else(|| format!("player{}", rand::thread_rng().gen_range(1000..10000)));

    info!("Starting client...");
    info!("Connecting to: {} as {}", args.server, username);
    println!("Type /help for commands");

    let identity = Identity::new(args.session, args.game, username);
    let client = Client::new(&args.server, identity, config).await?;
    let shutdown = client.shutdown_token();

    let (line_tx, line_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });

    let mut client_handle = tokio::spawn(client.run(line_rx));

    tokio::select! {
        result = &mut client_handle => {
            match result {
                Ok(Err(e)) => error!("Client stopped with error: {}", e),
                Err(e) => error!("Client task panicked: {}", e),
                Ok(Ok(())) => {}
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    shutdown.cancel();
    if let Err(e) = client_handle.await {
        error!("Client task panicked: {}", e);
    }

    Ok(())
}
