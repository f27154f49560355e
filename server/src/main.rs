use clap::Parser;
use log::{error, info};
use server::{CommandRegistry, Server, ServerError};
use shared::{MessagingConfig, DEFAULT_SERVER_PORT};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_SERVER_PORT)]
    port: u16,

    /// TOML file with messaging settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the reliable send window
    #[arg(long)]
    window_size: Option<usize>,

    /// Override the number of dispatch workers
    #[arg(short, long)]
    workers: Option<usize>,
}

impl Args {
    fn messaging_config(&self) -> Result<MessagingConfig, ServerError> {
        let mut config = match &self.config {
            Some(path) => MessagingConfig::from_toml_file(path)?,
            None => MessagingConfig::default(),
        };

        if let Some(window_size) = self.window_size {
            config.window_size = window_size;
        }
        if let Some(workers) = self.workers {
            config.worker_count = workers;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.messaging_config()?;
    let address = format!("{}:{}", args.host, args.port);

    info!("Starting server on {}", address);
    info!(
        "Window {}, ACK timeout {}ms, {} retries",
        config.window_size, config.ack_timeout_ms, config.max_retries
    );

    let commands = CommandRegistry::with_builtin_handlers()?;
    let server = Server::bind(&address, config, commands).await?;
    let shutdown = server.shutdown_token();
    let mut server_handle = tokio::spawn(server.run());

    tokio::select! {
        result = &mut server_handle => {
            match result {
                Ok(Err(e)) => error!("Server stopped with error: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    shutdown.cancel();
    if let Err(e) = server_handle.await {
        error!("Server task panicked: {}", e);
    }

    Ok(())
}
