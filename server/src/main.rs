use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use server::rooms::RegistryConfig;
use shared::BOARD_SIZE;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum number of concurrent connections
    #[arg(short, long, default_value = "256")]
    max_clients: usize,

    /// Seconds of silence before a connection is dropped
    #[arg(short = 't', long, default_value = "30")]
    client_timeout: u64,

    /// Number of face-up cards dealt per round
    #[arg(short, long, default_value_t = BOARD_SIZE)]
    board_size: usize,

    /// Keep a player's points when they join the same room again
    #[arg(long)]
    keep_points_on_rejoin: bool,

    /// Send only the remaining deck size to clients instead of the full deck
    #[arg(long)]
    hide_deck: bool,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            bind_addr: format!("{}:{}", args.host, args.port),
            max_clients: args.max_clients,
            client_timeout: Duration::from_secs(args.client_timeout),
            registry: RegistryConfig {
                board_size: args.board_size,
                reset_points_on_rejoin: !args.keep_points_on_rejoin,
                expose_full_deck: !args.hide_deck,
            },
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());
    info!(
        "Starting server on {} (max {} clients, board of {})",
        config.bind_addr, config.max_clients, config.registry.board_size
    );

    let mut server = Server::new(&config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped with error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
