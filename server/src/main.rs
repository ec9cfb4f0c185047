use clap::Parser;
use log::info;
use server::network::GameServer;
use server::registry::RoomRegistry;
use shared::{DEFAULT_HOST, DEFAULT_PORT, ROUND_SECONDS};
use std::sync::Arc;

/// Main-method of the application.
/// Parses command-line arguments, builds the room registry and runs the
/// connection listener until interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = DEFAULT_HOST)]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Round duration in seconds
        #[clap(short, long, default_value_t = ROUND_SECONDS)]
        round_seconds: u32,
    }

    env_logger::init();
    let args = Args::parse();

    let registry = Arc::new(RoomRegistry::new(args.round_seconds));
    let address = format!("{}:{}", args.host, args.port);
    let server = GameServer::bind(&address, registry).await?;

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
