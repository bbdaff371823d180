use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::info;
use server::network::Server;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to bind the TCP listener to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// TCP port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Also listen on a Unix domain socket at this path
    #[arg(short, long)]
    unix_socket: Option<PathBuf>,

    /// Maximum number of simultaneously connected players
    #[arg(short, long, default_value = "32")]
    max_players: usize,

    /// Seconds between liveness sweeps
    #[arg(long, default_value = "5")]
    ping_interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let address = format!("{}:{}", args.host, args.port);

    let mut server = Server::new(
        &address,
        args.unix_socket.as_deref(),
        Duration::from_secs(args.ping_interval),
        args.max_players,
    )
    .await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
