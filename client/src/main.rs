use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Username to register with (max 20 characters)
    username: String,

    /// Server TCP address to connect to
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Connect over a Unix domain socket at this path instead of TCP
    #[arg(short, long)]
    unix: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    info!("starting client as '{}'", args.username);

    match &args.unix {
        Some(path) => client::session::run_unix(&args.username, path).await,
        None => client::session::run_tcp(&args.username, &args.server).await,
    }
}
