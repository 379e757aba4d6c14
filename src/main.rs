use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "nestegg",
    about = "Retirement savings projector (multi-account growth, tax-aware withdrawals)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API server.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// Path of the JSON scenario store.
        #[arg(long, default_value = "nestegg-scenarios.json")]
        store: PathBuf,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    match Cli::parse().command {
        Command::Serve { port, store } => {
            if let Err(e) = nestegg::api::run_http_server(port, store).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
    }
}
