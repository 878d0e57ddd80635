use clap::Parser;
use log::{error, info};
use server::network::{BoxError, Server};

/// Main-method of the application.
/// Parses command-line arguments, then runs the WebSocket server until it
/// fails or Ctrl+C is received.
#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "8080")]
        port: u16,
        /// Pending moves buffered per game session
        #[clap(short, long, default_value = "1024")]
        queue_capacity: usize,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::new(&address, args.queue_capacity).await?;
    info!(
        "Clients connect to ws://{}/play/<game_id>/ws?player=<name>",
        server.local_addr()?
    );

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
