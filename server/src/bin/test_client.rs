use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use shared::{ClientMessage, ServerMessage};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Scripted console client: joins a game, sends moves, prints what arrives.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address to connect to
    #[clap(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Game to join
    #[clap(short = 'g', long, default_value = "1")]
    game: u64,

    /// Player name to join as
    #[clap(short = 'p', long)]
    player: String,

    /// Move to send as JSON, e.g. '{"kind":"start"}'; may be repeated
    #[clap(long = "send")]
    moves: Vec<String>,

    /// Delay between scripted moves in milliseconds
    #[clap(long, default_value = "250")]
    delay_ms: u64,

    /// How long to keep printing messages after the script finished
    #[clap(long, default_value = "30")]
    listen_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    // Validate the script before connecting
    let mut script = Vec::new();
    for raw in &args.moves {
        let message: ClientMessage = serde_json::from_str(raw)?;
        script.push(message);
    }

    let url = format!("ws://{}/play/{}/ws?player={}", args.server, args.game, args.player);
    info!("Connecting to {}", url);
    let (ws, _) = connect_async(url.as_str()).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let printer = tokio::spawn(async move {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(message) => println!("<- {:?}", message),
                    Err(_) => println!("<- (unrecognised) {}", text),
                },
                Ok(Message::Close(_)) => {
                    println!("Server closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Read error: {}", e);
                    break;
                }
            }
        }
    });

    for message in script {
        sleep(Duration::from_millis(args.delay_ms)).await;
        println!("-> {:?}", message);
        ws_tx
            .send(Message::Text(serde_json::to_string(&message)?))
            .await?;
    }

    if timeout(Duration::from_secs(args.listen_secs), printer)
        .await
        .is_err()
    {
        info!("Stopped listening after {}s", args.listen_secs);
    }

    let _ = ws_tx.close().await;
    println!("Test client finished");
    Ok(())
}
