use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use log::{info, warn};
use std::sync::Arc;
use twentyone_protocol::{GameCommand, GameEvent};
use uuid::Uuid;

mod game;
mod manager;
mod router;

use router::SessionRouter;

#[derive(Parser, Debug)]
#[command(name = "twentyone-server", about = "Two-player twenty-one card game server")]
struct Args {
    /// Address to bind the WebSocket listener on
    #[arg(long, default_value = "0.0.0.0:9001")]
    bind: String,
}

#[derive(Clone)]
struct AppState {
    router: Arc<SessionRouter>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let state = AppState {
        router: Arc::new(SessionRouter::new()),
    };
    let app = Router::new()
        .route("/game", get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!("server listening on ws://{}/game", args.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Writer task: events queue here so game locks are never held across
    // socket I/O and a slow peer only delays itself.
    let (tx_out, mut rx_out) = tokio::sync::mpsc::unbounded_channel::<GameEvent>();
    tokio::spawn(async move {
        while let Some(event) = rx_out.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!("[SEND] failed to encode event: {err}");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut my_id: Option<Uuid> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<GameCommand>(&text) {
                Ok(command) => state.router.dispatch(command, &mut my_id, &tx_out),
                // Malformed frames are dropped; the connection stays up.
                Err(err) => warn!("[WS] dropping malformed frame: {err}"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Reached on voluntary close and on transport failure alike, so the
    // mappings and game eligibility are always re-checked.
    if let Some(id) = my_id {
        state.router.handle_disconnect(id);
    }
}
