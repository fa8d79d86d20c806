use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use crate::domain::{Alert, Trade, TradeEvent};

use super::AppContext;

/// Fan-out payload pushed to every connected `/ws` client whenever a trade,
/// alert, or trade event changes. The live dashboard is the intended
/// consumer; the wire shape is the boundary this module owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WsEvent {
    Alert(Alert),
    Trade(Trade),
    TradeEvent(TradeEvent),
}

pub async fn ws_handler(State(ctx): State<Arc<AppContext>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(mut socket: WebSocket, ctx: Arc<AppContext>) {
    let mut rx = ctx.events_tx.subscribe();
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Ok(event) = event else { break };
                let Ok(payload) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
