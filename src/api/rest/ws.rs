use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::hub::Role;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct JoinQuery {
    pub account: Uuid,
    pub role: Role,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(join): Query<JoinQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, join))
}

/// Joins the account's private channel and forwards private plus
/// role-filtered fallback events until either side goes away. Missed events
/// are not replayed; clients re-sync through the query endpoints.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, join: JoinQuery) {
    let JoinQuery { account, role } = join;

    let private_rx = state.hub.join(account);
    let fallback_rx = state.hub.subscribe_fallback();

    let (mut sender, mut receiver) = futures::StreamExt::split(socket);

    info!(%account, "realtime client joined");

    let mut send_task = tokio::spawn(async move {
        let mut events =
            BroadcastStream::new(private_rx).merge(BroadcastStream::new(fallback_rx));

        while let Some(result) = events.next().await {
            let event = match result {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "event stream lagged, client must re-sync");
                    continue;
                }
            };

            if event.role != role {
                continue;
            }

            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.hub.leave(account);
    info!(%account, "realtime client left");
}
