use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::background::resilient_subscription::{
    ReconnectPolicy, ResilientSubscription, SubscriptionState,
};
use crate::baas::realtime::Realtime;
use crate::config::RealtimeCfg;
use crate::error::AppError;
use crate::helpers::LogErr;
use crate::services::ServiceError;

use super::AppState;

#[derive(Deserialize)]
pub struct ChannelParams {
    channel: String,
}

/// Stream document events of one collection channel as JSON text frames.
///
/// Transport disconnects are bridged by resubscribing. The socket is closed once
/// the subscription gives up.
pub async fn ws(
    State(state): State<AppState>,
    Query(params): Query<ChannelParams>,
    wsu: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let db = &state.baas.databases;
    let known = [
        db.users.channel(),
        db.posts.channel(),
        db.saves.channel(),
        db.follows.channel(),
        db.notifications.channel(),
        db.comments.channel(),
        db.shares.channel(),
    ];
    if !known.contains(&params.channel.as_str()) {
        return Err(ServiceError::NotFound(format!("channel {}", params.channel)).into());
    }

    info!(channel = %params.channel, "realtime subscribe");
    let realtime = state.baas.realtime.clone();
    let cfg = state.realtime.clone();
    let res = wsu
        .on_failed_upgrade(|e| {
            error!("ws upgrade failed: {:?}", e);
        })
        .on_upgrade(move |socket| forward(socket, realtime, params.channel, cfg));
    Ok(res)
}

async fn gave_up(mut state: watch::Receiver<SubscriptionState>) {
    // a closed sender means the subscription task is gone as well
    let _ = state.wait_for(|s| *s == SubscriptionState::GaveUp).await;
}

async fn forward(socket: WebSocket, realtime: Realtime, channel: String, cfg: RealtimeCfg) {
    let (tx, mut events) = mpsc::channel(cfg.buffer.max(1));
    let subscription = ResilientSubscription::spawn(
        realtime,
        channel.as_str(),
        ReconnectPolicy::from(&cfg),
        move |event| {
            if tx.try_send(event).is_err() {
                warn!("ws client lagging, event dropped");
            }
        },
    );
    info!(%channel, "new ws conn");

    let stopped = gave_up(subscription.watch_state());
    tokio::pin!(stopped);
    let (mut sink, mut incoming) = socket.split();

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                let Ok(text) = serde_json::to_string(&event).log_err("could not encode event") else {
                    continue;
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(%e, "ws died");
                    break;
                }
            }
            _ = &mut stopped => {
                info!(%channel, "realtime gave up, closing ws");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            msg = incoming.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!(%e, "ws read failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    info!(%channel, "done sending events");
    subscription.stop();
}
