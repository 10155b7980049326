//! Realtime WebSocket feed for dashboard clients.
//!
//! On connect the client gets one `initial_state` frame (recent
//! transcriptions plus current node statuses), then live events in
//! publish order. The broadcast subscription is taken *before* the
//! snapshot is read, so nothing published in between can be missed;
//! a client may see an event that is also in its snapshot, never a gap.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use chrono::Utc;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use homemic_services::events::{Event, TranscriptionEvent};

use crate::state::AppState;
use crate::ws::storage::WsSender;

pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    info!(%connection_id, "WebSocket connected");

    let (sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(Mutex::new(sender));
    state.ws.add(connection_id.clone(), sender.clone());

    // Subscribe before building the snapshot; see module docs.
    let events = state.bus.subscribe();

    if let Err(e) = send_initial_state(&state, &sender).await {
        warn!(%connection_id, error = %e, "Failed to send initial state");
        state.ws.remove(&connection_id);
        return;
    }

    let forward = tokio::spawn(forward_events(
        events,
        sender.clone(),
        connection_id.clone(),
    ));

    let heartbeat = Duration::from_secs(state.settings.realtime.heartbeat_secs);
    let missed_limit = state.settings.realtime.missed_heartbeat_limit;
    let mut ping_timer = tokio::time::interval_at(
        tokio::time::Instant::now() + heartbeat,
        heartbeat,
    );
    ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = ping_timer.tick() => {
                if missed >= missed_limit {
                    warn!(%connection_id, missed, "Client stopped answering pings, dropping");
                    break;
                }
                missed += 1;
                let mut guard = sender.lock().await;
                if guard.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => missed = 0,
                    Some(Ok(Message::Ping(data))) => {
                        let mut guard = sender.lock().await;
                        let _ = guard.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Text(text))) => {
                        missed = 0;
                        handle_client_message(&sender, &connection_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(%connection_id, %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    forward.abort();
    state.ws.remove(&connection_id);
    info!(%connection_id, "WebSocket disconnected");
}

/// Pumps bus events to one client until it lags out or disconnects.
async fn forward_events<S>(
    mut events: broadcast::Receiver<Event>,
    sender: Arc<Mutex<S>>,
    connection_id: String,
) where
    S: Sink<Message> + Unpin + Send,
{
    loop {
        match events.recv().await {
            Ok(event) => {
                let Ok(text) = serde_json::to_string(&event) else {
                    continue;
                };
                let mut guard = sender.lock().await;
                if guard.send(Message::text(text)).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // A consumer this far behind would silently miss events;
                // closing forces it to reconnect and resnapshot.
                warn!(%connection_id, skipped, "Subscriber overflow, closing");
                let mut guard = sender.lock().await;
                let _ = guard.send(Message::Close(None)).await;
                break;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn send_initial_state(state: &AppState, sender: &WsSender) -> Result<(), anyhow::Error> {
    let limit = state.settings.realtime.initial_state_limit as i64;
    let recent = state.clips.recent_transcribed(limit).await?;
    let now = Utc::now();
    let nodes = state.nodes.find_all(false).await?;

    let transcriptions: Vec<TranscriptionEvent> = recent
        .iter()
        .filter_map(|clip| {
            let id = clip.id?;
            let text = clip.transcript_text.clone().unwrap_or_default();
            Some(TranscriptionEvent {
                clip_id: id.to_hex(),
                node_id: clip.node_id.clone(),
                filename: clip.filename.clone(),
                text_preview: text.chars().take(200).collect(),
                word_count: clip.word_count,
                duration_seconds: clip.duration_seconds,
                recorded_at: clip.recorded_at.to_chrono(),
                processing_duration_ms: clip.processing_duration_ms.unwrap_or(0),
            })
        })
        .collect();

    let node_states: Vec<serde_json::Value> = nodes
        .iter()
        .map(|node| {
            let status = state
                .health
                .peek(node.last_seen.to_chrono(), node.latency_ms, now);
            serde_json::json!({
                "node_id": node.id,
                "name": node.name,
                "location": node.location,
                "status": status.as_str(),
                "latency_ms": node.latency_ms,
            })
        })
        .collect();

    let frame = serde_json::json!({
        "type": "initial_state",
        "data": {
            "recent_transcriptions": transcriptions,
            "nodes": node_states,
        }
    });
    let mut guard = sender.lock().await;
    guard.send(Message::text(serde_json::to_string(&frame)?)).await?;
    Ok(())
}

async fn handle_client_message<S>(sender: &Arc<Mutex<S>>, connection_id: &str, text: &str)
where
    S: Sink<Message> + Unpin + Send,
{
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };
    let msg_type = parsed.get("type").and_then(|t| t.as_str()).unwrap_or("");
    debug!(%connection_id, msg_type, "WS message received");

    match msg_type {
        "ping" => {
            let pong = serde_json::json!({ "type": "pong" });
            let mut guard = sender.lock().await;
            let _ = guard
                .send(Message::text(pong.to_string()))
                .await;
        }
        other => {
            debug!(%connection_id, msg_type = other, "Unknown WS message type");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use homemic_db::models::NodeStatus;
    use homemic_services::events::{AudioLevelEvent, EventBus, NodeStatusEvent};

    /// Records every frame a handler tries to send.
    #[derive(Default)]
    struct CaptureSink {
        frames: Vec<Message>,
    }

    impl Sink<Message> for CaptureSink {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Infallible> {
            self.get_mut().frames.push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }
    }

    fn text_json(frame: &Message) -> serde_json::Value {
        match frame {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    fn level(node: &str, level_db: f64) -> Event {
        Event::AudioLevel(AudioLevelEvent {
            node_id: node.to_string(),
            level_db,
            at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn events_reach_the_client_in_publish_order() {
        let bus = EventBus::new(16);
        let events = bus.subscribe();
        let sink = Arc::new(Mutex::new(CaptureSink::default()));

        bus.publish(level("kitchen", -40.0));
        bus.publish(level("bedroom", -35.0));
        bus.publish(Event::NodeStatus(NodeStatusEvent {
            node_id: "kitchen".to_string(),
            status: NodeStatus::Online,
            latency_ms: 9.0,
        }));
        // Dropping the bus closes the channel once buffered events drain,
        // so the pump terminates.
        drop(bus);

        forward_events(events, sink.clone(), "c1".to_string()).await;

        let guard = sink.lock().await;
        assert_eq!(guard.frames.len(), 3);
        let first = text_json(&guard.frames[0]);
        assert_eq!(first["type"], "audio_level");
        assert_eq!(first["data"]["node_id"], "kitchen");
        assert_eq!(text_json(&guard.frames[1])["data"]["node_id"], "bedroom");
        assert_eq!(text_json(&guard.frames[2])["type"], "node_status");
    }

    #[tokio::test]
    async fn lagged_subscriber_is_closed_not_skipped() {
        let bus = EventBus::new(1);
        let events = bus.subscribe();
        let sink = Arc::new(Mutex::new(CaptureSink::default()));

        // Overrun the single-slot channel before the pump starts.
        bus.publish(level("kitchen", -40.0));
        bus.publish(level("kitchen", -39.0));
        bus.publish(level("kitchen", -38.0));

        forward_events(events, sink.clone(), "c1".to_string()).await;

        let guard = sink.lock().await;
        assert_eq!(guard.frames.len(), 1);
        assert!(matches!(guard.frames[0], Message::Close(_)));
    }

    #[tokio::test]
    async fn client_ping_gets_a_pong() {
        let sink = Arc::new(Mutex::new(CaptureSink::default()));
        handle_client_message(&sink, "c1", r#"{"type":"ping"}"#).await;

        let guard = sink.lock().await;
        assert_eq!(guard.frames.len(), 1);
        assert_eq!(text_json(&guard.frames[0])["type"], "pong");
    }

    #[tokio::test]
    async fn unknown_and_malformed_messages_are_ignored() {
        let sink = Arc::new(Mutex::new(CaptureSink::default()));
        handle_client_message(&sink, "c1", r#"{"type":"subscribe"}"#).await;
        handle_client_message(&sink, "c1", "not json").await;
        assert!(sink.lock().await.frames.is_empty());
    }
}
