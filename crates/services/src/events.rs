//! The in-process event bus behind the realtime WebSocket feed.
//!
//! One `tokio::sync::broadcast` channel fans events out to every connected
//! client. Publish order is delivery order per subscriber; a subscriber
//! that falls more than the channel capacity behind is disconnected
//! rather than silently skipped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use homemic_db::models::NodeStatus;

/// Everything that goes over the wire to dashboard clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    Transcription(TranscriptionEvent),
    NodeStatus(NodeStatusEvent),
    KeywordDetected(KeywordDetectedEvent),
    AudioLevel(AudioLevelEvent),
}

/// Emitted once per clip that reaches `transcribed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionEvent {
    pub clip_id: String,
    pub node_id: String,
    pub filename: String,
    /// First 200 characters of the transcript.
    pub text_preview: String,
    pub word_count: i32,
    pub duration_seconds: f64,
    pub recorded_at: DateTime<Utc>,
    pub processing_duration_ms: i64,
}

/// Emitted only on health transitions, never on steady state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatusEvent {
    pub node_id: String,
    pub status: NodeStatus,
    pub latency_ms: f64,
}

/// Emitted after the owning clip's transcription event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordDetectedEvent {
    pub clip_id: String,
    pub keyword_id: String,
    pub phrase: String,
    pub category: Option<String>,
    pub priority: i32,
    pub detected_at: DateTime<Utc>,
}

/// Live input level forwarded from node heartbeats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioLevelEvent {
    pub node_id: String,
    pub level_db: f64,
    pub at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Fire-and-forget: publishing with zero subscribers is not an error.
    pub fn publish(&self, event: Event) {
        trace!(subscribers = self.tx.receiver_count(), "Publishing event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_in_publish_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(Event::AudioLevel(AudioLevelEvent {
            node_id: "kitchen".to_string(),
            level_db: -42.0,
            at: Utc::now(),
        }));
        bus.publish(Event::NodeStatus(NodeStatusEvent {
            node_id: "kitchen".to_string(),
            status: NodeStatus::Online,
            latency_ms: 12.0,
        }));

        assert!(matches!(rx.recv().await.unwrap(), Event::AudioLevel(_)));
        assert!(matches!(rx.recv().await.unwrap(), Event::NodeStatus(_)));
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new(16);
        bus.publish(Event::AudioLevel(AudioLevelEvent {
            node_id: "kitchen".to_string(),
            level_db: -30.0,
            at: Utc::now(),
        }));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = Event::KeywordDetected(KeywordDetectedEvent {
            clip_id: "abc".to_string(),
            keyword_id: "def".to_string(),
            phrase: "coffee".to_string(),
            category: None,
            priority: 5,
            detected_at: Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "keyword_detected");
        assert_eq!(json["data"]["phrase"], "coffee");
    }
}
