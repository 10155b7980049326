use bson::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Offline,
    Warning,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Online => "online",
            NodeStatus::Offline => "offline",
            NodeStatus::Warning => "warning",
        }
    }
}

/// A physical capture device (e.g. a Raspberry Pi in a room).
///
/// Keyed by the node-supplied id so agents can self-register on first
/// contact. Never hard-deleted while clips reference it; `disabled_at`
/// soft-disables instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub location: String,
    pub status: NodeStatus,
    /// Node-local mute switch; mirrors the hardware toggle.
    #[serde(default)]
    pub audio_filtering: bool,
    /// Rolling heartbeat latency sample in milliseconds.
    #[serde(default)]
    pub latency_ms: f64,
    pub last_seen: DateTime,
    pub created_at: DateTime,
    pub disabled_at: Option<DateTime>,
}

impl Node {
    pub const COLLECTION: &'static str = "nodes";
}
