use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// The rule itself; a closed set of variants rather than ad-hoc documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleSpec {
    /// Transient mute for one node. `expires_at = None` means indefinite.
    NodeMute {
        node_id: String,
        expires_at: Option<DateTime>,
        reason: Option<String>,
    },
    /// Mute every node until explicitly lifted.
    GlobalMute { reason: Option<String> },
    /// Recurring daily window, minutes since midnight. `start > end`
    /// wraps past midnight (e.g. 22:00–07:00).
    QuietHours { start_minute: i32, end_minute: i32 },
}

/// A privacy rule evaluated at ingestion time. Clips carry no privacy
/// state of their own; the rule set is consulted once per upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyRule {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(flatten)]
    pub spec: RuleSpec,
    pub active: bool,
    pub created_at: DateTime,
}

impl PrivacyRule {
    pub const COLLECTION: &'static str = "privacy_rules";
}
