use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// A phrase matched against every transcript as segments are produced.
///
/// `detection_count`/`last_detected` mutate as a side effect of matching,
/// independent of the owning clip's success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub phrase: String,
    pub category: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub detection_count: i64,
    pub last_detected: Option<DateTime>,
    pub created_at: DateTime,
}

fn default_true() -> bool {
    true
}

impl Keyword {
    pub const COLLECTION: &'static str = "keywords";
}
