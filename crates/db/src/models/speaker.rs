use bson::{Binary, DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// An enrolled speaker for voice attribution.
///
/// Segments hold a weak reference: deleting a speaker nulls out
/// `segments.speaker_id` across clips, it never cascades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Speaker {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub color: String,
    /// Opaque voice embedding produced by the enrollment tooling.
    pub voice_embedding: Option<Binary>,
    #[serde(default)]
    pub sample_count: i32,
    pub enrolled_at: DateTime,
}

impl Speaker {
    pub const COLLECTION: &'static str = "speakers";
}
