use bson::{DateTime, doc};
use futures::stream::TryStreamExt;
use mongodb::{Collection, Database, options::ReturnDocument};
use homemic_db::models::{Node, NodeStatus};

use super::base::{DaoError, DaoResult};

/// Nodes are keyed by their self-supplied id, so this DAO works on a
/// `Collection<Node>` directly instead of the ObjectId-keyed `BaseDao`.
pub struct NodeDao {
    collection: Collection<Node>,
}

impl NodeDao {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(Node::COLLECTION),
        }
    }

    pub async fn get(&self, node_id: &str) -> DaoResult<Node> {
        self.collection
            .find_one(doc! { "_id": node_id })
            .await?
            .ok_or(DaoError::NotFound)
    }

    pub async fn find_all(&self, include_disabled: bool) -> DaoResult<Vec<Node>> {
        let filter = if include_disabled {
            doc! {}
        } else {
            doc! { "disabled_at": null }
        };
        Ok(self
            .collection
            .find(filter)
            .sort(doc! { "last_seen": -1 })
            .await?
            .try_collect()
            .await?)
    }

    /// First contact auto-registers the node under its own id; subsequent
    /// calls leave the stored document untouched.
    pub async fn register_if_missing(&self, node_id: &str, now: DateTime) -> DaoResult<Node> {
        self.collection
            .find_one_and_update(
                doc! { "_id": node_id },
                doc! {
                    "$setOnInsert": {
                        "name": node_id,
                        "location": "unassigned",
                        "status": NodeStatus::Online.as_str(),
                        "audio_filtering": false,
                        "latency_ms": 0.0,
                        "last_seen": now,
                        "created_at": now,
                        "disabled_at": null,
                    }
                },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(DaoError::NotFound)
    }

    /// Stamps a contact (upload or heartbeat) and the derived status.
    pub async fn record_contact(
        &self,
        node_id: &str,
        latency_ms: Option<f64>,
        status: NodeStatus,
        now: DateTime,
    ) -> DaoResult<Node> {
        let mut set = doc! {
            "last_seen": now,
            "status": status.as_str(),
        };
        if let Some(latency) = latency_ms {
            set.insert("latency_ms", latency);
        }
        self.collection
            .find_one_and_update(doc! { "_id": node_id }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(DaoError::NotFound)
    }

    pub async fn update_settings(
        &self,
        node_id: &str,
        name: Option<String>,
        location: Option<String>,
        audio_filtering: Option<bool>,
    ) -> DaoResult<Node> {
        let mut set = doc! {};
        if let Some(name) = name {
            if name.trim().is_empty() {
                return Err(DaoError::Validation("node name must not be empty".to_string()));
            }
            set.insert("name", name);
        }
        if let Some(location) = location {
            set.insert("location", location);
        }
        if let Some(filtering) = audio_filtering {
            set.insert("audio_filtering", filtering);
        }
        if set.is_empty() {
            return self.get(node_id).await;
        }
        self.collection
            .find_one_and_update(doc! { "_id": node_id }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(DaoError::NotFound)
    }

    /// Soft-disable; clips keep referencing the node, it just stops being
    /// listed and can no longer upload.
    pub async fn disable(&self, node_id: &str, now: DateTime) -> DaoResult<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": node_id, "disabled_at": null },
                doc! { "$set": { "disabled_at": now, "status": NodeStatus::Offline.as_str() } },
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    pub async fn set_status(&self, node_id: &str, status: NodeStatus) -> DaoResult<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "_id": node_id },
                doc! { "$set": { "status": status.as_str() } },
            )
            .await?;
        Ok(result.modified_count > 0)
    }
}
