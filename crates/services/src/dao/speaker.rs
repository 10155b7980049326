use bson::{DateTime, doc, oid::ObjectId};
use mongodb::Database;
use homemic_db::models::Speaker;

use super::base::{BaseDao, DaoError, DaoResult};

pub struct SpeakerDao {
    pub base: BaseDao<Speaker>,
}

impl SpeakerDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Speaker::COLLECTION),
        }
    }

    pub async fn create(&self, name: String, color: String) -> DaoResult<Speaker> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(DaoError::Validation("speaker name must not be empty".to_string()));
        }
        let speaker = Speaker {
            id: None,
            name,
            color,
            voice_embedding: None,
            sample_count: 0,
            enrolled_at: DateTime::now(),
        };
        let id = self.base.insert_one(&speaker).await?;
        self.base.find_by_id(id).await
    }

    pub async fn get(&self, speaker_id: ObjectId) -> DaoResult<Speaker> {
        self.base.find_by_id(speaker_id).await
    }

    pub async fn find_all(&self) -> DaoResult<Vec<Speaker>> {
        self.base.find_many(doc! {}, Some(doc! { "name": 1 })).await
    }

    /// Removes the speaker record. Segment references are nulled separately
    /// by the clip store; attribution is a weak link, not a cascade.
    pub async fn delete(&self, speaker_id: ObjectId) -> DaoResult<bool> {
        self.base.delete_by_id(speaker_id).await
    }
}
