use async_trait::async_trait;
use bson::{DateTime, doc, oid::ObjectId};
use chrono::Utc;
use mongodb::Database;
use homemic_db::models::Keyword;

use super::base::{BaseDao, DaoError, DaoResult};
use crate::store::{KeywordStore, StoreError};

pub struct KeywordDao {
    pub base: BaseDao<Keyword>,
}

impl KeywordDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Keyword::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        phrase: String,
        category: Option<String>,
        priority: i32,
        case_sensitive: bool,
    ) -> DaoResult<Keyword> {
        let phrase = phrase.trim().to_string();
        if phrase.is_empty() {
            return Err(DaoError::Validation("keyword phrase must not be empty".to_string()));
        }
        let keyword = Keyword {
            id: None,
            phrase,
            category,
            priority,
            case_sensitive,
            enabled: true,
            detection_count: 0,
            last_detected: None,
            created_at: DateTime::now(),
        };
        let id = self.base.insert_one(&keyword).await?;
        self.base.find_by_id(id).await
    }

    pub async fn find_all(&self) -> DaoResult<Vec<Keyword>> {
        self.base
            .find_many(doc! {}, Some(doc! { "priority": -1, "created_at": -1 }))
            .await
    }

    pub async fn set_enabled(&self, keyword_id: ObjectId, enabled: bool) -> DaoResult<Keyword> {
        self.base
            .update_by_id(keyword_id, doc! { "$set": { "enabled": enabled } })
            .await?;
        self.base.find_by_id(keyword_id).await
    }

    pub async fn delete(&self, keyword_id: ObjectId) -> DaoResult<bool> {
        self.base.delete_by_id(keyword_id).await
    }
}

#[async_trait]
impl KeywordStore for KeywordDao {
    async fn list_enabled(&self) -> Result<Vec<Keyword>, StoreError> {
        let mut keywords: Vec<Keyword> = self
            .base
            .find_many(doc! { "enabled": true }, Some(doc! { "priority": -1 }))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        keywords.retain(|k| k.id.is_some());
        Ok(keywords)
    }

    async fn record_detection(
        &self,
        keyword_id: ObjectId,
        at: chrono::DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.base
            .update_by_id(
                keyword_id,
                doc! {
                    "$inc": { "detection_count": 1i64 },
                    "$set": { "last_detected": DateTime::from_chrono(at) },
                },
            )
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
