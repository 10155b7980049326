use bson::{Document, doc, oid::ObjectId};
use futures::stream::TryStreamExt;
use mongodb::{Collection, Database};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaoError {
    #[error("document not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("database error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("serialization error: {0}")]
    BsonSer(#[from] bson::ser::Error),
    #[error("deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),
}

pub type DaoResult<T> = Result<T, DaoError>;

#[derive(Debug, Clone, Copy)]
pub struct PaginationParams {
    pub offset: u64,
    pub limit: i64,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { offset: 0, limit: 50 }
    }
}

#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Thin typed wrapper around one collection; concrete DAOs compose it.
pub struct BaseDao<T: Send + Sync> {
    collection: Collection<T>,
}

impl<T> BaseDao<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + Unpin,
{
    pub fn new(db: &Database, collection_name: &str) -> Self {
        Self {
            collection: db.collection(collection_name),
        }
    }

    pub fn collection(&self) -> &Collection<T> {
        &self.collection
    }

    pub async fn insert_one(&self, item: &T) -> DaoResult<ObjectId> {
        let result = self.collection.insert_one(item).await?;
        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| DaoError::Validation("inserted _id is not an ObjectId".to_string()))
    }

    pub async fn find_by_id(&self, id: ObjectId) -> DaoResult<T> {
        self.collection
            .find_one(doc! { "_id": id })
            .await?
            .ok_or(DaoError::NotFound)
    }

    pub async fn find_one(&self, filter: Document) -> DaoResult<Option<T>> {
        Ok(self.collection.find_one(filter).await?)
    }

    pub async fn find_many(&self, filter: Document, sort: Option<Document>) -> DaoResult<Vec<T>> {
        let mut query = self.collection.find(filter);
        if let Some(sort) = sort {
            query = query.sort(sort);
        }
        Ok(query.await?.try_collect().await?)
    }

    pub async fn find_paginated(
        &self,
        filter: Document,
        sort: Option<Document>,
        params: &PaginationParams,
    ) -> DaoResult<PaginatedResult<T>> {
        let total = self.collection.count_documents(filter.clone()).await?;
        let mut query = self
            .collection
            .find(filter)
            .skip(params.offset)
            .limit(params.limit.max(1));
        if let Some(sort) = sort {
            query = query.sort(sort);
        }
        let items = query.await?.try_collect().await?;
        Ok(PaginatedResult { items, total })
    }

    /// Returns true if a document was modified.
    pub async fn update_by_id(&self, id: ObjectId, update: Document) -> DaoResult<bool> {
        self.update_one(doc! { "_id": id }, update).await
    }

    pub async fn update_one(&self, filter: Document, update: Document) -> DaoResult<bool> {
        let result = self.collection.update_one(filter, update).await?;
        Ok(result.modified_count > 0)
    }

    pub async fn delete_by_id(&self, id: ObjectId) -> DaoResult<bool> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }

    pub async fn count(&self, filter: Document) -> DaoResult<u64> {
        Ok(self.collection.count_documents(filter).await?)
    }
}
