use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Clips: claim query, history listing, segment lookup for reassignment
    create_indexes(
        db,
        "clips",
        vec![
            index(bson::doc! { "node_id": 1, "status": 1, "recorded_at": -1 }),
            index(bson::doc! { "status": 1, "next_attempt_at": 1, "recorded_at": 1 }),
            index(bson::doc! { "recorded_at": -1 }),
            index_sparse(bson::doc! { "segments.id": 1 }),
        ],
    )
    .await?;

    // Nodes
    create_indexes(db, "nodes", vec![index(bson::doc! { "last_seen": -1 })]).await?;

    // Keywords
    create_indexes(db, "keywords", vec![index(bson::doc! { "enabled": 1 })]).await?;

    // Privacy rules
    create_indexes(
        db,
        "privacy_rules",
        vec![
            index(bson::doc! { "kind": 1, "active": 1 }),
            index_sparse(bson::doc! { "node_id": 1, "active": 1 }),
        ],
    )
    .await?;

    // Speakers
    create_indexes(db, "speakers", vec![index(bson::doc! { "name": 1 })]).await?;

    info!("MongoDB indexes ensured");
    Ok(())
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    db.collection::<bson::Document>(collection)
        .create_indexes(indexes)
        .await?;
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_sparse(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().sparse(true).build())
        .build()
}
