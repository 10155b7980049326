use std::sync::Arc;

use mongodb::Database;
use tokio::sync::Notify;

use homemic_config::Settings;
use homemic_services::dao::keyword::KeywordDao;
use homemic_services::dao::node::NodeDao;
use homemic_services::dao::privacy::PrivacyDao;
use homemic_services::dao::speaker::SpeakerDao;
use homemic_services::events::EventBus;
use homemic_services::health::{HealthThresholds, NodeHealthMonitor};
use homemic_services::storage::AudioStorage;
use homemic_services::store::mongo::MongoClipStore;

use crate::ws::storage::WsStorage;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    /// Handle kept for the health endpoint's ping.
    pub db: Database,
    pub nodes: Arc<NodeDao>,
    pub clips: Arc<MongoClipStore>,
    pub keywords: Arc<KeywordDao>,
    pub speakers: Arc<SpeakerDao>,
    pub privacy: Arc<PrivacyDao>,
    pub storage: AudioStorage,
    pub bus: EventBus,
    pub health: Arc<NodeHealthMonitor>,
    /// Pokes idle transcription workers after an upload lands.
    pub pipeline_wake: Arc<Notify>,
    pub ws: Arc<WsStorage>,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        db: &Database,
        bus: EventBus,
        pipeline_wake: Arc<Notify>,
    ) -> Self {
        let health = Arc::new(NodeHealthMonitor::new(
            HealthThresholds::from(&settings.health),
            bus.clone(),
        ));
        Self {
            db: db.clone(),
            nodes: Arc::new(NodeDao::new(db)),
            clips: Arc::new(MongoClipStore::new(db)),
            keywords: Arc::new(KeywordDao::new(db)),
            speakers: Arc::new(SpeakerDao::new(db)),
            privacy: Arc::new(PrivacyDao::new(db)),
            storage: AudioStorage::new(&settings.storage.audio_dir),
            bus,
            health,
            pipeline_wake,
            ws: Arc::new(WsStorage::new()),
            settings,
        }
    }
}
