use std::sync::Arc;

use tokio_cron_scheduler::JobScheduler;
use tracing::info;
use tracing_subscriber::EnvFilter;

use homemic_api::{build_router, state::AppState};
use homemic_config::Settings;
use homemic_services::cleanup::{self, RetentionSweep};
use homemic_services::coordinator::{CoordinatorConfig, TranscriptionCoordinator};
use homemic_services::dao::keyword::KeywordDao;
use homemic_services::events::EventBus;
use homemic_services::store::mongo::MongoClipStore;
use homemic_transcription::WhisperCliTranscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Arc::new(Settings::load()?);
    let db = homemic_db::connect(&settings.database).await?;
    homemic_db::indexes::ensure_indexes(&db).await?;

    let bus = EventBus::new(settings.realtime.event_buffer);

    let transcriber = Arc::new(
        WhisperCliTranscriber::new(
            &settings.transcriber.whisper_bin,
            &settings.transcriber.whisper_model,
        )
        .with_threads(settings.pipeline.workers.max(1) * 2),
    );
    let clip_store = Arc::new(MongoClipStore::new(&db));
    let coordinator = TranscriptionCoordinator::new(
        clip_store.clone(),
        Arc::new(KeywordDao::new(&db)),
        transcriber,
        bus.clone(),
        CoordinatorConfig::from_settings(&settings.pipeline, &settings.transcriber),
    );
    let _pipeline = coordinator.spawn();

    let state = AppState::new(settings.clone(), &db, bus, coordinator.wake_handle());

    let scheduler = JobScheduler::new().await?;
    cleanup::schedule(
        &scheduler,
        RetentionSweep::new(&settings.storage.audio_dir, settings.storage.retention_days),
        clip_store,
    )
    .await?;
    scheduler.start().await?;

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "HomeMic server listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
