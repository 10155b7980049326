use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Top-level settings for the HomeMic server.
///
/// Loaded from `config/default.toml` (optional) with `HOMEMIC__` environment
/// overrides, e.g. `HOMEMIC__SERVER__PORT=8420` or
/// `HOMEMIC__STORAGE__AUDIO_DIR=/mnt/audio`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub pipeline: PipelineSettings,
    pub transcriber: TranscriberSettings,
    pub health: HealthSettings,
    pub realtime: RealtimeSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Root directory for uploaded audio blobs.
    pub audio_dir: String,
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: u64,
    /// Audio files older than this are reaped by the retention sweep.
    /// Clip rows and transcripts are kept forever.
    pub retention_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// Number of concurrent transcription workers.
    pub workers: usize,
    /// Maximum transcription attempts before a clip goes terminal `failed`.
    pub max_attempts: u32,
    /// Base delay for exponential retry backoff, in seconds.
    pub backoff_base_secs: u64,
    /// Worker lease TTL in seconds. A lease not renewed within this window
    /// is considered abandoned and the clip becomes reclaimable.
    pub lease_ttl_secs: u64,
    /// How often a busy worker renews its lease, in seconds.
    pub lease_renew_secs: u64,
    /// Idle-worker poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// How often expired leases are swept back to `pending`, in seconds.
    pub reclaim_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriberSettings {
    /// Path to the whisper-cli binary.
    pub whisper_bin: String,
    /// Path to the ggml model file.
    pub whisper_model: String,
    /// Language hint (ISO 639-1), None = auto-detect.
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthSettings {
    /// A node is `online` if seen within this many seconds.
    pub freshness_secs: u64,
    /// Latency above this marks a fresh node as `warning`, in milliseconds.
    pub latency_warning_ms: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeSettings {
    /// Seconds between server ping frames.
    pub heartbeat_secs: u64,
    /// Consecutive unanswered pings before a client is dropped.
    pub missed_heartbeat_limit: u32,
    /// Capacity of the event broadcast channel; a subscriber that falls
    /// this far behind is disconnected.
    pub event_buffer: usize,
    /// Number of recent transcriptions included in `initial_state`.
    pub initial_state_limit: usize,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8420)?
            .set_default("database.url", "mongodb://localhost:27017")?
            .set_default("database.name", "homemic")?
            .set_default("storage.audio_dir", "/mnt/audio")?
            .set_default("storage.max_upload_bytes", 100 * 1024 * 1024i64)?
            .set_default("storage.retention_days", 14)?
            .set_default("pipeline.workers", 2)?
            .set_default("pipeline.max_attempts", 3)?
            .set_default("pipeline.backoff_base_secs", 30)?
            .set_default("pipeline.lease_ttl_secs", 300)?
            .set_default("pipeline.lease_renew_secs", 60)?
            .set_default("pipeline.poll_interval_ms", 2000)?
            .set_default("pipeline.reclaim_interval_secs", 60)?
            .set_default("transcriber.whisper_bin", "/opt/whisper.cpp/build/bin/whisper-cli")?
            .set_default("transcriber.whisper_model", "/opt/whisper.cpp/models/ggml-small.bin")?
            .set_default("health.freshness_secs", 300)?
            .set_default("health.latency_warning_ms", 1500.0)?
            .set_default("realtime.heartbeat_secs", 30)?
            .set_default("realtime.missed_heartbeat_limit", 3)?
            .set_default("realtime.event_buffer", 256)?
            .set_default("realtime.initial_state_limit", 20)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(Environment::with_prefix("HOMEMIC").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load() {
        let settings = Settings::load().expect("defaults must deserialize");
        assert_eq!(settings.server.port, 8420);
        assert_eq!(settings.pipeline.max_attempts, 3);
        assert!(settings.pipeline.lease_ttl_secs > settings.pipeline.lease_renew_secs);
        assert_eq!(settings.storage.retention_days, 14);
    }
}
