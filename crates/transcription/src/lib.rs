pub mod export;
pub mod wav;
pub mod whisper_cli;

pub use whisper_cli::WhisperCliTranscriber;

use std::path::PathBuf;

use async_trait::async_trait;

/// Request to transcribe one complete audio clip.
pub struct TranscribeRequest {
    /// WAV file on local disk (16kHz mono as produced by the nodes).
    pub wav_path: PathBuf,
    /// Optional language hint (ISO 639-1, e.g. "en", "de").
    pub language_hint: Option<String>,
}

/// A raw time-aligned segment as produced by the speech-to-text engine,
/// before the pipeline sanitises it against the clip duration.
#[derive(Debug, Clone)]
pub struct RawSegment {
    /// Seconds from clip start.
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// Confidence in [0, 1]; 0.0 when the engine reports none.
    pub confidence: f64,
}

/// Result of transcribing a clip.
#[derive(Debug, Clone, Default)]
pub struct TranscriberOutput {
    pub segments: Vec<RawSegment>,
    pub language: Option<String>,
}

/// The opaque speech-to-text capability: bytes in, segments out.
///
/// Stateless from the pipeline's perspective; the coordinator enforces no
/// timeout on this call beyond the worker lease TTL.
#[async_trait]
pub trait Transcriber: Send + Sync + 'static {
    async fn transcribe(&self, request: TranscribeRequest) -> anyhow::Result<TranscriberOutput>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;
}
