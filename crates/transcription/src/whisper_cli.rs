use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{RawSegment, TranscribeRequest, Transcriber, TranscriberOutput};

/// Transcriber backed by the whisper.cpp `whisper-cli` binary.
///
/// The clip is handed over as a file path and the JSON output
/// (`-oj -ojf`) is parsed back into time-aligned segments. Per-segment
/// confidence is the mean token probability when the engine reports one.
pub struct WhisperCliTranscriber {
    binary: PathBuf,
    model: PathBuf,
    threads: usize,
}

impl WhisperCliTranscriber {
    pub fn new(binary: impl Into<PathBuf>, model: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
            threads: 2,
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }
}

#[async_trait]
impl Transcriber for WhisperCliTranscriber {
    async fn transcribe(&self, request: TranscribeRequest) -> anyhow::Result<TranscriberOutput> {
        let out_dir = tempfile::tempdir()
            .map_err(|e| anyhow::anyhow!("failed to create output dir: {e}"))?;
        let out_prefix = out_dir.path().join("transcript");

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-m")
            .arg(&self.model)
            .arg("-f")
            .arg(&request.wav_path)
            .arg("-t")
            .arg(self.threads.to_string())
            .arg("-oj")
            .arg("-ojf")
            .arg("-of")
            .arg(&out_prefix)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        if let Some(lang) = &request.language_hint {
            cmd.arg("-l").arg(lang);
        }

        debug!(wav = %request.wav_path.display(), "Invoking whisper-cli");
        let output = cmd
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("failed to spawn {}: {e}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "whisper-cli exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        let json_path = out_prefix.with_extension("json");
        let raw = tokio::fs::read_to_string(&json_path)
            .await
            .map_err(|e| anyhow::anyhow!("whisper-cli produced no JSON output: {e}"))?;

        parse_output(&raw)
    }

    fn name(&self) -> &str {
        "whisper-cli"
    }
}

#[derive(Deserialize)]
struct WhisperJson {
    result: Option<WhisperResult>,
    #[serde(default)]
    transcription: Vec<WhisperEntry>,
}

#[derive(Deserialize)]
struct WhisperResult {
    language: Option<String>,
}

#[derive(Deserialize)]
struct WhisperEntry {
    offsets: WhisperOffsets,
    text: String,
    #[serde(default)]
    tokens: Vec<WhisperToken>,
}

#[derive(Deserialize)]
struct WhisperOffsets {
    /// Milliseconds from clip start.
    from: i64,
    to: i64,
}

#[derive(Deserialize)]
struct WhisperToken {
    #[serde(default)]
    p: f64,
}

fn parse_output(raw: &str) -> anyhow::Result<TranscriberOutput> {
    let parsed: WhisperJson =
        serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("malformed whisper JSON: {e}"))?;

    let mut segments = Vec::with_capacity(parsed.transcription.len());
    for entry in parsed.transcription {
        let text = entry.text.trim().to_string();
        if text.is_empty() || is_hallucination(&text) {
            continue;
        }
        let confidence = if entry.tokens.is_empty() {
            0.0
        } else {
            let sum: f64 = entry.tokens.iter().map(|t| t.p).sum();
            (sum / entry.tokens.len() as f64).clamp(0.0, 1.0)
        };
        segments.push(RawSegment {
            start: entry.offsets.from as f64 / 1000.0,
            end: entry.offsets.to as f64 / 1000.0,
            text,
            confidence,
        });
    }

    if segments.is_empty() {
        warn!("whisper-cli returned no usable segments");
    }

    Ok(TranscriberOutput {
        segments,
        language: parsed.result.and_then(|r| r.language),
    })
}

/// Returns true if the text is a known Whisper hallucination/placeholder.
fn is_hallucination(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("[blank_audio]")
        || lower.contains("[silence]")
        || lower.contains("[music]")
        || lower.contains("(silence)")
        || lower.contains("(music)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whisper_json() {
        let raw = r#"{
            "result": { "language": "en" },
            "transcription": [
                {
                    "timestamps": { "from": "00:00:00,000", "to": "00:00:04,200" },
                    "offsets": { "from": 0, "to": 4200 },
                    "text": " Good morning everyone.",
                    "tokens": [ { "p": 0.9 }, { "p": 0.7 } ]
                },
                {
                    "offsets": { "from": 4200, "to": 6000 },
                    "text": " [BLANK_AUDIO]"
                }
            ]
        }"#;

        let out = parse_output(raw).unwrap();
        assert_eq!(out.language.as_deref(), Some("en"));
        assert_eq!(out.segments.len(), 1);
        let seg = &out.segments[0];
        assert_eq!(seg.text, "Good morning everyone.");
        assert!((seg.start - 0.0).abs() < f64::EPSILON);
        assert!((seg.end - 4.2).abs() < 1e-9);
        assert!((seg.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn missing_tokens_yield_zero_confidence() {
        let raw = r#"{
            "transcription": [
                { "offsets": { "from": 100, "to": 900 }, "text": "hello" }
            ]
        }"#;
        let out = parse_output(raw).unwrap();
        assert_eq!(out.segments[0].confidence, 0.0);
        assert!(out.language.is_none());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_output("not json").is_err());
    }
}
