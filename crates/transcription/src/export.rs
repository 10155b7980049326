use serde::Serialize;

/// Supported transcript export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Txt,
    Srt,
    Json,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "txt" => Ok(ExportFormat::Txt),
            "srt" => Ok(ExportFormat::Srt),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unsupported export format: {other}")),
        }
    }
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Txt | ExportFormat::Srt => "text/plain; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Srt => "srt",
            ExportFormat::Json => "json",
        }
    }
}

/// A transcript prepared for export, decoupled from storage models.
#[derive(Debug, Clone, Serialize)]
pub struct ExportDocument {
    pub title: String,
    pub recorded_at: String,
    pub duration_seconds: f64,
    pub segments: Vec<ExportSegment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub speaker: Option<String>,
}

/// Renders a transcript in the requested format.
pub fn render(doc: &ExportDocument, format: ExportFormat) -> String {
    match format {
        ExportFormat::Txt => render_txt(doc),
        ExportFormat::Srt => render_srt(doc),
        ExportFormat::Json => serde_json::to_string_pretty(doc).unwrap_or_default(),
    }
}

fn render_txt(doc: &ExportDocument) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {} ({})\n\n", doc.title, doc.recorded_at));
    for seg in &doc.segments {
        match &seg.speaker {
            Some(name) => out.push_str(&format!("[{}] {}: {}\n", clock(seg.start), name, seg.text)),
            None => out.push_str(&format!("[{}] {}\n", clock(seg.start), seg.text)),
        }
    }
    out
}

fn render_srt(doc: &ExportDocument) -> String {
    let mut out = String::new();
    for (i, seg) in doc.segments.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n",
            i + 1,
            srt_timestamp(seg.start),
            srt_timestamp(seg.end)
        ));
        match &seg.speaker {
            Some(name) => out.push_str(&format!("{}: {}\n\n", name, seg.text)),
            None => out.push_str(&format!("{}\n\n", seg.text)),
        }
    }
    out
}

/// `MM:SS` for txt headers.
fn clock(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// `HH:MM:SS,mmm` as required by SRT.
fn srt_timestamp(secs: f64) -> String {
    let millis = (secs.max(0.0) * 1000.0).round() as u64;
    let (h, rem) = (millis / 3_600_000, millis % 3_600_000);
    let (m, rem) = (rem / 60_000, rem % 60_000);
    let (s, ms) = (rem / 1000, rem % 1000);
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> ExportDocument {
        ExportDocument {
            title: "kitchen-0930.wav".to_string(),
            recorded_at: "2026-08-25T09:30:00Z".to_string(),
            duration_seconds: 120.0,
            segments: vec![
                ExportSegment {
                    start: 0.0,
                    end: 4.2,
                    text: "Good morning.".to_string(),
                    speaker: Some("Ana".to_string()),
                },
                ExportSegment {
                    start: 61.5,
                    end: 65.0,
                    text: "Coffee is ready.".to_string(),
                    speaker: None,
                },
            ],
        }
    }

    #[test]
    fn format_parsing() {
        assert_eq!("SRT".parse::<ExportFormat>().unwrap(), ExportFormat::Srt);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn txt_lines_carry_clock_and_speaker() {
        let out = render(&doc(), ExportFormat::Txt);
        assert!(out.contains("[00:00] Ana: Good morning."));
        assert!(out.contains("[01:01] Coffee is ready."));
    }

    #[test]
    fn srt_timestamps_are_well_formed() {
        let out = render(&doc(), ExportFormat::Srt);
        assert!(out.starts_with("1\n00:00:00,000 --> 00:00:04,200\nAna: Good morning.\n"));
        assert!(out.contains("2\n00:01:01,500 --> 00:01:05,000\nCoffee is ready.\n"));
    }

    #[test]
    fn json_round_trips_segment_count() {
        let out = render(&doc(), ExportFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["segments"].as_array().unwrap().len(), 2);
        assert_eq!(parsed["title"], "kitchen-0930.wav");
    }
}
