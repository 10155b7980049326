use std::io::Cursor;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WavError {
    #[error("not a valid WAV file: {0}")]
    Malformed(String),
    #[error("WAV file contains no audio frames")]
    Empty,
}

/// Basic facts read from a WAV header.
#[derive(Debug, Clone, Copy)]
pub struct WavInfo {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Inspects an uploaded WAV blob and derives its duration from the header.
///
/// The nodes report `duration_seconds` alongside the upload; this is the
/// cross-check (and the fallback when the parameter is absent).
pub fn probe(bytes: &[u8]) -> Result<WavInfo, WavError> {
    let reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| WavError::Malformed(e.to_string()))?;
    let spec = reader.spec();
    let frames = reader.duration();
    if frames == 0 {
        return Err(WavError::Empty);
    }

    Ok(WavInfo {
        duration_seconds: frames as f64 / spec.sample_rate as f64,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(sample_rate: u32, seconds: f64) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut buf, spec).unwrap();
            let frames = (sample_rate as f64 * seconds) as usize;
            for i in 0..frames {
                writer.write_sample(((i % 97) as i16) - 48).unwrap();
            }
            writer.finalize().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn probes_duration_from_header() {
        let bytes = wav_bytes(16_000, 2.5);
        let info = probe(&bytes).unwrap();
        assert_eq!(info.sample_rate, 16_000);
        assert_eq!(info.channels, 1);
        assert!((info.duration_seconds - 2.5).abs() < 0.01);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(probe(b"RIFFnope"), Err(WavError::Malformed(_))));
    }

    #[test]
    fn rejects_empty_audio() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut buf = Cursor::new(Vec::new());
        hound::WavWriter::new(&mut buf, spec).unwrap().finalize().unwrap();
        assert!(matches!(probe(&buf.into_inner()), Err(WavError::Empty)));
    }
}
