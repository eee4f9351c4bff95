//! Audio metadata extraction.
//!
//! Parsing failures never escape this module: a file whose headers cannot be
//! read is still cataloged, with [`AudioMetadata::unknown`] as its metadata.

use crate::models::AudioMetadata;
use lofty::error::LoftyError;
use lofty::file::FileType;
use lofty::prelude::{AudioFile, TaggedFileExt};
use std::path::Path;
use tracing::{debug, warn};

/// Source of audio properties for the ingestion pipeline.
pub trait MetadataProbe: Send + Sync {
    /// Never fails; returns [`AudioMetadata::unknown`] when nothing could be read.
    fn extract(&self, path: &Path) -> AudioMetadata;
}

/// Header parsing backed by `lofty`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyProbe;

impl MetadataProbe for LoftyProbe {
    fn extract(&self, path: &Path) -> AudioMetadata {
        match read_properties(path) {
            Ok(meta) => {
                debug!(path = %path.display(), duration = meta.duration, "metadata extracted");
                meta
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "metadata extraction degraded");
                AudioMetadata::unknown()
            }
        }
    }
}

pub fn read_properties(path: &Path) -> Result<AudioMetadata, LoftyError> {
    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let duration = properties.duration().as_secs_f64();
    Ok(AudioMetadata {
        duration: if duration.is_finite() { duration } else { 0.0 },
        sample_rate: properties.sample_rate().filter(|v| *v > 0),
        channels: properties.channels().filter(|v| *v > 0),
        format: Some(format_label(tagged_file.file_type())),
        bitrate: properties
            .audio_bitrate()
            .or(properties.overall_bitrate())
            .filter(|v| *v > 0),
    })
}

fn format_label(file_type: FileType) -> String {
    let label = match file_type {
        FileType::Mpeg => "mp3",
        FileType::Wav => "wav",
        FileType::Vorbis => "ogg",
        FileType::Opus => "opus",
        FileType::Speex => "speex",
        FileType::Mp4 => "m4a",
        FileType::Flac => "flac",
        FileType::Aiff => "aiff",
        FileType::Aac => "aac",
        FileType::Ape => "ape",
        FileType::Mpc => "mpc",
        FileType::WavPack => "wavpack",
        FileType::Custom(name) => return name.to_lowercase(),
        _ => "unknown",
    };
    label.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, seconds: f32, sample_rate: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let frames = (seconds * sample_rate as f32) as u32;
        for _ in 0..frames * channels as u32 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn reads_wav_properties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 1.0, 22_050, 2);

        let meta = LoftyProbe.extract(&path);
        assert!((meta.duration - 1.0).abs() < 0.05, "duration {}", meta.duration);
        assert_eq!(meta.sample_rate, Some(22_050));
        assert_eq!(meta.channels, Some(2));
        assert_eq!(meta.format.as_deref(), Some("wav"));
    }

    #[test]
    fn unparseable_file_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readme.txt");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let meta = LoftyProbe.extract(&path);
        assert!(meta.is_unknown());
        assert_eq!(meta.duration, 0.0);
    }

    #[test]
    fn missing_file_degrades() {
        let meta = LoftyProbe.extract(Path::new("/nonexistent/soundtag/x.wav"));
        assert!(meta.is_unknown());
    }
}
