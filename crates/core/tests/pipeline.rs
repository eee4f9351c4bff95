use soundtag_core::models::AudioMetadata;
use soundtag_core::paths::{absolutize, path_key};
use soundtag_core::scanner::{content_hash, scan};
use soundtag_core::extractor::MetadataProbe;
use soundtag_core::{Catalog, IngestOutcome, Ingestor};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

async fn setup() -> (TempDir, Ingestor) {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("catalog.db");
    let catalog = Catalog::open(db.to_str().unwrap()).await.unwrap();
    (dir, Ingestor::new(catalog))
}

fn write_wav(path: &Path, seconds: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..(8_000.0 * seconds) as u32 {
        writer.write_sample((i % 64) as i16 * 100).unwrap();
    }
    writer.finalize().unwrap();
}

fn key(path: &Path) -> String {
    path_key(&absolutize(path).unwrap())
}

fn indexed(outcome: IngestOutcome) -> (i64, String, bool) {
    match outcome {
        IngestOutcome::Indexed {
            file_id,
            hash,
            degraded,
        } => (file_id, hash, degraded),
        other => panic!("expected Indexed, got {other:?}"),
    }
}

#[tokio::test]
async fn wav_is_cataloged_with_real_metadata() {
    let (dir, ingestor) = setup().await;
    let wav = dir.path().join("tone.wav");
    write_wav(&wav, 2.0);

    let (_, hash, degraded) = indexed(ingestor.ingest(&wav).await.unwrap());
    assert!(!degraded);
    assert_eq!(hash, content_hash(&wav).unwrap());

    let view = ingestor.catalog().get_file(&key(&wav)).await.unwrap();
    let meta = view.metadata.unwrap();
    assert!((meta.duration - 2.0).abs() < 0.05, "{}", meta.duration);
    assert_eq!(meta.sample_rate, Some(8_000));
    assert_eq!(meta.channels, Some(1));
    assert_eq!(meta.format.as_deref(), Some("wav"));
}

#[tokio::test]
async fn garbage_audio_is_cataloged_with_unknown_metadata() {
    let (dir, ingestor) = setup().await;
    let bogus = dir.path().join("not-really.wav");
    std::fs::write(&bogus, b"this is plain text, not mpeg frames").unwrap();

    let (_, hash, degraded) = indexed(ingestor.ingest(&bogus).await.unwrap());
    assert!(degraded);
    assert_eq!(hash.len(), 64);

    let view = ingestor.catalog().get_file(&key(&bogus)).await.unwrap();
    assert_eq!(view.metadata, Some(AudioMetadata::unknown()));
    assert_eq!(view.duration(), 0.0);
}

#[tokio::test]
async fn reingesting_is_idempotent_and_tracks_content() {
    let (dir, ingestor) = setup().await;
    let wav = dir.path().join("loop.wav");
    write_wav(&wav, 0.5);

    let (id1, hash1, _) = indexed(ingestor.ingest(&wav).await.unwrap());
    let (id2, hash2, _) = indexed(ingestor.ingest(&wav).await.unwrap());
    assert_eq!((id1, &hash1), (id2, &hash2));
    assert_eq!(ingestor.catalog().stats().await.unwrap().total_files, 1);

    write_wav(&wav, 1.0);
    let (id3, hash3, _) = indexed(ingestor.ingest(&wav).await.unwrap());
    assert_eq!(id3, id1);
    assert_ne!(hash3, hash1);
    let view = ingestor.catalog().get_file(&key(&wav)).await.unwrap();
    assert!(view.duration() > 0.9);
}

#[tokio::test]
async fn vanished_and_directory_paths_leave_the_catalog_alone() {
    let (dir, ingestor) = setup().await;
    let gone = dir.path().join("gone.wav");
    assert_eq!(ingestor.ingest(&gone).await.unwrap(), IngestOutcome::Vanished);
    assert_eq!(
        ingestor.ingest(dir.path()).await.unwrap(),
        IngestOutcome::NotAFile
    );
    assert_eq!(ingestor.catalog().stats().await.unwrap().total_files, 0);
}

#[tokio::test]
async fn remove_falls_back_to_the_directory_subtree() {
    let (dir, ingestor) = setup().await;
    let kit = dir.path().join("kit");
    std::fs::create_dir_all(&kit).unwrap();
    write_wav(&kit.join("kick.wav"), 0.1);
    write_wav(&kit.join("snare.wav"), 0.1);
    write_wav(&dir.path().join("pad.wav"), 0.1);
    for name in ["kit/kick.wav", "kit/snare.wav", "pad.wav"] {
        ingestor.ingest(&dir.path().join(name)).await.unwrap();
    }

    assert_eq!(ingestor.remove(&kit.join("kick.wav")).await.unwrap(), 1);
    assert_eq!(ingestor.remove(&kit).await.unwrap(), 1);
    assert_eq!(ingestor.remove(&kit).await.unwrap(), 0);
    assert_eq!(ingestor.catalog().stats().await.unwrap().total_files, 1);
}

struct FixedProbe(f64);

impl MetadataProbe for FixedProbe {
    fn extract(&self, _path: &Path) -> AudioMetadata {
        AudioMetadata {
            duration: self.0,
            ..AudioMetadata::unknown()
        }
    }
}

#[tokio::test]
async fn probe_is_pluggable() {
    let (dir, ingestor) = setup().await;
    let ingestor = Ingestor::with_probe(ingestor.catalog().clone(), Arc::new(FixedProbe(42.0)));
    let file = dir.path().join("x.flac");
    std::fs::write(&file, b"x").unwrap();

    let (_, _, degraded) = indexed(ingestor.ingest(&file).await.unwrap());
    assert!(!degraded);
    let view = ingestor.catalog().get_file(&key(&file)).await.unwrap();
    assert_eq!(view.duration(), 42.0);
}

#[tokio::test]
async fn scan_indexes_the_tree_in_parallel() {
    let (dir, ingestor) = setup().await;
    let lib = dir.path().join("library");
    std::fs::create_dir_all(lib.join("drums")).unwrap();
    std::fs::create_dir_all(lib.join(".trash")).unwrap();
    for i in 0..6 {
        write_wav(&lib.join(format!("drums/hit{i}.wav")), 0.05);
    }
    std::fs::write(lib.join("broken.ogg"), b"nope").unwrap();
    std::fs::write(lib.join("readme.txt"), b"nope").unwrap();
    write_wav(&lib.join(".trash/old.wav"), 0.05);

    let summary = scan(&ingestor, &lib, &[], 3).await.unwrap();
    assert_eq!(summary.discovered, 7);
    assert_eq!(summary.indexed, 7);
    assert_eq!(summary.degraded, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(ingestor.catalog().stats().await.unwrap().total_files, 7);
}

#[cfg(unix)]
#[tokio::test]
async fn dotted_and_symlinked_paths_share_one_record() {
    let (dir, ingestor) = setup().await;
    let real = dir.path().join("real");
    std::fs::create_dir_all(&real).unwrap();
    write_wav(&real.join("kick.wav"), 0.1);
    std::os::unix::fs::symlink(&real, dir.path().join("alias")).unwrap();

    let (id, _, _) = indexed(ingestor.ingest(&real.join("kick.wav")).await.unwrap());
    for variant in ["real/./kick.wav", "alias/kick.wav", "real/../alias/kick.wav"] {
        let (again, _, _) = indexed(ingestor.ingest(&dir.path().join(variant)).await.unwrap());
        assert_eq!(again, id, "{variant}");
    }
    assert_eq!(ingestor.catalog().stats().await.unwrap().total_files, 1);

    assert_eq!(
        ingestor.remove(&dir.path().join("alias/./kick.wav")).await.unwrap(),
        1
    );
    assert_eq!(ingestor.catalog().stats().await.unwrap().total_files, 0);
}
