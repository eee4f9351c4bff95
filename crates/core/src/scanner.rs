//! Walks directory trees for audio files and computes content hashes.

use crate::error::{CatalogError, Result};
use crate::paths::{is_audio_path, is_hidden_within, path_key};
use crate::pipeline::{IngestOutcome, Ingestor};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::{self, JoinSet};
use tracing::{info, warn};
use walkdir::WalkDir;

const HASH_BUF_BYTES: usize = 64 * 1024;

/// Full-file BLAKE3 digest as lowercase hex, read in fixed-size chunks.
pub fn content_hash(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; HASH_BUF_BYTES];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Decides which paths under a root are in scope: hidden entries and
/// user-excluded globs are out.
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    excludes: GlobSet,
}

impl PathFilter {
    pub fn new(root: &Path, excludes: &[String]) -> anyhow::Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            excludes: build_globset(excludes)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// In scope regardless of file type (used for removals and directories).
    pub fn in_scope(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
            && !is_hidden_within(&self.root, path)
            && !self.excludes.is_match(path)
    }

    pub fn accepts_audio(&self, path: &Path) -> bool {
        self.in_scope(path) && is_audio_path(path)
    }
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat)?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Calls `visit` for every in-scope audio file below the filter's root.
/// Stops early when `visit` returns false.
pub fn walk_audio_files(filter: &PathFilter, mut visit: impl FnMut(PathBuf) -> bool) {
    for entry in WalkDir::new(filter.root())
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || filter.in_scope(e.path()))
    {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() || !filter.accepts_audio(entry.path()) {
            continue;
        }
        if !visit(entry.into_path()) {
            break;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub discovered: u64,
    pub indexed: u64,
    pub degraded: u64,
    pub failed: u64,
}

/// One-shot ingestion of every audio file under `root`, `workers` files at a time.
pub async fn scan(
    ingestor: &Ingestor,
    root: &Path,
    excludes: &[String],
    workers: usize,
) -> Result<ScanSummary> {
    let root = tokio::fs::canonicalize(root)
        .await
        .map_err(|e| CatalogError::io(path_key(root), e))?;
    let filter = PathFilter::new(&root, excludes)
        .map_err(|e| CatalogError::InvalidArgument(e.to_string()))?;
    let (tx, mut rx) = mpsc::channel::<PathBuf>(100);

    // Walker task
    let walker_handle = task::spawn_blocking(move || {
        walk_audio_files(&filter, |path| {
            // Receiver dropped, stop walking.
            tx.blocking_send(path).is_ok()
        });
    });

    let workers = workers.max(1);
    let mut jobs = JoinSet::new();
    let mut summary = ScanSummary::default();
    while let Some(path) = rx.recv().await {
        summary.discovered += 1;
        if jobs.len() >= workers {
            if let Some(joined) = jobs.join_next().await {
                tally(&mut summary, joined?);
            }
        }
        let ingestor = ingestor.clone();
        jobs.spawn(async move {
            let result = ingestor.ingest(&path).await;
            (path, result)
        });
    }
    walker_handle.await?;

    while let Some(joined) = jobs.join_next().await {
        tally(&mut summary, joined?);
    }
    info!(
        root = %root.display(),
        discovered = summary.discovered,
        indexed = summary.indexed,
        failed = summary.failed,
        "scan complete"
    );
    Ok(summary)
}

fn tally(summary: &mut ScanSummary, (path, result): (PathBuf, Result<IngestOutcome>)) {
    match result {
        Ok(IngestOutcome::Indexed { degraded, .. }) => {
            summary.indexed += 1;
            if degraded {
                summary.degraded += 1;
            }
        }
        Ok(_) => {}
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ingestion failed");
            summary.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        fs::write(&a, vec![7u8; HASH_BUF_BYTES * 3 + 11]).unwrap();
        fs::write(&b, vec![7u8; HASH_BUF_BYTES * 3 + 11]).unwrap();

        let ha = content_hash(&a).unwrap();
        assert_eq!(ha.len(), 64);
        assert_eq!(ha, content_hash(&b).unwrap());

        fs::write(&b, vec![8u8; 10]).unwrap();
        assert_ne!(ha, content_hash(&b).unwrap());
    }

    #[test]
    fn hashing_a_missing_file_is_an_io_error() {
        let err = content_hash(Path::new("/nonexistent/soundtag.mp3")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn walk_skips_hidden_excluded_and_non_audio() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("drums")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::create_dir_all(root.join("bounce")).unwrap();
        fs::write(root.join("drums/kick.WAV"), b"x").unwrap();
        fs::write(root.join("pad.flac"), b"x").unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();
        fs::write(root.join(".hidden.mp3"), b"x").unwrap();
        fs::write(root.join(".cache/snare.wav"), b"x").unwrap();
        fs::write(root.join("bounce/mix.wav"), b"x").unwrap();

        let filter = PathFilter::new(root, &["**/bounce/**".to_string()]).unwrap();
        let mut found = Vec::new();
        walk_audio_files(&filter, |p| {
            found.push(p.strip_prefix(root).unwrap().to_path_buf());
            true
        });
        found.sort();
        assert_eq!(
            found,
            vec![PathBuf::from("drums/kick.WAV"), PathBuf::from("pad.flac")]
        );
    }
}
