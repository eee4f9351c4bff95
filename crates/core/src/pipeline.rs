//! Single-file ingestion: stat, hash, extract, commit.

use crate::catalog::Catalog;
use crate::error::{CatalogError, Result};
use crate::extractor::{LoftyProbe, MetadataProbe};
use crate::paths::{absolutize, path_key};
use crate::scanner::content_hash;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio::task;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Indexed {
        file_id: i64,
        hash: String,
        /// Metadata could not be parsed and was stored as unknown.
        degraded: bool,
    },
    /// The path disappeared before it could be read; a removal will follow.
    Vanished,
    NotAFile,
}

/// Drives one path through the pipeline. Hashing and header parsing run on
/// the blocking pool; only the final commit takes the catalog write gate.
#[derive(Clone)]
pub struct Ingestor {
    catalog: Catalog,
    probe: Arc<dyn MetadataProbe>,
}

impl Ingestor {
    pub fn new(catalog: Catalog) -> Self {
        Self::with_probe(catalog, Arc::new(LoftyProbe))
    }

    pub fn with_probe(catalog: Catalog, probe: Arc<dyn MetadataProbe>) -> Self {
        Self { catalog, probe }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub async fn ingest(&self, path: &Path) -> Result<IngestOutcome> {
        let path = absolutize(path).map_err(|e| CatalogError::io(path_key(path), e))?;
        let key = path_key(&path);

        // 1. stat
        let meta = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %key, "vanished before ingestion");
                return Ok(IngestOutcome::Vanished);
            }
            Err(e) => return Err(CatalogError::io(key, e)),
        };
        if !meta.is_file() {
            return Ok(IngestOutcome::NotAFile);
        }
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();

        // 2. hash
        let hash_path: PathBuf = path.clone();
        let hash = match task::spawn_blocking(move || content_hash(&hash_path)).await? {
            Ok(h) => h,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %key, "vanished while hashing");
                return Ok(IngestOutcome::Vanished);
            }
            Err(e) => return Err(CatalogError::io(key, e)),
        };

        // 3. extract
        let probe = Arc::clone(&self.probe);
        let probe_path = path.clone();
        let metadata = task::spawn_blocking(move || probe.extract(&probe_path)).await?;
        let degraded = metadata.is_unknown();

        // 4. commit
        let file_id = self
            .catalog
            .commit_ingest(&key, &hash, mtime, &metadata)
            .await?;
        info!(path = %key, file_id, degraded, "indexed");
        Ok(IngestOutcome::Indexed {
            file_id,
            hash,
            degraded,
        })
    }

    /// Removes `path` from the catalog. When no file row matched, the path
    /// is treated as a removed directory and everything below it goes too.
    pub async fn remove(&self, path: &Path) -> Result<u64> {
        let path = absolutize(path).map_err(|e| CatalogError::io(path_key(path), e))?;
        let key = path_key(&path);
        if self.catalog.remove_file(&key).await? {
            info!(path = %key, "removed");
            return Ok(1);
        }
        let removed = self.catalog.remove_under(&key).await?;
        if removed > 0 {
            info!(path = %key, removed, "removed directory contents");
        }
        Ok(removed)
    }
}
