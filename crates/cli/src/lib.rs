//! Library half of the `soundtag` binary: output rendering and the watch loop.
pub mod report;
pub mod watch;

use anyhow::{Context, Result};
use soundtag_core::config::AppConfig;
use soundtag_core::paths::{absolutize, path_key};
use soundtag_core::Catalog;
use std::path::Path;

/// Opens the configured catalog. A bare file path gets its parent
/// directory created.
pub async fn open_catalog(cfg: &AppConfig) -> Result<Catalog> {
    let target = cfg.database.resolve();
    Catalog::open(&target)
        .await
        .with_context(|| format!("open catalog at {target}"))
}

/// The catalog key for a path typed on the command line.
pub fn catalog_key(path: &str) -> Result<String> {
    Ok(path_key(&absolutize(Path::new(path))?))
}

pub fn catalog_keys(paths: &[String]) -> Result<Vec<String>> {
    paths.iter().map(|p| catalog_key(p)).collect()
}
