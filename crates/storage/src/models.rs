//! Row shapes returned by catalog queries.

use sqlx::FromRow;

/// A `files` row left-joined with its `audio_metadata` row.
///
/// `meta_file_id` is `None` when the file has no metadata row yet.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub id: i64,
    pub path: String,
    pub hash: String,
    pub mtime: i64,
    pub meta_file_id: Option<i64>,
    pub duration: Option<f64>,
    pub sample_rate: Option<i64>,
    pub channels: Option<i64>,
    pub format: Option<String>,
    pub bitrate: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TagRow {
    pub id: i64,
    pub name: String,
}

/// One `(file_id, tag name)` pair, used to attach tag sets to file rows.
#[derive(Debug, Clone, FromRow)]
pub struct FileTagRow {
    pub file_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct TagUsageRow {
    pub name: String,
    pub file_count: i64,
}
