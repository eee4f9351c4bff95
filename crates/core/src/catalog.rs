//! Catalog store: files, audio metadata, tags and file/tag associations.
//!
//! Every mutation takes the store-wide write gate and runs in a single
//! transaction. Reads that join several tables run inside one read
//! transaction so they see a single committed snapshot.

use crate::error::{CatalogError, Result};
use crate::models::{
    AudioMetadata, FileRecord, FileView, MatchMode, SortBy, SortOrder, Stats, Tag, DEFAULT_TAGS,
};
use crate::search::TagQuery;
use anyhow::Context;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use storage::models::{FileRow, FileTagRow, TagRow, TagUsageRow};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const TAG_LOOKUP_CHUNK: usize = 500;

pub(crate) const FILE_VIEW_SELECT: &str = r#"
    SELECT f.id, f.path, f.hash, f.mtime,
           m.file_id AS meta_file_id, m.duration, m.sample_rate, m.channels, m.format, m.bitrate
    FROM files f
    LEFT JOIN audio_metadata m ON m.file_id = f.id
"#;

/// Result of tagging or untagging a batch of paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagBatchReport {
    pub applied: Vec<String>,
    /// Paths that are not in the catalog.
    pub missing: Vec<String>,
}

/// Handle to the catalog database. Cheap to clone; clones share the pool and
/// the write gate.
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}

impl Catalog {
    /// Connects, applies migrations and seeds the default tags.
    pub async fn open(database_url: &str) -> anyhow::Result<Self> {
        let pool = storage::connect(database_url).await.context("db connect")?;
        storage::migrate(&pool).await.context("db migrate")?;
        let catalog = Self::new(pool);
        catalog
            .seed_default_tags()
            .await
            .context("seed default tags")?;
        info!(database = database_url, "catalog opened");
        Ok(catalog)
    }

    /// Wraps an already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn seed_default_tags(&self) -> Result<()> {
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        for name in DEFAULT_TAGS {
            sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?1)")
                .bind(*name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_file(&self, path: &str, hash: &str, mtime: i64) -> Result<i64> {
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let id = upsert_file_row(&mut tx, path, hash, mtime).await?;
        tx.commit().await?;
        Ok(id)
    }

    pub async fn upsert_audio_metadata(&self, file_id: i64, meta: &AudioMetadata) -> Result<()> {
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        upsert_metadata_row(&mut tx, file_id, meta).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Writes the file row and its metadata in one transaction, so readers
    /// never see a new hash next to stale metadata. A failed metadata write
    /// is logged and the file row is committed anyway.
    pub async fn commit_ingest(
        &self,
        path: &str,
        hash: &str,
        mtime: i64,
        meta: &AudioMetadata,
    ) -> Result<i64> {
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let id = upsert_file_row(&mut tx, path, hash, mtime).await?;
        if let Err(err) = upsert_metadata_row(&mut tx, id, meta).await {
            warn!(path, error = %err, "metadata write failed; keeping file row");
        }
        tx.commit().await?;
        Ok(id)
    }

    /// Deletes a file with its metadata and tag associations. Returns false
    /// when the path was not cataloged.
    pub async fn remove_file(&self, path: &str) -> Result<bool> {
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM files WHERE path = ?1")
            .bind(path)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(id) = id else {
            return Ok(false);
        };
        delete_file_rows(&mut tx, id).await?;
        tx.commit().await?;
        debug!(path, "file removed from catalog");
        Ok(true)
    }

    /// Deletes every file stored below `dir`. Used when a directory vanishes.
    pub async fn remove_under(&self, dir: &str) -> Result<u64> {
        let sep = std::path::MAIN_SEPARATOR;
        let prefix = format!("{}{}", dir.trim_end_matches(sep), sep);
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        // substr avoids LIKE wildcards hiding in directory names.
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM files WHERE substr(path, 1, length(?1)) = ?1")
                .bind(&prefix)
                .fetch_all(&mut *tx)
                .await?;
        for id in &ids {
            delete_file_rows(&mut tx, *id).await?;
        }
        tx.commit().await?;
        Ok(ids.len() as u64)
    }

    pub async fn ensure_tag(&self, name: &str) -> Result<i64> {
        validate_tag_name(name)?;
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let id = ensure_tag_row(&mut tx, name).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Adds names to the tag vocabulary; existing names are left alone.
    pub async fn add_tags(&self, names: &[String]) -> Result<Vec<Tag>> {
        for name in names {
            validate_tag_name(name)?;
        }
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let mut tags = Vec::with_capacity(names.len());
        for name in names {
            let id = ensure_tag_row(&mut tx, name).await?;
            tags.push(Tag {
                id,
                name: name.clone(),
            });
        }
        tx.commit().await?;
        Ok(tags)
    }

    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        let rows = sqlx::query_as::<_, TagRow>("SELECT id, name FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| Tag {
                id: r.id,
                name: r.name,
            })
            .collect())
    }

    /// Tags a cataloged file with an existing tag. Tagging twice is a no-op.
    pub async fn add_file_tag(&self, path: &str, tag: &str) -> Result<()> {
        let _guard = self.writer.lock().await;
        let mut tx = self.pool.begin().await?;
        let file_id = resolve_file_id(&mut tx, path).await?;
        let tag_id = resolve_tag_id(&mut tx, tag).await?;
        sqlx::query("INSERT OR IGNORE INTO file_tags (file_id, tag_id) VALUES (?1, ?2)")
            .bind(file_id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Removes an association if present.
    pub async fn remove_file_tag(&self, path: &str, tag: &str) -> Result<()> {
        let _guard = self.writer.lock().await;
        sqlx::query(
            r#"
            DELETE FROM file_tags
            WHERE file_id = (SELECT id FROM files WHERE path = ?1)
              AND tag_id = (SELECT id FROM tags WHERE name = ?2)
            "#,
        )
        .bind(path)
        .bind(tag)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Ensures `tag` exists, then tags every cataloged path in `paths`.
    pub async fn tag_files(&self, paths: &[String], tag: &str) -> Result<TagBatchReport> {
        self.ensure_tag(tag).await?;
        let mut report = TagBatchReport::default();
        for path in paths {
            match self.add_file_tag(path, tag).await {
                Ok(()) => report.applied.push(path.clone()),
                Err(CatalogError::FileNotFound(p)) => report.missing.push(p),
                Err(err) => return Err(err),
            }
        }
        Ok(report)
    }

    pub async fn untag_files(&self, paths: &[String], tag: &str) -> Result<TagBatchReport> {
        let mut report = TagBatchReport::default();
        for path in paths {
            if self.file_id(path).await?.is_some() {
                self.remove_file_tag(path, tag).await?;
                report.applied.push(path.clone());
            } else {
                report.missing.push(path.clone());
            }
        }
        Ok(report)
    }

    pub async fn file_id(&self, path: &str) -> Result<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM files WHERE path = ?1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn get_file(&self, path: &str) -> Result<FileView> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("{FILE_VIEW_SELECT} WHERE f.path = ?1");
        let row = sqlx::query_as::<_, FileRow>(&sql)
            .bind(path)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CatalogError::FileNotFound(path.to_string()))?;
        let mut views = attach_tags(&mut tx, vec![row]).await?;
        tx.commit().await?;
        views
            .pop()
            .ok_or_else(|| CatalogError::FileNotFound(path.to_string()))
    }

    pub async fn query_by_tags(
        &self,
        tags: &[String],
        mode: MatchMode,
        sort_by: SortBy,
        order: SortOrder,
    ) -> Result<Vec<FileView>> {
        let query = TagQuery::new(tags, mode)?.sort(sort_by, order);
        let mut tx = self.pool.begin().await?;
        let rows = query
            .build()
            .build_query_as::<FileRow>()
            .fetch_all(&mut *tx)
            .await?;
        let views = attach_tags(&mut tx, rows).await?;
        tx.commit().await?;
        Ok(views)
    }

    pub async fn stats(&self) -> Result<Stats> {
        let mut tx = self.pool.begin().await?;
        let total_files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&mut *tx)
            .await?;
        let usage = sqlx::query_as::<_, TagUsageRow>(
            r#"
            SELECT t.name AS name, COUNT(ft.file_id) AS file_count
            FROM tags t
            LEFT JOIN file_tags ft ON ft.tag_id = t.id
            GROUP BY t.id
            ORDER BY t.name
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let per_tag: BTreeMap<String, i64> =
            usage.into_iter().map(|r| (r.name, r.file_count)).collect();
        Ok(Stats {
            total_files,
            total_tags: per_tag.len() as i64,
            per_tag,
        })
    }
}

fn validate_tag_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CatalogError::InvalidArgument(
            "tag name must not be empty".into(),
        ));
    }
    Ok(())
}

async fn upsert_file_row(
    conn: &mut SqliteConnection,
    path: &str,
    hash: &str,
    mtime: i64,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO files (path, hash, mtime, indexed_at)
        VALUES (?1, ?2, ?3, strftime('%s','now'))
        ON CONFLICT(path) DO UPDATE SET
            hash = excluded.hash,
            mtime = excluded.mtime,
            indexed_at = excluded.indexed_at
        RETURNING id
        "#,
    )
    .bind(path)
    .bind(hash)
    .bind(mtime)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

async fn upsert_metadata_row(
    conn: &mut SqliteConnection,
    file_id: i64,
    meta: &AudioMetadata,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audio_metadata (file_id, duration, sample_rate, channels, format, bitrate)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(file_id) DO UPDATE SET
            duration = excluded.duration,
            sample_rate = excluded.sample_rate,
            channels = excluded.channels,
            format = excluded.format,
            bitrate = excluded.bitrate
        "#,
    )
    .bind(file_id)
    .bind(meta.duration)
    .bind(meta.sample_rate.map(i64::from))
    .bind(meta.channels.map(i64::from))
    .bind(meta.format.as_deref())
    .bind(meta.bitrate.map(i64::from))
    .execute(&mut *conn)
    .await
    .map_err(|err| match err {
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
            CatalogError::FileNotFound(format!("file id {file_id}"))
        }
        other => other.into(),
    })?;
    Ok(())
}

async fn delete_file_rows(conn: &mut SqliteConnection, file_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM file_tags WHERE file_id = ?1")
        .bind(file_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM audio_metadata WHERE file_id = ?1")
        .bind(file_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM files WHERE id = ?1")
        .bind(file_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn ensure_tag_row(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?1)")
        .bind(name)
        .execute(&mut *conn)
        .await?;
    resolve_tag_id(conn, name).await
}

async fn resolve_file_id(conn: &mut SqliteConnection, path: &str) -> Result<i64> {
    sqlx::query_scalar("SELECT id FROM files WHERE path = ?1")
        .bind(path)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CatalogError::FileNotFound(path.to_string()))
}

async fn resolve_tag_id(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    sqlx::query_scalar("SELECT id FROM tags WHERE name = ?1")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CatalogError::TagNotFound(name.to_string()))
}

/// Loads the tag names for `rows` and builds views in the same order.
async fn attach_tags(conn: &mut SqliteConnection, rows: Vec<FileRow>) -> Result<Vec<FileView>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let mut by_file: HashMap<i64, Vec<String>> = HashMap::new();
    // Stay well below SQLite's bound-parameter limit.
    for chunk in rows.chunks(TAG_LOOKUP_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT ft.file_id AS file_id, t.name AS name FROM file_tags ft JOIN tags t ON t.id = ft.tag_id WHERE ft.file_id IN (",
        );
        let mut separated = qb.separated(", ");
        for row in chunk {
            separated.push_bind(row.id);
        }
        separated.push_unseparated(") ORDER BY t.name");
        let tag_rows = qb
            .build_query_as::<FileTagRow>()
            .fetch_all(&mut *conn)
            .await?;
        for tr in tag_rows {
            by_file.entry(tr.file_id).or_default().push(tr.name);
        }
    }
    Ok(rows
        .into_iter()
        .map(|row| {
            let tags = by_file.remove(&row.id).unwrap_or_default();
            into_view(row, tags)
        })
        .collect())
}

fn into_view(row: FileRow, tags: Vec<String>) -> FileView {
    let metadata = row.meta_file_id.map(|_| AudioMetadata {
        duration: row.duration.unwrap_or(0.0),
        sample_rate: row.sample_rate.and_then(|v| u32::try_from(v).ok()),
        channels: row.channels.and_then(|v| u8::try_from(v).ok()),
        format: row.format,
        bitrate: row.bitrate.and_then(|v| u32::try_from(v).ok()),
    });
    FileView {
        file: FileRecord {
            id: row.id,
            path: row.path,
            hash: row.hash,
            mtime: row.mtime,
        },
        metadata,
        tags,
    }
}
