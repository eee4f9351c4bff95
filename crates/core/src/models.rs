use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Tags created once when a catalog is first opened.
pub const DEFAULT_TAGS: &[&str] = &["favorite", "loop", "drum", "bass", "melody", "fx"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub path: String,
    pub hash: String,
    /// Filesystem mtime, milliseconds since the Unix epoch.
    pub mtime: i64,
}

/// Audio properties of a file. Only `duration` is always present; it is 0
/// when the file could not be parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub duration: f64,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
    pub format: Option<String>,
    pub bitrate: Option<u32>,
}

impl AudioMetadata {
    /// The record stored when extraction fails.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::unknown()
    }
}

/// A file joined with its metadata and its tag names (sorted by name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileView {
    #[serde(flatten)]
    pub file: FileRecord,
    pub metadata: Option<AudioMetadata>,
    pub tags: Vec<String>,
}

impl FileView {
    pub fn duration(&self) -> f64 {
        self.metadata.as_ref().map(|m| m.duration).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_files: i64,
    pub total_tags: i64,
    /// File count per tag name; unused tags report 0.
    pub per_tag: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// The file carries every requested tag.
    All,
    /// The file carries at least one requested tag.
    Any,
}

impl MatchMode {
    pub fn from_match_all(match_all: bool) -> Self {
        if match_all {
            MatchMode::All
        } else {
            MatchMode::Any
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Path,
    LastModified,
    Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "path" => Ok(SortBy::Path),
            "last-modified" | "lastmodified" | "mtime" => Ok(SortBy::LastModified),
            "duration" => Ok(SortBy::Duration),
            other => Err(format!("unknown sort field: {other}")),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SortBy::Path => "path",
            SortBy::LastModified => "last-modified",
            SortBy::Duration => "duration",
        };
        f.write_str(s)
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_fields_parse_loosely() {
        assert_eq!("last_modified".parse::<SortBy>(), Ok(SortBy::LastModified));
        assert_eq!("lastModified".parse::<SortBy>(), Ok(SortBy::LastModified));
        assert_eq!("Duration".parse::<SortBy>(), Ok(SortBy::Duration));
        assert!("size".parse::<SortBy>().is_err());
        assert_eq!("DESC".parse::<SortOrder>(), Ok(SortOrder::Desc));
    }

    #[test]
    fn unknown_metadata_is_zero_duration() {
        let meta = AudioMetadata::unknown();
        assert_eq!(meta.duration, 0.0);
        assert!(meta.is_unknown());
    }
}
