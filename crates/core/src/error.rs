use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("file not in catalog: {0}")]
    FileNotFound(String),
    #[error("unknown tag: {0}")]
    TagNotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CatalogError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        CatalogError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the NotFound class (missing file row or missing tag).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::FileNotFound(_) | CatalogError::TagNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
