use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("course {0} not found")]
    CourseNotFound(i64),

    #[error("no context found for course {0}")]
    ContextNotFound(i64),

    #[error("cannot modify a context whose parent is locked (context {context_id})")]
    ParentContextLocked { context_id: i64 },

    #[error("course is not read-only")]
    CourseNotReadOnly,

    #[error("missing capability {capability}")]
    PermissionDenied { capability: String },

    #[error("{0}")]
    InvalidOverride(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LifecycleError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CourseNotFound(_) | Self::ContextNotFound(_) => "not_found",
            Self::ParentContextLocked { .. } => "parent_locked",
            Self::CourseNotReadOnly => "not_read_only",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::InvalidOverride(_) => "invalid_override",
            Self::Db(_) => "db_query_failed",
            Self::Other(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
