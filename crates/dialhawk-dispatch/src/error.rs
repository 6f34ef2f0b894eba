use thiserror::Error;

/// Errors from the dispatch and persistence layer.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("agent not found: {0}")]
    AgentNotFound(i64),

    #[error("telephony error: {0}")]
    Telephony(String),
}

impl From<r2d2::Error> for DispatchError {
    fn from(e: r2d2::Error) -> Self {
        Self::Pool(e.to_string())
    }
}
