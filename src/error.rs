use axum::http::StatusCode;
use axum::Json;

#[derive(Debug, thiserror::Error)]
pub enum MemError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("blocked by sensitive-data policy: {0}")]
    PolicyBlocked(String),

    #[error("entry not found: {0}")]
    EntryNotFound(String),

    #[error("entry with identical content already exists for source {source_ref}")]
    DuplicateContent { source_ref: String },

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("migration {version} failed: {cause}")]
    Migration { version: String, cause: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("internal: {0}")]
    Internal(String),
}

impl MemError {
    /// Stable error code exposed to callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::PolicyBlocked(_) => "POLICY_BLOCKED",
            Self::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            Self::DuplicateContent { .. } | Self::Storage(_) => "STORAGE_FAILURE",
            Self::Migration { .. } => "MIGRATION_FAILURE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::PolicyBlocked(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::EntryNotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateContent { .. } => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Storage(_) | Self::Migration { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

// Engine errors are flattened to their message so rusqlite types never cross
// the store boundary.
impl From<rusqlite::Error> for MemError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<r2d2::Error> for MemError {
    fn from(e: r2d2::Error) -> Self {
        Self::Storage(format!("pool: {e}"))
    }
}

impl axum::response::IntoResponse for MemError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({
            "error": { "code": self.code(), "message": self.to_string() }
        }));
        (status, body).into_response()
    }
}
