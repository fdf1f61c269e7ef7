//! Retention and ingestion handlers.

use axum::extract::State;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::blocking;
use crate::error::MemError;
use crate::ingest::{self, IngestReport, IngestRequest};
use crate::retention::{self, RetentionReport, RetentionRequest};
use crate::{db, AppState};

/// An empty body means "all defaults".
fn parse_optional<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, MemError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| MemError::invalid(format!("invalid body: {e}")))
}

#[derive(Deserialize, Default)]
pub(super) struct DryRunBody {
    /// RFC 3339; defaults to now.
    now: Option<String>,
    max_age_days: Option<i64>,
    max_entries_per_project: Option<i64>,
    project: Option<String>,
}

pub(super) async fn retention_dry_run(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Json<RetentionReport>, MemError> {
    let b: DryRunBody = parse_optional(&body)?;
    let req = RetentionRequest {
        now_ms: b.now.as_deref().map(db::parse_iso_ms).transpose()?,
        max_age_days: b.max_age_days,
        max_entries_per_project: b.max_entries_per_project,
        project: b.project,
    };
    let db = state.db.clone();
    let report = blocking(move || retention::dry_run(&db, &req)).await??;
    Ok(Json(report))
}

#[derive(Deserialize, Default)]
pub(super) struct IngestBody {
    project: Option<String>,
    sources: Option<Vec<String>>,
    entry_type: Option<String>,
}

pub(super) async fn ingest_sources(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Json<IngestReport>, MemError> {
    let b: IngestBody = parse_optional(&body)?;
    let project = b
        .project
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| state.default_project.clone());
    let mut req = IngestRequest::new(state.root_dir.clone(), project);
    if let Some(sources) = b.sources {
        req = req.sources(sources);
    }
    if let Some(t) = b.entry_type {
        req = req.entry_type(t);
    }

    let db = state.db.clone();
    let report = blocking(move || ingest::ingest(&db, &req)).await??;
    Ok(Json(report))
}
