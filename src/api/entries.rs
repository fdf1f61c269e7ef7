//! Entry write, lookup, search and timeline handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::blocking;
use crate::error::MemError;
use crate::{db, AppState};

/// POST /entries body. `text` and `type` are accepted as aliases.
#[derive(Deserialize)]
pub(super) struct CreateEntry {
    #[serde(default, alias = "text")]
    body: String,
    title: Option<String>,
    #[serde(alias = "type")]
    entry_type: Option<String>,
    project: Option<String>,
    session_id: Option<String>,
    source_ref: Option<String>,
    metadata: Option<Value>,
}

/// Full entry with its metadata decoded back into a JSON document.
fn entry_view(e: db::Entry) -> Value {
    let meta = serde_json::from_str::<Value>(&e.metadata)
        .unwrap_or_else(|_| Value::String(e.metadata.clone()));
    let mut v = serde_json::to_value(&e).unwrap_or_default();
    v["metadata"] = meta;
    v
}

pub(super) async fn create_entry(
    State(state): State<AppState>,
    Json(req): Json<CreateEntry>,
) -> Result<(StatusCode, Json<Value>), MemError> {
    let input = db::EntryInput {
        body: req.body,
        title: req.title,
        entry_type: req.entry_type,
        project: req.project.or_else(|| Some(state.default_project.clone())),
        session_id: req.session_id,
        source_ref: req.source_ref,
        content_hash: None,
        metadata: req.metadata.map(|m| m.to_string()),
        created_at_ms: None,
    };
    let db = state.db.clone();
    let entry = blocking(move || db.insert(input)).await??;
    tracing::debug!(id = %entry.id, project = %entry.project, "entry saved");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "status": "saved",
            "id": entry.id,
            "created_at": entry.created_at,
        })),
    ))
}

#[derive(Deserialize)]
pub(super) struct BatchIds {
    #[serde(default)]
    ids: Vec<String>,
}

pub(super) async fn get_entries_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchIds>,
) -> Result<Json<Value>, MemError> {
    let db = state.db.clone();
    let entries = blocking(move || db.get_by_ids(&req.ids)).await??;
    let items: Vec<Value> = entries.into_iter().map(entry_view).collect();
    Ok(Json(serde_json::json!({ "items": items })))
}

/// GET /search?q=term&project=p&type=t&limit=20&offset=0
pub(super) async fn search_entries(
    State(state): State<AppState>,
    Query(q): Query<db::SearchQuery>,
) -> Result<Json<db::SearchPage>, MemError> {
    let db = state.db.clone();
    let page = blocking(move || db.search(&q)).await??;
    Ok(Json(page))
}

#[derive(Deserialize)]
pub(super) struct TimelineParams {
    before: Option<usize>,
    after: Option<usize>,
}

/// GET /timeline/{id}?before=3&after=3
pub(super) async fn get_timeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(p): Query<TimelineParams>,
) -> Result<Json<db::Timeline>, MemError> {
    let db = state.db.clone();
    let timeline = blocking(move || db.timeline(&id, p.before, p.after)).await??;
    Ok(Json(timeline))
}
