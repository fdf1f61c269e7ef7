use axum::http::StatusCode;
use codex_mem::error::MemError;
use http_body_util::BodyExt;

#[test]
fn codes_are_stable() {
    assert_eq!(MemError::InvalidArgument("x".into()).code(), "INVALID_ARGUMENT");
    assert_eq!(MemError::PolicyBlocked("x".into()).code(), "POLICY_BLOCKED");
    assert_eq!(MemError::EntryNotFound("x".into()).code(), "ENTRY_NOT_FOUND");
    assert_eq!(MemError::Storage("x".into()).code(), "STORAGE_FAILURE");
    assert_eq!(
        MemError::DuplicateContent { source_ref: "a.md".into() }.code(),
        "STORAGE_FAILURE"
    );
    assert_eq!(
        MemError::Migration { version: "002".into(), cause: "x".into() }.code(),
        "MIGRATION_FAILURE"
    );
}

#[test]
fn status_codes_are_correct() {
    assert_eq!(MemError::InvalidArgument("x".into()).status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(
        MemError::PolicyBlocked("x".into()).status_code(),
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(MemError::EntryNotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
    assert_eq!(
        MemError::DuplicateContent { source_ref: "a.md".into() }.status_code(),
        StatusCode::CONFLICT
    );
    assert_eq!(MemError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        MemError::Storage("disk".into()).status_code(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn error_messages_are_human_readable() {
    assert_eq!(
        MemError::Migration { version: "003_retention_audit_events".into(), cause: "locked".into() }
            .to_string(),
        "migration 003_retention_audit_events failed: locked"
    );
    assert!(MemError::DuplicateContent { source_ref: "docs/a.md".into() }
        .to_string()
        .contains("docs/a.md"));
}

#[test]
fn sqlite_errors_become_storage_failures() {
    let err: MemError = rusqlite::Error::QueryReturnedNoRows.into();
    assert_eq!(err.code(), "STORAGE_FAILURE");
}

#[tokio::test]
async fn into_response_has_json_body() {
    use axum::response::IntoResponse;
    let resp = MemError::EntryNotFound("abc".into()).into_response();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let j: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(j["error"]["code"], "ENTRY_NOT_FOUND");
    assert_eq!(j["error"]["message"], "entry not found: abc");
}
