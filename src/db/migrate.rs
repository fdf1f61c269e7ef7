//! Versioned schema changes tracked in the `schema_migrations` ledger.

use rusqlite::{params, Connection, TransactionBehavior};

use crate::error::MemError;

/// One schema change. Versions compare lexically.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: &'static str,
    pub sql: &'static str,
}

const LEDGER: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (\
    version TEXT PRIMARY KEY, \
    applied_at TEXT NOT NULL)";

const INITIAL: &str = r#"
CREATE TABLE projects (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE sessions (
    id TEXT PRIMARY KEY,
    project TEXT NOT NULL REFERENCES projects(name),
    created_at TEXT NOT NULL
);

CREATE TABLE entries (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    entry_type TEXT NOT NULL,
    project TEXT NOT NULL REFERENCES projects(name),
    session_id TEXT REFERENCES sessions(id),
    source_ref TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    created_at_unix_ms INTEGER NOT NULL,
    insertion_seq INTEGER NOT NULL
);

CREATE UNIQUE INDEX idx_entries_seq ON entries(insertion_seq);
CREATE INDEX idx_entries_project_time ON entries(project, created_at_unix_ms, insertion_seq);
CREATE INDEX idx_entries_type ON entries(entry_type);

CREATE VIRTUAL TABLE entries_fts USING fts5(
    id UNINDEXED, title, body, tokenize='unicode61'
);
"#;

const CONTENT_HASH_DEDUPE: &str = r#"
ALTER TABLE entries ADD COLUMN content_hash TEXT;

CREATE UNIQUE INDEX idx_entries_source_hash ON entries(source_ref, content_hash)
    WHERE source_ref IS NOT NULL AND content_hash IS NOT NULL;

CREATE TABLE ingestion_events (
    id TEXT PRIMARY KEY,
    source_ref TEXT NOT NULL,
    imported_at TEXT NOT NULL,
    imported_count INTEGER NOT NULL
);
CREATE INDEX idx_ingestion_events_source ON ingestion_events(source_ref);
"#;

const RETENTION_AUDIT: &str = r#"
CREATE TABLE retention_audit_events (
    id TEXT PRIMARY KEY,
    mode TEXT NOT NULL,
    executed_at TEXT NOT NULL,
    project TEXT,
    total_candidates INTEGER NOT NULL,
    by_reason_json TEXT NOT NULL,
    input_json TEXT NOT NULL,
    candidate_ids_json TEXT NOT NULL
);
CREATE INDEX idx_retention_audit_executed ON retention_audit_events(executed_at);
"#;

pub const MIGRATIONS: &[Migration] = &[
    Migration { version: "001_initial", sql: INITIAL },
    Migration { version: "002_content_hash_dedupe", sql: CONTENT_HASH_DEDUPE },
    Migration { version: "003_retention_audit_events", sql: RETENTION_AUDIT },
];

/// Apply every migration not yet in the ledger, in ascending version order.
/// Each one commits together with its ledger row. Returns the versions
/// applied by this call; empty when the schema is already current.
///
/// A failure stops the run with `MemError::Migration`. Migrations committed
/// before the failing one stay applied.
pub fn migrate(conn: &mut Connection, migrations: &[Migration]) -> Result<Vec<String>, MemError> {
    let fail = |version: &str, e: rusqlite::Error| MemError::Migration {
        version: version.to_string(),
        cause: e.to_string(),
    };

    conn.execute_batch(LEDGER).map_err(|e| fail("schema_migrations", e))?;
    let applied = applied_versions(conn).map_err(|e| MemError::Migration {
        version: "schema_migrations".into(),
        cause: e.to_string(),
    })?;

    let mut pending: Vec<&Migration> = migrations
        .iter()
        .filter(|m| !applied.iter().any(|v| v == m.version))
        .collect();
    pending.sort_by(|a, b| a.version.cmp(b.version));

    let mut done = Vec::with_capacity(pending.len());
    for m in pending {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| fail(m.version, e))?;
        tx.execute_batch(m.sql).map_err(|e| fail(m.version, e))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![m.version, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| fail(m.version, e))?;
        tx.commit().map_err(|e| fail(m.version, e))?;
        tracing::debug!(version = m.version, "migration applied");
        done.push(m.version.to_string());
    }
    Ok(done)
}

pub fn applied_versions(conn: &Connection) -> Result<Vec<String>, MemError> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let rows = stmt
        .query_map([], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
#[path = "migrate_tests.rs"]
mod tests;
