use rusqlite::params;
use uuid::Uuid;

use super::*;

/// The slice of an entry retention planning looks at.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionRow {
    pub id: String,
    pub project: String,
    pub created_at_ms: i64,
}

/// One dry-run evaluation, as persisted in `retention_audit_events`.
/// The JSON fields are already serialized.
#[derive(Debug, Clone)]
pub struct RetentionAudit {
    pub mode: String,
    pub executed_at: String,
    pub project: Option<String>,
    pub total_candidates: usize,
    pub by_reason_json: String,
    pub input_json: String,
    pub candidate_ids_json: String,
}

fn retention_row(row: &rusqlite::Row) -> rusqlite::Result<RetentionRow> {
    Ok(RetentionRow {
        id: row.get(0)?,
        project: row.get(1)?,
        created_at_ms: row.get(2)?,
    })
}

impl MemoryDB {
    /// Rows grouped by project, newest first within each project.
    pub fn list_for_retention(&self, project: Option<&str>) -> Result<Vec<RetentionRow>, MemError> {
        let conn = self.conn()?;
        let rows = match project {
            Some(p) => {
                let mut stmt = conn.prepare(
                    "SELECT id, project, created_at_unix_ms FROM entries WHERE project = ?1 \
                     ORDER BY project ASC, created_at_unix_ms DESC, insertion_seq DESC",
                )?;
                let rows = stmt.query_map(params![p], retention_row)?.collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, project, created_at_unix_ms FROM entries \
                     ORDER BY project ASC, created_at_unix_ms DESC, insertion_seq DESC",
                )?;
                let rows = stmt.query_map([], retention_row)?.collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    pub fn record_retention_audit(&self, audit: &RetentionAudit) -> Result<String, MemError> {
        let id = Uuid::new_v4().to_string();
        self.conn()?.execute(
            "INSERT INTO retention_audit_events \
             (id, mode, executed_at, project, total_candidates, by_reason_json, input_json, candidate_ids_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                audit.mode,
                audit.executed_at,
                audit.project,
                audit.total_candidates as i64,
                audit.by_reason_json,
                audit.input_json,
                audit.candidate_ids_json,
            ],
        )?;
        Ok(id)
    }
}
