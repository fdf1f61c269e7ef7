//! Entry writes and point/batch reads.

use std::collections::HashMap;

use rusqlite::{params, params_from_iter, TransactionBehavior};
use uuid::Uuid;

use super::*;
use crate::policy::EntryDraft;
use crate::util::clip_chars;

pub const MAX_BATCH_IDS: usize = 200;

/// Normalized, validated form of an `EntryInput`.
struct NewEntry {
    title: String,
    body: String,
    entry_type: String,
    project: String,
    session_id: Option<String>,
    source_ref: Option<String>,
    content_hash: Option<String>,
    metadata: String,
    created_at: String,
    created_at_ms: i64,
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn short_field(v: Option<String>, fallback: &str) -> String {
    non_blank(v)
        .map(|s| clip_chars(&s, MAX_SHORT_FIELD_LEN))
        .unwrap_or_else(|| fallback.to_string())
}

fn normalize(input: EntryInput) -> Result<NewEntry, MemError> {
    let trimmed = input.body.trim();
    if trimmed.is_empty() {
        return Err(MemError::invalid("text is required"));
    }
    let title = match non_blank(input.title) {
        Some(t) => clip_chars(&t, MAX_TITLE_LEN),
        None => clip_chars(trimmed, MAX_TITLE_LEN),
    };
    let created_at_ms = input.created_at_ms.unwrap_or_else(now_ms);
    let created_at = iso_from_ms(created_at_ms).ok_or_else(|| {
        MemError::invalid(format!("created_at_ms out of range: {created_at_ms}"))
    })?;
    Ok(NewEntry {
        title,
        entry_type: short_field(input.entry_type, DEFAULT_ENTRY_TYPE),
        project: short_field(input.project, DEFAULT_PROJECT),
        session_id: non_blank(input.session_id),
        source_ref: non_blank(input.source_ref),
        content_hash: non_blank(input.content_hash),
        metadata: input.metadata.unwrap_or_else(|| "{}".into()),
        created_at,
        created_at_ms,
        body: input.body,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _)
        if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
}

impl MemoryDB {
    /// Insert a new entry. The project row, the session row (if any), the
    /// entry and its FTS row are written in one transaction.
    ///
    /// Fails with `DuplicateContent` when another entry already holds the
    /// same `(source_ref, content_hash)` pair.
    pub fn insert(&self, input: EntryInput) -> Result<Entry, MemError> {
        let e = normalize(input)?;

        if let Some(guard) = &self.guard {
            guard
                .check(&EntryDraft {
                    title: &e.title,
                    body: &e.body,
                    metadata: &e.metadata,
                })
                .map_err(MemError::PolicyBlocked)?;
        }

        let id = Uuid::new_v4().to_string();
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT OR IGNORE INTO projects (name, created_at) VALUES (?1, ?2)",
            params![e.project, e.created_at],
        )?;
        if let Some(ref sid) = e.session_id {
            tx.execute(
                "INSERT OR IGNORE INTO sessions (id, project, created_at) VALUES (?1, ?2, ?3)",
                params![sid, e.project, e.created_at],
            )?;
        }

        let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(insertion_seq), 0) + 1 FROM entries",
            [],
            |r| r.get(0),
        )?;

        let inserted = tx.execute(
            "INSERT INTO entries \
             (id, title, body, entry_type, project, session_id, source_ref, content_hash, \
              metadata_json, created_at, created_at_unix_ms, insertion_seq) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                id,
                e.title,
                e.body,
                e.entry_type,
                e.project,
                e.session_id,
                e.source_ref,
                e.content_hash,
                e.metadata,
                e.created_at,
                e.created_at_ms,
                seq,
            ],
        );
        if let Err(err) = inserted {
            if e.content_hash.is_some() && is_unique_violation(&err) {
                let source_ref = e.source_ref.unwrap_or_default();
                tracing::debug!(%source_ref, "duplicate content rejected");
                return Err(MemError::DuplicateContent { source_ref });
            }
            return Err(err.into());
        }

        fts::fts_insert(&tx, &id, &e.title, &e.body)?;
        tx.commit()?;

        Ok(Entry {
            id,
            title: e.title,
            body: e.body,
            entry_type: e.entry_type,
            project: e.project,
            session_id: e.session_id,
            source_ref: e.source_ref,
            content_hash: e.content_hash,
            metadata: e.metadata,
            created_at: e.created_at,
            created_at_ms: e.created_at_ms,
            insertion_seq: seq,
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<Entry>, MemError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {ENTRY_COLS} FROM entries WHERE id = ?1"))?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_entry(row)?)),
            None => Ok(None),
        }
    }

    /// Fetch full records in the caller's order. Unknown IDs are skipped.
    pub fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Entry>, MemError> {
        if ids.len() > MAX_BATCH_IDS {
            return Err(MemError::invalid(format!(
                "ids exceeds maximum batch size ({MAX_BATCH_IDS})"
            )));
        }
        let clean: Vec<&str> = ids.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
        if clean.is_empty() {
            return Err(MemError::invalid("ids is required"));
        }

        let placeholders = (1..=clean.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(",");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLS} FROM entries WHERE id IN ({placeholders})"
        ))?;
        let found: HashMap<String, Entry> = stmt
            .query_map(params_from_iter(clean.iter()), row_to_entry)?
            .map(|r| r.map(|e| (e.id.clone(), e)))
            .collect::<Result<_, _>>()?;

        let mut out = Vec::with_capacity(clean.len());
        for id in clean {
            // repeated ids in the request repeat in the result
            if let Some(e) = found.get(id) {
                out.push(e.clone());
            }
        }
        Ok(out)
    }

    /// Fast dedupe check used by ingestion before attempting a write.
    pub fn exists_for_source_and_hash(&self, source_ref: &str, hash: &str) -> Result<bool, MemError> {
        let found: bool = self.conn()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM entries WHERE source_ref = ?1 AND content_hash = ?2)",
            params![source_ref, hash],
            |r| r.get(0),
        )?;
        Ok(found)
    }

    /// Append one ingestion attempt to the audit log. Returns the event id.
    pub fn record_ingestion_event(&self, source_ref: &str, imported_count: u32) -> Result<String, MemError> {
        let id = Uuid::new_v4().to_string();
        let imported_at = iso_from_ms(now_ms()).unwrap_or_default();
        self.conn()?.execute(
            "INSERT INTO ingestion_events (id, source_ref, imported_at, imported_count) \
             VALUES (?1, ?2, ?3, ?4)",
            params![id, source_ref, imported_at, imported_count],
        )?;
        Ok(id)
    }
}
