//! FTS5 index maintenance and ranked search.

use rusqlite::types::ToSql;
use rusqlite::{params, Connection};

use super::*;

pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Index one entry. Runs on the caller's connection so it shares the
/// entry's transaction.
pub(super) fn fts_insert(conn: &Connection, id: &str, title: &str, body: &str) -> Result<(), MemError> {
    conn.execute(
        "INSERT INTO entries_fts(id, title, body) VALUES (?1, ?2, ?3)",
        params![id, append_cjk_bigrams(title), append_cjk_bigrams(body)],
    )?;
    Ok(())
}

/// Turn free text into an FTS5 MATCH expression: every whitespace token
/// becomes a quoted phrase and phrases are OR-ed. Double quotes inside a
/// token are dropped so user input can never produce FTS5 operators.
/// CJK runs additionally contribute their bigrams, mirroring how they are
/// indexed.
///
/// Returns `None` when nothing searchable is left.
pub fn build_match_query(query: &str) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();
    for raw in query.split_whitespace() {
        let token = raw.replace('"', "");
        if token.is_empty() {
            continue;
        }
        let chars: Vec<char> = token.chars().collect();
        let cjk_run = chars.len() > 2 && chars.iter().all(|c| is_cjk(*c));
        terms.push(format!("\"{token}\""));
        if cjk_run {
            for pair in chars.windows(2) {
                terms.push(format!("\"{}\"", pair.iter().collect::<String>()));
            }
        }
    }
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

impl MemoryDB {
    /// Ranked full-text search over titles and bodies.
    ///
    /// Ordering is BM25 relevance first, then newer `created_at` first.
    /// `total` counts every match under the same filters, ignoring paging.
    pub fn search(&self, q: &SearchQuery) -> Result<SearchPage, MemError> {
        let fts_query = build_match_query(&q.query)
            .ok_or_else(|| MemError::invalid("query is required"))?;
        let limit = q.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
        let offset = q.offset.unwrap_or(0);
        let sql_offset = i64::try_from(offset)
            .map_err(|_| MemError::invalid(format!("offset out of range: {offset}")))?;

        let mut clauses = vec!["entries_fts MATCH ?1".to_string()];
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(fts_query)];
        if let Some(p) = q.project.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            args.push(Box::new(p.to_string()));
            clauses.push(format!("e.project = ?{}", args.len()));
        }
        if let Some(t) = q.entry_type.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            args.push(Box::new(t.to_string()));
            clauses.push(format!("e.entry_type = ?{}", args.len()));
        }
        let filter = clauses.join(" AND ");
        let n = args.len();

        let conn = self.conn()?;
        let filter_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let total: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM entries_fts \
                 JOIN entries e ON e.id = entries_fts.id WHERE {filter}"
            ),
            filter_refs.as_slice(),
            |r| r.get(0),
        )?;

        args.push(Box::new(limit as i64));
        args.push(Box::new(sql_offset));
        let page_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
        let sql = format!(
            "SELECT e.id, e.title, e.entry_type, e.project, e.created_at, \
                    bm25(entries_fts) AS rank_score \
             FROM entries_fts JOIN entries e ON e.id = entries_fts.id \
             WHERE {filter} \
             ORDER BY rank_score ASC, e.created_at_unix_ms DESC, e.insertion_seq DESC \
             LIMIT ?{} OFFSET ?{}",
            n + 1,
            n + 2
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(page_refs.as_slice(), |row| {
                let rank: f64 = row.get("rank_score")?;
                Ok(EntrySummary {
                    id: row.get("id")?,
                    title: row.get("title")?,
                    entry_type: row.get("entry_type")?,
                    project: row.get("project")?,
                    created_at: row.get("created_at")?,
                    // bm25 is lower-is-better
                    score: if rank.is_finite() { -rank } else { 0.0 },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SearchPage {
            items,
            total: total as usize,
            limit,
            offset,
        })
    }

    /// Reconcile the FTS table with `entries`: drop orphan index rows and
    /// index entries that have none. Returns `(orphans_removed, missing_indexed)`.
    pub fn repair_fts(&self) -> Result<(usize, usize), MemError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let orphans = tx.execute(
            "DELETE FROM entries_fts WHERE id NOT IN (SELECT id FROM entries)",
            [],
        )?;

        let missing: Vec<(String, String, String)> = {
            let mut stmt = tx.prepare(
                "SELECT id, title, body FROM entries \
                 WHERE id NOT IN (SELECT id FROM entries_fts)",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        for (id, title, body) in &missing {
            fts_insert(&tx, id, title, body)?;
        }
        tx.commit()?;

        Ok((orphans, missing.len()))
    }
}

#[cfg(test)]
#[path = "fts_tests.rs"]
mod tests;
