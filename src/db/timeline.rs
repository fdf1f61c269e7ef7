//! Chronological neighbourhood around an anchor entry.

use rusqlite::params;

use super::*;

pub const DEFAULT_DEPTH: usize = 3;
pub const MAX_DEPTH: usize = 20;

fn summary_from_row(row: &rusqlite::Row) -> rusqlite::Result<EntrySummary> {
    Ok(EntrySummary {
        id: row.get(0)?,
        title: row.get(1)?,
        entry_type: row.get(2)?,
        project: row.get(3)?,
        created_at: row.get(4)?,
        score: 0.0,
    })
}

impl MemoryDB {
    /// Up to `before` predecessors, the anchor, then up to `after`
    /// successors, all from the anchor's project and ordered by
    /// `(created_at, insertion_seq)` ascending.
    pub fn timeline(
        &self,
        anchor_id: &str,
        before: Option<usize>,
        after: Option<usize>,
    ) -> Result<Timeline, MemError> {
        let anchor_id = anchor_id.trim();
        if anchor_id.is_empty() {
            return Err(MemError::invalid("anchor id is required"));
        }
        let before = before.unwrap_or(DEFAULT_DEPTH).min(MAX_DEPTH);
        let after = after.unwrap_or(DEFAULT_DEPTH).min(MAX_DEPTH);

        let anchor = self
            .get(anchor_id)?
            .ok_or_else(|| MemError::EntryNotFound(anchor_id.to_string()))?;

        let conn = self.conn()?;
        let mut prev = conn.prepare(
            "SELECT id, title, entry_type, project, created_at FROM entries \
             WHERE project = ?1 AND (created_at_unix_ms, insertion_seq) < (?2, ?3) \
             ORDER BY created_at_unix_ms DESC, insertion_seq DESC LIMIT ?4",
        )?;
        let mut items: Vec<EntrySummary> = prev
            .query_map(
                params![anchor.project, anchor.created_at_ms, anchor.insertion_seq, before as i64],
                summary_from_row,
            )?
            .collect::<Result<_, _>>()?;
        items.reverse();

        items.push(EntrySummary::from(&anchor));

        let mut next = conn.prepare(
            "SELECT id, title, entry_type, project, created_at FROM entries \
             WHERE project = ?1 AND (created_at_unix_ms, insertion_seq) > (?2, ?3) \
             ORDER BY created_at_unix_ms ASC, insertion_seq ASC LIMIT ?4",
        )?;
        let successors = next.query_map(
            params![anchor.project, anchor.created_at_ms, anchor.insertion_seq, after as i64],
            summary_from_row,
        )?;
        for s in successors {
            items.push(s?);
        }

        Ok(Timeline {
            anchor_id: anchor.id,
            items,
        })
    }
}
