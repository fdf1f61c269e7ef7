//! Report-only retention analysis.
//!
//! Two independent rules flag entries as deletion candidates:
//!
//! - **age**: created more than `max_age_days` before `now`
//! - **project count**: beyond the newest `max_entries_per_project` in its
//!   project, ordered by `(created_at, insertion_seq)` descending
//!
//! The reported set is the union of both. Each rule keeps its own count, so
//! an entry flagged twice counts once in `total_candidates` and once in each
//! reason bucket. Nothing is ever deleted; every run appends one audit row.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::db::{iso_from_ms, now_ms, MemoryDB, RetentionAudit, RetentionRow};
use crate::error::MemError;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Default)]
pub struct RetentionRequest {
    /// Reference time. Defaults to the wall clock.
    pub now_ms: Option<i64>,
    pub max_age_days: Option<i64>,
    pub max_entries_per_project: Option<i64>,
    pub project: Option<String>,
}

impl RetentionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(mut self, ms: i64) -> Self {
        self.now_ms = Some(ms);
        self
    }

    pub fn max_age_days(mut self, days: i64) -> Self {
        self.max_age_days = Some(days);
        self
    }

    pub fn max_entries_per_project(mut self, n: i64) -> Self {
        self.max_entries_per_project = Some(n);
        self
    }

    pub fn project(mut self, p: impl Into<String>) -> Self {
        self.project = Some(p.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReasonCounts {
    pub age: usize,
    pub project_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetentionReport {
    pub mode: &'static str,
    pub executed_at: String,
    pub total_candidates: usize,
    pub by_reason: ReasonCounts,
    /// Lexically sorted.
    pub candidate_ids: Vec<String>,
}

fn positive(value: Option<i64>, name: &str) -> Result<Option<i64>, MemError> {
    match value {
        Some(v) if v <= 0 => Err(MemError::invalid(format!("{name} must be greater than 0"))),
        other => Ok(other),
    }
}

/// Apply both rules to rows that are grouped by project and newest-first
/// within each project. Returns `(age_candidates, count_candidates)`.
pub fn select_candidates(
    rows: &[RetentionRow],
    age_cutoff_ms: Option<i64>,
    max_per_project: Option<usize>,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut by_age = BTreeSet::new();
    let mut by_count = BTreeSet::new();
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for row in rows {
        if let Some(cutoff) = age_cutoff_ms {
            if row.created_at_ms < cutoff {
                by_age.insert(row.id.clone());
            }
        }
        if let Some(cap) = max_per_project {
            let pos = seen.entry(row.project.as_str()).or_insert(0);
            if *pos >= cap {
                by_count.insert(row.id.clone());
            }
            *pos += 1;
        }
    }
    (by_age, by_count)
}

/// Evaluate the retention rules against the store and record the outcome.
pub fn dry_run(db: &MemoryDB, req: &RetentionRequest) -> Result<RetentionReport, MemError> {
    let max_age_days = positive(req.max_age_days, "max_age_days")?;
    let max_per_project = positive(req.max_entries_per_project, "max_entries_per_project")?;
    if max_age_days.is_none() && max_per_project.is_none() {
        return Err(MemError::invalid("at least one retention rule must be set"));
    }
    let project = req
        .project
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    let now = req.now_ms.unwrap_or_else(now_ms);
    let executed_at =
        iso_from_ms(now).ok_or_else(|| MemError::invalid(format!("now out of range: {now}")))?;
    let cutoff = max_age_days.map(|d| now.saturating_sub(d.saturating_mul(MS_PER_DAY)));

    let rows = db.list_for_retention(project.as_deref())?;
    let (by_age, by_count) = select_candidates(
        &rows,
        cutoff,
        max_per_project.map(|n| usize::try_from(n).unwrap_or(usize::MAX)),
    );

    // BTreeSet union iterates in sorted order
    let candidate_ids: Vec<String> = by_age.union(&by_count).cloned().collect();
    let report = RetentionReport {
        mode: "dry-run",
        executed_at,
        total_candidates: candidate_ids.len(),
        by_reason: ReasonCounts {
            age: by_age.len(),
            project_count: by_count.len(),
        },
        candidate_ids,
    };

    db.record_retention_audit(&RetentionAudit {
        mode: report.mode.to_string(),
        executed_at: report.executed_at.clone(),
        project: project.clone(),
        total_candidates: report.total_candidates,
        by_reason_json: serde_json::json!({
            "age": report.by_reason.age,
            "project_count": report.by_reason.project_count,
        })
        .to_string(),
        input_json: serde_json::json!({
            "now": report.executed_at,
            "max_age_days": max_age_days,
            "max_entries_per_project": max_per_project,
            "project": project,
        })
        .to_string(),
        candidate_ids_json: serde_json::json!(report.candidate_ids).to_string(),
    })?;

    tracing::info!(
        total = report.total_candidates,
        age = report.by_reason.age,
        project_count = report.by_reason.project_count,
        project = project.as_deref().unwrap_or("*"),
        "retention dry-run"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, project: &str, ms: i64) -> RetentionRow {
        RetentionRow {
            id: id.into(),
            project: project.into(),
            created_at_ms: ms,
        }
    }

    #[test]
    fn count_rule_is_per_project() {
        let rows = vec![
            row("a3", "a", 30),
            row("a2", "a", 20),
            row("a1", "a", 10),
            row("b1", "b", 5),
        ];
        let (age, count) = select_candidates(&rows, None, Some(1));
        assert!(age.is_empty());
        assert_eq!(count.into_iter().collect::<Vec<_>>(), vec!["a1", "a2"]);
    }

    #[test]
    fn age_rule_is_strictly_older_than_cutoff() {
        let rows = vec![row("x", "p", 100), row("y", "p", 99)];
        let (age, count) = select_candidates(&rows, Some(100), None);
        assert_eq!(age.into_iter().collect::<Vec<_>>(), vec!["y"]);
        assert!(count.is_empty());
    }

    #[test]
    fn overlapping_rules_count_in_both_buckets() {
        let rows = vec![row("new", "p", 1_000), row("old", "p", 1)];
        let (age, count) = select_candidates(&rows, Some(500), Some(1));
        assert!(age.contains("old") && count.contains("old"));
        assert_eq!(age.union(&count).count(), 1);
    }

    #[test]
    fn rejects_non_positive_limits() {
        assert!(positive(Some(0), "x").is_err());
        assert!(positive(Some(-3), "x").is_err());
        assert_eq!(positive(Some(2), "x").unwrap(), Some(2));
        assert_eq!(positive(None, "x").unwrap(), None);
    }
}
