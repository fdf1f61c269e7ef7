//! Import project documents as entries, deduplicated by content fingerprint.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::db::{EntryInput, MemoryDB, MAX_TITLE_LEN};
use crate::error::MemError;
use crate::util::{clip_chars, normalize_source_ref};

pub const DEFAULT_INGEST_TYPE: &str = "ingestion";
pub const DEFAULT_SOURCES: &[&str] = &[
    "docs/session-log.md",
    "docs/decisions.md",
    "docs/requirements.md",
];

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub root_dir: PathBuf,
    pub project: String,
    /// Paths relative to `root_dir`.
    pub sources: Vec<String>,
    pub entry_type: Option<String>,
}

impl IngestRequest {
    /// Request for the default document set.
    pub fn new(root_dir: impl Into<PathBuf>, project: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            project: project.into(),
            sources: DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
            entry_type: None,
        }
    }

    pub fn sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn entry_type(mut self, t: impl Into<String>) -> Self {
        self.entry_type = Some(t.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub processed_sources: usize,
    pub imported_entries: usize,
    pub duplicate_entries: usize,
    pub skipped_sources: Vec<String>,
}

/// SHA-256 of the text, lowercase hex.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// First `# ` heading, else the file name.
pub fn derive_title(source_ref: &str, body: &str) -> String {
    let heading = body
        .lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix("# "))
        .map(str::trim);
    let title = match heading {
        Some(h) => h,
        None => source_ref.rsplit('/').next().unwrap_or(source_ref),
    };
    clip_chars(title, MAX_TITLE_LEN)
}

fn stays_inside_root(rel: &Path) -> bool {
    rel.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

pub fn ingest(db: &MemoryDB, req: &IngestRequest) -> Result<IngestReport, MemError> {
    let entry_type = req
        .entry_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_INGEST_TYPE);
    let mut report = IngestReport::default();

    // every path is checked before anything is written
    let source_refs: Vec<String> = req
        .sources
        .iter()
        .map(|s| normalize_source_ref(s))
        .filter(|s| !s.is_empty())
        .collect();
    if let Some(bad) = source_refs.iter().find(|s| !stays_inside_root(Path::new(s))) {
        return Err(MemError::invalid(format!(
            "source must be a relative path inside the root: {bad}"
        )));
    }

    for source_ref in source_refs {
        let path = req.root_dir.join(&source_ref);
        if !path.is_file() {
            tracing::debug!(%source_ref, "source missing, skipped");
            report.skipped_sources.push(source_ref);
            continue;
        }
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(%source_ref, error = %e, "source unreadable, skipped");
                report.skipped_sources.push(source_ref);
                continue;
            }
        };
        // invalid UTF-8 sequences become U+FFFD
        let body = String::from_utf8_lossy(&bytes).into_owned();
        if body.trim().is_empty() {
            tracing::warn!(%source_ref, "source is empty, skipped");
            report.skipped_sources.push(source_ref);
            continue;
        }
        report.processed_sources += 1;

        let hash = content_hash(&body);
        if db.exists_for_source_and_hash(&source_ref, &hash)? {
            report.duplicate_entries += 1;
            db.record_ingestion_event(&source_ref, 0)?;
            continue;
        }

        let metadata = serde_json::json!({ "ingestion": true, "source_ref": source_ref });
        let input = EntryInput::new(body.as_str())
            .title(derive_title(&source_ref, &body))
            .entry_type(entry_type)
            .project(req.project.as_str())
            .source_ref(source_ref.as_str())
            .content_hash(hash)
            .metadata(metadata.to_string());

        match db.insert(input) {
            Ok(entry) => {
                db.record_ingestion_event(&source_ref, 1)?;
                report.imported_entries += 1;
                tracing::info!(%source_ref, id = %entry.id, "ingested");
            }
            // lost a race with another writer holding the same content
            Err(MemError::DuplicateContent { .. }) => {
                report.duplicate_entries += 1;
                db.record_ingestion_event(&source_ref, 0)?;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        processed = report.processed_sources,
        imported = report.imported_entries,
        duplicates = report.duplicate_entries,
        skipped = report.skipped_sources.len(),
        "ingestion finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            content_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn title_prefers_first_h1() {
        let body = "intro\n## Sub\n  # Decisions Log  \n# Later";
        assert_eq!(derive_title("docs/decisions.md", body), "Decisions Log");
    }

    #[test]
    fn title_falls_back_to_file_name() {
        assert_eq!(derive_title("docs/session-log.md", "no heading here"), "session-log.md");
        assert_eq!(derive_title("README", "#not-a-heading"), "README");
    }

    #[test]
    fn rejects_paths_leaving_root() {
        assert!(stays_inside_root(Path::new("docs/a.md")));
        assert!(stays_inside_root(Path::new("./docs/a.md")));
        assert!(!stays_inside_root(Path::new("../secrets.md")));
        assert!(!stays_inside_root(Path::new("/etc/passwd")));
    }
}
