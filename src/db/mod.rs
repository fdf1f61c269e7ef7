//! SQLite-backed entry store with FTS5 full-text search.

mod entries;
pub mod fts;
pub mod migrate;
mod retention;
mod timeline;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};

pub use migrate::{Migration, MIGRATIONS};
pub use retention::{RetentionAudit, RetentionRow};

use crate::error::MemError;
use crate::policy::WriteGuard;

type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

pub const MAX_TITLE_LEN: usize = 120;
pub const MAX_SHORT_FIELD_LEN: usize = 64;
pub const DEFAULT_PROJECT: &str = "default";
pub const DEFAULT_ENTRY_TYPE: &str = "note";

/// Per-connection setup run by the pool on every new connection.
/// foreign_keys is a connection-level pragma, so it has to live here.
#[derive(Debug)]
struct ConnectionSetup {
    busy_timeout: Duration,
}

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error> for ConnectionSetup {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub busy_timeout: Duration,
    pub pool_size: Option<u32>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            pool_size: None,
        }
    }
}

/// A stored memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub title: String,
    pub body: String,
    pub entry_type: String,
    pub project: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Opaque serialized document, stored and returned verbatim.
    pub metadata: String,
    pub created_at: String,
    pub created_at_ms: i64,
    pub insertion_seq: i64,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct EntryInput {
    #[serde(default)]
    pub body: String,
    pub title: Option<String>,
    pub entry_type: Option<String>,
    pub project: Option<String>,
    pub session_id: Option<String>,
    pub source_ref: Option<String>,
    /// Fingerprint of the body; only set for ingested content.
    pub content_hash: Option<String>,
    pub metadata: Option<String>,
    /// Explicit creation time for backfills. Defaults to now.
    pub created_at_ms: Option<i64>,
}

impl EntryInput {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn title(mut self, t: impl Into<String>) -> Self {
        self.title = Some(t.into());
        self
    }

    pub fn entry_type(mut self, t: impl Into<String>) -> Self {
        self.entry_type = Some(t.into());
        self
    }

    pub fn project(mut self, p: impl Into<String>) -> Self {
        self.project = Some(p.into());
        self
    }

    pub fn session(mut self, s: impl Into<String>) -> Self {
        self.session_id = Some(s.into());
        self
    }

    pub fn source_ref(mut self, s: impl Into<String>) -> Self {
        self.source_ref = Some(s.into());
        self
    }

    pub fn content_hash(mut self, h: impl Into<String>) -> Self {
        self.content_hash = Some(h.into());
        self
    }

    pub fn metadata(mut self, m: impl Into<String>) -> Self {
        self.metadata = Some(m.into());
        self
    }

    pub fn created_at_ms(mut self, ms: i64) -> Self {
        self.created_at_ms = Some(ms);
        self
    }
}

/// Index view of an entry, as returned by search and timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySummary {
    pub id: String,
    pub title: String,
    pub entry_type: String,
    pub project: String,
    pub created_at: String,
    /// Relevance; higher is better. Always 0 outside of search.
    pub score: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default, alias = "q")]
    pub query: String,
    pub project: Option<String>,
    #[serde(alias = "type")]
    pub entry_type: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn project(mut self, p: impl Into<String>) -> Self {
        self.project = Some(p.into());
        self
    }

    pub fn entry_type(mut self, t: impl Into<String>) -> Self {
        self.entry_type = Some(t.into());
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub items: Vec<EntrySummary>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
    pub anchor_id: String,
    pub items: Vec<EntrySummary>,
}

/// Store handle. Owns the connection pool; pass it (or an `Arc` of it) to
/// whatever needs storage.
pub struct MemoryDB {
    pool: Pool<SqliteConnectionManager>,
    guard: Option<Arc<dyn WriteGuard>>,
}

impl MemoryDB {
    fn conn(&self) -> Result<PooledConn, MemError> {
        Ok(self.pool.get()?)
    }

    /// Open (or create) a store at the given path and bring its schema
    /// up to date. `":memory:"` gives a private in-memory store.
    pub fn open(path: &str) -> Result<Self, MemError> {
        Self::open_with(path, OpenOptions::default())
    }

    pub fn open_with(path: &str, opts: OpenOptions) -> Result<Self, MemError> {
        let in_memory = path == ":memory:";
        let manager = if in_memory {
            // Shared cache so all pool connections see the same in-memory DB.
            // Each store gets a unique name to avoid cross-test pollution.
            let name = uuid::Uuid::new_v4().to_string();
            SqliteConnectionManager::file(format!("file:{name}?mode=memory&cache=shared"))
        } else {
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MemError::Storage(format!("create {}: {e}", parent.display()))
                })?;
            }
            SqliteConnectionManager::file(path)
        };
        // 1 writer + readers in WAL mode
        let pool_size = opts.pool_size.unwrap_or(if in_memory { 2 } else { 8 });
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_customizer(Box::new(ConnectionSetup {
                busy_timeout: opts.busy_timeout,
            }))
            .build(manager)?;

        let mut conn = pool.get()?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let applied = migrate::migrate(&mut conn, MIGRATIONS)?;
        if !applied.is_empty() {
            tracing::info!(versions = ?applied, "schema migrations applied");
        }
        drop(conn);

        let db = Self { pool, guard: None };
        let (orphans, missing) = db.repair_fts()?;
        if orphans > 0 || missing > 0 {
            tracing::info!(orphans, missing, "reconciled FTS index");
        }
        Ok(db)
    }

    /// Install a guard consulted before every entry write.
    pub fn with_guard(mut self, guard: Arc<dyn WriteGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Flush the WAL into the main file and release every connection.
    pub fn close(self) -> Result<(), MemError> {
        let conn = self.conn()?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        drop(conn);
        drop(self.pool);
        tracing::debug!("store closed");
        Ok(())
    }

    /// Versions recorded in the migration ledger, ascending.
    pub fn applied_migrations(&self) -> Result<Vec<String>, MemError> {
        let conn = self.conn()?;
        migrate::applied_versions(&conn)
    }

    pub fn count_entries(&self) -> Result<usize, MemError> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// RFC 3339 UTC rendering with millisecond precision, e.g. `2026-02-10T00:00:00.000Z`.
pub fn iso_from_ms(ms: i64) -> Option<String> {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

/// Parse an RFC 3339 timestamp into epoch milliseconds.
pub fn parse_iso_ms(s: &str) -> Result<i64, MemError> {
    chrono::DateTime::parse_from_rfc3339(s.trim())
        .map(|t| t.timestamp_millis())
        .map_err(|e| MemError::invalid(format!("invalid timestamp '{s}': {e}")))
}

// FTS5 unicode61 splits on word boundaries which works for Latin scripts
// but indexes a whole CJK run as one token. We bigram CJK chars to get
// usable index terms.
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'   // CJK Unified Basic
        | '\u{3400}'..='\u{4DBF}' // CJK Extension A
        | '\u{F900}'..='\u{FAFF}' // CJK Compatibility
        | '\u{3040}'..='\u{30FF}' // Hiragana + Katakana
        | '\u{AC00}'..='\u{D7AF}' // Hangul
    )
}

/// Append CJK bigrams to text so FTS5 unicode61 can index Chinese/Japanese/Korean.
/// Original text is preserved intact; bigrams are appended after a space.
pub(crate) fn append_cjk_bigrams(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut bigrams = Vec::new();
    for pair in chars.windows(2) {
        if is_cjk(pair[0]) && is_cjk(pair[1]) {
            bigrams.push(pair.iter().collect::<String>());
        }
    }
    if bigrams.is_empty() {
        text.to_string()
    } else {
        format!("{} {}", text, bigrams.join(" "))
    }
}

/// Column order shared by every full-entry SELECT.
pub(crate) const ENTRY_COLS: &str = "id, title, body, entry_type, project, session_id, \
    source_ref, content_hash, metadata_json, created_at, created_at_unix_ms, insertion_seq";

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get("id")?,
        title: row.get("title")?,
        body: row.get("body")?,
        entry_type: row.get("entry_type")?,
        project: row.get("project")?,
        session_id: row.get("session_id")?,
        source_ref: row.get("source_ref")?,
        content_hash: row.get("content_hash")?,
        metadata: row.get("metadata_json")?,
        created_at: row.get("created_at")?,
        created_at_ms: row.get("created_at_unix_ms")?,
        insertion_seq: row.get("insertion_seq")?,
    })
}

impl From<&Entry> for EntrySummary {
    fn from(e: &Entry) -> Self {
        Self {
            id: e.id.clone(),
            title: e.title.clone(),
            entry_type: e.entry_type.clone(),
            project: e.project.clone(),
            created_at: e.created_at.clone(),
            score: 0.0,
        }
    }
}
