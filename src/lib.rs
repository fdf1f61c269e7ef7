pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod policy;
pub mod retention;
pub mod util;

use std::path::PathBuf;
use std::sync::Arc;

pub type SharedDB = Arc<db::MemoryDB>;

#[derive(Clone)]
pub struct AppState {
    pub db: SharedDB,
    pub api_key: Option<String>,
    /// Base directory ingestion sources are resolved against.
    pub root_dir: PathBuf,
    pub default_project: String,
    pub started_at: std::time::Instant,
}
