//! Runtime settings resolved from the environment.
//!
//! Every `MEMORY_*` variable has a built-in default. The DB path and
//! project name also honour the older `CODEX_MEM_*` names when the new
//! ones are unset. CLI flags override whatever is resolved here.

use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = ".memory/context-memory.db";
pub const DEFAULT_PORT: u16 = 3917;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_path: String,
    pub project: String,
    pub api_key: Option<String>,
    pub port: u16,
    pub busy_timeout: Duration,
    /// Run the secret-pattern guard before writes.
    pub policy_enabled: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let var = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let var_or = |primary: &str, legacy: &str| var(primary).or_else(|| var(legacy));

        Self {
            db_path: var_or("MEMORY_DB_PATH", "CODEX_MEM_DB_PATH")
                .unwrap_or_else(|| DEFAULT_DB_PATH.into()),
            project: var_or("MEMORY_PROJECT_NAME", "CODEX_MEM_PROJECT_NAME")
                .unwrap_or_else(|| crate::db::DEFAULT_PROJECT.into()),
            api_key: var("MEMORY_API_KEY"),
            port: var("MEMORY_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            busy_timeout: Duration::from_millis(
                var("MEMORY_BUSY_TIMEOUT_MS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
            ),
            policy_enabled: !var("MEMORY_POLICY")
                .map(|v| v.eq_ignore_ascii_case("off"))
                .unwrap_or(false),
        }
    }
}
