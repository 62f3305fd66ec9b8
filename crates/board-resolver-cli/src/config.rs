//! Store location and seed file loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use board_resolver::SeedRecord;

/// Resolve the SQLite store path: flag, then `DB_PATH`, then the home default.
pub fn resolve_db_path(explicit: Option<&Path>) -> PathBuf {
    resolve_db_path_with(explicit, std::env::var("DB_PATH").ok())
}

fn resolve_db_path_with(explicit: Option<&Path>, env_path: Option<String>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(env_path) = env_path.filter(|p| !p.trim().is_empty()) {
        return PathBuf::from(env_path);
    }
    default_db_path()
}

fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".board-resolver")
        .join("resolutions.db")
}

/// Read a JSON array of `{ organization_id, claimed_jobs_url }` records.
/// Extra fields on each record are ignored.
pub fn load_seeds(path: &Path) -> Result<Vec<SeedRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seeds file: {}", path.display()))?;
    let seeds: Vec<SeedRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid seeds file: {}", path.display()))?;
    Ok(seeds)
}
