//! Resolution cache and board registry.
//!
//! The core only needs [`ResolutionCache`]: single-key `get`/`put`,
//! last write wins. [`MemoryCache`] backs tests and one-off runs;
//! [`SqliteCache`] persists across runs and also carries the board registry
//! (one row per canonical board, plus the organization fan-out table).

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::types::{ResolutionResult, ResolverError, ResolverResult, SourceType};

/// A cached result with its validity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub result: ResolutionResult,
    pub checked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(result: ResolutionResult, ttl: Duration) -> Self {
        let checked_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = checked_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            result,
            checked_at,
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Storage for resolved seeds, keyed by canonical seed URL.
pub trait ResolutionCache: Send + Sync {
    /// The live entry for `key`; `None` when absent or expired.
    fn get(&self, key: &str) -> ResolverResult<Option<CacheEntry>>;

    /// Insert or replace the entry for `key`.
    fn put(&self, key: &str, result: &ResolutionResult, ttl: Duration) -> ResolverResult<()>;
}

// ── In-memory ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResolutionCache for MemoryCache {
    fn get(&self, key: &str) -> ResolverResult<Option<CacheEntry>> {
        Ok(self
            .entries
            .get(key)
            .map(|e| e.value().clone())
            .filter(|e| !e.is_expired()))
    }

    fn put(&self, key: &str, result: &ResolutionResult, ttl: Duration) -> ResolverResult<()> {
        self.entries
            .insert(key.to_string(), CacheEntry::new(result.clone(), ttl));
        Ok(())
    }
}

// ── SQLite ──────────────────────────────────────────────────────────────────

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS resolution_cache (
        seed_key TEXT PRIMARY KEY,
        seed_url TEXT NOT NULL,
        canonical_jobs_url TEXT NOT NULL,
        jobs_source_type TEXT NOT NULL,
        adapter TEXT NOT NULL,
        confidence REAL NOT NULL,
        discovered_via TEXT NOT NULL,
        notes TEXT NOT NULL,
        manual_review INTEGER NOT NULL,
        checked_at TEXT NOT NULL,
        expires_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS board (
        canonical_jobs_url TEXT PRIMARY KEY,
        jobs_source_type TEXT NOT NULL,
        adapter TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS org_board (
        org_id TEXT NOT NULL,
        canonical_jobs_url TEXT NOT NULL,
        PRIMARY KEY (org_id, canonical_jobs_url)
    );
";

/// One row of the board registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub canonical_jobs_url: String,
    pub jobs_source_type: SourceType,
    pub adapter: String,
}

/// SQLite-backed cache and board registry.
pub struct SqliteCache {
    db: Mutex<Connection>,
}

impl SqliteCache {
    /// Open or create a store at `path`, creating parent directories.
    pub fn open(path: &Path) -> ResolverResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> ResolverResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> ResolverResult<Self> {
        db.execute_batch(SCHEMA)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> ResolverResult<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| ResolverError::Cache("sqlite connection lock poisoned".to_string()))
    }

    /// Insert a board, or refresh its type and adapter.
    pub fn upsert_board(&self, result: &ResolutionResult) -> ResolverResult<()> {
        self.conn()?.execute(
            "INSERT INTO board (canonical_jobs_url, jobs_source_type, adapter, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(canonical_jobs_url) DO UPDATE SET
                jobs_source_type = excluded.jobs_source_type,
                adapter = excluded.adapter,
                updated_at = excluded.updated_at",
            params![
                result.canonical_jobs_url,
                result.jobs_source_type.as_str(),
                result.adapter,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Record that `org_id` posts on `canonical_jobs_url`. Idempotent.
    pub fn map_org_board(&self, org_id: &str, canonical_jobs_url: &str) -> ResolverResult<()> {
        self.conn()?.execute(
            "INSERT OR IGNORE INTO org_board (org_id, canonical_jobs_url) VALUES (?1, ?2)",
            params![org_id, canonical_jobs_url],
        )?;
        Ok(())
    }

    /// Boards an organization is mapped to, ordered by URL.
    pub fn boards_for_org(&self, org_id: &str) -> ResolverResult<Vec<Board>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT b.canonical_jobs_url, b.jobs_source_type, b.adapter
             FROM org_board o
             JOIN board b ON b.canonical_jobs_url = o.canonical_jobs_url
             WHERE o.org_id = ?1
             ORDER BY b.canonical_jobs_url",
        )?;
        let rows = stmt.query_map(params![org_id], |row| {
            Ok(Board {
                canonical_jobs_url: row.get(0)?,
                jobs_source_type: SourceType::parse(&row.get::<_, String>(1)?),
                adapter: row.get(2)?,
            })
        })?;
        let boards = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(boards)
    }

    pub fn board_count(&self) -> ResolverResult<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM board", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn parse_timestamp(raw: &str) -> ResolverResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ResolverError::Cache(format!("bad timestamp {raw:?}: {e}")))
}

impl ResolutionCache for SqliteCache {
    fn get(&self, key: &str) -> ResolverResult<Option<CacheEntry>> {
        let db = self.conn()?;
        let row = db
            .query_row(
                "SELECT seed_url, canonical_jobs_url, jobs_source_type, adapter, confidence,
                        discovered_via, notes, manual_review, checked_at, expires_at
                 FROM resolution_cache WHERE seed_key = ?1",
                params![key],
                |row| {
                    let result = ResolutionResult {
                        seed_url: row.get(0)?,
                        canonical_jobs_url: row.get(1)?,
                        jobs_source_type: SourceType::parse(&row.get::<_, String>(2)?),
                        adapter: row.get(3)?,
                        confidence: row.get(4)?,
                        discovered_via: row.get(5)?,
                        notes: row.get(6)?,
                        manual_review: row.get::<_, i64>(7)? != 0,
                    };
                    Ok((result, row.get::<_, String>(8)?, row.get::<_, String>(9)?))
                },
            )
            .optional()?;

        let Some((result, checked_at, expires_at)) = row else {
            return Ok(None);
        };
        let entry = CacheEntry {
            result,
            checked_at: parse_timestamp(&checked_at)?,
            expires_at: parse_timestamp(&expires_at)?,
        };
        Ok((!entry.is_expired()).then_some(entry))
    }

    fn put(&self, key: &str, result: &ResolutionResult, ttl: Duration) -> ResolverResult<()> {
        let entry = CacheEntry::new(result.clone(), ttl);
        self.conn()?.execute(
            "INSERT INTO resolution_cache (
                seed_key, seed_url, canonical_jobs_url, jobs_source_type, adapter,
                confidence, discovered_via, notes, manual_review, checked_at, expires_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(seed_key) DO UPDATE SET
                seed_url = excluded.seed_url,
                canonical_jobs_url = excluded.canonical_jobs_url,
                jobs_source_type = excluded.jobs_source_type,
                adapter = excluded.adapter,
                confidence = excluded.confidence,
                discovered_via = excluded.discovered_via,
                notes = excluded.notes,
                manual_review = excluded.manual_review,
                checked_at = excluded.checked_at,
                expires_at = excluded.expires_at",
            params![
                key,
                result.seed_url,
                result.canonical_jobs_url,
                result.jobs_source_type.as_str(),
                result.adapter,
                result.confidence,
                result.discovered_via,
                result.notes,
                result.manual_review as i64,
                entry.checked_at.to_rfc3339(),
                entry.expires_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
