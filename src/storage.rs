//!
//! signatories storage module
//! --------------------------
//! SQLite-backed store for the four record types: campaigns, signatures,
//! admin records and block (ban) records. The schema carries the invariants
//! the request handlers rely on:
//!
//! - `signatures` has a storage-level UNIQUE over (orcid, campaign_slug), so
//!   "at most one signature per identity per campaign" holds under
//!   concurrent requests without check-then-act reads.
//! - `campaigns` has a CHECK tying `closed_date` to `is_active`: the closed
//!   timestamp is non-null exactly when the campaign is inactive.
//! - Multi-statement mutations (campaign delete with its signature cascade)
//!   run inside a single transaction.
//!
//! The public API centers around the `Store` type, wrapped in a thread-safe
//! `SharedStore` (`Arc<Mutex<Store>>`) by the server.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use tracing::info;

use crate::error::AppResult;

pub mod admins;
pub mod campaigns;
pub mod signatures;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS campaigns (
    slug               TEXT PRIMARY KEY,
    owner_orcid        TEXT NOT NULL,
    owner_name         TEXT NOT NULL,
    kind               TEXT NOT NULL,
    name               TEXT NOT NULL,
    short_description  TEXT NOT NULL,
    text               TEXT NOT NULL,
    sort_alphabetical  INTEGER NOT NULL DEFAULT 0,
    allow_anonymous    INTEGER NOT NULL DEFAULT 1,
    is_active          INTEGER NOT NULL DEFAULT 1,
    creation_date      TEXT NOT NULL,
    closed_date        TEXT,
    CHECK ((is_active = 1 AND closed_date IS NULL)
        OR (is_active = 0 AND closed_date IS NOT NULL))
);
CREATE TABLE IF NOT EXISTS signatures (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    orcid          TEXT NOT NULL,
    name           TEXT NOT NULL,
    campaign_slug  TEXT NOT NULL,
    affiliation    TEXT,
    anonymous      INTEGER NOT NULL DEFAULT 0,
    UNIQUE (orcid, campaign_slug)
);
CREATE TABLE IF NOT EXISTS admins (
    orcid       TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    role_level  INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS blocks (
    orcid  TEXT PRIMARY KEY,
    name   TEXT NOT NULL
);
";

/// Owns the SQLite connection. Repository operations are implemented in the
/// submodules as `impl Store` blocks, one per record type.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path`. This is the only fatal
    /// failure path in the service: an unreachable store aborts startup.
    pub fn open(path: &str) -> Result<Self> {
        if let Some(dir) = Path::new(path).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating database directory {}", dir.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening database at {}", path))?;
        // WAL for concurrent read access
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        info!(path, "store opened");
        Ok(Self { conn })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory database")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Flush WAL-resident commits into the main database file. Callers that
    /// copy the file must hold the store lock across checkpoint and read,
    /// otherwise a concurrent write can land between the two.
    pub fn checkpoint(&self) -> AppResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

/// Thread-safe handle shared across request handlers.
#[derive(Clone)]
pub struct SharedStore(pub Arc<Mutex<Store>>);

impl SharedStore {
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Store::open(path)?))))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Store::open_in_memory()?))))
    }

    pub fn lock(&self) -> MutexGuard<'_, Store> {
        self.0.lock()
    }
}
