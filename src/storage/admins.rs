//! Admin and block (ban) record repositories.
//!
//! Role levels: 1 = removed admin (treated as Signer), 2 = Editor,
//! 3 = Administrator. A blocked identity may still authenticate but is
//! refused when trying to record or update a signature.

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;

use crate::error::AppResult;

use super::Store;

#[derive(Debug, Clone, Serialize)]
pub struct AdminRecord {
    pub orcid: String,
    pub name: String,
    pub role_level: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockRecord {
    pub orcid: String,
    pub name: String,
}

fn row_to_admin(row: &Row<'_>) -> rusqlite::Result<AdminRecord> {
    Ok(AdminRecord { orcid: row.get(0)?, name: row.get(1)?, role_level: row.get(2)? })
}

impl Store {
    pub fn get_admin(&self, orcid: &str) -> AppResult<Option<AdminRecord>> {
        let mut stmt = self
            .conn()
            .prepare_cached("SELECT orcid, name, role_level FROM admins WHERE orcid = ?1")?;
        Ok(stmt.query_row([orcid], row_to_admin).optional()?)
    }

    pub fn upsert_admin(&mut self, orcid: &str, name: &str, role_level: i64) -> AppResult<()> {
        self.conn().execute(
            "INSERT INTO admins (orcid, name, role_level) VALUES (?1, ?2, ?3) \
             ON CONFLICT (orcid) DO UPDATE SET name = excluded.name, \
                 role_level = excluded.role_level",
            params![orcid, name, role_level],
        )?;
        info!(orcid, role_level, "admin record upserted");
        Ok(())
    }

    pub fn delete_admin(&mut self, orcid: &str) -> AppResult<bool> {
        let n = self.conn().execute("DELETE FROM admins WHERE orcid = ?1", [orcid])?;
        Ok(n > 0)
    }

    pub fn list_admins(&self) -> AppResult<Vec<AdminRecord>> {
        let mut stmt = self
            .conn()
            .prepare_cached("SELECT orcid, name, role_level FROM admins")?;
        let rows = stmt.query_map([], row_to_admin)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Make sure the configured bootstrap identity is an Administrator
    /// (level 3), creating or upgrading its record as needed.
    pub fn ensure_bootstrap_admin(&mut self, orcid: &str, name: &str) -> AppResult<()> {
        self.conn().execute(
            "INSERT INTO admins (orcid, name, role_level) VALUES (?1, ?2, 3) \
             ON CONFLICT (orcid) DO UPDATE SET role_level = 3",
            params![orcid, name],
        )?;
        info!(orcid, "bootstrap administrator ensured");
        Ok(())
    }

    pub fn is_blocked(&self, orcid: &str) -> AppResult<bool> {
        let mut stmt = self
            .conn()
            .prepare_cached("SELECT COUNT(*) FROM blocks WHERE orcid = ?1")?;
        let n: i64 = stmt.query_row([orcid], |r| r.get(0))?;
        Ok(n > 0)
    }

    pub fn upsert_block(&mut self, orcid: &str, name: &str) -> AppResult<()> {
        self.conn().execute(
            "INSERT INTO blocks (orcid, name) VALUES (?1, ?2) \
             ON CONFLICT (orcid) DO UPDATE SET name = excluded.name",
            params![orcid, name],
        )?;
        info!(orcid, "identity blocked");
        Ok(())
    }

    pub fn list_blocks(&self) -> AppResult<Vec<BlockRecord>> {
        let mut stmt = self.conn().prepare_cached("SELECT orcid, name FROM blocks")?;
        let rows = stmt.query_map([], |row| {
            Ok(BlockRecord { orcid: row.get(0)?, name: row.get(1)? })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
