//! Signature repository.
//!
//! At most one signature per (identity, campaign), enforced by the UNIQUE
//! constraint: the upsert is a single atomic statement, never a read followed
//! by an insert. The display name is a snapshot taken at first signing and is
//! never refreshed, even if the provider name changes later.

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;

use crate::error::AppResult;
use crate::identity::Identity;

use super::Store;

#[derive(Debug, Clone, Serialize)]
pub struct Signature {
    pub id: i64,
    pub orcid: String,
    /// Display name as it was when the identity first signed.
    pub name: String,
    pub campaign_slug: String,
    pub affiliation: Option<String>,
    pub anonymous: bool,
}

fn row_to_signature(row: &Row<'_>) -> rusqlite::Result<Signature> {
    Ok(Signature {
        id: row.get(0)?,
        orcid: row.get(1)?,
        name: row.get(2)?,
        campaign_slug: row.get(3)?,
        affiliation: row.get(4)?,
        anonymous: row.get(5)?,
    })
}

const SIGNATURE_COLS: &str = "id, orcid, name, campaign_slug, affiliation, anonymous";

impl Store {
    /// Create or update the identity's signature for one campaign. An empty
    /// affiliation is stored as NULL. On conflict only affiliation and
    /// anonymity are updated (last-write-wins); the name snapshot stays.
    pub fn upsert_signature(
        &mut self,
        identity: &Identity,
        slug: &str,
        affiliation: &str,
        anonymous: bool,
    ) -> AppResult<()> {
        let affiliation = if affiliation.is_empty() { None } else { Some(affiliation) };
        self.conn().execute(
            "INSERT INTO signatures (orcid, name, campaign_slug, affiliation, anonymous) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT (orcid, campaign_slug) DO UPDATE SET \
                 affiliation = excluded.affiliation, anonymous = excluded.anonymous",
            params![identity.orcid, identity.name, slug, affiliation, anonymous],
        )?;
        info!(orcid = %identity.orcid, slug, anonymous, "signature recorded");
        Ok(())
    }

    pub fn get_signature(&self, orcid: &str, slug: &str) -> AppResult<Option<Signature>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {} FROM signatures WHERE orcid = ?1 AND campaign_slug = ?2",
            SIGNATURE_COLS
        ))?;
        Ok(stmt.query_row([orcid, slug], row_to_signature).optional()?)
    }

    /// Self-service removal of one signature. Returns whether a row existed.
    pub fn delete_signature(&mut self, orcid: &str, slug: &str) -> AppResult<bool> {
        let n = self.conn().execute(
            "DELETE FROM signatures WHERE orcid = ?1 AND campaign_slug = ?2",
            [orcid, slug],
        )?;
        Ok(n > 0)
    }

    /// Administrator bulk action: remove an identity's signatures across all
    /// campaigns. Returns the number of rows removed.
    pub fn delete_signatures_by_identity(&mut self, orcid: &str) -> AppResult<usize> {
        let n = self
            .conn()
            .execute("DELETE FROM signatures WHERE orcid = ?1", [orcid])?;
        info!(orcid, removed = n, "bulk signature delete");
        Ok(n)
    }

    pub fn count_total(&self, slug: &str) -> AppResult<i64> {
        let mut stmt = self
            .conn()
            .prepare_cached("SELECT COUNT(*) FROM signatures WHERE campaign_slug = ?1")?;
        Ok(stmt.query_row([slug], |r| r.get(0))?)
    }

    pub fn count_anonymous(&self, slug: &str) -> AppResult<i64> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT COUNT(*) FROM signatures WHERE campaign_slug = ?1 AND anonymous = 1",
        )?;
        Ok(stmt.query_row([slug], |r| r.get(0))?)
    }

    /// Non-anonymous signatures of one campaign, optionally ordered by the
    /// name snapshot (ascending); otherwise storage order.
    pub fn list_visible_signatures(
        &self,
        slug: &str,
        alphabetical: bool,
    ) -> AppResult<Vec<Signature>> {
        let order = if alphabetical { " ORDER BY name ASC" } else { "" };
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {} FROM signatures WHERE campaign_slug = ?1 AND anonymous = 0{}",
            SIGNATURE_COLS, order
        ))?;
        let rows = stmt.query_map([slug], row_to_signature)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Maintenance sweep: drop signatures whose campaign no longer exists.
    pub fn delete_orphan_signatures(&mut self) -> AppResult<usize> {
        let n = self.conn().execute(
            "DELETE FROM signatures WHERE campaign_slug NOT IN (SELECT slug FROM campaigns)",
            [],
        )?;
        if n > 0 {
            info!(removed = n, "orphan signatures removed");
        }
        Ok(n)
    }
}
