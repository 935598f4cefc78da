//! Campaign repository and lifecycle engine.
//!
//! A campaign is keyed by its slug (non-empty, no whitespace, unique). The
//! owner is captured at creation and never changes. Lifecycle: active
//! campaigns carry no closed timestamp; closing sets it, reopening clears
//! it, and the CHECK constraint in the schema refuses any other combination.
//! Deletion cascades the campaign's signatures inside one transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;

use crate::error::{AppError, AppResult};

use super::Store;

#[derive(Debug, Clone, Serialize)]
pub struct Campaign {
    pub slug: String,
    pub owner_orcid: String,
    pub owner_name: String,
    pub kind: String,
    pub name: String,
    pub short_description: String,
    pub text: String,
    pub sort_alphabetical: bool,
    pub allow_anonymous: bool,
    pub is_active: bool,
    pub creation_date: DateTime<Utc>,
    pub closed_date: Option<DateTime<Utc>>,
}

/// Fields supplied by the create-campaign form.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub slug: String,
    pub owner_orcid: String,
    pub owner_name: String,
    pub kind: String,
    pub name: String,
    pub short_description: String,
    pub text: String,
    pub sort_alphabetical: bool,
    pub allow_anonymous: bool,
}

/// Mutable display metadata and policies; owner and lifecycle fields are
/// deliberately absent.
#[derive(Debug, Clone)]
pub struct CampaignEdit {
    pub kind: String,
    pub name: String,
    pub short_description: String,
    pub text: String,
    pub sort_alphabetical: bool,
    pub allow_anonymous: bool,
}

fn validate_slug(slug: &str) -> AppResult<()> {
    if slug.is_empty() || slug.chars().any(|c| c.is_whitespace()) {
        return Err(AppError::invalid_slug(
            "slug must be non-empty and contain no whitespace",
        ));
    }
    Ok(())
}

fn parse_date(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_campaign(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    let creation: String = row.get(10)?;
    let closed: Option<String> = row.get(11)?;
    Ok(Campaign {
        slug: row.get(0)?,
        owner_orcid: row.get(1)?,
        owner_name: row.get(2)?,
        kind: row.get(3)?,
        name: row.get(4)?,
        short_description: row.get(5)?,
        text: row.get(6)?,
        sort_alphabetical: row.get(7)?,
        allow_anonymous: row.get(8)?,
        is_active: row.get(9)?,
        creation_date: parse_date(10, creation)?,
        closed_date: match closed {
            Some(s) => Some(parse_date(11, s)?),
            None => None,
        },
    })
}

const CAMPAIGN_COLS: &str = "slug, owner_orcid, owner_name, kind, name, short_description, \
                             text, sort_alphabetical, allow_anonymous, is_active, \
                             creation_date, closed_date";

impl Store {
    /// Create a campaign. Fails with `InvalidSlug` for empty/whitespace
    /// slugs and `DuplicateSlug` when the slug is already taken (enforced by
    /// the primary key, not by a prior read).
    pub fn create_campaign(&mut self, new: &NewCampaign) -> AppResult<Campaign> {
        validate_slug(&new.slug)?;
        let now = Utc::now();
        let res = self.conn().execute(
            "INSERT INTO campaigns (slug, owner_orcid, owner_name, kind, name, \
             short_description, text, sort_alphabetical, allow_anonymous, is_active, \
             creation_date, closed_date) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, NULL)",
            params![
                new.slug,
                new.owner_orcid,
                new.owner_name,
                new.kind,
                new.name,
                new.short_description,
                new.text,
                new.sort_alphabetical,
                new.allow_anonymous,
                now.to_rfc3339(),
            ],
        );
        match res {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(AppError::duplicate_slug(format!(
                    "a campaign with slug '{}' already exists",
                    new.slug
                )));
            }
            Err(e) => return Err(e.into()),
        }
        info!(slug = %new.slug, owner = %new.owner_orcid, "campaign created");
        self.get_campaign(&new.slug)?
            .ok_or_else(|| AppError::internal("campaign vanished after insert"))
    }

    pub fn get_campaign(&self, slug: &str) -> AppResult<Option<Campaign>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {} FROM campaigns WHERE slug = ?1",
            CAMPAIGN_COLS
        ))?;
        Ok(stmt.query_row([slug], row_to_campaign).optional()?)
    }

    /// Update display metadata and policies. Owner and lifecycle fields are
    /// untouched.
    pub fn update_campaign(&mut self, slug: &str, edit: &CampaignEdit) -> AppResult<()> {
        let n = self.conn().execute(
            "UPDATE campaigns SET kind = ?1, name = ?2, short_description = ?3, text = ?4, \
             sort_alphabetical = ?5, allow_anonymous = ?6 WHERE slug = ?7",
            params![
                edit.kind,
                edit.name,
                edit.short_description,
                edit.text,
                edit.sort_alphabetical,
                edit.allow_anonymous,
                slug,
            ],
        )?;
        if n == 0 {
            return Err(AppError::not_found(format!("no campaign '{}'", slug)));
        }
        Ok(())
    }

    /// Active -> Closed stamps `closed_date`; Closed -> Active clears it.
    pub fn set_campaign_active(&mut self, slug: &str, active: bool) -> AppResult<Campaign> {
        let n = if active {
            self.conn().execute(
                "UPDATE campaigns SET is_active = 1, closed_date = NULL WHERE slug = ?1",
                [slug],
            )?
        } else {
            self.conn().execute(
                "UPDATE campaigns SET is_active = 0, closed_date = ?1 WHERE slug = ?2",
                params![Utc::now().to_rfc3339(), slug],
            )?
        };
        if n == 0 {
            return Err(AppError::not_found(format!("no campaign '{}'", slug)));
        }
        info!(slug, active, "campaign lifecycle transition");
        self.get_campaign(slug)?
            .ok_or_else(|| AppError::internal("campaign vanished after update"))
    }

    /// Bump the apparent freshness: set `creation_date` to now without
    /// touching activity state.
    pub fn reset_campaign_date(&mut self, slug: &str) -> AppResult<()> {
        let n = self.conn().execute(
            "UPDATE campaigns SET creation_date = ?1 WHERE slug = ?2",
            params![Utc::now().to_rfc3339(), slug],
        )?;
        if n == 0 {
            return Err(AppError::not_found(format!("no campaign '{}'", slug)));
        }
        Ok(())
    }

    /// Terminal delete: the campaign and all its signatures go in one
    /// transaction, so a crash mid-operation leaves either both or neither.
    pub fn delete_campaign(&mut self, slug: &str) -> AppResult<usize> {
        let tx = self.conn_mut().transaction()?;
        let signatures = tx.execute("DELETE FROM signatures WHERE campaign_slug = ?1", [slug])?;
        let campaigns = tx.execute("DELETE FROM campaigns WHERE slug = ?1", [slug])?;
        if campaigns == 0 {
            // Dropping the uncommitted transaction rolls the cascade back.
            return Err(AppError::not_found(format!("no campaign '{}'", slug)));
        }
        tx.commit()?;
        info!(slug, signatures, "campaign deleted with signature cascade");
        Ok(signatures)
    }

    pub fn list_active_campaigns(&self) -> AppResult<Vec<Campaign>> {
        self.list_campaigns_where("WHERE is_active = 1", &[])
    }

    pub fn list_all_campaigns(&self) -> AppResult<Vec<Campaign>> {
        self.list_campaigns_where("", &[])
    }

    pub fn list_campaigns_owned_by(&self, orcid: &str) -> AppResult<Vec<Campaign>> {
        self.list_campaigns_where("WHERE owner_orcid = ?1", &[&orcid])
    }

    fn list_campaigns_where(
        &self,
        clause: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> AppResult<Vec<Campaign>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {} FROM campaigns {}",
            CAMPAIGN_COLS, clause
        ))?;
        let rows = stmt.query_map(args, row_to_campaign)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
