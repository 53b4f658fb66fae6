//! Version history for pages, attachments, and redirects.
//!
//! Saving a versioned entity appends a JSON snapshot to the `versions` table
//! together with a comment such as `Renamed from "Foo"`. Snapshots are keyed
//! by the entity's identity inside its region (a page's slug, a file's
//! `slug/name`, a redirect's source) rather than by primary key, because a
//! rename gives the entity a new primary key.

use crate::db::WikiError;
use crate::models::{Page, PageFile, Redirect, Version};
use rusqlite::Connection;
use serde::Serialize;

/// An entity whose every save is recorded as an immutable snapshot.
pub trait Versioned: Serialize {
    /// Stored in `versions.entity_kind`.
    const KIND: &'static str;

    fn region_id(&self) -> &str;

    /// Identity of the entity inside its region.
    fn history_key(&self) -> String;

    fn entity_id(&self) -> Option<&str>;
}

impl Versioned for Page {
    const KIND: &'static str = "page";

    fn region_id(&self) -> &str {
        &self.region_id
    }

    fn history_key(&self) -> String {
        self.slug.clone()
    }

    fn entity_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Versioned for PageFile {
    const KIND: &'static str = "page_file";

    fn region_id(&self) -> &str {
        &self.region_id
    }

    /// File names cannot contain `/`, so splitting at the last `/` recovers
    /// the page slug.
    fn history_key(&self) -> String {
        format!("{}/{}", self.slug, self.name)
    }

    fn entity_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl Versioned for Redirect {
    const KIND: &'static str = "redirect";

    fn region_id(&self) -> &str {
        &self.region_id
    }

    fn history_key(&self) -> String {
        self.source.clone()
    }

    fn entity_id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

fn row_to_version(row: &rusqlite::Row) -> Result<Version, rusqlite::Error> {
    let snapshot: String = row.get(6)?;
    let snapshot = serde_json::from_str(&snapshot).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Version {
        id: row.get(0)?,
        entity_kind: row.get(1)?,
        region_id: row.get(2)?,
        history_key: row.get(3)?,
        entity_id: row.get(4)?,
        version_number: row.get(5)?,
        snapshot,
        comment: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Records a new snapshot of `entity` with `comment`.
///
/// The entity must already be persisted; call this after the insert or
/// update, on the same connection or transaction.
pub fn save_version<T: Versioned>(
    conn: &Connection,
    entity: &T,
    comment: &str,
) -> Result<Version, WikiError> {
    let entity_id = entity
        .entity_id()
        .ok_or_else(|| WikiError::InvalidInput(format!("Cannot version an unsaved {}", T::KIND)))?
        .to_string();
    let region_id = entity.region_id().to_string();
    let history_key = entity.history_key();
    let snapshot = serde_json::to_value(entity)?;
    let created_at = chrono::Utc::now().to_rfc3339();

    let version_number: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version_number), 0) + 1 FROM versions
         WHERE entity_kind = ?1 AND region_id = ?2 AND history_key = ?3",
        rusqlite::params![T::KIND, region_id, history_key],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT INTO versions (entity_kind, region_id, history_key, entity_id, version_number, snapshot, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            T::KIND,
            region_id,
            history_key,
            entity_id,
            version_number,
            serde_json::to_string(&snapshot)?,
            comment,
            created_at,
        ],
    )?;

    log::debug!(
        "recorded {} version {} of '{}': {}",
        T::KIND,
        version_number,
        history_key,
        comment
    );

    Ok(Version {
        id: conn.last_insert_rowid(),
        entity_kind: T::KIND.to_string(),
        region_id,
        history_key,
        entity_id,
        version_number,
        snapshot,
        comment: comment.to_string(),
        created_at,
    })
}

/// Lists the history of one entity, newest first.
pub fn list_history(
    conn: &Connection,
    kind: &str,
    region_id: &str,
    history_key: &str,
) -> Result<Vec<Version>, WikiError> {
    let mut stmt = conn.prepare(
        "SELECT id, entity_kind, region_id, history_key, entity_id, version_number, snapshot, comment, created_at
         FROM versions
         WHERE entity_kind = ?1 AND region_id = ?2 AND history_key = ?3
         ORDER BY version_number DESC",
    )?;

    let versions = stmt
        .query_map(rusqlite::params![kind, region_id, history_key], row_to_version)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(versions)
}

/// History of the page currently or formerly at `slug`.
pub fn page_history(conn: &Connection, region_id: &str, slug: &str) -> Result<Vec<Version>, WikiError> {
    list_history(conn, Page::KIND, region_id, slug)
}

/// History of the attachment `name` on the page at `slug`.
pub fn file_history(
    conn: &Connection,
    region_id: &str,
    slug: &str,
    name: &str,
) -> Result<Vec<Version>, WikiError> {
    list_history(conn, PageFile::KIND, region_id, &format!("{}/{}", slug, name))
}
