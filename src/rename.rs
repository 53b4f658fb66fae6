//! Page renames.
//!
//! A rename never mutates a page's slug in place. It creates a fresh page
//! under the new name, turns the old slug into a redirect (which deletes the
//! old page record), and re-creates everything that pointed at the old page
//! for the new one. All of it happens in one transaction.

use crate::db::WikiError;
use crate::models::{Page, Redirect};
use crate::related::{RelatedRecord, RelationRegistry};
use crate::repo::{self, SaveMode};
use crate::slug::{normalize_name, slugify};
use rusqlite::Connection;
use serde::Serialize;

/// History comment on records re-created for a renamed page.
pub const PARENT_PAGE_RENAMED: &str = "Parent page renamed";

/// History comment on the renamed page and its redirect.
pub fn renamed_from(old_name: &str) -> String {
    format!("Renamed from \"{}\"", old_name)
}

/// What a rename did.
#[derive(Debug, Clone, Serialize)]
pub struct RenameOutcome {
    pub page: Page,
    /// `None` for a rename that kept the slug.
    pub redirect: Option<Redirect>,
    /// Related records re-created for the new page.
    pub migrated: usize,
    /// Related records dropped because an equivalent already existed or
    /// they would have redirected a page to itself.
    pub skipped: usize,
}

/// Renames `page` to `new_name` and returns the page now holding its content.
///
/// # Errors
/// `InvalidName` if `new_name` has an empty slug, `PageExists` if another
/// page holds the new slug, `NotFound` if `page` was never saved.
pub fn rename_page(conn: &Connection, page: &Page, new_name: &str) -> Result<Page, WikiError> {
    rename_page_with(conn, &RelationRegistry::default(), page, new_name).map(|outcome| outcome.page)
}

/// Renames `page`, carrying over the related records known to `registry`.
pub fn rename_page_with(
    conn: &Connection,
    registry: &RelationRegistry,
    page: &Page,
    new_name: &str,
) -> Result<RenameOutcome, WikiError> {
    page.saved_id()?;
    let cleaned = normalize_name(new_name);
    let new_slug = slugify(&cleaned);
    if new_slug.is_empty() {
        return Err(WikiError::InvalidName(new_name.to_string()));
    }
    let comment = renamed_from(&page.name);

    if repo::page_exists(conn, &page.region_id, &new_slug)? {
        if new_slug != page.slug {
            return Err(WikiError::PageExists(cleaned));
        }

        // Same slug: only the spelling of the name changes.
        let tx = conn.unchecked_transaction()?;
        let renamed = repo::save_page(
            &tx,
            &Page {
                name: cleaned,
                ..page.clone()
            },
            &comment,
            SaveMode::Normal,
        )?;
        tx.commit()?;

        log::info!("renamed '{}' to '{}' in place", page.name, renamed.name);
        return Ok(RenameOutcome {
            page: renamed,
            redirect: None,
            migrated: 0,
            skipped: 0,
        });
    }

    let tx = conn.unchecked_transaction()?;

    let new_page = repo::save_page(
        &tx,
        &Page::create_from(page, &cleaned),
        &comment,
        SaveMode::Rename,
    )?;
    let related = registry.collect(&tx, page)?;
    let redirect = repo::create_redirect(&tx, &page.slug, &new_page, &comment)?;

    let mut migrated = 0;
    let mut skipped = 0;
    for record in related.by_foreign_key.iter().chain(related.by_slug.iter()) {
        if migrate(&tx, record.as_ref(), &new_page)? {
            migrated += 1;
        } else {
            skipped += 1;
        }
    }

    tx.commit()?;

    log::info!(
        "renamed '{}' to '{}': {} related record(s) migrated, {} skipped",
        page.name,
        new_page.name,
        migrated,
        skipped
    );
    Ok(RenameOutcome {
        page: new_page,
        redirect: Some(redirect),
        migrated,
        skipped,
    })
}

/// Re-creates `record` for `new_page`. Returns false if it was skipped.
fn migrate(conn: &Connection, record: &dyn RelatedRecord, new_page: &Page) -> Result<bool, WikiError> {
    let moved = record.create_from(new_page)?;
    if moved.already_exists(conn)? {
        log::debug!("skipping {}: already exists", moved.describe());
        return Ok(false);
    }

    let saved = if moved.is_versioned() {
        moved.save_with_comment(conn, PARENT_PAGE_RENAMED)
    } else {
        moved.save(conn)
    };
    match saved {
        Ok(()) => Ok(true),
        Err(WikiError::RedirectToSelf(source)) => {
            log::debug!("dropping redirect from '{}': it now names the page itself", source);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
