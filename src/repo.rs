//! Repository layer: all SQL for regions, pages, attachments, redirects, and
//! tag sets.
//!
//! Plain functions that take a `rusqlite::Connection` first and return
//! `Result<T, WikiError>`. Functions named `persist_*` write a single record
//! and nothing else. `save_*` functions also record a history version. Neither
//! opens a transaction, so both can run inside the rename orchestrator's.
//! The top-level helpers (`create_page`, `attach_file`, `set_tags`, ...) wrap
//! their work in a transaction of their own.

use crate::db::{is_unique_violation, WikiError};
use crate::history;
use crate::models::{Page, PageFile, Redirect, Region, TagSet};
use crate::slug::{normalize_name, slugify, validate_slug};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeSet;

/// How a page save interacts with the rest of the wiki.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// A regular save. A newly created page takes over its slug from any
    /// redirect that was using it.
    Normal,
    /// The page is being created as the target of a rename. Redirects at its
    /// slug are left for the orchestrator to migrate or drop.
    Rename,
}

fn not_found(what: String) -> impl FnOnce(rusqlite::Error) -> WikiError {
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => WikiError::NotFound(what),
        _ => WikiError::Db(e),
    }
}

// =============================================================================
// Regions
// =============================================================================

fn row_to_region(row: &rusqlite::Row) -> Result<Region, rusqlite::Error> {
    Ok(Region {
        id: row.get(0)?,
        slug: row.get(1)?,
        full_name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Creates a new region with a generated UUID.
///
/// # Errors
/// Returns `WikiError::InvalidInput` if the slug is already taken.
pub fn create_region(conn: &Connection, slug: &str, full_name: &str) -> Result<Region, WikiError> {
    let id = uuid::Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO regions (id, slug, full_name, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id, slug, full_name, created_at],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            WikiError::InvalidInput(format!("Region '{}' already exists", slug))
        } else {
            WikiError::Db(e)
        }
    })?;

    Ok(Region {
        id,
        slug: slug.to_string(),
        full_name: full_name.to_string(),
        created_at,
    })
}

/// Retrieves a region by its slug.
///
/// # Errors
/// Returns `WikiError::NotFound` if no region with the given slug exists.
pub fn get_region_by_slug(conn: &Connection, slug: &str) -> Result<Region, WikiError> {
    conn.query_row(
        "SELECT id, slug, full_name, created_at FROM regions WHERE slug = ?1",
        [slug],
        row_to_region,
    )
    .map_err(not_found(format!("Region with slug '{}' not found", slug)))
}

pub fn get_region(conn: &Connection, id: &str) -> Result<Region, WikiError> {
    conn.query_row(
        "SELECT id, slug, full_name, created_at FROM regions WHERE id = ?1",
        [id],
        row_to_region,
    )
    .map_err(not_found(format!("Region with ID '{}' not found", id)))
}

/// Lists all regions, ordered by slug.
pub fn list_regions(conn: &Connection) -> Result<Vec<Region>, WikiError> {
    let mut stmt =
        conn.prepare("SELECT id, slug, full_name, created_at FROM regions ORDER BY slug")?;

    let regions = stmt
        .query_map([], row_to_region)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(regions)
}

/// Deletes a region by its slug.
///
/// # Errors
/// Returns `WikiError::Db` if the region still has pages (foreign key
/// constraint violation), `WikiError::NotFound` if it does not exist.
pub fn delete_region(conn: &Connection, slug: &str) -> Result<(), WikiError> {
    let region = get_region_by_slug(conn, slug)?;
    conn.execute("DELETE FROM regions WHERE id = ?1", [&region.id])?;
    Ok(())
}

// =============================================================================
// Pages
// =============================================================================

const PAGE_COLUMNS: &str = "id, region_id, name, slug, content, created_at, updated_at";

fn row_to_page(row: &rusqlite::Row) -> Result<Page, rusqlite::Error> {
    Ok(Page {
        id: Some(row.get(0)?),
        region_id: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn page_conflict(name: &str) -> impl FnOnce(rusqlite::Error) -> WikiError + '_ {
    move |e| {
        if is_unique_violation(&e) {
            WikiError::PageExists(name.to_string())
        } else {
            WikiError::Db(e)
        }
    }
}

/// Persists `page` and records a version with `comment`.
///
/// The slug is always recomputed from the name; whatever the caller put in
/// `page.slug` is ignored. Unsaved pages are inserted under a fresh id, saved
/// pages are updated in place.
///
/// # Errors
/// `InvalidName` if the name has an empty slug, `PageExists` if another page
/// in the region already has the slug, `NotFound` if a saved page vanished.
pub fn save_page(
    conn: &Connection,
    page: &Page,
    comment: &str,
    mode: SaveMode,
) -> Result<Page, WikiError> {
    let slug = slugify(&page.name);
    if slug.is_empty() {
        return Err(WikiError::InvalidName(page.name.clone()));
    }
    let now = chrono::Utc::now().to_rfc3339();

    let saved = match &page.id {
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO pages (id, region_id, name, slug, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![id, page.region_id, page.name, slug, page.content, now, now],
            )
            .map_err(page_conflict(&page.name))?;

            if mode == SaveMode::Normal {
                let replaced = conn.execute(
                    "DELETE FROM redirects WHERE source = ?1 AND region_id = ?2",
                    rusqlite::params![slug, page.region_id],
                )?;
                if replaced > 0 {
                    log::info!("page '{}' replaces the redirect from '{}'", page.name, slug);
                }
            }

            Page {
                id: Some(id),
                slug,
                created_at: now.clone(),
                updated_at: now,
                ..page.clone()
            }
        }
        Some(id) => {
            let rows_affected = conn
                .execute(
                    "UPDATE pages SET name = ?1, slug = ?2, content = ?3, updated_at = ?4 WHERE id = ?5",
                    rusqlite::params![page.name, slug, page.content, now, id],
                )
                .map_err(page_conflict(&page.name))?;
            if rows_affected == 0 {
                return Err(WikiError::NotFound(format!("Page with ID '{}' not found", id)));
            }
            get_page(conn, id)?
        }
    };

    history::save_version(conn, &saved, comment)?;
    Ok(saved)
}

/// Validates and creates a page.
pub fn create_page(
    conn: &Connection,
    region_id: &str,
    name: &str,
    content: &str,
) -> Result<Page, WikiError> {
    let mut page = Page::new(region_id, name, content);
    page.clean()?;

    let tx = conn.unchecked_transaction()?;
    let saved = save_page(&tx, &page, "Created", SaveMode::Normal)?;
    tx.commit()?;

    Ok(saved)
}

/// Retrieves a page by its ID.
///
/// # Errors
/// Returns `WikiError::NotFound` if no page with the given ID exists.
pub fn get_page(conn: &Connection, id: &str) -> Result<Page, WikiError> {
    conn.query_row(
        &format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS),
        [id],
        row_to_page,
    )
    .map_err(not_found(format!("Page with ID '{}' not found", id)))
}

/// Looks up the page at `(slug, region)`, if any.
pub fn find_page(conn: &Connection, region_id: &str, slug: &str) -> Result<Option<Page>, WikiError> {
    let page = conn
        .query_row(
            &format!("SELECT {} FROM pages WHERE slug = ?1 AND region_id = ?2", PAGE_COLUMNS),
            rusqlite::params![slug, region_id],
            row_to_page,
        )
        .optional()?;
    Ok(page)
}

/// Retrieves the page at `(slug, region)`.
pub fn get_page_by_slug(conn: &Connection, region_id: &str, slug: &str) -> Result<Page, WikiError> {
    find_page(conn, region_id, slug)?
        .ok_or_else(|| WikiError::NotFound(format!("Page '{}' not found", slug)))
}

/// Retrieves a page by any spelling of its name.
pub fn get_page_by_name(conn: &Connection, region_id: &str, name: &str) -> Result<Page, WikiError> {
    get_page_by_slug(conn, region_id, &slugify(name))
}

/// True iff a page with this `(slug, region)` is persisted.
pub fn page_exists(conn: &Connection, region_id: &str, slug: &str) -> Result<bool, WikiError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM pages WHERE slug = ?1 AND region_id = ?2)",
        rusqlite::params![slug, region_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Replaces a page's content and records a version.
pub fn update_page_content(
    conn: &Connection,
    id: &str,
    content: &str,
    comment: &str,
) -> Result<Page, WikiError> {
    let page = Page {
        content: content.to_string(),
        ..get_page(conn, id)?
    };

    let tx = conn.unchecked_transaction()?;
    let saved = save_page(&tx, &page, comment, SaveMode::Normal)?;
    tx.commit()?;

    Ok(saved)
}

/// Lists the pages of a region, ordered by name.
pub fn list_pages(conn: &Connection, region_id: &str) -> Result<Vec<Page>, WikiError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM pages WHERE region_id = ?1 ORDER BY name COLLATE NOCASE",
        PAGE_COLUMNS
    ))?;

    let pages = stmt
        .query_map([region_id], row_to_page)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(pages)
}

/// Deletes a page. Redirects to it and its tag set go with it (CASCADE);
/// attachments stay behind under the old slug.
pub fn delete_page(conn: &Connection, id: &str) -> Result<(), WikiError> {
    let rows_affected = conn.execute("DELETE FROM pages WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(WikiError::NotFound(format!("Page with ID '{}' not found", id)));
    }

    Ok(())
}

// =============================================================================
// Attachments
// =============================================================================

const FILE_COLUMNS: &str = "id, region_id, slug, name, file, created_at";

fn row_to_page_file(row: &rusqlite::Row) -> Result<PageFile, rusqlite::Error> {
    let file: Vec<u8> = row.get(4)?;
    Ok(PageFile {
        id: Some(row.get(0)?),
        region_id: row.get(1)?,
        slug: row.get(2)?,
        name: row.get(3)?,
        size: file.len(),
        file,
        created_at: row.get(5)?,
    })
}

fn validate_file_name(name: &str) -> Result<(), WikiError> {
    if name.trim().is_empty() {
        return Err(WikiError::InvalidInput("File name must not be empty".to_string()));
    }
    if name.contains('/') {
        return Err(WikiError::InvalidInput(format!(
            "File name '{}' must not contain '/'",
            name
        )));
    }
    Ok(())
}

/// Inserts an unsaved attachment as a new record. No history is recorded.
///
/// # Errors
/// `InvalidSlug` for a non-canonical owner slug, `InvalidInput` for a bad or
/// already-attached file name.
pub fn persist_page_file(conn: &Connection, file: &PageFile) -> Result<PageFile, WikiError> {
    if file.id.is_some() {
        return Err(WikiError::InvalidInput(format!(
            "File '{}' is already saved",
            file.name
        )));
    }
    validate_slug(&file.slug)?;
    validate_file_name(&file.name)?;

    let id = uuid::Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO page_files (id, region_id, slug, name, file, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![id, file.region_id, file.slug, file.name, file.file, created_at],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            WikiError::InvalidInput(format!(
                "File '{}' is already attached to '{}'",
                file.name, file.slug
            ))
        } else {
            WikiError::Db(e)
        }
    })?;

    Ok(PageFile {
        id: Some(id),
        created_at,
        ..file.clone()
    })
}

/// Inserts an attachment and records a version with `comment`.
pub fn save_page_file(conn: &Connection, file: &PageFile, comment: &str) -> Result<PageFile, WikiError> {
    let saved = persist_page_file(conn, file)?;
    history::save_version(conn, &saved, comment)?;
    Ok(saved)
}

/// Attaches `bytes` as `name` to the page at `slug`.
///
/// The page does not have to exist; attachments are keyed by slug only.
pub fn attach_file(
    conn: &Connection,
    region_id: &str,
    slug: &str,
    name: &str,
    bytes: Vec<u8>,
) -> Result<PageFile, WikiError> {
    let file = PageFile::new(region_id, slug, name, bytes);

    let tx = conn.unchecked_transaction()?;
    let saved = save_page_file(&tx, &file, "Uploaded")?;
    tx.commit()?;

    Ok(saved)
}

pub fn get_page_file(
    conn: &Connection,
    region_id: &str,
    slug: &str,
    name: &str,
) -> Result<PageFile, WikiError> {
    conn.query_row(
        &format!(
            "SELECT {} FROM page_files WHERE slug = ?1 AND region_id = ?2 AND name = ?3",
            FILE_COLUMNS
        ),
        rusqlite::params![slug, region_id, name],
        row_to_page_file,
    )
    .map_err(not_found(format!("File '{}' on page '{}' not found", name, slug)))
}

pub fn page_file_exists(
    conn: &Connection,
    region_id: &str,
    slug: &str,
    name: &str,
) -> Result<bool, WikiError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM page_files WHERE slug = ?1 AND region_id = ?2 AND name = ?3)",
        rusqlite::params![slug, region_id, name],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Lists the attachments of the page at `slug`, ordered by name.
pub fn list_page_files(conn: &Connection, region_id: &str, slug: &str) -> Result<Vec<PageFile>, WikiError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM page_files WHERE slug = ?1 AND region_id = ?2 ORDER BY name",
        FILE_COLUMNS
    ))?;

    let files = stmt
        .query_map(rusqlite::params![slug, region_id], row_to_page_file)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(files)
}

pub fn delete_page_file(conn: &Connection, id: &str) -> Result<(), WikiError> {
    let rows_affected = conn.execute("DELETE FROM page_files WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(WikiError::NotFound(format!("File with ID '{}' not found", id)));
    }

    Ok(())
}

/// The page that owns `file`.
///
/// When no page is stored at the file's slug, returns an unsaved placeholder
/// whose name is a best-effort guess from the slug.
pub fn attached_to_page(conn: &Connection, file: &PageFile) -> Result<Page, WikiError> {
    if let Some(page) = find_page(conn, &file.region_id, &file.slug)? {
        return Ok(page);
    }
    let mut placeholder = Page::new(&file.region_id, &normalize_name(&file.slug), "");
    placeholder.slug = file.slug.clone();
    Ok(placeholder)
}

// =============================================================================
// Redirects
// =============================================================================

const REDIRECT_COLUMNS: &str = "id, region_id, source, destination_id, created_at";

fn row_to_redirect(row: &rusqlite::Row) -> Result<Redirect, rusqlite::Error> {
    Ok(Redirect {
        id: Some(row.get(0)?),
        region_id: row.get(1)?,
        source: row.get(2)?,
        destination_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Stores a redirect without recording history.
///
/// Any page stored at the redirect's source is deleted first (the redirect
/// takes over that identity). An existing redirect from the same source is
/// re-pointed.
///
/// # Errors
/// `RedirectToSelf` if the destination page's slug equals the source; this
/// check happens before anything is written.
pub fn persist_redirect(conn: &Connection, redirect: &Redirect) -> Result<Redirect, WikiError> {
    let destination = get_page(conn, &redirect.destination_id)?;
    if redirect.source == slugify(&destination.name) {
        return Err(WikiError::RedirectToSelf(redirect.source.clone()));
    }
    if destination.region_id != redirect.region_id {
        return Err(WikiError::InvalidInput(format!(
            "Redirect from '{}' points to a page in another region",
            redirect.source
        )));
    }
    validate_slug(&redirect.source)?;

    let replaced = conn.execute(
        "DELETE FROM pages WHERE slug = ?1 AND region_id = ?2",
        rusqlite::params![redirect.source, redirect.region_id],
    )?;
    if replaced > 0 {
        log::debug!("redirect from '{}' replaced the page stored there", redirect.source);
    }

    let id = uuid::Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO redirects (id, region_id, source, destination_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (source, region_id) DO UPDATE SET destination_id = excluded.destination_id",
        rusqlite::params![id, redirect.region_id, redirect.source, redirect.destination_id, created_at],
    )?;

    get_redirect(conn, &redirect.region_id, &redirect.source)
}

/// Stores a redirect and records a version with `comment`.
pub fn save_redirect(conn: &Connection, redirect: &Redirect, comment: &str) -> Result<Redirect, WikiError> {
    let saved = persist_redirect(conn, redirect)?;
    history::save_version(conn, &saved, comment)?;
    Ok(saved)
}

/// Redirects `source` to `destination`, deleting any page stored at `source`.
pub fn create_redirect(
    conn: &Connection,
    source: &str,
    destination: &Page,
    comment: &str,
) -> Result<Redirect, WikiError> {
    let redirect = Redirect::new(&destination.region_id, source, destination.saved_id()?);
    save_redirect(conn, &redirect, comment)
}

pub fn get_redirect(conn: &Connection, region_id: &str, source: &str) -> Result<Redirect, WikiError> {
    conn.query_row(
        &format!(
            "SELECT {} FROM redirects WHERE source = ?1 AND region_id = ?2",
            REDIRECT_COLUMNS
        ),
        rusqlite::params![source, region_id],
        row_to_redirect,
    )
    .map_err(not_found(format!("Redirect from '{}' not found", source)))
}

pub fn redirect_exists(conn: &Connection, region_id: &str, source: &str) -> Result<bool, WikiError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM redirects WHERE source = ?1 AND region_id = ?2)",
        rusqlite::params![source, region_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Lists the redirects of a region, ordered by source.
pub fn list_redirects(conn: &Connection, region_id: &str) -> Result<Vec<Redirect>, WikiError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM redirects WHERE region_id = ?1 ORDER BY source",
        REDIRECT_COLUMNS
    ))?;

    let redirects = stmt
        .query_map([region_id], row_to_redirect)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(redirects)
}

/// Lists the redirects whose destination is the page with `page_id`.
pub fn redirects_to_page(conn: &Connection, page_id: &str) -> Result<Vec<Redirect>, WikiError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM redirects WHERE destination_id = ?1 ORDER BY source",
        REDIRECT_COLUMNS
    ))?;

    let redirects = stmt
        .query_map([page_id], row_to_redirect)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(redirects)
}

pub fn delete_redirect(conn: &Connection, region_id: &str, source: &str) -> Result<(), WikiError> {
    let rows_affected = conn.execute(
        "DELETE FROM redirects WHERE source = ?1 AND region_id = ?2",
        rusqlite::params![source, region_id],
    )?;

    if rows_affected == 0 {
        return Err(WikiError::NotFound(format!("Redirect from '{}' not found", source)));
    }

    Ok(())
}

// =============================================================================
// Tag sets
// =============================================================================

fn load_tags(conn: &Connection, tag_set_id: &str) -> Result<Vec<String>, WikiError> {
    let mut stmt = conn.prepare("SELECT tag FROM page_tags WHERE tag_set_id = ?1 ORDER BY tag")?;

    let tags = stmt
        .query_map([tag_set_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;

    Ok(tags)
}

/// The page's tag set with its tags loaded, if it has one.
pub fn get_tag_set(conn: &Connection, page_id: &str) -> Result<Option<TagSet>, WikiError> {
    let row = conn
        .query_row(
            "SELECT id, page_id, region_id FROM page_tag_sets WHERE page_id = ?1",
            [page_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((id, page_id, region_id)) => {
            let tags = load_tags(conn, &id)?;
            Ok(Some(TagSet {
                id: Some(id),
                page_id,
                region_id,
                tags,
            }))
        }
        None => Ok(None),
    }
}

pub fn tag_set_exists(conn: &Connection, page_id: &str) -> Result<bool, WikiError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM page_tag_sets WHERE page_id = ?1)",
        [page_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Inserts an unsaved tag set and its tags. Tag sets are not versioned.
pub fn persist_tag_set(conn: &Connection, tag_set: &TagSet) -> Result<TagSet, WikiError> {
    let id = uuid::Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO page_tag_sets (id, page_id, region_id) VALUES (?1, ?2, ?3)",
        rusqlite::params![id, tag_set.page_id, tag_set.region_id],
    )?;
    for tag in &tag_set.tags {
        conn.execute(
            "INSERT INTO page_tags (tag_set_id, tag) VALUES (?1, ?2)",
            rusqlite::params![id, tag],
        )?;
    }

    Ok(TagSet {
        id: Some(id),
        ..tag_set.clone()
    })
}

/// Replaces all tags on a page. Tags are trimmed, lowercased, and
/// de-duplicated; empty tags are dropped.
pub fn set_tags(conn: &Connection, page_id: &str, tags: &[String]) -> Result<TagSet, WikiError> {
    let page = get_page(conn, page_id)?;
    let tags: BTreeSet<String> = tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM page_tag_sets WHERE page_id = ?1", [page_id])?;
    let saved = persist_tag_set(
        &tx,
        &TagSet {
            id: None,
            page_id: page_id.to_string(),
            region_id: page.region_id,
            tags: tags.into_iter().collect(),
        },
    )?;
    tx.commit()?;

    Ok(saved)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::history::page_history;

    fn setup_test_db() -> (Connection, Region) {
        let conn = open_in_memory().expect("Failed to create in-memory database");
        let region = create_region(&conn, "oakland", "Oakland").expect("Failed to create region");
        (conn, region)
    }

    #[test]
    fn test_create_and_get_region() {
        let (conn, region) = setup_test_db();

        assert_eq!(region.slug, "oakland");
        assert_eq!(region.full_name, "Oakland");
        assert!(!region.id.is_empty());

        let retrieved = get_region_by_slug(&conn, "oakland").expect("Failed to get region");
        assert_eq!(retrieved.id, region.id);
        assert_eq!(get_region(&conn, &region.id).expect("by id").slug, "oakland");
    }

    #[test]
    fn test_create_duplicate_region_fails() {
        let (conn, _) = setup_test_db();
        let result = create_region(&conn, "oakland", "Again");
        assert!(matches!(result, Err(WikiError::InvalidInput(_))));
    }

    #[test]
    fn test_get_region_not_found() {
        let (conn, _) = setup_test_db();
        let result = get_region_by_slug(&conn, "nonexistent");
        assert!(matches!(result, Err(WikiError::NotFound(_))));
    }

    #[test]
    fn test_list_and_delete_regions() {
        let (conn, _) = setup_test_db();
        create_region(&conn, "berkeley", "Berkeley").expect("Failed to create region");

        let regions = list_regions(&conn).expect("Failed to list regions");
        let slugs: Vec<&str> = regions.iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(slugs, vec!["berkeley", "oakland"]);

        delete_region(&conn, "berkeley").expect("Failed to delete region");
        assert_eq!(list_regions(&conn).expect("list").len(), 1);
    }

    #[test]
    fn test_delete_region_with_pages_fails() {
        let (conn, region) = setup_test_db();
        create_page(&conn, &region.id, "Front Page", "").expect("Failed to create page");

        let result = delete_region(&conn, "oakland");
        assert!(matches!(result, Err(WikiError::Db(_))));
    }

    #[test]
    fn test_create_and_get_page() {
        let (conn, region) = setup_test_db();

        let page = create_page(&conn, &region.id, "Lake Merritt", "<p>A lake.</p>")
            .expect("Failed to create page");

        assert!(page.id.is_some());
        assert_eq!(page.slug, "lake merritt");
        assert_eq!(page.content, "<p>A lake.</p>");

        let retrieved = get_page(&conn, page.saved_id().unwrap()).expect("Failed to get page");
        assert_eq!(retrieved.name, "Lake Merritt");

        let by_name = get_page_by_name(&conn, &region.id, "lake_merritt").expect("by name");
        assert_eq!(by_name.id, page.id);
    }

    #[test]
    fn test_create_page_cleans_name() {
        let (conn, region) = setup_test_db();
        let page = create_page(&conn, &region.id, " Parks / Lake_Merritt# ", "").expect("create");
        assert_eq!(page.name, "Parks/Lake Merritt");
        assert_eq!(page.slug, "parks/lake merritt");
    }

    #[test]
    fn test_page_with_fullwidth_slash_is_addressable_by_slug() {
        let (conn, region) = setup_test_db();
        let page = create_page(&conn, &region.id, "Foo ／ Bar", "").expect("create");
        assert_eq!(page.slug, "foo/bar");

        let found = get_page_by_name(&conn, &region.id, &page.slug).expect("by stored slug");
        assert_eq!(found.id, page.id);
        attach_file(&conn, &region.id, &page.slug, "photo.jpg", vec![1]).expect("attach");
    }

    #[test]
    fn test_create_page_invalid_name() {
        let (conn, region) = setup_test_db();
        let result = create_page(&conn, &region.id, "###", "");
        assert!(matches!(result, Err(WikiError::InvalidName(_))));
    }

    #[test]
    fn test_create_page_with_taken_slug_fails() {
        let (conn, region) = setup_test_db();
        create_page(&conn, &region.id, "Lake Merritt", "").expect("create");

        let result = create_page(&conn, &region.id, "LAKE MERRITT", "");
        assert!(matches!(result, Err(WikiError::PageExists(_))));
    }

    #[test]
    fn test_same_slug_in_other_region_is_allowed() {
        let (conn, region) = setup_test_db();
        let other = create_region(&conn, "berkeley", "Berkeley").expect("region");
        create_page(&conn, &region.id, "Front Page", "").expect("create");
        create_page(&conn, &other.id, "Front Page", "").expect("create in other region");

        assert!(page_exists(&conn, &region.id, "front page").expect("exists"));
        assert!(page_exists(&conn, &other.id, "front page").expect("exists"));
        assert!(!page_exists(&conn, &region.id, "back page").expect("exists"));
    }

    #[test]
    fn test_save_page_recomputes_slug() {
        let (conn, region) = setup_test_db();
        let mut page = Page::new(&region.id, "Foo Bar", "");
        page.slug = "something else".to_string();

        let saved = save_page(&conn, &page, "Created", SaveMode::Normal).expect("save");
        assert_eq!(saved.slug, "foo bar");
    }

    #[test]
    fn test_update_page_content_records_version() {
        let (conn, region) = setup_test_db();
        let page = create_page(&conn, &region.id, "Foo", "<p>one</p>").expect("create");

        let updated = update_page_content(&conn, page.saved_id().unwrap(), "<p>two</p>", "Edited")
            .expect("update");
        assert_eq!(updated.content, "<p>two</p>");
        assert_eq!(updated.id, page.id);

        let history = page_history(&conn, &region.id, "foo").expect("history");
        let comments: Vec<&str> = history.iter().map(|v| v.comment.as_str()).collect();
        assert_eq!(comments, vec!["Edited", "Created"]);
    }

    #[test]
    fn test_update_page_not_found() {
        let (conn, _) = setup_test_db();
        let result = update_page_content(&conn, "nonexistent", "", "Edited");
        assert!(matches!(result, Err(WikiError::NotFound(_))));
    }

    #[test]
    fn test_list_pages_is_scoped_by_region() {
        let (conn, region) = setup_test_db();
        let other = create_region(&conn, "berkeley", "Berkeley").expect("region");
        create_page(&conn, &region.id, "b page", "").expect("create");
        create_page(&conn, &region.id, "A Page", "").expect("create");
        create_page(&conn, &other.id, "Elsewhere", "").expect("create");

        let pages = list_pages(&conn, &region.id).expect("list");
        let names: Vec<&str> = pages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A Page", "b page"]);
    }

    #[test]
    fn test_delete_page_cascades_redirects_and_tags() {
        let (conn, region) = setup_test_db();
        let page = create_page(&conn, &region.id, "Foo", "").expect("create");
        let page_id = page.saved_id().unwrap().to_string();
        create_redirect(&conn, "old foo", &page, "Redirect created").expect("redirect");
        set_tags(&conn, &page_id, &["parks".to_string()]).expect("tags");
        attach_file(&conn, &region.id, "foo", "photo.jpg", vec![1]).expect("attach");

        delete_page(&conn, &page_id).expect("delete");

        assert!(redirects_to_page(&conn, &page_id).expect("redirects").is_empty());
        assert!(get_tag_set(&conn, &page_id).expect("tag set").is_none());
        assert!(page_file_exists(&conn, &region.id, "foo", "photo.jpg").expect("file"));
        assert!(matches!(delete_page(&conn, &page_id), Err(WikiError::NotFound(_))));
    }

    #[test]
    fn test_creating_page_replaces_redirect_at_its_slug() {
        let (conn, region) = setup_test_db();
        let target = create_page(&conn, &region.id, "Target", "").expect("create");
        create_redirect(&conn, "shortcut", &target, "Redirect created").expect("redirect");

        create_page(&conn, &region.id, "Shortcut", "").expect("create");

        assert!(!redirect_exists(&conn, &region.id, "shortcut").expect("exists"));
    }

    #[test]
    fn test_rename_mode_keeps_redirect_at_its_slug() {
        let (conn, region) = setup_test_db();
        let target = create_page(&conn, &region.id, "Target", "").expect("create");
        create_redirect(&conn, "shortcut", &target, "Redirect created").expect("redirect");

        save_page(&conn, &Page::new(&region.id, "Shortcut", ""), "Renamed", SaveMode::Rename)
            .expect("save");

        assert!(redirect_exists(&conn, &region.id, "shortcut").expect("exists"));
    }

    #[test]
    fn test_attach_and_get_file() {
        let (conn, region) = setup_test_db();
        let file = attach_file(&conn, &region.id, "foo", "photo.jpg", vec![1, 2, 3])
            .expect("attach");
        assert!(file.id.is_some());
        assert_eq!(file.size, 3);

        let retrieved = get_page_file(&conn, &region.id, "foo", "photo.jpg").expect("get");
        assert_eq!(retrieved.file, vec![1, 2, 3]);
        assert_eq!(retrieved.rough_type(), "image");

        let history = history::file_history(&conn, &region.id, "foo", "photo.jpg").expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].comment, "Uploaded");
    }

    #[test]
    fn test_attach_file_rejects_non_canonical_slug() {
        let (conn, region) = setup_test_db();
        let result = attach_file(&conn, &region.id, "Foo", "photo.jpg", vec![]);
        assert!(matches!(result, Err(WikiError::InvalidSlug(_))));
    }

    #[test]
    fn test_attach_file_rejects_bad_names() {
        let (conn, region) = setup_test_db();
        for name in ["", "  ", "dir/photo.jpg"] {
            let result = attach_file(&conn, &region.id, "foo", name, vec![]);
            assert!(matches!(result, Err(WikiError::InvalidInput(_))), "name {:?}", name);
        }
    }

    #[test]
    fn test_attach_same_name_twice_fails_atomically() {
        let (conn, region) = setup_test_db();
        attach_file(&conn, &region.id, "foo", "photo.jpg", vec![1]).expect("attach");

        let result = attach_file(&conn, &region.id, "foo", "photo.jpg", vec![2]);
        assert!(matches!(result, Err(WikiError::InvalidInput(_))));

        let history = history::file_history(&conn, &region.id, "foo", "photo.jpg").expect("history");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_list_page_files_by_slug() {
        let (conn, region) = setup_test_db();
        attach_file(&conn, &region.id, "foo", "b.png", vec![]).expect("attach");
        attach_file(&conn, &region.id, "foo", "a.pdf", vec![]).expect("attach");
        attach_file(&conn, &region.id, "bar", "c.png", vec![]).expect("attach");

        let files = list_page_files(&conn, &region.id, "foo").expect("list");
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.png"]);

        delete_page_file(&conn, files[0].id.as_deref().unwrap()).expect("delete");
        assert_eq!(list_page_files(&conn, &region.id, "foo").expect("list").len(), 1);
    }

    #[test]
    fn test_attached_to_page_existing() {
        let (conn, region) = setup_test_db();
        let page = create_page(&conn, &region.id, "Foo", "").expect("create");
        let file = attach_file(&conn, &region.id, "foo", "photo.jpg", vec![]).expect("attach");

        let owner = attached_to_page(&conn, &file).expect("owner");
        assert_eq!(owner.id, page.id);
    }

    #[test]
    fn test_attached_to_page_placeholder() {
        let (conn, region) = setup_test_db();
        let file = attach_file(&conn, &region.id, "parks/lake merritt", "map.png", vec![])
            .expect("attach");

        let owner = attached_to_page(&conn, &file).expect("owner");
        assert!(owner.id.is_none());
        assert_eq!(owner.slug, "parks/lake merritt");
        assert_eq!(owner.name, "parks/lake merritt");
        assert!(!page_exists(&conn, &region.id, &owner.slug).expect("exists"));
    }

    #[test]
    fn test_create_redirect_deletes_page_at_source() {
        let (conn, region) = setup_test_db();
        create_page(&conn, &region.id, "Old", "").expect("create");
        let target = create_page(&conn, &region.id, "New", "").expect("create");

        let redirect = create_redirect(&conn, "old", &target, "Redirect created").expect("redirect");

        assert_eq!(redirect.destination_id, target.id.clone().unwrap());
        assert!(!page_exists(&conn, &region.id, "old").expect("exists"));
        assert_eq!(list_redirects(&conn, &region.id).expect("list").len(), 1);
    }

    #[test]
    fn test_create_redirect_to_self_fails() {
        let (conn, region) = setup_test_db();
        let page = create_page(&conn, &region.id, "Foo", "").expect("create");

        let result = create_redirect(&conn, "foo", &page, "Redirect created");
        assert!(matches!(result, Err(WikiError::RedirectToSelf(s)) if s == "foo"));
        assert!(page_exists(&conn, &region.id, "foo").expect("exists"));
    }

    #[test]
    fn test_create_redirect_rejects_non_canonical_source() {
        let (conn, region) = setup_test_db();
        let page = create_page(&conn, &region.id, "Foo", "").expect("create");

        let result = create_redirect(&conn, "Old Foo", &page, "Redirect created");
        assert!(matches!(result, Err(WikiError::InvalidSlug(_))));
    }

    #[test]
    fn test_create_redirect_repoints_existing_source() {
        let (conn, region) = setup_test_db();
        let first = create_page(&conn, &region.id, "First", "").expect("create");
        let second = create_page(&conn, &region.id, "Second", "").expect("create");
        let original = create_redirect(&conn, "alias", &first, "Redirect created").expect("redirect");

        let repointed = create_redirect(&conn, "alias", &second, "Redirect changed").expect("redirect");

        assert_eq!(repointed.id, original.id);
        assert_eq!(repointed.destination_id, second.id.clone().unwrap());
        assert_eq!(list_redirects(&conn, &region.id).expect("list").len(), 1);
        let history = history::list_history(&conn, "redirect", &region.id, "alias").expect("history");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_set_tags_replaces_and_normalizes() {
        let (conn, region) = setup_test_db();
        let page = create_page(&conn, &region.id, "Foo", "").expect("create");
        let page_id = page.saved_id().unwrap();

        set_tags(&conn, page_id, &["Parks".to_string(), " lakes ".to_string()]).expect("tags");
        let tag_set = set_tags(
            &conn,
            page_id,
            &["water".to_string(), "Water".to_string(), "".to_string()],
        )
        .expect("tags");

        assert_eq!(tag_set.tags, vec!["water"]);
        let loaded = get_tag_set(&conn, page_id).expect("get").expect("tag set exists");
        assert_eq!(loaded.tags, vec!["water"]);
        assert!(tag_set_exists(&conn, page_id).expect("exists"));
    }

    #[test]
    fn test_set_tags_unknown_page() {
        let (conn, _) = setup_test_db();
        let result = set_tags(&conn, "nonexistent", &["parks".to_string()]);
        assert!(matches!(result, Err(WikiError::NotFound(_))));
    }
}
