//! Registry of the records that point at a page.
//!
//! A page is referenced in two ways: by foreign key (redirects, tag sets),
//! where the database removes the record along with the page, and by a
//! denormalized slug (attachments), where nothing happens automatically.
//! Every relation kind is registered explicitly; the rename orchestrator
//! walks the registry instead of discovering relations at runtime.

use crate::db::WikiError;
use crate::models::{Page, PageFile, Redirect, TagSet};
use crate::repo;
use rusqlite::Connection;
use std::fmt;

/// How a related record refers to its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    /// Holds the page's primary key and is deleted with the page.
    ForeignKey,
    /// Holds a copy of the page's slug and survives the page.
    Slug,
}

/// A record loaded in full from the database that can be re-created for
/// another page.
pub trait RelatedRecord: fmt::Debug {
    fn kind(&self) -> &'static str;

    /// Short human identity, used in log lines.
    fn describe(&self) -> String;

    /// A new, unsaved record equal to this one but attached to `page`.
    fn create_from(&self, page: &Page) -> Result<Box<dyn RelatedRecord>, WikiError>;

    /// True if a record with the same unique fields is already stored.
    fn already_exists(&self, conn: &Connection) -> Result<bool, WikiError>;

    fn is_versioned(&self) -> bool {
        false
    }

    /// Stores the record without a history entry.
    fn save(&self, conn: &Connection) -> Result<(), WikiError>;

    /// Stores the record and records a version. Unversioned kinds ignore
    /// the comment.
    fn save_with_comment(&self, conn: &Connection, _comment: &str) -> Result<(), WikiError> {
        self.save(conn)
    }
}

impl RelatedRecord for Redirect {
    fn kind(&self) -> &'static str {
        "redirect"
    }

    fn describe(&self) -> String {
        format!("redirect from '{}'", self.source)
    }

    fn create_from(&self, page: &Page) -> Result<Box<dyn RelatedRecord>, WikiError> {
        Ok(Box::new(Redirect::create_from(self, page)?))
    }

    fn already_exists(&self, conn: &Connection) -> Result<bool, WikiError> {
        repo::redirect_exists(conn, &self.region_id, &self.source)
    }

    fn is_versioned(&self) -> bool {
        true
    }

    fn save(&self, conn: &Connection) -> Result<(), WikiError> {
        repo::persist_redirect(conn, self).map(|_| ())
    }

    fn save_with_comment(&self, conn: &Connection, comment: &str) -> Result<(), WikiError> {
        repo::save_redirect(conn, self, comment).map(|_| ())
    }
}

impl RelatedRecord for TagSet {
    fn kind(&self) -> &'static str {
        "tag_set"
    }

    fn describe(&self) -> String {
        format!("tag set [{}]", self.tags.join(", "))
    }

    fn create_from(&self, page: &Page) -> Result<Box<dyn RelatedRecord>, WikiError> {
        Ok(Box::new(TagSet::create_from(self, page)?))
    }

    fn already_exists(&self, conn: &Connection) -> Result<bool, WikiError> {
        repo::tag_set_exists(conn, &self.page_id)
    }

    fn save(&self, conn: &Connection) -> Result<(), WikiError> {
        repo::persist_tag_set(conn, self).map(|_| ())
    }
}

impl RelatedRecord for PageFile {
    fn kind(&self) -> &'static str {
        "page_file"
    }

    fn describe(&self) -> String {
        format!("file '{}' on '{}'", self.name, self.slug)
    }

    fn create_from(&self, page: &Page) -> Result<Box<dyn RelatedRecord>, WikiError> {
        Ok(Box::new(PageFile::create_from(self, page)))
    }

    fn already_exists(&self, conn: &Connection) -> Result<bool, WikiError> {
        repo::page_file_exists(conn, &self.region_id, &self.slug, &self.name)
    }

    fn is_versioned(&self) -> bool {
        true
    }

    fn save(&self, conn: &Connection) -> Result<(), WikiError> {
        repo::persist_page_file(conn, self).map(|_| ())
    }

    fn save_with_comment(&self, conn: &Connection, comment: &str) -> Result<(), WikiError> {
        repo::save_page_file(conn, self, comment).map(|_| ())
    }
}

/// Loads every record of one kind that refers to a page.
pub type Collector = fn(&Connection, &Page) -> Result<Vec<Box<dyn RelatedRecord>>, WikiError>;

/// One registered relation kind.
#[derive(Clone, Copy)]
pub struct Relation {
    pub kind: &'static str,
    pub reference: Reference,
    pub collect: Collector,
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("kind", &self.kind)
            .field("reference", &self.reference)
            .finish()
    }
}

fn collect_redirects(conn: &Connection, page: &Page) -> Result<Vec<Box<dyn RelatedRecord>>, WikiError> {
    Ok(repo::redirects_to_page(conn, page.saved_id()?)?
        .into_iter()
        .map(|r| Box::new(r) as Box<dyn RelatedRecord>)
        .collect())
}

fn collect_tag_sets(conn: &Connection, page: &Page) -> Result<Vec<Box<dyn RelatedRecord>>, WikiError> {
    Ok(repo::get_tag_set(conn, page.saved_id()?)?
        .into_iter()
        .map(|t| Box::new(t) as Box<dyn RelatedRecord>)
        .collect())
}

fn collect_page_files(conn: &Connection, page: &Page) -> Result<Vec<Box<dyn RelatedRecord>>, WikiError> {
    Ok(repo::list_page_files(conn, &page.region_id, &page.slug)?
        .into_iter()
        .map(|f| Box::new(f) as Box<dyn RelatedRecord>)
        .collect())
}

/// Everything that referred to a page at collection time.
#[derive(Debug, Default)]
pub struct RelatedSet {
    pub by_foreign_key: Vec<Box<dyn RelatedRecord>>,
    pub by_slug: Vec<Box<dyn RelatedRecord>>,
}

impl RelatedSet {
    pub fn len(&self) -> usize {
        self.by_foreign_key.len() + self.by_slug.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The relation kinds that follow a page through a rename, in the order
/// they are collected and migrated.
#[derive(Debug, Clone)]
pub struct RelationRegistry {
    relations: Vec<Relation>,
}

impl RelationRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        RelationRegistry { relations: Vec::new() }
    }

    pub fn register(&mut self, relation: Relation) -> &mut Self {
        self.relations.push(relation);
        self
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Loads every related record of `page` into memory.
    ///
    /// Must run before the page is deleted: foreign-key dependents are gone
    /// afterwards.
    pub fn collect(&self, conn: &Connection, page: &Page) -> Result<RelatedSet, WikiError> {
        let mut set = RelatedSet::default();
        for relation in &self.relations {
            let records = (relation.collect)(conn, page)?;
            log::debug!(
                "collected {} {} record(s) for '{}'",
                records.len(),
                relation.kind,
                page.slug
            );
            match relation.reference {
                Reference::ForeignKey => set.by_foreign_key.extend(records),
                Reference::Slug => set.by_slug.extend(records),
            }
        }
        Ok(set)
    }
}

impl Default for RelationRegistry {
    /// Redirects and tag sets by foreign key, attachments by slug.
    fn default() -> Self {
        let mut registry = RelationRegistry::new();
        registry
            .register(Relation {
                kind: "redirect",
                reference: Reference::ForeignKey,
                collect: collect_redirects,
            })
            .register(Relation {
                kind: "tag_set",
                reference: Reference::ForeignKey,
                collect: collect_tag_sets,
            })
            .register(Relation {
                kind: "page_file",
                reference: Reference::Slug,
                collect: collect_page_files,
            });
        registry
    }
}
