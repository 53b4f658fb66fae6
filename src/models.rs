//! Core data structures for the wiki.
//!
//! These structs are the shared language between the repository layer (SQL),
//! the rename orchestrator, and the output layer (serde_json). Anything that
//! needs a database connection lives in `repo`; what is here can be answered
//! from the entity alone.

use crate::db::WikiError;
use crate::slug::{name_to_url, slugify};
use serde::Serialize;

/// An independent wiki sharing the same storage. Every uniqueness
/// constraint on pages, files, and redirects is scoped by region.
#[derive(Debug, Clone, Serialize)]
pub struct Region {
    pub id: String,
    pub slug: String,
    pub full_name: String,
    pub created_at: String,
}

/// Path under which a region's pages are served, e.g. `/oakland/`.
pub fn page_base_path(region: &Region) -> String {
    format!("/{}/", region.slug)
}

/// A wiki page. `id` is `None` until the page has been saved.
///
/// `slug` always equals `slugify(name)` once saved; the repository recomputes
/// it on every save.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub id: Option<String>,
    pub region_id: String,
    pub name: String,
    pub slug: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Page {
    /// Builds an unsaved page.
    pub fn new(region_id: &str, name: &str, content: &str) -> Self {
        Page {
            id: None,
            region_id: region_id.to_string(),
            name: name.to_string(),
            slug: slugify(name),
            content: content.to_string(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    /// Builds a fresh, unsaved page carrying `template`'s content under a
    /// new name. Shares no identity with the template.
    pub fn create_from(template: &Page, name: &str) -> Self {
        Page::new(&template.region_id, name, &template.content)
    }

    /// The primary key, or `NotFound` for an unsaved page.
    pub fn saved_id(&self) -> Result<&str, WikiError> {
        self.id
            .as_deref()
            .ok_or_else(|| WikiError::NotFound(format!("Page '{}' has not been saved", self.name)))
    }

    /// Normalizes the name and rejects names with an empty slug.
    pub fn clean(&mut self) -> Result<(), WikiError> {
        self.name = crate::slug::normalize_name(&self.name);
        self.slug = slugify(&self.name);
        if self.slug.is_empty() {
            return Err(WikiError::InvalidName(self.name.clone()));
        }
        Ok(())
    }

    pub fn is_front_page(&self) -> bool {
        self.name.to_lowercase() == "front page"
    }

    pub fn is_template_page(&self) -> bool {
        let name = self.name.to_lowercase();
        name == "templates" || name.starts_with("templates/")
    }

    /// The URL form of the name, or the slug for a nameless page.
    pub fn pretty_slug(&self) -> String {
        if self.name.is_empty() {
            return self.slug.clone();
        }
        name_to_url(&self.name)
    }

    pub fn name_parts(&self) -> Vec<&str> {
        self.name.split('/').collect()
    }

    pub fn canonical_url(&self, region: &Region) -> String {
        format!("{}{}", page_base_path(region), name_to_url(&self.name))
    }
}

/// Rough file categories, checked in order against the guessed MIME type.
const ROUGH_TYPES: &[(&str, &str)] = &[
    ("audio", "audio"),
    ("video", "video"),
    ("application/pdf", "pdf"),
    ("application/msword", "word"),
    ("text/html", "html"),
    ("text", "text"),
    ("image", "image"),
    ("application/vnd.ms-powerpoint", "powerpoint"),
    ("application/vnd.ms-excel", "excel"),
];

/// A file attached to a page.
///
/// The owning page is referenced by `slug`, not by id, so the rename
/// orchestrator has to carry attachments over by hand.
#[derive(Debug, Clone, Serialize)]
pub struct PageFile {
    pub id: Option<String>,
    pub region_id: String,
    pub slug: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub file: Vec<u8>,
    pub size: usize,
    pub created_at: String,
}

impl PageFile {
    pub fn new(region_id: &str, slug: &str, name: &str, file: Vec<u8>) -> Self {
        PageFile {
            id: None,
            region_id: region_id.to_string(),
            slug: slug.to_string(),
            name: name.to_string(),
            size: file.len(),
            file,
            created_at: String::new(),
        }
    }

    /// A new, unsaved copy of this file attached to `page`.
    pub fn create_from(&self, page: &Page) -> Self {
        PageFile::new(&page.region_id, &page.slug, &self.name, self.file.clone())
    }

    pub fn mime_type(&self) -> Option<&'static str> {
        mime_guess::from_path(&self.name).first_raw()
    }

    /// Coarse classification used to pick an icon or a viewer.
    pub fn rough_type(&self) -> &'static str {
        self.mime_type()
            .and_then(|mime| {
                ROUGH_TYPES
                    .iter()
                    .find(|(prefix, _)| mime.starts_with(prefix))
                    .map(|(_, rough)| *rough)
            })
            .unwrap_or("unknown")
    }

    pub fn is_image(&self) -> bool {
        self.rough_type() == "image"
    }
}

/// Maps an old slug to the page that now holds its content.
#[derive(Debug, Clone, Serialize)]
pub struct Redirect {
    pub id: Option<String>,
    pub region_id: String,
    pub source: String,
    pub destination_id: String,
    pub created_at: String,
}

impl Redirect {
    pub fn new(region_id: &str, source: &str, destination_id: &str) -> Self {
        Redirect {
            id: None,
            region_id: region_id.to_string(),
            source: source.to_string(),
            destination_id: destination_id.to_string(),
            created_at: String::new(),
        }
    }

    /// A new, unsaved redirect from the same source to `destination`.
    pub fn create_from(&self, destination: &Page) -> Result<Self, WikiError> {
        Ok(Redirect::new(&destination.region_id, &self.source, destination.saved_id()?))
    }
}

/// The tags on a page. `tags` is loaded eagerly so that a tag set read
/// before its page is deleted still knows its tags afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct TagSet {
    pub id: Option<String>,
    pub page_id: String,
    pub region_id: String,
    pub tags: Vec<String>,
}

impl TagSet {
    pub fn create_from(&self, page: &Page) -> Result<Self, WikiError> {
        Ok(TagSet {
            id: None,
            page_id: page.saved_id()?.to_string(),
            region_id: page.region_id.clone(),
            tags: self.tags.clone(),
        })
    }
}

/// One immutable snapshot in an entity's history.
#[derive(Debug, Clone, Serialize)]
pub struct Version {
    pub id: i64,
    pub entity_kind: String,
    pub region_id: String,
    pub history_key: String,
    pub entity_id: String,
    pub version_number: i64,
    pub snapshot: serde_json::Value,
    pub comment: String,
    pub created_at: String,
}
